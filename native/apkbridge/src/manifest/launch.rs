use serde::Serialize;

use super::{Activity, ManifestDocument};

pub const MAIN_ACTION: &str = "android.intent.action.MAIN";
pub const LAUNCHER_CATEGORY: &str = "android.intent.category.LAUNCHER";

/// Scans activities, then each activity's filters, in declaration order. First match wins.
pub(super) fn resolve(doc: &ManifestDocument) -> Option<&Activity> {
    for activity in &doc.activities {
        for filter in &activity.intent_filters {
            if filter.has_action(MAIN_ACTION) && filter.has_category(LAUNCHER_CATEGORY) {
                return Some(activity);
            }
        }
    }
    None
}

/// Result record of the `parse` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutput {
    pub package_name: String,
    /// Empty when the package declares no launcher activity.
    pub launch_activity: String,
}

impl From<&ManifestDocument> for ParseOutput {
    fn from(doc: &ManifestDocument) -> Self {
        Self {
            package_name: doc.package_name.clone(),
            launch_activity: doc.launch_activity().map(|a| a.name.clone()).unwrap_or_default(),
        }
    }
}

impl ParseOutput {
    /// JSON with four-space indentation.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        // serde_json only ever writes valid UTF-8
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
