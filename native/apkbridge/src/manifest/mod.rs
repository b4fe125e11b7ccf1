//! Decoded view of `AndroidManifest.xml`, limited to package identity and activities.

#[cfg(test)]
pub(crate) mod fixture;
mod launch;

use std::io::Cursor;

pub use launch::{LAUNCHER_CATEGORY, MAIN_ACTION, ParseOutput};
use resand::{
    defs::{ResTableRef, ResourceMap},
    res_value::ResValueType,
    string_pool::StringPoolHandler,
    xmltree::{ResXMLTreeAttribute, XMLTree, XMLTreeNode},
};
use tracing::instrument;

use crate::error::{Error, Result};

/// Framework resource id of `android:name`.
pub(crate) const ATTR_NAME_RESOURCE_ID: u32 = 0x0101_0003;

/// Package identity and the activities it declares, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestDocument {
    pub package_name: String,
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Activity {
    pub name: String,
    pub intent_filters: Vec<IntentFilter>,
}

/// An `<intent-filter>`. Either list may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntentFilter {
    pub actions: Vec<String>,
    pub categories: Vec<String>,
}

impl IntentFilter {
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

impl ManifestDocument {
    /// Decodes a compiled (binary XML) manifest.
    #[instrument(level = "debug", skip(bytes), fields(len = bytes.len()), err)]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let xml = XMLTree::read(&mut Cursor::new(bytes))
            .map_err(|e| Error::malformed_manifest(format!("failed to parse binary XML: {e}")))?;
        let tree = Tree { strings: &xml.string_pool, resource_map: xml.resource_map.as_ref() };

        let root = &xml.root;
        match tree.element_name(root) {
            Some("manifest") => {}
            other => {
                return Err(Error::malformed_manifest(format!(
                    "root element is <{}>, expected <manifest>",
                    other.unwrap_or_default()
                )));
            }
        }
        let package_name = tree
            .attr(root, "package")
            .ok_or_else(|| Error::malformed_manifest("missing <manifest package=...>"))?
            .to_owned();

        // get_elements collects through a stack, which reverses sibling order
        let activities = tree
            .children(root, "application")
            .flat_map(|application| tree.children(application, "activity"))
            .map(|activity| Activity {
                name: tree.attr(activity, "name").unwrap_or_default().to_owned(),
                intent_filters: tree
                    .children(activity, "intent-filter")
                    .map(|filter| IntentFilter {
                        actions: tree.child_names(filter, "action"),
                        categories: tree.child_names(filter, "category"),
                    })
                    .collect(),
            })
            .collect();

        Ok(Self { package_name, activities })
    }

    /// First activity declaring the MAIN action together with the LAUNCHER category.
    pub fn launch_activity(&self) -> Option<&Activity> {
        launch::resolve(self)
    }
}

/// Name lookups against one document's string pool and resource map.
#[derive(Clone, Copy)]
struct Tree<'a> {
    strings: &'a StringPoolHandler,
    resource_map: Option<&'a ResourceMap>,
}

impl<'a> Tree<'a> {
    fn element_name(self, node: &XMLTreeNode) -> Option<&'a str> {
        node.element.name.resolve(self.strings)
    }

    /// Direct children called `name`, in document order.
    fn children<'n>(
        self,
        node: &'n XMLTreeNode,
        name: &'static str,
    ) -> impl Iterator<Item = &'n XMLTreeNode> + use<'a, 'n> {
        node.children.iter().filter(move |child| self.element_name(child) == Some(name))
    }

    /// `android:name` of every `<kind>` child.
    fn child_names(self, node: &XMLTreeNode, kind: &'static str) -> Vec<String> {
        self.children(node, kind)
            .filter_map(|child| self.attr(child, "name"))
            .map(str::to_owned)
            .collect()
    }

    /// String value of attribute `name`.
    ///
    /// Shrunk manifests blank attribute names in the string pool. `name` then falls back to
    /// the resource map entry for `android:name`.
    fn attr(self, node: &XMLTreeNode, name: &str) -> Option<&'a str> {
        let attr = node.get_attribute(name, self.strings).or_else(|| {
            (name == "name")
                .then(|| node.element.attributes.iter().find(|a| self.is_obfuscated_name(a)))
                .flatten()
        })?;
        self.string_value(attr)
    }

    fn is_obfuscated_name(self, attr: &ResXMLTreeAttribute) -> bool {
        let blank = attr.name.resolve(self.strings).is_none_or(str::is_empty);
        blank
            && self
                .resource_map
                .and_then(|map| map.mapping.get(attr.name.index as usize))
                .is_some_and(|id| resource_id(id) == ATTR_NAME_RESOURCE_ID)
    }

    fn string_value(self, attr: &ResXMLTreeAttribute) -> Option<&'a str> {
        match attr.typed_value.data {
            ResValueType::String(sref) => sref.resolve(self.strings),
            _ => attr.raw_value.resolve(self.strings),
        }
    }
}

fn resource_id(id: &ResTableRef) -> u32 {
    (u32::from(id.package_index) << 24) | (u32::from(id.type_index) << 16) | u32::from(id.entry_index)
}
