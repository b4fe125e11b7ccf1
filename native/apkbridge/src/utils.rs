mod speed;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
pub use speed::AverageSpeed;
use tracing::{debug, instrument};

/// Resolves an executable from an explicitly configured path or name, falling back to
/// searching `PATH` for `name`.
#[instrument(level = "debug", ret, err)]
pub fn resolve_binary_path(configured: Option<&str>, name: &str) -> Result<PathBuf> {
    if let Some(configured) = configured.filter(|c| !c.is_empty()) {
        let path = Path::new(configured);
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        debug!(configured, "Configured binary is not a file, searching PATH");
        return which::which(configured)
            .with_context(|| format!("Configured binary {configured} not found"));
    }
    which::which(name).with_context(|| format!("{name} not found in PATH"))
}
