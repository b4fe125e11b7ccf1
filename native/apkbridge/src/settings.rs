use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{install::DEFAULT_REMOTE_TEMP_DIR, transfer::DEFAULT_POLL_INTERVAL};

/// Overrides `adb_path`.
pub const ADB_PATH_ENV: &str = "APKBRIDGE_ADB_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// `adb` executable for passthrough and server start. Empty means search `PATH`.
    pub adb_path: String,
    pub adb_host: String,
    pub adb_port: u16,
    /// Device directory packages are pushed to before installing.
    pub remote_temp_dir: String,
    pub poll_interval_ms: u64,
    pub log_to_file: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            adb_path: String::new(),
            // localhost resolves to IPv6 first on some systems, which adb doesn't listen on
            adb_host: "127.0.0.1".to_string(),
            adb_port: 5037,
            remote_temp_dir: DEFAULT_REMOTE_TEMP_DIR.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            log_to_file: true,
        }
    }
}

impl Settings {
    /// Poll interval, never shorter than 10 ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn adb_host(&self) -> forensic_adb::Host {
        forensic_adb::Host { host: Some(self.adb_host.clone()), port: Some(self.adb_port) }
    }

    /// `adb_path` when set, for [`crate::utils::resolve_binary_path`].
    pub fn configured_adb_path(&self) -> Option<&str> {
        Some(self.adb_path.as_str()).filter(|p| !p.is_empty())
    }

    /// Applies environment overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(adb_path) = var(ADB_PATH_ENV).filter(|p| !p.is_empty()) {
            debug!(adb_path, "ADB path overridden from environment");
            self.adb_path = adb_path;
        }
    }
}

/// Reads and writes `settings.json`.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    settings_file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(app_dir: &Path) -> Self {
        Self { settings_file_path: app_dir.join("settings.json") }
    }

    /// Store in the per-user config directory.
    pub fn default_location() -> Result<Self> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(Self::new(&config_dir.join("apkbridge")))
    }

    pub fn path(&self) -> &Path {
        &self.settings_file_path
    }

    /// Loads settings, creating the file with defaults when it doesn't exist yet.
    ///
    /// An unreadable or invalid file is an error and is left untouched.
    #[instrument(skip(self), fields(path = %self.settings_file_path.display()), err)]
    pub fn load_or_default(&self) -> Result<Settings> {
        if !self.settings_file_path.exists() {
            info!("Settings file doesn't exist, using defaults");
            let settings = Settings::default();
            self.save(&settings).context("Failed to write default settings")?;
            return Ok(settings);
        }
        self.load()
    }

    /// Load settings from file
    pub fn load(&self) -> Result<Settings> {
        let file_content = fs_err::read_to_string(&self.settings_file_path)
            .context("Failed to read settings file")?;
        let settings: Settings =
            serde_json::from_str(&file_content).context("Failed to parse settings file")?;
        debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, settings: &Settings) -> Result<()> {
        let settings_json =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
        if let Some(parent) = self.settings_file_path.parent()
            && !parent.exists()
        {
            info!(path = %parent.display(), "Creating settings directory");
            fs_err::create_dir_all(parent).context("Failed to create settings directory")?;
        }
        fs_err::write(&self.settings_file_path, settings_json)
            .context("Failed to write settings file")?;
        debug!(path = %self.settings_file_path.display(), "Saved settings");
        Ok(())
    }
}
