//! Push, `pm install`, clean up.

use std::{path::Path, sync::Arc, time::Duration};

use lazy_regex::regex_captures;
use reqwest::Url;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    adb::RemoteDevice,
    error::{Error, Result},
    source::{PackageSource, is_http_url},
    transfer::{DEFAULT_POLL_INTERVAL, TransferController, TransferProgress},
};

pub const DEFAULT_REMOTE_TEMP_DIR: &str = "/data/local/tmp";

/// Name a package gets in the device's temp directory: the last path segment of the source
/// (query and fragment ignored for URLs), with `.apk` appended when missing.
pub fn remote_file_name(location: &str) -> String {
    let base = if is_http_url(location) {
        Url::parse(location)
            .ok()
            .and_then(|url| url.path_segments()?.next_back().map(str::to_string))
            .unwrap_or_default()
    } else {
        Path::new(location).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    };
    let base = if base.is_empty() { "package".to_string() } else { base };
    if base.ends_with(".apk") { base } else { format!("{base}.apk") }
}

/// What `pm install` printed for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub destination: String,
    pub bytes_transferred: u64,
    pub output: String,
}

impl InstallReport {
    /// The `REASON` of a `Failure [REASON]` line, if the package manager rejected the package.
    pub fn failure_reason(&self) -> Option<&str> {
        regex_captures!(r"Failure \[([^\]]+)\]", &self.output).map(|(_, reason)| reason)
    }

    /// Turns a package manager rejection into `RemoteCommandFailure`.
    pub fn ensure_success(&self) -> Result<()> {
        match self.failure_reason() {
            Some(reason) => Err(Error::RemoteCommandFailure {
                command: "pm install".to_string(),
                source: anyhow::anyhow!("package manager rejected the package: {reason}"),
            }),
            None => Ok(()),
        }
    }
}

/// Installs packages on one device.
pub struct Installer {
    device: Arc<dyn RemoteDevice>,
    remote_temp_dir: String,
    poll_interval: Duration,
    cancel_token: CancellationToken,
}

impl Installer {
    pub fn new(device: Arc<dyn RemoteDevice>) -> Self {
        Self {
            device,
            remote_temp_dir: DEFAULT_REMOTE_TEMP_DIR.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_remote_temp_dir(mut self, dir: impl Into<String>) -> Self {
        self.remote_temp_dir = dir.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn destination_for(&self, location: &str) -> String {
        format!("{}/{}", self.remote_temp_dir.trim_end_matches('/'), remote_file_name(location))
    }

    /// Pushes `source`, runs `pm install <pm_flags..> <dest>` and removes the pushed file.
    ///
    /// The install command only runs after a complete push. Cancellation stops the push or the
    /// install command. Removal is attempted whatever happened before it, also when this future
    /// is dropped, and its failure is only logged.
    #[instrument(level = "debug", skip(self, source, progress), fields(location = source.location()), err)]
    pub async fn install(
        &self,
        source: PackageSource,
        pm_flags: &[String],
        progress: UnboundedSender<TransferProgress>,
    ) -> Result<InstallReport> {
        let destination = self.destination_for(source.location());
        let pushed = PushedFile::new(self.device.clone(), destination.clone());
        let controller =
            TransferController::new(self.device.clone(), self.poll_interval, self.cancel_token.clone());

        let outcome = match controller.transfer(source, &destination, progress).await {
            Ok(bytes_transferred) => {
                info!(destination, bytes_transferred, "Package pushed, installing");
                self.run_install(&destination, pm_flags).await.map(|output| InstallReport {
                    destination: destination.clone(),
                    bytes_transferred,
                    output,
                })
            }
            Err(e) => Err(e),
        };

        pushed.remove().await;
        outcome
    }

    async fn run_install(&self, destination: &str, pm_flags: &[String]) -> Result<String> {
        let mut args = Vec::with_capacity(pm_flags.len() + 2);
        args.push("install".to_string());
        args.extend_from_slice(pm_flags);
        args.push(destination.to_string());
        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => {
                info!(destination, "Install cancelled");
                Err(Error::Cancelled)
            }
            result = self.device.run_command("pm", &args) => result.map_err(|source| {
                Error::RemoteCommandFailure { command: "pm install".to_string(), source }
            }),
        }
    }
}

/// A package pushed to the device. Dropping it without [`PushedFile::remove`] schedules the
/// removal on the runtime instead.
struct PushedFile {
    device: Arc<dyn RemoteDevice>,
    path: Option<String>,
}

impl PushedFile {
    fn new(device: Arc<dyn RemoteDevice>, path: String) -> Self {
        Self { device, path: Some(path) }
    }

    async fn remove(mut self) {
        if let Some(path) = self.path.take() {
            remove_remote_file(self.device.as_ref(), &path).await;
        }
    }
}

impl Drop for PushedFile {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(%path, "Install interrupted, removing pushed package in the background");
                let device = self.device.clone();
                runtime.spawn(async move { remove_remote_file(device.as_ref(), &path).await });
            }
            Err(_) => warn!(%path, "No runtime left to remove pushed package"),
        }
    }
}

async fn remove_remote_file(device: &dyn RemoteDevice, path: &str) {
    let args = ["-f".to_string(), path.to_string()];
    if let Err(e) = device.run_command("rm", &args).await {
        warn!(
            destination = path,
            error = e.as_ref() as &dyn std::error::Error,
            "Failed to remove pushed package"
        );
    }
}
