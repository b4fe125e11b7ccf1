//! The device capability the install pipeline runs against, and its ADB implementation.

mod device;
#[cfg(test)]
pub(crate) mod fake;

use std::{error::Error, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
pub use device::AdbDevice;
use tokio::{io::AsyncRead, process::Command, time::timeout};
use tracing::{debug, error, info, instrument};

use crate::utils::resolve_binary_path;

/// Operations the transfer controller and the installer need from a device.
#[async_trait]
pub trait RemoteDevice: Send + Sync {
    /// Size in bytes of the file at `path`. Fails while the file does not exist.
    async fn stat_size(&self, path: &str) -> Result<u64>;

    /// Streams `source` into `path`, creating or truncating it with the given permission bits.
    async fn write_file(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
        mode: u32,
    ) -> Result<()>;

    /// Runs `command` with `args` in the device shell and returns its captured output.
    async fn run_command(&self, command: &str, args: &[String]) -> Result<String>;
}

/// Quotes `arg` for the device's POSIX shell. Plain words are left untouched.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=:+,@%".contains(c));
    if plain { arg.to_string() } else { format!("'{}'", arg.replace('\'', r"'\''")) }
}

/// Joins a command and its quoted arguments into one shell line.
pub fn command_line(command: &str, args: &[String]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&shell_quote(arg));
    }
    line
}

/// Returns true when the ADB server answers on `host`.
#[instrument(level = "debug", ret)]
pub async fn is_server_running(host: &forensic_adb::Host) -> bool {
    match timeout(Duration::from_millis(1000), host.check_host_running()).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(error = &e as &dyn Error, "ADB server check failed");
            false
        }
        Err(_) => {
            debug!("Timed out while checking ADB server status (likely not running)");
            false
        }
    }
}

/// Starts the ADB server with `adb start-server` unless it is already running.
///
/// The `adb` binary (`configured_adb`, else `PATH`) is only looked up when a start is needed.
#[instrument(level = "debug", skip(host), err)]
pub async fn ensure_server_running(
    host: &forensic_adb::Host,
    configured_adb: Option<&str>,
) -> Result<()> {
    if is_server_running(host).await {
        return Ok(());
    }
    let adb_path = resolve_binary_path(configured_adb, "adb")
        .context("ADB server is not running and the adb binary was not found")?;
    info!(path = %adb_path.display(), "ADB server not running, starting it");
    let output = timeout(Duration::from_secs(10), {
        let mut command = Command::new(&adb_path);
        command.arg("start-server");
        command.output()
    })
    .await
    .map_err(|_| anyhow!("Timed out while starting ADB server"))?
    .context("Failed to start ADB server")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(%stderr, "adb start-server failed");
        bail!("Failed to start ADB server: {}", stderr.trim());
    }
    info!("ADB server started");
    Ok(())
}
