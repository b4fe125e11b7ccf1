use std::fmt::Display;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use derive_more::Debug;
use forensic_adb::{Device, DeviceState, Host, UnixPath};
use tokio::io::AsyncRead;
use tracing::{info, instrument, trace, warn};

use super::{RemoteDevice, command_line};

/// A device reached through the ADB server.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    #[debug(skip)]
    inner: Device,
    /// Serial reported by ADB (`host:port` for wireless devices)
    pub serial: String,
    /// Product identifier from the device listing, when reported
    pub product: Option<String>,
}

impl Display for AdbDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.product.as_deref().unwrap_or("Unknown"), self.serial)
    }
}

impl AdbDevice {
    /// Connects to the device with the given serial, or to the only online device.
    ///
    /// When several devices are online and no serial is given, the first one listed is used.
    #[instrument(level = "debug", skip(host), err)]
    pub async fn connect(host: Host, serial: Option<&str>) -> Result<Self> {
        let devices = host
            .devices::<Vec<_>>()
            .await
            .context("Failed to list devices")?
            .into_iter()
            .filter(|d| d.state == DeviceState::Device)
            .collect::<Vec<_>>();

        let target = if let Some(serial) = serial {
            devices
                .into_iter()
                .find(|d| d.serial == serial)
                .with_context(|| format!("Requested device {serial} not available"))?
        } else {
            if devices.len() > 1 {
                warn!(
                    count = devices.len(),
                    "More than one device online, using the first one (pass -s to choose)"
                );
            }
            match devices.into_iter().next() {
                Some(d) => d,
                None => bail!("No devices available"),
            }
        };

        info!(serial = %target.serial, "Connecting to device");
        let inner = Device::new(host, target.serial.clone(), target.info.clone())
            .await
            .context("Failed to connect to device")?;
        let product = inner.info.get("product").map(|p| p.to_string());
        Ok(Self { serial: inner.serial.clone(), product, inner })
    }

    /// Executes a shell command on the device
    #[instrument(level = "debug", skip(self), err)]
    async fn shell(&self, command: &str) -> Result<String> {
        self.inner
            .execute_host_shell_command(command)
            .await
            .context("Failed to execute shell command")
            .inspect(|v| trace!(output = ?v, "Shell command executed"))
    }
}

#[async_trait]
impl RemoteDevice for AdbDevice {
    async fn stat_size(&self, path: &str) -> Result<u64> {
        let stat = self
            .inner
            .stat(UnixPath::new(path))
            .await
            .with_context(|| format!("Failed to stat {path}"))?;
        Ok(stat.size as u64)
    }

    #[instrument(level = "debug", skip(self, source), err)]
    async fn write_file(
        &self,
        path: &str,
        mut source: &mut (dyn AsyncRead + Send + Unpin),
        mode: u32,
    ) -> Result<()> {
        self.inner
            .push(&mut source, UnixPath::new(path), mode)
            .await
            .with_context(|| format!("Failed to push to {path}"))
    }

    async fn run_command(&self, command: &str, args: &[String]) -> Result<String> {
        self.shell(&command_line(command, args)).await
    }
}
