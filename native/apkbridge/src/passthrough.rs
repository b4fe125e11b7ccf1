//! Runs `adb` itself for every command this tool doesn't handle.

use std::{
    error::Error,
    ffi::OsString,
    io,
    path::Path,
    process::{ExitStatus, Stdio},
};

use tokio::process::Command;
use tracing::{error, instrument, warn};

/// Exit code when `adb` could not be started or ended without one (killed by a signal).
pub const SPAWN_FAILURE_EXIT_CODE: u8 = 127;

/// Runs `adb_path` with `args` on the inherited stdio and returns its exit code.
#[instrument(level = "debug", ret)]
pub async fn run_adb(adb_path: &Path, args: &[OsString]) -> u8 {
    let status = Command::new(adb_path)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await;
    exit_code(status)
}

fn exit_code(status: io::Result<ExitStatus>) -> u8 {
    match status {
        Ok(status) => match status.code() {
            // exit statuses are 0..=255 on unix; anything wider is truncated the way a shell would
            Some(code) => code as u8,
            None => {
                warn!(%status, "adb terminated without an exit code");
                SPAWN_FAILURE_EXIT_CODE
            }
        },
        Err(e) => {
            error!(error = &e as &dyn Error, "Failed to run adb");
            SPAWN_FAILURE_EXIT_CODE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_maps_to_sentinel() {
        let code = run_adb(Path::new("/definitely/not/adb"), &[]).await;
        assert_eq!(code, SPAWN_FAILURE_EXIT_CODE);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn propagates_exit_code() {
        let args: [OsString; 2] = ["-c".into(), "exit 3".into()];
        assert_eq!(run_adb(Path::new("/bin/sh"), &args).await, 3);
        let args: [OsString; 2] = ["-c".into(), "true".into()];
        assert_eq!(run_adb(Path::new("/bin/sh"), &args).await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_death_maps_to_sentinel() {
        let args: [OsString; 2] = ["-c".into(), "kill -9 $$".into()];
        assert_eq!(run_adb(Path::new("/bin/sh"), &args).await, SPAWN_FAILURE_EXIT_CODE);
    }
}
