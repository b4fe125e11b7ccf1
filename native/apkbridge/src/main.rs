use std::{error::Error, process::ExitCode};

use apkbridge::{
    cli::{self, Invocation},
    logging,
    settings::{Settings, SettingsStore},
};
use mimalloc::MiMalloc;
use tracing::{debug, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let invocation = match Invocation::from_args(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(e) => e.exit(),
    };

    // settings decide whether to log to a file, so they are read before logging is up
    let loaded = SettingsStore::default_location().and_then(|store| store.load_or_default());
    let log_to_file = loaded.as_ref().map_or(true, |s| s.log_to_file);
    let log_dir = if log_to_file { logging::default_log_dir() } else { None };
    let _guard = match logging::setup_logging(invocation.verbose(), log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to setup logging: {e:#}");
            None
        }
    };

    let mut settings = loaded.unwrap_or_else(|e| {
        warn!(error = e.as_ref() as &dyn Error, "Failed to load settings, using defaults");
        Settings::default()
    });
    settings.apply_env(|key| std::env::var(key).ok());

    match cli::run(invocation, settings).await {
        Ok(code) => code,
        Err(e) => {
            debug!(error = e.as_ref() as &dyn Error, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
