//! Command-line surface: `parse`, `install`, and everything else handed to `adb`.

use std::{ffi::OsString, process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use humansize::{DECIMAL, format_size};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    adb::{self, AdbDevice},
    archive,
    error::Error,
    install::Installer,
    manifest::{ManifestDocument, ParseOutput},
    passthrough::{self, SPAWN_FAILURE_EXIT_CODE},
    settings::Settings,
    source::PackageSource,
    transfer::TransferProgress,
    utils::resolve_binary_path,
};

/// Commands handled here rather than by `adb`.
pub const OWN_COMMANDS: [&str; 2] = ["parse", "install"];

#[derive(Debug, Parser)]
#[command(name = "apkbridge", version, about)]
pub struct Cli {
    /// Serial of the device to use
    #[arg(short = 's', global = true, env = "ANDROID_SERIAL", value_name = "SERIAL")]
    pub serial: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the package name and launch activity of an APK as JSON
    Parse {
        /// Local path or http(s) URL of the APK
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Push an APK to the device and install it with `pm install`
    Install {
        /// `pm install` flags and the local path or http(s) URL of the APK
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// What the process arguments ask for.
#[derive(Debug)]
pub enum Invocation {
    /// `parse` or `install`
    Own(Cli),
    /// Anything else, handed to `adb` unchanged (program name dropped)
    Adb(Vec<OsString>),
}

impl Invocation {
    /// Routes on the first token after `-s SERIAL` and `-v`. Only `parse` and `install` go
    /// through clap, so `adb`'s own flags, `--help` and `--version` reach `adb` untouched.
    pub fn from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let rest = args.get(1..).unwrap_or_default();
        if names_own_command(rest) {
            Cli::try_parse_from(args).map(Self::Own)
        } else {
            Ok(Self::Adb(rest.to_vec()))
        }
    }

    pub fn verbose(&self) -> bool {
        match self {
            Self::Own(cli) => cli.verbose,
            Self::Adb(_) => false,
        }
    }
}

fn names_own_command(args: &[OsString]) -> bool {
    let mut tokens = args.iter().map(|a| a.to_str());
    while let Some(token) = tokens.next() {
        match token {
            Some("-s") => {
                tokens.next();
            }
            Some("-v" | "--verbose") => {}
            Some(attached) if attached.starts_with("-s") => {}
            Some(command) => return OWN_COMMANDS.contains(&command),
            None => return false,
        }
    }
    false
}

/// The single source location `parse` accepts.
pub fn parse_source(args: &[String]) -> Result<&str, Error> {
    match args {
        [location] => Ok(location.as_str()),
        _ => Err(Error::ArgumentError(format!(
            "parse takes exactly one APK path or URL, got {} arguments",
            args.len()
        ))),
    }
}

/// Splits `install` arguments into the source and `pm install` flags.
///
/// The source is the last argument, as with `adb install [flags] <apk>`. When the last argument
/// is a flag, the source is the first argument instead (`install <apk> [flags]`).
pub fn split_install_args(args: &[String]) -> Result<(&str, Vec<String>), Error> {
    let index = match args {
        [] => return Err(Error::ArgumentError("install needs an APK path or URL".to_string())),
        [.., last] if !last.starts_with('-') => args.len() - 1,
        [first, ..] if !first.starts_with('-') => 0,
        _ => {
            return Err(Error::ArgumentError(
                "install needs an APK path or URL after the flags".to_string(),
            ));
        }
    };
    let flags = args
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != index)
        .map(|(_, arg)| arg.clone())
        .collect();
    Ok((args[index].as_str(), flags))
}

/// Runs the invocation and returns the process exit code.
pub async fn run(invocation: Invocation, settings: Settings) -> Result<ExitCode> {
    let cli = match invocation {
        Invocation::Own(cli) => cli,
        Invocation::Adb(args) => return Ok(run_adb(&args, &settings).await),
    };
    match cli.command {
        Command::Parse { args } => parse(&args).await?,
        Command::Install { args } => install(&args, cli.serial.as_deref(), &settings).await?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Reads the manifest at `location` and resolves its launch activity.
#[instrument(level = "debug", err)]
pub async fn inspect(location: &str) -> Result<ParseOutput> {
    let manifest = archive::read_manifest(location).await?;
    let doc = ManifestDocument::decode(&manifest)?;
    Ok(ParseOutput::from(&doc))
}

#[instrument(level = "debug", err)]
async fn parse(args: &[String]) -> Result<()> {
    let location = parse_source(args)?;
    let output = inspect(location).await?;
    println!("{}", output.to_json_pretty().context("Failed to serialize parse output")?);
    Ok(())
}

#[instrument(level = "debug", skip(settings), err)]
async fn install(args: &[String], serial: Option<&str>, settings: &Settings) -> Result<()> {
    let (location, pm_flags) = split_install_args(args)?;

    let host = settings.adb_host();
    adb::ensure_server_running(&host, settings.configured_adb_path()).await?;
    let device = AdbDevice::connect(host, serial).await?;
    info!(%device, "Using device");

    let client = reqwest::Client::new();
    let source = PackageSource::open(location, &client).await?;
    let total = source.length();

    let cancel_token = CancellationToken::new();
    // SIGINT is caught only while the installer runs. It cancels the push or `pm install`.
    let interrupt_listener = tokio::spawn({
        let cancel_token = cancel_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling install");
                cancel_token.cancel();
            }
        }
    });

    let installer = Installer::new(Arc::new(device))
        .with_remote_temp_dir(settings.remote_temp_dir.clone())
        .with_poll_interval(settings.poll_interval())
        .with_cancel_token(cancel_token);

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(progress_rx, total));
    let result = installer.install(source, &pm_flags, progress_tx).await;
    interrupt_listener.abort();
    // the channel closes once install returns, which ends the renderer
    if let Err(e) = renderer.await {
        debug!(error = &e as &dyn std::error::Error, "Progress renderer failed");
    }

    let report = result?;
    print!("{}", report.output);
    report.ensure_success()?;
    Ok(())
}

async fn run_adb(args: &[OsString], settings: &Settings) -> ExitCode {
    let adb_path = match resolve_binary_path(settings.configured_adb_path(), "adb") {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(SPAWN_FAILURE_EXIT_CODE);
        }
    };
    ExitCode::from(passthrough::run_adb(&adb_path, args).await)
}

/// Draws samples on a stderr progress bar until the sender side closes.
async fn render_progress(mut samples: UnboundedReceiver<TransferProgress>, total: Option<u64>) {
    let bar = match total {
        Some(total) => ProgressBar::new(total).with_style(
            ProgressStyle::with_template(
                "{spinner} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        ),
        None => ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        ),
    };
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut finished = false;
    while let Some(sample) = samples.recv().await {
        bar.set_position(sample.transferred);
        bar.set_message(progress_message(&sample));
        if sample.finished {
            finished = true;
            bar.finish();
        }
    }
    if !finished {
        bar.abandon();
    }
}

/// Speed and remaining time shown next to the bar.
pub fn progress_message(sample: &TransferProgress) -> String {
    let speed = format!("{}/s", format_size(sample.speed, DECIMAL));
    match (sample.finished, sample.eta) {
        (true, _) => format!("{speed}, done"),
        (false, Some(eta)) => format!("{speed}, ETA {}", HumanDuration(eta)),
        (false, None) => speed,
    }
}
