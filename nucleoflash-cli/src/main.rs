//! nucleoflash CLI - Command-line tool for uploading firmware to STM32 boards
//! over their debug console.
//!
//! ## Features
//!
//! - Upload application firmware with a live progress bar
//! - Inspect a firmware file (length, STM32 CRC, handshake frame)
//! - List serial ports and auto-detect ST-LINK consoles
//! - Console monitor
//! - Shell completion generation
//! - Environment variable and TOML configuration support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use nucleoflash::{FwUpgradeType, UploadError};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if progress bars and colors should be used.
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Default console baud rate of Nucleo boards.
pub(crate) const DEFAULT_BAUD: u32 = 115_200;

/// nucleoflash - Upload firmware to STM32 boards over the debug console.
///
/// Environment variables:
///   NUCLEOFLASH_PORT   - Default serial port
///   NUCLEOFLASH_BAUD   - Default baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "nucleoflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "NUCLEOFLASH_PORT")]
    pub(crate) port: Option<String>,

    /// Console baud rate [default: 115200].
    #[arg(short, long, global = true, env = "NUCLEOFLASH_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Firmware kinds accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum FwKind {
    /// Application firmware (uploaded over the debug console).
    Application,
    /// Radio stack firmware (not supported over the debug console).
    Radio,
}

impl From<FwKind> for FwUpgradeType {
    fn from(kind: FwKind) -> Self {
        match kind {
            FwKind::Application => Self::ApplicationFirmware,
            FwKind::Radio => Self::RadioFirmware,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Upload a firmware image to the board.
    Upload {
        /// Path to the raw firmware binary.
        firmware: PathBuf,

        /// Firmware kind.
        #[arg(long = "type", value_enum, default_value = "application")]
        kind: FwKind,

        /// Timeout for each awaited target response, in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Timeout for the handshake acknowledgement, in milliseconds.
        #[arg(long)]
        handshake_timeout_ms: Option<u64>,
    },

    /// Show upload information about a firmware file.
    Info {
        /// Path to the raw firmware binary.
        firmware: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Print the board's console output.
    Monitor,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Failures with a dedicated process exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation or environment.
    #[error("{0}")]
    Usage(String),
    /// Invalid configuration.
    #[error("{0}")]
    Config(String),
    /// No serial port could be selected.
    #[error("{0}")]
    DeviceNotFound(String),
    /// The upload was refused or failed.
    #[error("upload failed: {0}")]
    Upload(UploadError),
}

impl CliError {
    /// Process exit code for this error.
    pub(crate) fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Config(_) => 3,
            Self::DeviceNotFound(_) => 4,
            Self::Upload(_) => 5,
        }
    }
}

/// Exit code for any error returned by a command.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    match err.downcast_ref::<nucleoflash::Error>() {
        Some(nucleoflash::Error::DeviceNotFound) => 4,
        Some(nucleoflash::Error::Upload(_)) => 5,
        _ => 1,
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    if cli.baud == Some(0) {
        return Err(CliError::Usage("--baud must be greater than zero".to_string()).into());
    }

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };
    config.validate()?;

    match &cli.command {
        Commands::Upload {
            firmware,
            kind,
            timeout_ms,
            handshake_timeout_ms,
        } => commands::upload::cmd_upload(
            cli,
            &config,
            firmware,
            (*kind).into(),
            *timeout_ms,
            *handshake_timeout_ms,
        ),
        Commands::Info { firmware, json } => commands::info::cmd_info(&config, firmware, *json),
        Commands::ListPorts { json } => commands::info::cmd_list_ports(*json),
        Commands::Monitor => commands::monitor::cmd_monitor(cli, &config),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    debug!(
        "nucleoflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}
