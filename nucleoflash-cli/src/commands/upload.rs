//! Upload command implementation.

use anyhow::{Context, Result};
use console::style;
use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use nucleoflash::{
    ConsoleUploader, FwUpgradeType, SerialConfig, SerialConsole, UploadConfig, UploadError,
    UploadEvent,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::serial::{select_baud, select_serial_port};
use crate::{Cli, CliError, use_fancy_output};

/// Upload command implementation.
pub(crate) fn cmd_upload(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    kind: FwUpgradeType,
    timeout_ms: Option<u64>,
    handshake_timeout_ms: Option<u64>,
) -> Result<()> {
    // Rejected before any port is opened
    if kind != FwUpgradeType::ApplicationFirmware {
        return Err(CliError::Upload(UploadError::UnsupportedOperation))
            .with_context(|| format!("{kind} firmware cannot be uploaded over the debug console"));
    }
    let total = fs::metadata(firmware)
        .map(|m| m.len())
        .map_err(|_| CliError::Upload(UploadError::InvalidFirmwareFile))
        .with_context(|| format!("Cannot read firmware {}", firmware.display()))?;

    let upload_config = upload_config(config, timeout_ms, handshake_timeout_ms);
    debug!("Upload configuration: {upload_config:?}");

    let port = select_serial_port(cli.port.as_deref(), config)?;
    let baud = select_baud(cli.baud, config);
    if !cli.quiet {
        eprintln!(
            "{} Uploading {} ({total} bytes) via {} at {baud} baud",
            style("→").cyan(),
            style(firmware.display()).yellow(),
            style(&port).green()
        );
    }

    let console = SerialConsole::open(&SerialConfig::new(&port, baud))
        .with_context(|| format!("Failed to open serial port {port}"))?;
    let uploader = ConsoleUploader::with_config(Arc::new(console), upload_config);

    let (tx, rx) = crossbeam_channel::unbounded();
    let pb = progress_bar(cli.quiet, total)?;
    let started = uploader.load_fw_file(kind, firmware, tx);

    let outcome = if started {
        wait_for_outcome(&rx, &pb, total)
    } else {
        // A refused request reports at most one error synchronously.
        match rx.try_recv() {
            Ok(UploadEvent::Error(e)) => Err(e),
            _ => Err(UploadError::TransmissionError),
        }
    };

    match outcome {
        Ok(()) => {
            pb.finish_and_clear();
            if !cli.quiet {
                eprintln!(
                    "{} Upload complete, target confirmed the image",
                    style("✓").green().bold()
                );
            }
            Ok(())
        },
        Err(e) => {
            pb.abandon();
            Err(CliError::Upload(e).into())
        },
    }
}

/// Apply command-line timeouts over the configuration file.
fn upload_config(
    config: &Config,
    timeout_ms: Option<u64>,
    handshake_timeout_ms: Option<u64>,
) -> UploadConfig {
    let mut upload = config.upload_config();
    if let Some(ms) = timeout_ms {
        upload = upload.with_response_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = handshake_timeout_ms {
        upload = upload.with_handshake_timeout(Duration::from_millis(ms));
    }
    upload
}

fn progress_bar(quiet: bool, total: u64) -> Result<ProgressBar> {
    if quiet || !use_fancy_output() {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    Ok(pb)
}

/// Feed progress into the bar until the upload ends.
fn wait_for_outcome(
    rx: &Receiver<UploadEvent>,
    pb: &ProgressBar,
    total: u64,
) -> std::result::Result<(), UploadError> {
    for event in rx {
        match event {
            UploadEvent::Progress(remaining) => {
                pb.set_position(total.saturating_sub(remaining as u64));
            },
            UploadEvent::Complete => return Ok(()),
            UploadEvent::Error(e) => return Err(e),
        }
    }
    // The uploader always reports a verdict before dropping the sender.
    Err(UploadError::TransmissionError)
}
