//! Console monitor command implementation.

use anyhow::{Context, Result};
use console::style;
use crossbeam_channel::Receiver;
use nucleoflash::{Console, ConsoleListener, MonitorListener, SerialConfig, SerialConsole};
use std::io::{self, Write};
use std::sync::Arc;

use crate::config::Config;
use crate::serial::{select_baud, select_serial_port};
use crate::Cli;

/// Print the board's console output until interrupted.
pub(crate) fn cmd_monitor(cli: &Cli, config: &Config) -> Result<()> {
    let port = select_serial_port(cli.port.as_deref(), config)?;
    let baud = select_baud(cli.baud, config);

    if !cli.quiet {
        eprintln!(
            "{} Monitoring {} at {baud} baud",
            style("📡").cyan(),
            style(&port).green()
        );
        eprintln!("{}", style("Press Ctrl+C to exit").dim());
    }

    let console = SerialConsole::open(&SerialConfig::new(&port, baud))
        .with_context(|| format!("Failed to open serial port {port}"))?;
    let (listener, rx) = MonitorListener::new();
    let listener: Arc<dyn ConsoleListener> = listener;
    console.add_listener(listener.clone());

    let result = print_stream(&rx, &mut io::stdout().lock());
    console.remove_listener(&listener);
    result.context("Failed to write console output")
}

/// Copy decoded console text to `out` until the console closes.
fn print_stream(rx: &Receiver<String>, out: &mut impl Write) -> io::Result<()> {
    for text in rx {
        out.write_all(text.as_bytes())?;
        out.flush()?;
    }
    Ok(())
}
