//! Debug console over a native serial port.
//!
//! A background reader thread forwards every byte burst received from the
//! target to the attached listeners and tells them when it stops. Writes are performed on the caller's
//! thread; their outcome is then reported to the listeners.

use {
    crate::{
        console::{Console, ConsoleListener, ListenerSet},
        error::{Error, Result},
        port::{SerialConfig, native},
    },
    log::{debug, trace, warn},
    std::{
        io::{self, Read as _, Write as _},
        sync::{
            Arc, Mutex, PoisonError,
            atomic::{AtomicBool, Ordering},
        },
        thread::{self, JoinHandle},
    },
};

/// Size of the reader thread's receive buffer.
const READ_BUFFER_SIZE: usize = 256;

/// Debug console backed by a serial port.
pub struct SerialConsole {
    writer: Mutex<Option<Box<dyn serialport::SerialPort>>>,
    listeners: Arc<ListenerSet>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    name: String,
}

impl SerialConsole {
    /// Open the serial port and start the reader thread.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = native::open(config)?;
        let mut reader_port = port.try_clone()?;

        let listeners = Arc::new(ListenerSet::new());
        let running = Arc::new(AtomicBool::new(true));

        let reader_listeners = listeners.clone();
        let reader_running = running.clone();
        let port_name = config
            .port_name
            .clone();
        let reader = thread::Builder::new()
            .name(format!("console-rx-{port_name}"))
            .spawn(move || {
                let mut buf = [0u8; READ_BUFFER_SIZE];
                while reader_running.load(Ordering::Relaxed) {
                    match reader_port.read(&mut buf) {
                        Ok(0) => {},
                        Ok(n) => {
                            trace!("Console received {n} bytes");
                            reader_listeners.notify_text(&buf[..n]);
                        },
                        Err(e) if e.kind() == io::ErrorKind::TimedOut => {},
                        Err(e) => {
                            warn!("Console read failed on {port_name}: {e}");
                            break;
                        },
                    }
                }
                debug!("Console reader for {port_name} stopped");
                reader_listeners.notify_closed();
            })?;

        Ok(Self {
            writer: Mutex::new(Some(port)),
            listeners,
            running,
            reader: Mutex::new(Some(reader)),
            name: config
                .port_name
                .clone(),
        })
    }

    /// Open a serial console with default settings.
    pub fn open_simple(port_name: &str, baud_rate: u32) -> Result<Self> {
        Self::open(&SerialConfig::new(port_name, baud_rate))
    }

    /// Port name/path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the reader thread and release the port.
    pub fn close(&self) {
        self.running
            .store(false, Ordering::Relaxed);
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = reader {
            if handle
                .join()
                .is_err()
            {
                warn!("Console reader for {} panicked", self.name);
            }
        }
    }
}

impl Console for SerialConsole {
    fn send(&self, data: &[u8]) -> Result<()> {
        let mut guard = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let port = guard
            .as_mut()
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "console closed",
                ))
            })?;

        let outcome = port
            .write_all(data)
            .and_then(|()| port.flush());
        drop(guard);

        trace!("Console sent {} bytes", data.len());
        self.listeners
            .notify_send_outcome(outcome.as_ref().err());
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn ConsoleListener>) {
        self.listeners
            .add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn ConsoleListener>) {
        self.listeners
            .remove(listener);
    }
}

impl Drop for SerialConsole {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails() {
        let result = SerialConsole::open_simple("/dev/nucleoflash-does-not-exist", 115200);
        assert!(result.is_err());
    }
}
