//! Debug console transport abstraction.
//!
//! A console is a command/response text channel to the target: raw bytes
//! can be written to it, and everything the target prints is pushed to the
//! attached listeners. Writes complete asynchronously; their outcome is
//! reported to the listeners as well.
//!
//! ```text
//! +------------------+   send()              +-------------------+
//! |  ConsoleUploader | --------------------> |                   |
//! |   (listener)     | <-- on_text_received  |  Console          |
//! |                  | <-- on_send_outcome   |  (serial, mock..) |
//! +------------------+                       +-------------------+
//! ```

#[cfg(feature = "native")]
pub mod serial;

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;

#[cfg(feature = "native")]
pub use serial::SerialConsole;

/// Receiver of console notifications.
///
/// Callbacks may run on a transport-owned thread and must not block.
pub trait ConsoleListener: Send + Sync {
    /// Bytes printed by the target.
    fn on_text_received(&self, data: &[u8]);

    /// Outcome of a previous [`Console::send`]; `None` means the bytes were
    /// delivered.
    fn on_send_outcome(&self, error: Option<&io::Error>);

    /// The console stopped receiving; no further text will arrive.
    fn on_closed(&self) {}
}

/// A debug console connection.
pub trait Console: Send + Sync {
    /// Queue `data` for transmission.
    ///
    /// `Ok` means the bytes were handed to the transport and exactly one
    /// [`ConsoleListener::on_send_outcome`] will follow. `Err` means nothing
    /// was sent and no outcome will be reported.
    fn send(&self, data: &[u8]) -> Result<()>;

    /// Attach a listener.
    fn add_listener(&self, listener: Arc<dyn ConsoleListener>);

    /// Detach a previously attached listener.
    fn remove_listener(&self, listener: &Arc<dyn ConsoleListener>);
}

/// Thread-safe set of attached listeners, for console implementations.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn ConsoleListener>>>,
}

impl ListenerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener (ignored if already attached).
    pub fn add(&self, listener: Arc<dyn ConsoleListener>) {
        let mut listeners = self.lock();
        if !listeners
            .iter()
            .any(|l| same_listener(l, &listener))
        {
            listeners.push(listener);
        }
    }

    /// Detach a listener.
    pub fn remove(&self, listener: &Arc<dyn ConsoleListener>) {
        self.lock()
            .retain(|l| !same_listener(l, listener));
    }

    /// Number of attached listeners.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no listener is attached.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver received bytes to every listener.
    pub fn notify_text(&self, data: &[u8]) {
        for listener in self.snapshot() {
            listener.on_text_received(data);
        }
    }

    /// Deliver a send outcome to every listener.
    pub fn notify_send_outcome(&self, error: Option<&io::Error>) {
        for listener in self.snapshot() {
            listener.on_send_outcome(error);
        }
    }

    /// Tell every listener that the console stopped receiving.
    pub fn notify_closed(&self) {
        for listener in self.snapshot() {
            listener.on_closed();
        }
    }

    // Listeners are called without holding the lock so they may detach
    // themselves from inside a callback.
    fn snapshot(&self) -> Vec<Arc<dyn ConsoleListener>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn ConsoleListener>>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn same_listener(a: &Arc<dyn ConsoleListener>, b: &Arc<dyn ConsoleListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
