//! Console monitor: turns the target's raw output into displayable text.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};

use crate::console::ConsoleListener;

/// Console listener that decodes target output into text lines for display.
///
/// Multi-byte characters split across reads are reassembled; invalid bytes
/// become `U+FFFD`. The text stream ends when the console closes.
pub struct MonitorListener {
    pending: Mutex<Vec<u8>>,
    tx: Mutex<Option<Sender<String>>>,
}

impl MonitorListener {
    /// Create a listener and the receiving end of its text stream.
    pub fn new() -> (Arc<Self>, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let listener = Arc::new(Self {
            pending: Mutex::new(Vec::new()),
            tx: Mutex::new(Some(tx)),
        });
        (listener, rx)
    }
}

impl ConsoleListener for MonitorListener {
    fn on_text_received(&self, data: &[u8]) {
        let text = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.extend_from_slice(data);
            decode_available(&mut pending)
        };
        let text = clean_monitor_text(&text);
        if text.is_empty() {
            return;
        }
        if let Some(tx) = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(text);
        }
    }

    fn on_send_outcome(&self, error: Option<&io::Error>) {
        if let Some(e) = error {
            warn!("Console write failed: {e}");
        }
    }

    fn on_closed(&self) {
        debug!("Console closed, ending monitor stream");
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Decode as much of `buffer` as possible.
///
/// Invalid sequences are replaced with `U+FFFD`. A truncated character at
/// the end stays in `buffer` for the next call.
pub fn decode_available(buffer: &mut Vec<u8>) -> String {
    let mut out = String::with_capacity(buffer.len());
    let mut consumed = 0;

    for chunk in buffer.utf8_chunks() {
        out.push_str(chunk.valid());
        consumed += chunk
            .valid()
            .len();

        let invalid = chunk.invalid();
        if invalid.is_empty() {
            continue;
        }
        let at_end = consumed + invalid.len() == buffer.len();
        let truncated = std::str::from_utf8(invalid)
            .err()
            .is_some_and(|e| e.error_len().is_none());
        if at_end && truncated {
            break;
        }
        out.push(char::REPLACEMENT_CHARACTER);
        consumed += invalid.len();
    }

    buffer.drain(..consumed);
    out
}

/// Strip control characters other than newline and tab. Carriage returns
/// are dropped so `\r\n` line endings print as plain newlines.
pub fn clean_monitor_text(text: &str) -> String {
    text.chars()
        .filter(|&ch| matches!(ch, '\n' | '\t') || !ch.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_split_character() {
        let mut buffer = b"h\xC3".to_vec();
        assert_eq!(decode_available(&mut buffer), "h");
        assert_eq!(buffer, vec![0xC3]);

        buffer.extend_from_slice(b"\xA9llo");
        assert_eq!(decode_available(&mut buffer), "\u{e9}llo");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let mut buffer = b"a\xFFb".to_vec();
        assert_eq!(decode_available(&mut buffer), "a\u{FFFD}b");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clean_monitor_text() {
        assert_eq!(clean_monitor_text("boot ok\r\n\x07\tready"), "boot ok\n\tready");
    }

    #[test]
    fn test_listener_forwards_text() {
        let (listener, rx) = MonitorListener::new();
        listener.on_text_received(b"ver 1.\xE2\x82");
        listener.on_text_received(b"\xAC\r\n");
        listener.on_text_received(b"\x01");

        let lines: Vec<String> = rx.try_iter().collect();
        assert_eq!(lines, vec!["ver 1.".to_string(), "\u{20ac}\n".to_string()]);
    }

    #[test]
    fn test_closed_console_ends_stream() {
        let (listener, rx) = MonitorListener::new();
        listener.on_text_received(b"last words\n");
        listener.on_closed();
        listener.on_text_received(b"ignored");

        let lines: Vec<String> = rx.iter().collect();
        assert_eq!(lines, vec!["last words\n".to_string()]);
    }
}
