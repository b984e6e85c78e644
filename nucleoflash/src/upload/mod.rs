//! Firmware upload over the debug console.
//!
//! ## Protocol Overview
//!
//! ```text
//! host                                   target
//!  | -- "upgradeFw" + len + crc ---------> |
//!  | <-------------------- crc (4 bytes) -- |   must match, else abort
//!  | -- chunk (<=16 bytes) --------------> |   one chunk every ~11 ms,
//!  | -- chunk ---------------------------> |   no per-chunk reply
//!  |    ...                                |
//!  | <------------------------- 0x01 ----- |   image received intact
//! ```
//!
//! Every awaited reply is guarded by a timeout. Any failure ends the
//! session; there is no retry at this layer.

pub mod callback;
pub mod pacer;
pub mod session;
pub mod uploader;

use std::time::Duration;

pub use callback::{UploadCallback, UploadEvent};
pub use pacer::TransferPacer;
pub use session::{Action, Event, SessionState, UploadSession};
pub use uploader::{ConsoleUploader, UploadHandle};

/// Maximum payload of one data chunk.
pub const MAX_CHUNK_SIZE: usize = 16;

/// Minimum delay between two data chunks (90 chunks per second).
pub const CHUNK_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 90);

/// Time allowed for each awaited target response.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Number of delivered chunks between two progress reports.
pub const PROGRESS_PERIOD: usize = 10;

/// Upload tuning parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UploadConfig {
    /// Maximum bytes per data chunk.
    pub chunk_size: usize,
    /// Delay between data chunks.
    pub chunk_interval: Duration,
    /// Timeout for the CRC echo after the handshake.
    pub handshake_timeout: Duration,
    /// Timeout for delivery confirmations and the final verdict.
    pub response_timeout: Duration,
    /// Delivered chunks between progress reports.
    pub progress_period: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE,
            chunk_interval: CHUNK_INTERVAL,
            handshake_timeout: RESPONSE_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
            progress_period: PROGRESS_PERIOD,
        }
    }
}

impl UploadConfig {
    /// Set the chunk size (clamped to at least one byte).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the delay between chunks.
    #[must_use]
    pub fn with_chunk_interval(mut self, interval: Duration) -> Self {
        self.chunk_interval = interval;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the response timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the progress period (clamped to at least one chunk).
    #[must_use]
    pub fn with_progress_period(mut self, period: usize) -> Self {
        self.progress_period = period.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let config = UploadConfig::default();
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.progress_period, 10);
        assert_eq!(config.response_timeout, Duration::from_secs(1));
        assert_eq!(config.chunk_interval.as_micros(), 11_111);
    }

    #[test]
    fn test_builder_clamps() {
        let config = UploadConfig::default()
            .with_chunk_size(0)
            .with_progress_period(0);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.progress_period, 1);
    }
}
