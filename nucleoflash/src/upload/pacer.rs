//! Time-paced chunking of the firmware image.
//!
//! The target's console receive buffer is small, so chunks are written at a
//! fixed rate instead of waiting for any acknowledgement.

use std::ops::Range;
use std::time::Duration;

/// Splits an image into chunks and tracks how much was handed to the
/// transport.
#[derive(Debug, Clone)]
pub struct TransferPacer {
    image_len: usize,
    chunk_size: usize,
    interval: Duration,
    bytes_sent: usize,
    chunks_sent: usize,
}

impl TransferPacer {
    /// Create a pacer for an image of `image_len` bytes.
    pub fn new(image_len: usize, chunk_size: usize, interval: Duration) -> Self {
        Self {
            image_len,
            chunk_size: chunk_size.max(1),
            interval,
            bytes_sent: 0,
            chunks_sent: 0,
        }
    }

    /// Take the next chunk and count it as sent.
    ///
    /// Returns `None` once the image is exhausted.
    pub fn next_chunk(&mut self) -> Option<Range<usize>> {
        let size = self
            .remaining()
            .min(self.chunk_size);
        if size == 0 {
            return None;
        }
        let range = self.bytes_sent..self.bytes_sent + size;
        self.bytes_sent += size;
        self.chunks_sent += 1;
        Some(range)
    }

    /// Bytes handed to the transport so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Chunks handed to the transport so far.
    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent
    }

    /// Bytes not yet handed to the transport.
    pub fn remaining(&self) -> usize {
        self.image_len - self.bytes_sent
    }

    /// Whether every byte has been handed to the transport.
    pub fn is_exhausted(&self) -> bool {
        self.bytes_sent == self.image_len
    }

    /// Delay before the next chunk.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
