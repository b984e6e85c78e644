//! Error types for nucleoflash.

use std::io;
use thiserror::Error;

/// Result type for nucleoflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for nucleoflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Firmware upload failed or was refused.
    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Another upload is already running on this console.
    #[error("An upload is already in progress on this console")]
    Busy,

    /// Device not found on any serial port.
    #[error("Device not found")]
    DeviceNotFound,

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Error kinds reported to an upload callback.
///
/// Exactly one of these (or a completion) is reported for every accepted
/// upload.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UploadError {
    /// The requested upgrade type is not handled by the console uploader.
    #[error("unsupported upgrade operation")]
    UnsupportedOperation,

    /// The firmware file could not be read.
    #[error("invalid firmware file")]
    InvalidFirmwareFile,

    /// Handshake CRC mismatch, transport send failure or response timeout.
    #[error("transmission error")]
    TransmissionError,

    /// The target rejected the received image.
    #[error("firmware corrupted during transfer")]
    CorruptedFile,
}
