//! Firmware images handed to the console uploader.

use crate::error::{Result, UploadError};
use crate::protocol::crc::stm32_crc;
use log::debug;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Kind of firmware an upgrade request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FwUpgradeType {
    /// Main application firmware (handled over the debug console).
    #[default]
    ApplicationFirmware,
    /// Radio/BLE stack firmware (not handled over the debug console).
    RadioFirmware,
}

impl fmt::Display for FwUpgradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplicationFirmware => write!(f, "application"),
            Self::RadioFirmware => write!(f, "radio"),
        }
    }
}

/// An immutable firmware image together with its STM32 CRC.
///
/// Cloning is cheap: the bytes are shared.
#[derive(Clone)]
pub struct FirmwareImage {
    data: Arc<[u8]>,
    crc: u32,
}

impl FirmwareImage {
    /// Create an image from raw bytes, computing its CRC.
    ///
    /// Fails with [`UploadError::InvalidFirmwareFile`] when the image does
    /// not fit the 32-bit length field of the handshake.
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data: Arc<[u8]> = data.into();
        if u32::try_from(data.len()).is_err() {
            return Err(UploadError::InvalidFirmwareFile.into());
        }
        let crc = stm32_crc(&data);
        debug!("Firmware image: {} bytes, CRC 0x{crc:08X}", data.len());
        Ok(Self { data, crc })
    }

    /// Read an image from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data)
    }

    /// Image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image has no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// STM32 CRC of the image.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Image length as sent in the handshake.
    #[allow(clippy::cast_possible_truncation)]
    pub fn wire_len(&self) -> u32 {
        // Checked in from_bytes
        self.data.len() as u32
    }

    /// Number of chunks needed to send the image.
    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        self.data.len().div_ceil(chunk_size.max(1))
    }
}

impl fmt::Debug for FirmwareImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirmwareImage")
            .field("len", &self.data.len())
            .field("crc", &format_args!("0x{:08X}", self.crc))
            .finish()
    }
}
