//! Console upgrade command framing.
//!
//! The upload is started by a single binary command written to the debug
//! console. The target answers with the CRC it expects, and after the last
//! data chunk with a one-byte verdict.
//!
//! ## Frame Format
//!
//! ```text
//! +-------------+----------------+----------------+
//! |     Tag     |  Image length  |   Image CRC    |
//! +-------------+----------------+----------------+
//! |   9 bytes   |  4 bytes (LE)  |  4 bytes (LE)  |
//! +-------------+----------------+----------------+
//! | "upgradeFw" |   u32 length   | STM32 CRC-32   |
//! +-------------+----------------+----------------+
//! ```
//!
//! Data chunks that follow carry no framing at all.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// ASCII tag that opens the upgrade command.
pub const UPGRADE_TAG: &[u8] = b"upgradeFw";

/// Byte sent by the target once the whole image was received intact.
pub const COMPLETION_ACK: u8 = 0x01;

/// Length of the CRC echoed by the target after the handshake.
pub const CRC_ACK_LEN: usize = 4;

/// Upgrade handshake command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeCommand {
    /// Firmware image length in bytes.
    pub image_len: u32,
    /// STM32 CRC of the firmware image.
    pub crc: u32,
}

impl HandshakeCommand {
    /// Total encoded frame length.
    pub const LEN: usize = UPGRADE_TAG.len() + 8;

    /// Create a handshake command.
    pub fn new(image_len: u32, crc: u32) -> Self {
        Self { image_len, crc }
    }

    /// Build the wire frame.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.extend_from_slice(UPGRADE_TAG);
        buf.write_u32::<LittleEndian>(self.image_len)
            .unwrap();
        buf.write_u32::<LittleEndian>(self.crc)
            .unwrap();
        buf
    }

    /// Parse a wire frame produced by [`HandshakeCommand::build`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != Self::LEN {
            return Err(Error::Protocol(format!(
                "handshake frame must be {} bytes, got {}",
                Self::LEN,
                data.len()
            )));
        }
        let (tag, fields) = data.split_at(UPGRADE_TAG.len());
        if tag != UPGRADE_TAG {
            return Err(Error::Protocol("missing upgradeFw tag".into()));
        }

        let mut cursor = Cursor::new(fields);
        let image_len = cursor.read_u32::<LittleEndian>()?;
        let crc = cursor.read_u32::<LittleEndian>()?;
        Ok(Self { image_len, crc })
    }
}

/// Build the handshake frame for an image of `image_len` bytes.
pub fn build_handshake(image_len: u32, crc: u32) -> Vec<u8> {
    HandshakeCommand::new(image_len, crc).build()
}

/// Decode the CRC echoed by the target after the handshake.
///
/// Returns `None` when fewer than four bytes are available. Extra bytes
/// are ignored.
pub fn decode_crc_ack(data: &[u8]) -> Option<u32> {
    let word: [u8; CRC_ACK_LEN] = data
        .get(..CRC_ACK_LEN)?
        .try_into()
        .ok()?;
    Some(u32::from_le_bytes(word))
}
