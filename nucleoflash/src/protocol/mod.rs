//! Protocol implementations.

pub mod command;
pub mod crc;

// Re-export common types
pub use command::{
    COMPLETION_ACK, CRC_ACK_LEN, HandshakeCommand, UPGRADE_TAG, build_handshake, decode_crc_ack,
};
pub use crc::{Stm32Crc, stm32_crc};
