//! # nucleoflash
//!
//! A library for uploading firmware to STM32 boards over their debug
//! console.
//!
//! The target firmware exposes an upgrade command on its text console. The
//! host announces the image with a CRC-protected handshake, streams it in
//! small time-paced chunks and waits for a one-byte verdict:
//!
//! - STM32 hardware CRC (polynomial `0x04C11DB7`, 32-bit words)
//! - Handshake framing and acknowledgement decoding
//! - Paced chunk transfer with response timeouts
//! - Progress and completion callbacks
//!
//! ## Features
//!
//! - `native` (default): serial console and port discovery via the
//!   `serialport` crate
//! - `serde`: serialization support for configuration and data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nucleoflash::{ConsoleUploader, FirmwareImage, UploadEvent};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let console = Arc::new(nucleoflash::SerialConsole::open_simple("/dev/ttyACM0", 115200)?);
//!         let uploader = ConsoleUploader::new(console);
//!
//!         let image = FirmwareImage::from_file("firmware.bin")?;
//!         let (tx, rx) = crossbeam_channel::unbounded();
//!         uploader.try_start_upload(image, tx)?;
//!
//!         for event in rx {
//!             match event {
//!                 UploadEvent::Progress(remaining) => println!("{remaining} bytes left"),
//!                 UploadEvent::Complete => break,
//!                 UploadEvent::Error(e) => return Err(e.into()),
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod console;
pub mod device;
pub mod error;
pub mod image;
pub mod monitor;
pub mod port;
pub mod protocol;
pub mod upload;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use console::SerialConsole;
pub use {
    console::{Console, ConsoleListener, ListenerSet},
    device::{DetectedPort, DeviceKind, auto_detect_port, detect_ports, format_port_list},
    error::{Error, Result, UploadError},
    image::{FirmwareImage, FwUpgradeType},
    monitor::{MonitorListener, clean_monitor_text, decode_available},
    port::SerialConfig,
    protocol::{HandshakeCommand, stm32_crc},
    upload::{
        ConsoleUploader, SessionState, TransferPacer, UploadCallback, UploadConfig, UploadEvent,
        UploadHandle, UploadSession,
    },
};
