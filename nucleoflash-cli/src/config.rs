//! Configuration file support for nucleoflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (NUCLEOFLASH_*)
//! 3. Local config file (./nucleoflash.toml)
//! 4. Global config file (e.g. ~/.config/nucleoflash/config.toml)
//!
//! ```toml
//! [connection]
//! serial = "/dev/ttyACM0"
//! baud = 115200
//!
//! [upload]
//! timeout_ms = 1000
//! handshake_timeout_ms = 1000
//! chunk_delay_us = 11111
//! chunk_size = 16
//! ```

use crate::CliError;
use directories::ProjectDirs;
use log::{debug, warn};
use nucleoflash::UploadConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "nucleoflash.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Console baud rate.
    pub baud: Option<u32>,
}

/// Upload tuning overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Timeout for each awaited target response.
    pub timeout_ms: Option<u64>,
    /// Timeout for the handshake acknowledgement.
    pub handshake_timeout_ms: Option<u64>,
    /// Delay between data chunks.
    pub chunk_delay_us: Option<u64>,
    /// Bytes per data chunk.
    pub chunk_size: Option<usize>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Upload settings.
    #[serde(default)]
    pub upload: UploadSettings,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Invalid TOML in config file {}: {e}", path.display());
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {e}", path.display());
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "nucleoflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; values set in `other` win.
    fn merge(&mut self, other: Self) {
        let Self { connection, upload } = other;

        if connection.serial.is_some() {
            self.connection.serial = connection.serial;
        }
        if connection.baud.is_some() {
            self.connection.baud = connection.baud;
        }

        if upload.timeout_ms.is_some() {
            self.upload.timeout_ms = upload.timeout_ms;
        }
        if upload.handshake_timeout_ms.is_some() {
            self.upload.handshake_timeout_ms = upload.handshake_timeout_ms;
        }
        if upload.chunk_delay_us.is_some() {
            self.upload.chunk_delay_us = upload.chunk_delay_us;
        }
        if upload.chunk_size.is_some() {
            self.upload.chunk_size = upload.chunk_size;
        }
    }

    /// Reject values the upload cannot run with.
    pub(crate) fn validate(&self) -> Result<(), CliError> {
        if self.connection.baud == Some(0) {
            return Err(CliError::Config(
                "connection.baud must be greater than zero".to_string(),
            ));
        }
        if self.upload.chunk_size == Some(0) {
            return Err(CliError::Config(
                "upload.chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload configuration with the file overrides applied to the
    /// protocol defaults.
    pub fn upload_config(&self) -> UploadConfig {
        let mut config = UploadConfig::default();
        if let Some(ms) = self.upload.timeout_ms {
            config = config.with_response_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.upload.handshake_timeout_ms {
            config = config.with_handshake_timeout(Duration::from_millis(ms));
        }
        if let Some(us) = self.upload.chunk_delay_us {
            config = config.with_chunk_interval(Duration::from_micros(us));
        }
        if let Some(size) = self.upload.chunk_size {
            config = config.with_chunk_size(size);
        }
        config
    }
}
