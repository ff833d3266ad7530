//! Error handling for the bulblink CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Bulb(#[from] bulblink_core::BulbError),

    #[error("Bluetooth initialization failed: {0}")]
    TransportInit(#[from] bulblink_ble::BleTransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Peripheral {id} not seen within {secs}s of scanning")]
    PeripheralNotFound { id: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
