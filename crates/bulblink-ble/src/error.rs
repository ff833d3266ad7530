//! Error types for the btleplug transport

use bulblink_core::BulbError;
use thiserror::Error;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised while driving the platform Bluetooth stack
#[derive(Error, Debug)]
pub enum BleTransportError {
    #[error("Failed to create BLE manager: {0}")]
    ManagerUnavailable(String),

    #[error("BLE adapter not available (index {index})")]
    AdapterNotAvailable { index: usize },

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Peripheral not found: {id}")]
    PeripheralNotFound { id: String },

    #[error("Peripheral {id} exposes no characteristics")]
    NoCharacteristics { id: String },

    #[error("Characteristic not found: {characteristic} in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },

    #[error("Failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),

    #[error("{operation} failed: {source}")]
    Stack {
        operation: &'static str,
        #[source]
        source: btleplug::Error,
    },
}

impl BleTransportError {
    /// Wrap a btleplug error with the operation that raised it
    pub fn stack(operation: &'static str) -> impl FnOnce(btleplug::Error) -> Self {
        move |source| BleTransportError::Stack { operation, source }
    }

    /// Name of the transport operation the error belongs to
    pub fn operation(&self) -> &'static str {
        match self {
            BleTransportError::ManagerUnavailable(_)
            | BleTransportError::AdapterNotAvailable { .. }
            | BleTransportError::EventStreamFailed(_) => "open adapter",
            BleTransportError::PeripheralNotFound { .. } => "lookup",
            BleTransportError::NoCharacteristics { .. } => "discover services",
            BleTransportError::CharacteristicNotFound { .. } => "lookup characteristic",
            BleTransportError::NotificationStreamFailed(_) => "monitor",
            BleTransportError::Stack { operation, .. } => operation,
        }
    }
}

impl From<BleTransportError> for BulbError {
    fn from(err: BleTransportError) -> Self {
        BulbError::transport(err.operation(), err)
    }
}
