//! Error types for bulb control
//!
//! Every failure the core can report is a [`BulbError`]. Transport-level
//! failures are terminal to the single operation that produced them; none of
//! them are retried.

use thiserror::Error;

use crate::codec::ValueWidth;
use crate::property::Property;
use crate::transport::PeripheralId;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors reported by the bulb controller and its components
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BulbError {
    #[error("Bluetooth access was not granted")]
    PermissionDenied,

    #[error("Transport error during {operation}: {reason}")]
    Transport { operation: String, reason: String },

    #[error("Malformed payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("No accessory connected")]
    NoConnection,

    #[error("Service discovery failed: {reason}")]
    DiscoveryFailure { reason: String },

    #[error("{property} cannot be written")]
    Unsupported { property: Property },

    #[error("Connection already in progress")]
    ConnectionInProgress,

    #[error("Already connected to {id}")]
    AlreadyConnected { id: PeripheralId },

    #[error("Value {value} does not fit a {width} payload")]
    ValueOutOfRange { value: u32, width: ValueWidth },
}

impl BulbError {
    /// Build a transport error for the named operation
    pub fn transport(operation: impl Into<String>, reason: impl ToString) -> Self {
        BulbError::Transport {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a malformed payload error
    pub fn malformed(reason: impl Into<String>) -> Self {
        BulbError::MalformedPayload {
            reason: reason.into(),
        }
    }
}

/// Result type for bulb operations
pub type Result<T> = core::result::Result<T, BulbError>;
