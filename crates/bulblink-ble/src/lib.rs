//! btleplug transport for bulblink
//!
//! This crate implements the [`BleTransport`] capability from
//! `bulblink-core` on top of the platform Bluetooth stack (BlueZ, Core
//! Bluetooth or WinRT) through `btleplug`.
//!
//! ## Architecture
//!
//! - [`config`] - adapter selection and event forwarding options
//! - [`error`] - stack errors and their conversion into [`bulblink_core::BulbError`]
//! - [`peripheral`] - registry of platform peripheral handles
//! - [`discovery`] - adapter selection, scanning and the event pump
//! - [`connection`] - connect, GATT discovery, reads, writes and notifications
//! - [`permission`] - permission gate backed by adapter availability
//! - [`transport`] - the [`BtleplugTransport`] tying it together
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bulblink_ble::{AdapterPermission, BtleplugConfig, BtleplugTransport};
//! use bulblink_core::{BulbController, ControllerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = BtleplugTransport::new(BtleplugConfig::new().with_adapter_index(0)).await?;
//! let mut controller = BulbController::new(
//!     Arc::new(transport),
//!     AdapterPermission,
//!     ControllerConfig::default(),
//! );
//!
//! controller.start_scan().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod discovery;
mod error;
mod peripheral;
mod permission;
mod transport;

// Public API exports
pub use config::BtleplugConfig;
pub use error::BleTransportError;
pub use permission::AdapterPermission;
pub use transport::BtleplugTransport;

// Re-export the capability for convenience
pub use bulblink_core::BleTransport;
