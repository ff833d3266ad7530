//! Smart bulb control over Bluetooth Low Energy
//!
//! This crate holds everything about driving a bulb that does not depend on a
//! particular Bluetooth stack: peripheral discovery, the connection state
//! machine, the characteristic value codec, and the rules that keep a local
//! mirror of the bulb's power, brightness and color temperature in sync with
//! the accessory.
//!
//! ## Architecture
//!
//! - [`codec`] - fixed-width big-endian value encoding plus hex/base64 forms
//! - [`property`] - GATT UUIDs and per-property width/range/capabilities
//! - [`transport`] - the [`BleTransport`] capability a Bluetooth stack implements
//! - [`permission`] - the [`PermissionGate`] consulted before scanning
//! - [`scan`] - deduplicated discovery results
//! - [`connection`] - the connection state machine and channel ownership
//! - [`channel`] - per-property read/write/subscribe
//! - [`sync`] - the mirrored state and its reconciliation rules
//! - [`controller`] - the context object tying it all together
//! - [`mock`] - an in-memory transport for tests and demos
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bulblink_core::mock::MockTransport;
//! use bulblink_core::{BulbController, ControllerConfig, ControllerEvent, StaticPermission};
//!
//! # async fn example() -> bulblink_core::Result<()> {
//! let transport = Arc::new(MockTransport::new());
//! let mut controller =
//!     BulbController::new(transport, StaticPermission::granted(), ControllerConfig::default());
//!
//! controller.start_scan().await?;
//! while let Some(event) = controller.next_event().await {
//!     if let ControllerEvent::PeripheralDiscovered(peripheral) = event {
//!         controller.connect(&peripheral.id).await?;
//!         break;
//!     }
//! }
//!
//! controller.set_brightness(200).await?;
//! println!("{}", controller.state());
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod mock;
pub mod permission;
pub mod property;
pub mod scan;
pub mod sync;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{CharacteristicChannel, Subscription};
pub use codec::{Payload, ValueWidth};
pub use config::ControllerConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use controller::{BulbController, ControllerEvent};
pub use error::{BulbError, Result};
pub use permission::{PermissionGate, StaticPermission};
pub use property::{
    Property, BRIGHTNESS_CHARACTERISTIC_UUID, BULB_SERVICE_UUID,
    COLOR_TEMPERATURE_CHARACTERISTIC_UUID, POWER_CHARACTERISTIC_UUID,
};
pub use scan::ScanSession;
pub use sync::{MirroredState, StateSynchronizer};
pub use transport::{
    BleTransport, EventSink, NotificationStream, PeripheralDescriptor, PeripheralId,
    TransportEvent,
};
