//! Wireless transport capability
//!
//! The core never talks to a radio directly. Everything it needs from the
//! Bluetooth stack is expressed by [`BleTransport`]: scanning, connecting,
//! GATT discovery, reads, unacknowledged writes and notification streams.
//! Asynchronous stack events (discoveries, scan errors, disconnects) are
//! pushed into an [`EventSink`] registered by the owner.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::codec::Payload;
use crate::error::Result;

// ----------------------------------------------------------------------------
// Peripheral Identity
// ----------------------------------------------------------------------------

/// Opaque, stable identity of a peripheral as reported by the stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A peripheral seen while scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralDescriptor {
    pub id: PeripheralId,
    /// Advertised local name, if any
    pub name: Option<String>,
    /// Signal strength at discovery time
    pub rssi: Option<i16>,
}

impl PeripheralDescriptor {
    pub fn new(id: impl Into<PeripheralId>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            rssi: None,
        }
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Advertised name, ignoring empty strings
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.trim().is_empty())
    }
}

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Asynchronous events raised by the wireless stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peripheral was seen during a scan
    Discovered(PeripheralDescriptor),
    /// The scan reported a problem but keeps running
    ScanError(String),
    /// The link to a peripheral dropped
    Disconnected(PeripheralId),
}

/// Channel the transport pushes [`TransportEvent`]s into
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// Stream of raw notification payloads for one characteristic.
///
/// The transport closes the stream when the peripheral disconnects.
pub type NotificationStream = mpsc::UnboundedReceiver<Result<Payload>>;

// ----------------------------------------------------------------------------
// Transport Capability
// ----------------------------------------------------------------------------

/// Primitives a Bluetooth stack must provide to drive a bulb
#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    /// Start an unfiltered scan; discoveries and scan errors go to `sink`
    async fn start_scan(&self, sink: EventSink) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// Register where disconnect events should be delivered
    fn on_disconnect(&self, sink: EventSink);

    async fn connect(&self, id: &PeripheralId) -> Result<()>;

    async fn disconnect(&self, id: &PeripheralId) -> Result<()>;

    /// Discover all services and characteristics of a connected peripheral
    async fn discover_services(&self, id: &PeripheralId) -> Result<()>;

    async fn read(&self, id: &PeripheralId, service: Uuid, characteristic: Uuid)
        -> Result<Payload>;

    /// Write without waiting for the accessory to acknowledge
    async fn write_without_response(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        payload: &Payload,
    ) -> Result<()>;

    /// Enable notifications and return the stream of updates
    async fn monitor(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<NotificationStream>;
}
