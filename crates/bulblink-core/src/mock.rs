//! In-memory transport for tests and demos
//!
//! [`MockTransport`] behaves like a single bulb that is always in range. It
//! remembers written values so read-backs see them, can clamp writes the way
//! real firmware does, and lets tests inject discoveries, scan errors,
//! notifications, link drops and failures at every step of the lifecycle.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::codec::{self, Payload};
use crate::error::{BulbError, Result};
use crate::property::Property;
use crate::transport::{
    BleTransport, EventSink, NotificationStream, PeripheralDescriptor, PeripheralId,
    TransportEvent,
};

// ----------------------------------------------------------------------------
// Mock State
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MockState {
    advertised: Vec<PeripheralDescriptor>,
    scan_sink: Option<EventSink>,
    disconnect_sink: Option<EventSink>,
    scan_starts: usize,
    connected: Option<PeripheralId>,
    services_discovered: bool,
    values: HashMap<Uuid, Payload>,
    clamps: HashMap<Uuid, u32>,
    writes: Vec<(Uuid, Payload)>,
    monitors: HashMap<Uuid, Vec<mpsc::UnboundedSender<Result<Payload>>>>,
    calls: usize,
    connect_failure: Option<String>,
    discovery_failure: Option<String>,
    read_failure: Option<String>,
}

impl MockState {
    fn require_link(&self, id: &PeripheralId, operation: &str) -> Result<()> {
        match &self.connected {
            Some(connected) if connected == id && self.services_discovered => Ok(()),
            Some(connected) if connected == id => {
                Err(BulbError::transport(operation, "services not discovered"))
            }
            _ => Err(BulbError::transport(operation, format!("{id} is not connected"))),
        }
    }
}

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

/// Scriptable stand-in for a Bluetooth stack with one bulb attached
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A transport whose bulb is on, at half brightness, at 300 mireds
    pub fn new() -> Self {
        let transport = Self {
            state: Mutex::new(MockState::default()),
        };
        transport.set_raw(Property::Power, 1);
        transport.set_raw(Property::Brightness, 128);
        transport.set_raw(Property::ColorTemperature, 300);
        transport
    }

    /// Add a peripheral that is reported whenever a scan starts
    pub fn with_peripheral(self, descriptor: PeripheralDescriptor) -> Self {
        self.state().advertised.push(descriptor);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_raw(&self, property: Property, value: u32) {
        if let Ok(payload) = codec::encode(value, property.width()) {
            self.set_value(property, payload);
        }
    }

    // --- Scripting ----------------------------------------------------------

    /// Report a discovery to the running scan, if any
    pub fn advertise(&self, descriptor: PeripheralDescriptor) {
        if let Some(sink) = &self.state().scan_sink {
            let _ = sink.send(TransportEvent::Discovered(descriptor));
        }
    }

    /// Report a non-fatal scan error to the running scan, if any
    pub fn scan_error(&self, reason: &str) {
        if let Some(sink) = &self.state().scan_sink {
            let _ = sink.send(TransportEvent::ScanError(reason.to_string()));
        }
    }

    /// Set the value the accessory reports for a property
    pub fn set_value(&self, property: Property, payload: Payload) {
        self.state()
            .values
            .insert(property.characteristic_uuid(), payload);
    }

    /// Make the accessory cap written values at `max`
    pub fn clamp_writes(&self, property: Property, max: u32) {
        self.state()
            .clamps
            .insert(property.characteristic_uuid(), max);
    }

    /// Push an accessory-initiated notification
    pub fn notify(&self, property: Property, payload: Payload) {
        let mut state = self.state();
        if let Some(monitors) = state.monitors.get_mut(&property.characteristic_uuid()) {
            monitors.retain(|monitor| monitor.send(Ok(payload.clone())).is_ok());
        }
    }

    /// Drop the link from the accessory side
    pub fn drop_link(&self) {
        let mut state = self.state();
        if let Some(id) = state.connected.take() {
            state.services_discovered = false;
            state.monitors.clear();
            if let Some(sink) = &state.disconnect_sink {
                let _ = sink.send(TransportEvent::Disconnected(id));
            }
        }
    }

    /// Fail every connect until cleared with `None`
    pub fn fail_connect(&self, reason: Option<&str>) {
        self.state().connect_failure = reason.map(str::to_string);
    }

    /// Fail every service discovery until cleared with `None`
    pub fn fail_discovery(&self, reason: Option<&str>) {
        self.state().discovery_failure = reason.map(str::to_string);
    }

    /// Fail every read until cleared with `None`
    pub fn fail_reads(&self, reason: Option<&str>) {
        self.state().read_failure = reason.map(str::to_string);
    }

    // --- Inspection ---------------------------------------------------------

    /// Number of transport primitives invoked so far
    pub fn calls(&self) -> usize {
        self.state().calls
    }

    pub fn scan_starts(&self) -> usize {
        self.state().scan_starts
    }

    pub fn is_scanning(&self) -> bool {
        self.state().scan_sink.is_some()
    }

    pub fn connected(&self) -> Option<PeripheralId> {
        self.state().connected.clone()
    }

    /// Every write received, in order
    pub fn writes(&self) -> Vec<(Uuid, Payload)> {
        self.state().writes.clone()
    }

    /// Number of open notification streams for a property
    pub fn monitor_count(&self, property: Property) -> usize {
        self.state()
            .monitors
            .get(&property.characteristic_uuid())
            .map_or(0, |monitors| monitors.iter().filter(|m| !m.is_closed()).count())
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn start_scan(&self, sink: EventSink) -> Result<()> {
        let mut state = self.state();
        state.calls += 1;
        state.scan_starts += 1;
        for descriptor in &state.advertised {
            let _ = sink.send(TransportEvent::Discovered(descriptor.clone()));
        }
        state.scan_sink = Some(sink);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        let mut state = self.state();
        state.calls += 1;
        state.scan_sink = None;
        Ok(())
    }

    fn on_disconnect(&self, sink: EventSink) {
        self.state().disconnect_sink = Some(sink);
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let mut state = self.state();
        state.calls += 1;
        if let Some(reason) = &state.connect_failure {
            return Err(BulbError::transport("connect", reason));
        }
        debug!("Mock connected to {}", id);
        state.connected = Some(id.clone());
        state.services_discovered = false;
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        let mut state = self.state();
        state.calls += 1;
        if state.connected.as_ref() == Some(id) {
            state.connected = None;
            state.services_discovered = false;
            state.monitors.clear();
            // Stacks report requested disconnects as well
            if let Some(sink) = &state.disconnect_sink {
                let _ = sink.send(TransportEvent::Disconnected(id.clone()));
            }
        }
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<()> {
        let mut state = self.state();
        state.calls += 1;
        if state.connected.as_ref() != Some(id) {
            return Err(BulbError::transport("discover services", "not connected"));
        }
        if let Some(reason) = &state.discovery_failure {
            return Err(BulbError::transport("discover services", reason));
        }
        state.services_discovered = true;
        Ok(())
    }

    async fn read(
        &self,
        id: &PeripheralId,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<Payload> {
        let mut state = self.state();
        state.calls += 1;
        state.require_link(id, "read")?;
        if let Some(reason) = &state.read_failure {
            return Err(BulbError::transport("read", reason));
        }
        Ok(state.values.get(&characteristic).cloned().unwrap_or_default())
    }

    async fn write_without_response(
        &self,
        id: &PeripheralId,
        _service: Uuid,
        characteristic: Uuid,
        payload: &Payload,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls += 1;
        state.require_link(id, "write")?;
        state.writes.push((characteristic, payload.clone()));

        let stored = match (
            Property::from_characteristic(characteristic),
            state.clamps.get(&characteristic),
        ) {
            (Some(property), Some(max)) => codec::decode(payload, property.width())
                .and_then(|value| codec::encode(value.min(*max), property.width()))
                .unwrap_or_else(|_| payload.clone()),
            _ => payload.clone(),
        };
        state.values.insert(characteristic, stored);
        Ok(())
    }

    async fn monitor(
        &self,
        id: &PeripheralId,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<NotificationStream> {
        let mut state = self.state();
        state.calls += 1;
        state.require_link(id, "monitor")?;
        let (tx, rx) = mpsc::unbounded_channel();
        state.monitors.entry(characteristic).or_default().push(tx);
        Ok(rx)
    }
}
