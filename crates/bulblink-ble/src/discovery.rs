//! Adapter selection, scanning and the adapter event pump
//!
//! btleplug reports everything the adapter sees on a single event stream.
//! [`BleDiscovery`] owns a task that drains it for the lifetime of the
//! transport and forwards what the core cares about into the registered
//! sinks: discoveries while a scan sink is set, disconnects to the
//! disconnect sink.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId as PlatformPeripheralId};
use bulblink_core::{EventSink, PeripheralId, TransportEvent};
use futures::stream::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BtleplugConfig;
use crate::error::BleTransportError;
use crate::peripheral::{describe, PeripheralRegistry};

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

// ----------------------------------------------------------------------------
// Adapter Selection
// ----------------------------------------------------------------------------

/// Open the adapter selected by `config`
pub async fn open_adapter(config: &BtleplugConfig) -> Result<Adapter, BleTransportError> {
    let manager = Manager::new()
        .await
        .map_err(|e| BleTransportError::ManagerUnavailable(e.to_string()))?;

    let adapters = manager
        .adapters()
        .await
        .map_err(BleTransportError::stack("list adapters"))?;

    let adapter = adapters
        .into_iter()
        .nth(config.adapter_index)
        .ok_or(BleTransportError::AdapterNotAvailable {
            index: config.adapter_index,
        })?;

    match adapter.adapter_info().await {
        Ok(name) => info!("Using BLE adapter {}", name),
        Err(e) => debug!("Adapter info unavailable: {}", e),
    }
    Ok(adapter)
}

// ----------------------------------------------------------------------------
// Event Sinks
// ----------------------------------------------------------------------------

/// Where adapter events are forwarded; both slots may be empty
#[derive(Debug, Default)]
pub struct EventSinks {
    scan: Mutex<Option<EventSink>>,
    disconnect: Mutex<Option<EventSink>>,
}

impl EventSinks {
    pub fn set_scan(&self, sink: Option<EventSink>) {
        *self.scan.lock().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    pub fn set_disconnect(&self, sink: EventSink) {
        *self.disconnect.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    pub fn scan(&self) -> Option<EventSink> {
        self.scan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn disconnect(&self) -> Option<EventSink> {
        self.disconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forward a discovery, dropping it when no scan is running
    fn discovered(&self, event: TransportEvent) {
        if let Some(sink) = self.scan() {
            if sink.send(event).is_err() {
                debug!("Scan sink closed");
            }
        }
    }

    fn disconnected(&self, id: PeripheralId) {
        match self.disconnect() {
            Some(sink) => {
                let _ = sink.send(TransportEvent::Disconnected(id));
            }
            None => debug!("Peripheral {} disconnected with no listener", id),
        }
    }
}

// ----------------------------------------------------------------------------
// Discovery
// ----------------------------------------------------------------------------

/// Handles scanning and forwards adapter events
pub struct BleDiscovery {
    adapter: Adapter,
    sinks: Arc<EventSinks>,
    pump: JoinHandle<()>,
}

impl BleDiscovery {
    /// Subscribe to the adapter's event stream and start forwarding
    pub async fn start(
        adapter: Adapter,
        registry: Arc<PeripheralRegistry>,
        config: &BtleplugConfig,
    ) -> Result<Self, BleTransportError> {
        let events = adapter
            .events()
            .await
            .map_err(|e| BleTransportError::EventStreamFailed(e.to_string()))?;

        let sinks = Arc::new(EventSinks::default());
        let pump = tokio::spawn(pump_events(
            adapter.clone(),
            events,
            registry,
            Arc::clone(&sinks),
            config.report_updates,
        ));

        Ok(Self {
            adapter,
            sinks,
            pump,
        })
    }

    /// Start an unfiltered scan; discoveries go to `sink`
    pub async fn start_scanning(&self, sink: EventSink) -> Result<(), BleTransportError> {
        self.sinks.set_scan(Some(sink));
        if let Err(e) = self.adapter.start_scan(ScanFilter::default()).await {
            self.sinks.set_scan(None);
            return Err(BleTransportError::stack("start scan")(e));
        }
        info!("Started BLE scanning");
        Ok(())
    }

    pub async fn stop_scanning(&self) -> Result<(), BleTransportError> {
        self.sinks.set_scan(None);
        self.adapter
            .stop_scan()
            .await
            .map_err(BleTransportError::stack("stop scan"))?;
        info!("Stopped BLE scanning");
        Ok(())
    }

    pub fn on_disconnect(&self, sink: EventSink) {
        self.sinks.set_disconnect(sink);
    }
}

impl Drop for BleDiscovery {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Drain adapter events until the stream ends
async fn pump_events(
    adapter: Adapter,
    mut events: CentralEvents,
    registry: Arc<PeripheralRegistry>,
    sinks: Arc<EventSinks>,
    report_updates: bool,
) {
    while let Some(event) = events.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) => {
                forward_discovery(&adapter, &id, &registry, &sinks).await;
            }
            CentralEvent::DeviceUpdated(id) if report_updates => {
                forward_discovery(&adapter, &id, &registry, &sinks).await;
            }
            CentralEvent::DeviceDisconnected(id) => {
                sinks.disconnected(PeripheralId::new(id.to_string()));
            }
            _ => {}
        }
    }
    warn!("BLE adapter event stream ended");
}

async fn forward_discovery(
    adapter: &Adapter,
    id: &PlatformPeripheralId,
    registry: &PeripheralRegistry,
    sinks: &EventSinks,
) {
    if sinks.scan().is_none() {
        return;
    }

    let peripheral = match adapter.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            sinks.discovered(TransportEvent::ScanError(format!(
                "Failed to resolve peripheral {}: {}",
                id, e
            )));
            return;
        }
    };

    let properties = match peripheral.properties().await {
        Ok(properties) => properties,
        Err(e) => {
            sinks.discovered(TransportEvent::ScanError(format!(
                "Failed to read properties of {}: {}",
                id, e
            )));
            return;
        }
    };

    let core_id = registry.insert(peripheral).await;
    sinks.discovered(TransportEvent::Discovered(describe(core_id, properties)));
}
