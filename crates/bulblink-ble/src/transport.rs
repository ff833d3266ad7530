//! [`BleTransport`] over btleplug

use std::sync::Arc;

use async_trait::async_trait;
use bulblink_core::{
    BleTransport, EventSink, NotificationStream, Payload, PeripheralId, Result as BulbResult,
};
use uuid::Uuid;

use crate::config::BtleplugConfig;
use crate::connection::BleConnection;
use crate::discovery::{open_adapter, BleDiscovery};
use crate::error::BleTransportError;
use crate::peripheral::PeripheralRegistry;

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// Bluetooth transport backed by the platform stack through btleplug
pub struct BtleplugTransport {
    discovery: BleDiscovery,
    connection: BleConnection,
}

impl BtleplugTransport {
    /// Open the configured adapter and start listening to its events
    pub async fn new(config: BtleplugConfig) -> Result<Self, BleTransportError> {
        let adapter = open_adapter(&config).await?;
        let registry = Arc::new(PeripheralRegistry::new());

        let discovery = BleDiscovery::start(adapter.clone(), Arc::clone(&registry), &config).await?;
        let connection = BleConnection::new(adapter, registry);

        Ok(Self {
            discovery,
            connection,
        })
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn start_scan(&self, sink: EventSink) -> BulbResult<()> {
        Ok(self.discovery.start_scanning(sink).await?)
    }

    async fn stop_scan(&self) -> BulbResult<()> {
        Ok(self.discovery.stop_scanning().await?)
    }

    fn on_disconnect(&self, sink: EventSink) {
        self.discovery.on_disconnect(sink);
    }

    async fn connect(&self, id: &PeripheralId) -> BulbResult<()> {
        Ok(self.connection.connect(id).await?)
    }

    async fn disconnect(&self, id: &PeripheralId) -> BulbResult<()> {
        Ok(self.connection.disconnect(id).await?)
    }

    async fn discover_services(&self, id: &PeripheralId) -> BulbResult<()> {
        Ok(self.connection.discover_services(id).await?)
    }

    async fn read(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> BulbResult<Payload> {
        Ok(self.connection.read(id, service, characteristic).await?)
    }

    async fn write_without_response(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        payload: &Payload,
    ) -> BulbResult<()> {
        Ok(self
            .connection
            .write_without_response(id, service, characteristic, payload)
            .await?)
    }

    async fn monitor(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> BulbResult<NotificationStream> {
        Ok(self.connection.monitor(id, service, characteristic).await?)
    }
}
