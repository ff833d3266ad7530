//! GATT operations on connected peripherals

use std::sync::Arc;

use btleplug::api::{Central, Characteristic, Peripheral as _, ValueNotification, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use bulblink_core::{NotificationStream, Payload, PeripheralId, Result as BulbResult};
use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BleTransportError;
use crate::peripheral::{peripheral_id, PeripheralRegistry};

// ----------------------------------------------------------------------------
// Connection Management
// ----------------------------------------------------------------------------

/// Handles connections, reads, writes and notification streams
pub struct BleConnection {
    adapter: Adapter,
    registry: Arc<PeripheralRegistry>,
}

impl BleConnection {
    pub fn new(adapter: Adapter, registry: Arc<PeripheralRegistry>) -> Self {
        Self { adapter, registry }
    }

    /// Resolve a core id to its platform handle, asking the adapter for
    /// peripherals the event pump has not seen yet
    async fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral, BleTransportError> {
        if let Some(peripheral) = self.registry.get(id).await {
            return Ok(peripheral);
        }

        let known = self
            .adapter
            .peripherals()
            .await
            .map_err(BleTransportError::stack("lookup"))?;
        match known.into_iter().find(|p| &peripheral_id(p) == id) {
            Some(peripheral) => {
                self.registry.insert(peripheral.clone()).await;
                Ok(peripheral)
            }
            None => Err(BleTransportError::PeripheralNotFound { id: id.to_string() }),
        }
    }

    pub async fn connect(&self, id: &PeripheralId) -> Result<(), BleTransportError> {
        let peripheral = self.peripheral(id).await?;
        let connected = peripheral
            .is_connected()
            .await
            .map_err(BleTransportError::stack("connect"))?;
        if !connected {
            peripheral
                .connect()
                .await
                .map_err(BleTransportError::stack("connect"))?;
        }
        info!("Connected to peripheral {}", id);
        Ok(())
    }

    pub async fn disconnect(&self, id: &PeripheralId) -> Result<(), BleTransportError> {
        let peripheral = self.peripheral(id).await?;
        peripheral
            .disconnect()
            .await
            .map_err(BleTransportError::stack("disconnect"))?;
        info!("Disconnected from peripheral {}", id);
        Ok(())
    }

    pub async fn discover_services(&self, id: &PeripheralId) -> Result<(), BleTransportError> {
        let peripheral = self.peripheral(id).await?;
        peripheral
            .discover_services()
            .await
            .map_err(BleTransportError::stack("discover services"))?;

        let characteristics = peripheral.characteristics();
        if characteristics.is_empty() {
            return Err(BleTransportError::NoCharacteristics { id: id.to_string() });
        }
        debug!(
            "Discovered {} characteristics on {}",
            characteristics.len(),
            id
        );
        Ok(())
    }

    pub async fn read(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Payload, BleTransportError> {
        let peripheral = self.peripheral(id).await?;
        let characteristic = find_characteristic(&peripheral, service, characteristic)?;
        let value = peripheral
            .read(&characteristic)
            .await
            .map_err(BleTransportError::stack("read"))?;
        Ok(Payload::from(value))
    }

    pub async fn write_without_response(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        payload: &Payload,
    ) -> Result<(), BleTransportError> {
        let peripheral = self.peripheral(id).await?;
        let characteristic = find_characteristic(&peripheral, service, characteristic)?;
        peripheral
            .write(&characteristic, payload.as_bytes(), WriteType::WithoutResponse)
            .await
            .map_err(BleTransportError::stack("write"))?;
        debug!("Wrote {} to {}", payload, characteristic.uuid);
        Ok(())
    }

    /// Enable notifications and forward the ones for `characteristic`.
    ///
    /// The stream closes when the platform ends the peripheral's
    /// notification stream, which happens on disconnect. Dropping the
    /// receiving end unsubscribes.
    pub async fn monitor(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<NotificationStream, BleTransportError> {
        let peripheral = self.peripheral(id).await?;
        let characteristic = find_characteristic(&peripheral, service, characteristic)?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(BleTransportError::stack("subscribe"))?;
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| BleTransportError::NotificationStreamFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = id.clone();
        tokio::spawn(async move {
            let uuid = characteristic.uuid;
            match forward_notifications(&mut notifications, uuid, &tx).await {
                ForwardEnd::ReceiverDropped => {
                    if let Err(e) = peripheral.unsubscribe(&characteristic).await {
                        debug!("Unsubscribe from {} on {} failed: {}", uuid, id, e);
                    }
                }
                ForwardEnd::StreamEnded => {}
            }
            debug!("Notification handler for {} on {} ended", uuid, id);
        });

        Ok(rx)
    }
}

/// Why a notification forwarder stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardEnd {
    ReceiverDropped,
    StreamEnded,
}

/// Forward the values for `uuid` until the platform stream ends or the
/// receiver goes away, whichever comes first
async fn forward_notifications<S>(
    notifications: &mut S,
    uuid: Uuid,
    tx: &mpsc::UnboundedSender<BulbResult<Payload>>,
) -> ForwardEnd
where
    S: Stream<Item = ValueNotification> + Unpin,
{
    loop {
        tokio::select! {
            _ = tx.closed() => return ForwardEnd::ReceiverDropped,
            next = notifications.next() => match next {
                Some(notification) if notification.uuid == uuid => {
                    if tx.send(Ok(Payload::from(notification.value))).is_err() {
                        return ForwardEnd::ReceiverDropped;
                    }
                }
                Some(_) => {}
                None => return ForwardEnd::StreamEnded,
            },
        }
    }
}

/// Find a discovered characteristic by service and characteristic uuid
fn find_characteristic(
    peripheral: &Peripheral,
    service: Uuid,
    characteristic: Uuid,
) -> Result<Characteristic, BleTransportError> {
    let found = peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == characteristic && c.service_uuid == service);
    if found.is_none() {
        warn!(
            "Characteristic {} not found in service {}",
            characteristic, service
        );
    }
    found.ok_or(BleTransportError::CharacteristicNotFound {
        service,
        characteristic,
    })
}
