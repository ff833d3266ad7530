//! Per-property characteristic access
//!
//! A [`CharacteristicChannel`] binds one [`Property`] to the connected
//! peripheral. It is only usable while the link that created it is alive;
//! after a disconnect every clone fails fast with
//! [`BulbError::NoConnection`] without touching the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::codec;
use crate::error::{BulbError, Result};
use crate::property::Property;
use crate::transport::{BleTransport, PeripheralId};

// ----------------------------------------------------------------------------
// Link Liveness
// ----------------------------------------------------------------------------

/// Shared flag cleared when the connection that owns a set of channels ends
#[derive(Debug, Clone)]
pub(crate) struct LinkFlag(Arc<AtomicBool>);

impl LinkFlag {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn sever(&self) {
        self.0.store(false, Ordering::Release);
    }
}

// ----------------------------------------------------------------------------
// Characteristic Channel
// ----------------------------------------------------------------------------

/// Read, write and subscribe operations for one property
pub struct CharacteristicChannel<T: BleTransport> {
    transport: Arc<T>,
    peripheral: PeripheralId,
    property: Property,
    link: LinkFlag,
    operation_timeout: Duration,
}

impl<T: BleTransport> Clone for CharacteristicChannel<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            peripheral: self.peripheral.clone(),
            property: self.property,
            link: self.link.clone(),
            operation_timeout: self.operation_timeout,
        }
    }
}

impl<T: BleTransport> CharacteristicChannel<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        peripheral: PeripheralId,
        property: Property,
        link: LinkFlag,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            peripheral,
            property,
            link,
            operation_timeout,
        }
    }

    pub fn property(&self) -> Property {
        self.property
    }

    pub fn peripheral(&self) -> &PeripheralId {
        &self.peripheral
    }

    /// Whether the connection behind this channel is still up
    pub fn is_live(&self) -> bool {
        self.link.is_alive()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.link.is_alive() {
            Ok(())
        } else {
            Err(BulbError::NoConnection)
        }
    }

    /// Read the current value from the accessory
    pub async fn read_once(&self) -> Result<u32> {
        self.ensure_live()?;

        let read = self.transport.read(
            &self.peripheral,
            self.property.service_uuid(),
            self.property.characteristic_uuid(),
        );
        let payload = timeout(self.operation_timeout, read)
            .await
            .map_err(|_| self.timed_out("read"))??;

        let value = codec::decode(&payload, self.property.width())?;
        trace!("Read {} = {} ({})", self.property, value, payload);
        Ok(value)
    }

    /// Write a value without waiting for the accessory to apply it
    pub async fn write(&self, value: u32) -> Result<()> {
        self.ensure_live()?;

        let payload = codec::encode(value, self.property.width())?;
        let write = self.transport.write_without_response(
            &self.peripheral,
            self.property.service_uuid(),
            self.property.characteristic_uuid(),
            &payload,
        );
        timeout(self.operation_timeout, write)
            .await
            .map_err(|_| self.timed_out("write"))??;

        debug!("Wrote {} = {} ({})", self.property, value, payload);
        Ok(())
    }

    /// Listen for accessory-initiated changes.
    ///
    /// `on_update` runs once per transport notification, with the decoded
    /// value or the decode error. Dropping the returned [`Subscription`]
    /// stops delivery.
    pub async fn subscribe<F>(&self, on_update: F) -> Result<Subscription>
    where
        F: Fn(Result<u32>) + Send + 'static,
    {
        self.ensure_live()?;

        let mut notifications = self
            .transport
            .monitor(
                &self.peripheral,
                self.property.service_uuid(),
                self.property.characteristic_uuid(),
            )
            .await?;

        let property = self.property;
        let link = self.link.clone();
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                if !link.is_alive() {
                    break;
                }
                let value = notification
                    .and_then(|payload| codec::decode(&payload, property.width()));
                on_update(value);
            }
            debug!("Notification handler for {} ended", property);
        });

        debug!("Subscribed to {} notifications", property);
        Ok(Subscription { property, task })
    }

    fn timed_out(&self, operation: &str) -> BulbError {
        BulbError::transport(
            format!("{} {}", operation, self.property),
            format!("timed out after {:?}", self.operation_timeout),
        )
    }
}

// ----------------------------------------------------------------------------
// Subscription Handle
// ----------------------------------------------------------------------------

/// Active notification listener; cancelled when dropped
#[derive(Debug)]
pub struct Subscription {
    property: Property,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn property(&self) -> Property {
        self.property
    }

    /// Whether the listener has stopped (stream closed or cancelled)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Payload;
    use crate::mock::MockTransport;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_secs(1);

    async fn connected(transport: &Arc<MockTransport>) -> PeripheralId {
        let id = PeripheralId::new("bulb");
        transport.connect(&id).await.unwrap();
        transport.discover_services(&id).await.unwrap();
        id
    }

    fn channel(
        transport: &Arc<MockTransport>,
        id: &PeripheralId,
        property: Property,
        link: &LinkFlag,
    ) -> CharacteristicChannel<MockTransport> {
        CharacteristicChannel::new(
            Arc::clone(transport),
            id.clone(),
            property,
            link.clone(),
            TIMEOUT,
        )
    }

    #[tokio::test]
    async fn test_read_and_write() {
        let transport = Arc::new(MockTransport::new());
        let id = connected(&transport).await;
        let link = LinkFlag::new();
        let brightness = channel(&transport, &id, Property::Brightness, &link);

        transport.set_value(Property::Brightness, Payload::Bytes(vec![0x40]));
        assert_eq!(brightness.read_once().await.unwrap(), 64);

        brightness.write(200).await.unwrap();
        assert_eq!(
            transport.writes(),
            vec![(Property::Brightness.characteristic_uuid(), Payload::Bytes(vec![200]))]
        );
        assert_eq!(brightness.read_once().await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_dead_link_makes_no_transport_calls() {
        let transport = Arc::new(MockTransport::new());
        let id = connected(&transport).await;
        let link = LinkFlag::new();
        let power = channel(&transport, &id, Property::Power, &link);
        let calls = transport.calls();

        link.sever();
        assert_eq!(power.read_once().await, Err(BulbError::NoConnection));
        assert_eq!(power.write(1).await, Err(BulbError::NoConnection));
        assert!(matches!(
            power.subscribe(|_| {}).await,
            Err(BulbError::NoConnection)
        ));
        assert_eq!(transport.calls(), calls);
    }

    #[tokio::test]
    async fn test_malformed_read() {
        let transport = Arc::new(MockTransport::new());
        let id = connected(&transport).await;
        let power = channel(&transport, &id, Property::Power, &LinkFlag::new());

        transport.set_value(Property::Power, Payload::Empty);
        assert!(matches!(
            power.read_once().await,
            Err(BulbError::MalformedPayload { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_out_of_range() {
        let transport = Arc::new(MockTransport::new());
        let id = connected(&transport).await;
        let brightness = channel(&transport, &id, Property::Brightness, &LinkFlag::new());

        assert!(matches!(
            brightness.write(256).await,
            Err(BulbError::ValueOutOfRange { value: 256, .. })
        ));
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn test_subscription_passes_duplicates_through() {
        let transport = Arc::new(MockTransport::new());
        let id = connected(&transport).await;
        let power = channel(&transport, &id, Property::Power, &LinkFlag::new());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = power
            .subscribe(move |value| {
                let _ = tx.send(value);
            })
            .await
            .unwrap();
        assert_eq!(subscription.property(), Property::Power);

        transport.notify(Property::Power, Payload::Bytes(vec![1]));
        transport.notify(Property::Power, Payload::Bytes(vec![1]));
        transport.notify(Property::Power, Payload::Empty);

        assert_eq!(rx.recv().await.unwrap(), Ok(1));
        assert_eq!(rx.recv().await.unwrap(), Ok(1));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Err(BulbError::MalformedPayload { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_delivery() {
        let transport = Arc::new(MockTransport::new());
        let id = connected(&transport).await;
        let brightness = channel(&transport, &id, Property::Brightness, &LinkFlag::new());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = brightness
            .subscribe(move |value| sink.lock().unwrap().push(value))
            .await
            .unwrap();

        subscription.cancel();
        tokio::task::yield_now().await;
        transport.notify(Property::Brightness, Payload::Bytes(vec![9]));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscription_finishes_when_stream_closes() {
        let transport = Arc::new(MockTransport::new());
        let id = connected(&transport).await;
        let power = channel(&transport, &id, Property::Power, &LinkFlag::new());

        let subscription = power.subscribe(|_| {}).await.unwrap();
        assert!(!subscription.is_finished());

        transport.drop_link();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(subscription.is_finished());
        assert_eq!(subscription.property(), Property::Power);
    }
}
