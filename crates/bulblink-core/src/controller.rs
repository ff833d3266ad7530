//! Bulb controller
//!
//! [`BulbController`] is the context object a presentation layer holds for
//! the lifetime of a session. It owns the scan session, the connection and
//! the mirrored state, and funnels every asynchronous input (discoveries,
//! scan errors, link drops, notifications) through one queue that is applied
//! on the caller's task by [`next_event`](BulbController::next_event) or
//! [`process_pending`](BulbController::process_pending). Nothing else
//! mutates the mirrored state.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{BulbError, Result};
use crate::permission::PermissionGate;
use crate::property::Property;
use crate::scan::ScanSession;
use crate::sync::{MirroredState, StateSynchronizer};
use crate::transport::{BleTransport, PeripheralDescriptor, PeripheralId, TransportEvent};

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Something the presentation layer may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// A new named peripheral was added to the scan results
    PeripheralDiscovered(PeripheralDescriptor),
    /// The scan reported a non-fatal problem
    ScanDiagnostic(String),
    /// A notification changed the mirrored state
    PropertyUpdated {
        property: Property,
        state: MirroredState,
    },
    /// The accessory dropped the link; the mirror has been reset
    Disconnected(PeripheralId),
}

/// Notification tagged with the link it arrived on
#[derive(Debug)]
struct Notification {
    link: u64,
    property: Property,
    value: Result<u32>,
}

// ----------------------------------------------------------------------------
// Controller
// ----------------------------------------------------------------------------

/// Single-accessory bulb controller
pub struct BulbController<T: BleTransport> {
    transport: Arc<T>,
    permission: Box<dyn PermissionGate>,
    config: ControllerConfig,
    scan: ScanSession,
    connection: ConnectionManager<T>,
    sync: StateSynchronizer,
    /// Incremented for every established link
    link_generation: u64,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    /// Disconnect reports, kept apart so stale ones can be discarded
    disconnect_rx: mpsc::UnboundedReceiver<TransportEvent>,
    notification_tx: mpsc::UnboundedSender<Notification>,
    notification_rx: mpsc::UnboundedReceiver<Notification>,
}

impl<T: BleTransport> BulbController<T> {
    pub fn new(
        transport: Arc<T>,
        permission: impl PermissionGate + 'static,
        config: ControllerConfig,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();

        transport.on_disconnect(disconnect_tx);

        Self {
            connection: ConnectionManager::new(Arc::clone(&transport), config.clone()),
            transport,
            permission: Box::new(permission),
            config,
            scan: ScanSession::new(),
            sync: StateSynchronizer::new(),
            link_generation: 0,
            transport_tx,
            transport_rx,
            disconnect_rx,
            notification_tx,
            notification_rx,
        }
    }

    // --- Scanning -----------------------------------------------------------

    /// Ask the permission gate, then start an unfiltered scan
    pub async fn start_scan(&mut self) -> Result<()> {
        if !self.permission.request_access().await {
            warn!("Bluetooth access denied; not scanning");
            return Err(BulbError::PermissionDenied);
        }

        self.scan
            .start(self.transport.as_ref(), self.transport_tx.clone())
            .await
    }

    pub async fn stop_scan(&mut self) -> Result<()> {
        self.scan.stop(self.transport.as_ref()).await
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_active()
    }

    /// Named peripherals discovered by the current scan, in arrival order
    pub fn peripherals(&self) -> &[PeripheralDescriptor] {
        self.scan.peripherals()
    }

    // --- Connection ---------------------------------------------------------

    /// Connect, seed the mirror with one read per property, and subscribe to
    /// notifications.
    ///
    /// Failed seed reads and subscriptions leave the property unknown but do
    /// not fail the connection.
    pub async fn connect(&mut self, id: &PeripheralId) -> Result<()> {
        if self.connection.state() == &ConnectionState::Connected(id.clone()) {
            return Ok(());
        }

        // Reports queued before a fresh link belong to an older one
        let fresh = self.connection.state() == &ConnectionState::Disconnected;
        if fresh {
            self.discard_disconnects();
        }

        if let Err(e) = self.connection.connect(id, &mut self.scan).await {
            // A failed discovery drops the new link, which the stack reports too
            if fresh {
                self.discard_disconnects();
            }
            return Err(e);
        }
        self.link_generation += 1;
        let link = self.link_generation;

        for property in Property::ALL {
            let channel = self.connection.channel(property)?.clone();

            if let Err(e) = self.sync.refresh(&channel).await {
                warn!("Initial read of {} failed: {}", property, e);
            }

            if !self.config.subscribe_on_connect || !property.supports_notifications() {
                continue;
            }

            let notifications = self.notification_tx.clone();
            let subscribed = channel
                .subscribe(move |value| {
                    let _ = notifications.send(Notification {
                        link,
                        property,
                        value,
                    });
                })
                .await;
            match subscribed {
                Ok(subscription) => self.connection.retain_subscription(subscription)?,
                Err(e) => warn!("Could not subscribe to {}: {}", property, e),
            }
        }

        info!("Bulb ready: {}", self.sync.state());
        Ok(())
    }

    /// Drop the link on request and forget the mirrored state
    pub async fn disconnect(&mut self) -> Result<()> {
        let result = self.connection.disconnect().await;
        self.discard_disconnects();
        self.sync.reset();
        result
    }

    pub fn connection_state(&self) -> &ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    // --- Properties ---------------------------------------------------------

    /// Snapshot of the mirrored state
    pub fn state(&self) -> MirroredState {
        self.sync.state()
    }

    /// Receiver that observes every change to the mirrored state
    pub fn watch_state(&self) -> watch::Receiver<MirroredState> {
        self.sync.watch()
    }

    /// Re-read a property from the accessory
    pub async fn read(&mut self, property: Property) -> Result<()> {
        let channel = self.connection.channel(property)?;
        self.sync.refresh(channel).await
    }

    pub async fn set_power(&mut self, on: bool) -> Result<()> {
        let channel = self.connection.channel(Property::Power)?;
        self.sync.set_power(channel, on).await
    }

    pub async fn set_brightness(&mut self, value: u8) -> Result<()> {
        let channel = self.connection.channel(Property::Brightness)?;
        self.sync.set_brightness(channel, value).await
    }

    /// Always fails with [`BulbError::Unsupported`]
    pub fn set_color_temperature(&mut self, value: u16) -> Result<()> {
        self.sync.set_color_temperature(value)
    }

    // --- Event processing ---------------------------------------------------

    /// Wait for the next input that changes something visible and apply it
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        loop {
            let applied = tokio::select! {
                Some(event) = self.transport_rx.recv() => self.apply_transport_event(event),
                Some(event) = self.disconnect_rx.recv() => self.apply_transport_event(event),
                Some(notification) = self.notification_rx.recv() => self.apply_notification(notification),
                else => return None,
            };
            if applied.is_some() {
                return applied;
            }
        }
    }

    /// Apply every queued input without waiting
    pub fn process_pending(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.transport_rx.try_recv() {
            events.extend(self.apply_transport_event(event));
        }
        while let Ok(event) = self.disconnect_rx.try_recv() {
            events.extend(self.apply_transport_event(event));
        }
        while let Ok(notification) = self.notification_rx.try_recv() {
            events.extend(self.apply_notification(notification));
        }
        events
    }

    /// Drop queued disconnect reports; they describe a link that no longer
    /// exists and must not tear down the next one
    fn discard_disconnects(&mut self) {
        while let Ok(event) = self.disconnect_rx.try_recv() {
            debug!("Discarding stale {:?}", event);
        }
    }

    fn apply_transport_event(&mut self, event: TransportEvent) -> Option<ControllerEvent> {
        match event {
            TransportEvent::Discovered(descriptor) => {
                if !self.scan.is_active() {
                    return None;
                }
                self.scan
                    .accept(descriptor.clone())
                    .then_some(ControllerEvent::PeripheralDiscovered(descriptor))
            }
            TransportEvent::ScanError(reason) => {
                warn!("Scan error: {}", reason);
                Some(ControllerEvent::ScanDiagnostic(reason))
            }
            TransportEvent::Disconnected(id) => {
                if !self.connection.handle_link_loss(&id) {
                    return None;
                }
                self.sync.reset();
                Some(ControllerEvent::Disconnected(id))
            }
        }
    }

    fn apply_notification(&mut self, notification: Notification) -> Option<ControllerEvent> {
        if notification.link != self.link_generation || !self.connection.is_connected() {
            debug!("Dropping {} notification from a closed link", notification.property);
            return None;
        }

        self.sync.commit(notification.property, notification.value);
        Some(ControllerEvent::PropertyUpdated {
            property: notification.property,
            state: self.sync.state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Payload;
    use crate::mock::MockTransport;
    use crate::permission::StaticPermission;

    fn controller(transport: &Arc<MockTransport>) -> BulbController<MockTransport> {
        BulbController::new(
            Arc::clone(transport),
            StaticPermission::granted(),
            ControllerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_permission_denied_never_scans() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = BulbController::new(
            Arc::clone(&transport),
            StaticPermission::denied(),
            ControllerConfig::default(),
        );

        assert_eq!(controller.start_scan().await, Err(BulbError::PermissionDenied));
        assert!(!controller.is_scanning());
        assert_eq!(transport.scan_starts(), 0);
    }

    #[tokio::test]
    async fn test_discoveries_outside_a_scan_are_ignored() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = controller(&transport);

        controller
            .transport_tx
            .send(TransportEvent::Discovered(PeripheralDescriptor::new(
                "bulb",
                Some("Bulb".into()),
            )))
            .unwrap();
        assert!(controller.process_pending().is_empty());
        assert!(controller.peripherals().is_empty());
    }

    #[tokio::test]
    async fn test_refused_connect_keeps_pending_link_loss() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = controller(&transport);
        let id = PeripheralId::new("bulb");
        controller.connect(&id).await.unwrap();

        transport.drop_link();
        assert_eq!(
            controller.connect(&PeripheralId::new("lamp")).await,
            Err(BulbError::AlreadyConnected { id: id.clone() })
        );

        assert_eq!(
            controller.process_pending(),
            vec![ControllerEvent::Disconnected(id)]
        );
        assert!(!controller.is_connected());
    }

    #[tokio::test]
    async fn test_stale_notifications_are_dropped() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = controller(&transport);
        let id = PeripheralId::new("bulb");
        controller.connect(&id).await.unwrap();

        controller
            .notification_tx
            .send(Notification {
                link: controller.link_generation - 1,
                property: Property::Brightness,
                value: Ok(3),
            })
            .unwrap();
        assert!(controller.process_pending().is_empty());
        assert_eq!(controller.state().brightness, Some(128));

        transport.notify(Property::Brightness, Payload::Bytes(vec![4]));
        let event = controller.next_event().await.unwrap();
        assert!(matches!(
            event,
            ControllerEvent::PropertyUpdated {
                property: Property::Brightness,
                ..
            }
        ));
        assert_eq!(controller.state().brightness, Some(4));
    }

    #[tokio::test]
    async fn test_connect_without_subscriptions() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = BulbController::new(
            Arc::clone(&transport),
            StaticPermission::granted(),
            ControllerConfig::default().with_subscribe_on_connect(false),
        );

        controller.connect(&PeripheralId::new("bulb")).await.unwrap();
        assert_eq!(controller.connection.subscription_count(), 0);
        assert_eq!(transport.monitor_count(Property::Power), 0);
        assert_eq!(controller.state().power, Some(true));
    }
}
