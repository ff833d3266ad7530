//! Connection lifecycle
//!
//! ```text
//! Disconnected --connect(id)--> Connecting --ok--> Connected(id)
//!                                   |                  |
//!                                failure        link drop / disconnect()
//!                                   v                  v
//!                              Disconnected       Disconnected
//! ```
//!
//! The [`ConnectionManager`] owns the characteristic channels and
//! notification subscriptions of the active link. They are created when the
//! link comes up and released together on every path back to
//! `Disconnected`.

use std::fmt;
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::channel::{CharacteristicChannel, LinkFlag, Subscription};
use crate::config::ControllerConfig;
use crate::error::{BulbError, Result};
use crate::property::Property;
use crate::scan::ScanSession;
use crate::transport::{BleTransport, PeripheralId};

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Connection state of the (single) accessory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting(PeripheralId),
    Connected(PeripheralId),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting(_))
    }

    /// Peripheral being connected to or connected
    pub fn peripheral(&self) -> Option<&PeripheralId> {
        match self {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting(id) | ConnectionState::Connected(id) => Some(id),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting(id) => write!(f, "connecting to {id}"),
            ConnectionState::Connected(id) => write!(f, "connected to {id}"),
        }
    }
}

// ----------------------------------------------------------------------------
// Active Link
// ----------------------------------------------------------------------------

struct ActiveLink<T: BleTransport> {
    link: LinkFlag,
    channels: Vec<CharacteristicChannel<T>>,
    subscriptions: Vec<Subscription>,
}

impl<T: BleTransport> Drop for ActiveLink<T> {
    fn drop(&mut self) {
        // Channel clones held elsewhere must fail from here on
        self.link.sever();
    }
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Drives the connection state machine for one accessory
pub struct ConnectionManager<T: BleTransport> {
    transport: Arc<T>,
    config: ControllerConfig,
    state: ConnectionState,
    active: Option<ActiveLink<T>>,
}

impl<T: BleTransport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>, config: ControllerConfig) -> Self {
        Self {
            transport,
            config,
            state: ConnectionState::Disconnected,
            active: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Connect to `id`, stop scanning, and discover its services.
    ///
    /// Calling this while a connection attempt is pending is rejected, as is
    /// connecting to a second accessory. Connecting to the accessory that is
    /// already connected does nothing.
    pub async fn connect(&mut self, id: &PeripheralId, scan: &mut ScanSession) -> Result<()> {
        match &self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting(_) => return Err(BulbError::ConnectionInProgress),
            ConnectionState::Connected(current) if current == id => {
                debug!("Already connected to {}", id);
                return Ok(());
            }
            ConnectionState::Connected(current) => {
                return Err(BulbError::AlreadyConnected {
                    id: current.clone(),
                })
            }
        }

        self.state = ConnectionState::Connecting(id.clone());
        info!("Connecting to {}...", id);

        let connected = match timeout(self.config.connection_timeout, self.transport.connect(id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(BulbError::transport(
                "connect",
                format!("timed out after {:?}", self.config.connection_timeout),
            )),
        };
        if let Err(e) = connected {
            error!("Failed to connect to {}: {}", id, e);
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }

        self.state = ConnectionState::Connected(id.clone());

        if let Err(e) = scan.stop(self.transport.as_ref()).await {
            warn!("Failed to stop scan after connecting: {}", e);
        }
        scan.clear();

        let discovered = match timeout(
            self.config.discovery_timeout,
            self.transport.discover_services(id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BulbError::transport(
                "discover services",
                format!("timed out after {:?}", self.config.discovery_timeout),
            )),
        };
        if let Err(e) = discovered {
            error!("Failed to discover services for {}: {}", id, e);
            if let Err(e) = self.transport.disconnect(id).await {
                debug!("Disconnect after failed discovery: {}", e);
            }
            self.state = ConnectionState::Disconnected;
            return Err(BulbError::DiscoveryFailure {
                reason: e.to_string(),
            });
        }

        let link = LinkFlag::new();
        let channels = Property::ALL
            .into_iter()
            .map(|property| {
                CharacteristicChannel::new(
                    Arc::clone(&self.transport),
                    id.clone(),
                    property,
                    link.clone(),
                    self.config.operation_timeout,
                )
            })
            .collect();
        self.active = Some(ActiveLink {
            link,
            channels,
            subscriptions: Vec::new(),
        });

        info!("Connected to {}", id);
        Ok(())
    }

    /// Channel for a property of the connected accessory
    pub fn channel(&self, property: Property) -> Result<&CharacteristicChannel<T>> {
        self.active
            .as_ref()
            .and_then(|active| {
                active
                    .channels
                    .iter()
                    .find(|channel| channel.property() == property)
            })
            .ok_or(BulbError::NoConnection)
    }

    /// Channels of the connected accessory (empty when disconnected)
    pub fn channels(&self) -> &[CharacteristicChannel<T>] {
        self.active
            .as_ref()
            .map(|active| active.channels.as_slice())
            .unwrap_or_default()
    }

    /// Keep a subscription alive for as long as the link is up
    pub fn retain_subscription(&mut self, subscription: Subscription) -> Result<()> {
        let active = self.active.as_mut().ok_or(BulbError::NoConnection)?;
        active.subscriptions.push(subscription);
        Ok(())
    }

    pub fn subscription_count(&self) -> usize {
        self.active
            .as_ref()
            .map_or(0, |active| active.subscriptions.len())
    }

    /// Handle a disconnect reported by the transport.
    ///
    /// Returns `true` if it concerned the current accessory.
    pub fn handle_link_loss(&mut self, id: &PeripheralId) -> bool {
        if self.state.peripheral() != Some(id) {
            debug!("Ignoring disconnect of unrelated peripheral {}", id);
            return false;
        }

        warn!("Lost connection to {}", id);
        self.teardown();
        true
    }

    /// Disconnect on request.
    ///
    /// Also clears a `Connecting` state left behind by an abandoned attempt.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(id) = self.state.peripheral().cloned() else {
            return Ok(());
        };

        let result = self.transport.disconnect(&id).await;
        self.teardown();
        info!("Disconnected from {}", id);
        result
    }

    /// Release channels and subscriptions and return to `Disconnected`
    fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(
                "Releasing {} channels and {} subscriptions",
                active.channels.len(),
                active.subscriptions.len()
            );
        }
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::transport::PeripheralDescriptor;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn manager(transport: &Arc<MockTransport>) -> ConnectionManager<MockTransport> {
        ConnectionManager::new(Arc::clone(transport), ControllerConfig::default())
    }

    #[tokio::test]
    async fn test_connect_stops_scan_and_creates_channels() {
        let transport = Arc::new(
            MockTransport::new()
                .with_peripheral(PeripheralDescriptor::new("bulb", Some("Bulb".into()))),
        );
        let mut scan = ScanSession::new();
        let (sink, _events) = mpsc::unbounded_channel();
        scan.start(transport.as_ref(), sink).await.unwrap();
        scan.accept(PeripheralDescriptor::new("bulb", Some("Bulb".into())));

        let mut connection = manager(&transport);
        let id = PeripheralId::new("bulb");
        connection.connect(&id, &mut scan).await.unwrap();

        assert_eq!(connection.state(), &ConnectionState::Connected(id.clone()));
        assert!(!scan.is_active());
        assert!(!transport.is_scanning());
        assert!(scan.peripherals().is_empty());
        assert_eq!(connection.channels().len(), Property::ALL.len());
        assert!(connection.channel(Property::ColorTemperature).is_ok());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_and_single_accessory() {
        let transport = Arc::new(MockTransport::new());
        let mut scan = ScanSession::new();
        let mut connection = manager(&transport);
        let id = PeripheralId::new("bulb");

        connection.connect(&id, &mut scan).await.unwrap();
        let calls = transport.calls();
        connection.connect(&id, &mut scan).await.unwrap();
        assert_eq!(transport.calls(), calls);

        let other = PeripheralId::new("lamp");
        assert_eq!(
            connection.connect(&other, &mut scan).await,
            Err(BulbError::AlreadyConnected { id: id.clone() })
        );
        assert_eq!(transport.connected(), Some(id));
    }

    #[tokio::test]
    async fn test_pending_attempt_rejects_new_connect() {
        let transport = Arc::new(MockTransport::new());
        let mut scan = ScanSession::new();
        let mut connection = manager(&transport);
        connection.state = ConnectionState::Connecting(PeripheralId::new("bulb"));
        assert!(connection.state().is_connecting());
        assert_eq!(
            connection.state().peripheral(),
            Some(&PeripheralId::new("bulb"))
        );

        assert_eq!(
            connection.connect(&PeripheralId::new("lamp"), &mut scan).await,
            Err(BulbError::ConnectionInProgress)
        );
        assert_eq!(transport.calls(), 0);

        // disconnect() clears an abandoned attempt
        connection.disconnect().await.unwrap();
        assert_eq!(connection.state(), &ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_disconnected() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_connect(Some("out of range"));
        let mut scan = ScanSession::new();
        let mut connection = manager(&transport);

        let err = connection
            .connect(&PeripheralId::new("bulb"), &mut scan)
            .await
            .unwrap_err();
        assert!(matches!(err, BulbError::Transport { .. }));
        assert_eq!(connection.state(), &ConnectionState::Disconnected);
        assert!(connection.channels().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_failure_forces_reset() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_discovery(Some("GATT error 133"));
        let mut scan = ScanSession::new();
        let mut connection = manager(&transport);

        let err = connection
            .connect(&PeripheralId::new("bulb"), &mut scan)
            .await
            .unwrap_err();
        assert!(matches!(err, BulbError::DiscoveryFailure { .. }));
        assert_eq!(connection.state(), &ConnectionState::Disconnected);
        assert_eq!(transport.connected(), None);
        assert_eq!(
            connection.channel(Property::Power).err(),
            Some(BulbError::NoConnection)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        struct Unresponsive(MockTransport);

        #[async_trait::async_trait]
        impl BleTransport for Unresponsive {
            async fn start_scan(&self, sink: crate::transport::EventSink) -> Result<()> {
                self.0.start_scan(sink).await
            }
            async fn stop_scan(&self) -> Result<()> {
                self.0.stop_scan().await
            }
            fn on_disconnect(&self, sink: crate::transport::EventSink) {
                self.0.on_disconnect(sink)
            }
            async fn connect(&self, _id: &PeripheralId) -> Result<()> {
                std::future::pending().await
            }
            async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
                self.0.disconnect(id).await
            }
            async fn discover_services(&self, id: &PeripheralId) -> Result<()> {
                self.0.discover_services(id).await
            }
            async fn read(
                &self,
                id: &PeripheralId,
                service: uuid::Uuid,
                characteristic: uuid::Uuid,
            ) -> Result<crate::codec::Payload> {
                self.0.read(id, service, characteristic).await
            }
            async fn write_without_response(
                &self,
                id: &PeripheralId,
                service: uuid::Uuid,
                characteristic: uuid::Uuid,
                payload: &crate::codec::Payload,
            ) -> Result<()> {
                self.0
                    .write_without_response(id, service, characteristic, payload)
                    .await
            }
            async fn monitor(
                &self,
                id: &PeripheralId,
                service: uuid::Uuid,
                characteristic: uuid::Uuid,
            ) -> Result<crate::transport::NotificationStream> {
                self.0.monitor(id, service, characteristic).await
            }
        }

        let transport = Arc::new(Unresponsive(MockTransport::new()));
        let config = ControllerConfig::default().with_connection_timeout(Duration::from_secs(2));
        let mut connection = ConnectionManager::new(transport, config);
        let mut scan = ScanSession::new();

        let err = connection
            .connect(&PeripheralId::new("bulb"), &mut scan)
            .await
            .unwrap_err();
        assert!(matches!(err, BulbError::Transport { .. }));
        assert_eq!(connection.state(), &ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_link_loss_releases_channels() {
        let transport = Arc::new(MockTransport::new());
        let mut scan = ScanSession::new();
        let mut connection = manager(&transport);
        let id = PeripheralId::new("bulb");
        connection.connect(&id, &mut scan).await.unwrap();

        let stale = connection.channel(Property::Power).unwrap().clone();
        let subscription = stale.subscribe(|_| {}).await.unwrap();
        connection.retain_subscription(subscription).unwrap();
        assert_eq!(connection.subscription_count(), 1);

        assert!(!connection.handle_link_loss(&PeripheralId::new("other")));
        assert!(connection.is_connected());

        assert!(connection.handle_link_loss(&id));
        assert_eq!(connection.state(), &ConnectionState::Disconnected);
        assert!(connection.channels().is_empty());
        assert_eq!(connection.subscription_count(), 0);
        assert!(!stale.is_live());
        assert_eq!(stale.read_once().await, Err(BulbError::NoConnection));
    }
}
