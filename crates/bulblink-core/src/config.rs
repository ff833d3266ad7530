//! Controller configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Timeouts and policy for a [`BulbController`](crate::BulbController)
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ControllerConfig {
    /// Maximum time to wait for the link to come up
    pub connection_timeout: Duration,
    /// Maximum time to wait for service discovery
    pub discovery_timeout: Duration,
    /// Maximum time to wait for a single read or write
    pub operation_timeout: Duration,
    /// Subscribe to notifications after connecting
    pub subscribe_on_connect: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(5),
            subscribe_on_connect: true,
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set service discovery timeout
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set read/write timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Enable or disable notification subscriptions on connect
    pub fn with_subscribe_on_connect(mut self, enabled: bool) -> Self {
        self.subscribe_on_connect = enabled;
        self
    }
}
