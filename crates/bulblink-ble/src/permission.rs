//! Adapter-backed permission gate

use async_trait::async_trait;
use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use bulblink_core::PermissionGate;
use tracing::warn;

/// Grants access when the platform exposes at least one usable adapter.
///
/// On platforms that gate Bluetooth behind a user prompt, creating the
/// manager and listing adapters is what triggers the prompt; a refusal
/// surfaces as an error or an empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterPermission;

#[async_trait]
impl PermissionGate for AdapterPermission {
    async fn request_access(&self) -> bool {
        let manager = match Manager::new().await {
            Ok(manager) => manager,
            Err(e) => {
                warn!("Bluetooth unavailable: {}", e);
                return false;
            }
        };

        match manager.adapters().await {
            Ok(adapters) if !adapters.is_empty() => true,
            Ok(_) => {
                warn!("No Bluetooth adapters found");
                false
            }
            Err(e) => {
                warn!("Bluetooth access refused: {}", e);
                false
            }
        }
    }
}
