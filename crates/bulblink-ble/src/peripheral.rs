//! Platform peripheral bookkeeping

use std::collections::HashMap;

use btleplug::api::{Peripheral as _, PeripheralProperties};
use btleplug::platform::Peripheral;
use bulblink_core::{PeripheralDescriptor, PeripheralId};
use tokio::sync::RwLock;

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Platform handles for every peripheral seen so far, keyed by the id the
/// core uses
#[derive(Debug, Default)]
pub struct PeripheralRegistry {
    peripherals: RwLock<HashMap<PeripheralId, Peripheral>>,
}

impl PeripheralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a platform peripheral and return the id it is known by
    pub async fn insert(&self, peripheral: Peripheral) -> PeripheralId {
        let id = peripheral_id(&peripheral);
        self.peripherals
            .write()
            .await
            .insert(id.clone(), peripheral);
        id
    }

    pub async fn get(&self, id: &PeripheralId) -> Option<Peripheral> {
        self.peripherals.read().await.get(id).cloned()
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

/// Core identity of a platform peripheral
pub fn peripheral_id(peripheral: &Peripheral) -> PeripheralId {
    PeripheralId::new(peripheral.id().to_string())
}

/// Build a discovery record from advertised properties
pub fn describe(id: PeripheralId, properties: Option<PeripheralProperties>) -> PeripheralDescriptor {
    match properties {
        Some(properties) => {
            let descriptor = PeripheralDescriptor::new(id, properties.local_name);
            match properties.rssi {
                Some(rssi) => descriptor.with_rssi(rssi),
                None => descriptor,
            }
        }
        None => PeripheralDescriptor::new(id, None),
    }
}
