//! Mirrored bulb state and its reconciliation rules
//!
//! The [`StateSynchronizer`] is the only writer of [`MirroredState`]. Writes
//! are confirmed by reading the characteristic back, notifications are
//! applied as they are processed, and whichever arrives last wins. Values
//! that cannot be decoded, or fall outside a property's range, turn the field
//! into `None` ("unknown") instead of surfacing an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::channel::CharacteristicChannel;
use crate::error::{BulbError, Result};
use crate::property::Property;
use crate::transport::BleTransport;

// ----------------------------------------------------------------------------
// Mirrored State
// ----------------------------------------------------------------------------

/// Local view of the accessory's properties; `None` means unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirroredState {
    pub power: Option<bool>,
    pub brightness: Option<u8>,
    pub color_temperature: Option<u16>,
}

impl MirroredState {
    /// Raw value of a property, if known
    pub fn value(&self, property: Property) -> Option<u32> {
        match property {
            Property::Power => self.power.map(u32::from),
            Property::Brightness => self.brightness.map(u32::from),
            Property::ColorTemperature => self.color_temperature.map(u32::from),
        }
    }

    fn set(&mut self, property: Property, value: Option<u32>) {
        let value = value.filter(|v| property.is_valid(*v));
        match property {
            Property::Power => self.power = value.map(|v| v == 1),
            Property::Brightness => {
                self.brightness = value.and_then(|v| u8::try_from(v).ok())
            }
            Property::ColorTemperature => {
                self.color_temperature = value.and_then(|v| u16::try_from(v).ok())
            }
        }
    }

    /// Whether every property has a known value
    pub fn is_complete(&self) -> bool {
        Property::ALL.into_iter().all(|p| self.value(p).is_some())
    }
}

impl fmt::Display for MirroredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn known<T: fmt::Display>(value: Option<T>) -> String {
            value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
        }

        let power = match self.power {
            Some(true) => "on",
            Some(false) => "off",
            None => "unknown",
        };
        write!(
            f,
            "power: {}, brightness: {}, color temperature: {}",
            power,
            known(self.brightness),
            known(self.color_temperature)
        )
    }
}

// ----------------------------------------------------------------------------
// State Synchronizer
// ----------------------------------------------------------------------------

/// Applies channel events to the mirrored state and publishes every change
#[derive(Debug)]
pub struct StateSynchronizer {
    state: watch::Sender<MirroredState>,
}

impl Default for StateSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSynchronizer {
    pub fn new() -> Self {
        let (state, _) = watch::channel(MirroredState::default());
        Self { state }
    }

    /// Current snapshot
    pub fn state(&self) -> MirroredState {
        *self.state.borrow()
    }

    /// Receiver that observes every committed change
    pub fn watch(&self) -> watch::Receiver<MirroredState> {
        self.state.subscribe()
    }

    /// Commit a value delivered by a notification or read.
    ///
    /// No ordering is enforced against in-flight writes.
    pub fn commit(&mut self, property: Property, value: Result<u32>) {
        let value = match value {
            Ok(v) if property.is_valid(v) => Some(v),
            Ok(v) => {
                warn!("Accessory reported out-of-range {} value {}", property, v);
                None
            }
            Err(e) => {
                warn!("Could not decode {} value: {}", property, e);
                None
            }
        };

        debug!("Committing {} = {:?}", property, value);
        self.state.send_modify(|state| state.set(property, value));
    }

    /// Read a property once and commit the result.
    ///
    /// A malformed value marks the property unknown; transport failures are
    /// returned and leave the mirror untouched.
    pub async fn refresh<T: BleTransport>(
        &mut self,
        channel: &CharacteristicChannel<T>,
    ) -> Result<()> {
        match channel.read_once().await {
            Ok(value) => {
                self.commit(channel.property(), Ok(value));
                Ok(())
            }
            Err(e @ BulbError::MalformedPayload { .. }) => {
                self.commit(channel.property(), Err(e));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn set_power<T: BleTransport>(
        &mut self,
        channel: &CharacteristicChannel<T>,
        on: bool,
    ) -> Result<()> {
        debug_assert_eq!(channel.property(), Property::Power);
        self.write_confirmed(channel, u32::from(on)).await
    }

    pub async fn set_brightness<T: BleTransport>(
        &mut self,
        channel: &CharacteristicChannel<T>,
        value: u8,
    ) -> Result<()> {
        debug_assert_eq!(channel.property(), Property::Brightness);
        self.write_confirmed(channel, u32::from(value)).await
    }

    /// Color temperature has no write path on the accessory
    pub fn set_color_temperature(&mut self, _value: u16) -> Result<()> {
        Err(BulbError::Unsupported {
            property: Property::ColorTemperature,
        })
    }

    /// Write, then commit whatever the accessory reports back
    async fn write_confirmed<T: BleTransport>(
        &mut self,
        channel: &CharacteristicChannel<T>,
        value: u32,
    ) -> Result<()> {
        let property = channel.property();
        if !property.is_writable() {
            return Err(BulbError::Unsupported { property });
        }

        channel.write(value).await?;
        self.refresh(channel).await
    }

    /// Forget every value
    pub fn reset(&mut self) {
        self.state.send_replace(MirroredState::default());
    }
}
