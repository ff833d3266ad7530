//! Bulb GATT layout and the logical properties it exposes

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::ValueWidth;

// ----------------------------------------------------------------------------
// BLE Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Bulb control service UUID
pub const BULB_SERVICE_UUID: Uuid = Uuid::from_u128(0x932c32bd_0000_47a2_835a_a8d455b859dd);

/// Power characteristic (0 = off, 1 = on)
pub const POWER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x932c32bd_0002_47a2_835a_a8d455b859dd);

/// Brightness characteristic (0-255)
pub const BRIGHTNESS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x932c32bd_0003_47a2_835a_a8d455b859dd);

/// Color temperature characteristic (153-500 mireds)
pub const COLOR_TEMPERATURE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x932c32bd_0004_47a2_835a_a8d455b859dd);

// ----------------------------------------------------------------------------
// Logical Properties
// ----------------------------------------------------------------------------

/// A logical bulb property backed by one characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Property {
    Power,
    Brightness,
    ColorTemperature,
}

impl Property {
    /// Every property, in the order they are seeded after connecting
    pub const ALL: [Property; 3] = [
        Property::Power,
        Property::Brightness,
        Property::ColorTemperature,
    ];

    pub const fn service_uuid(self) -> Uuid {
        BULB_SERVICE_UUID
    }

    pub const fn characteristic_uuid(self) -> Uuid {
        match self {
            Property::Power => POWER_CHARACTERISTIC_UUID,
            Property::Brightness => BRIGHTNESS_CHARACTERISTIC_UUID,
            Property::ColorTemperature => COLOR_TEMPERATURE_CHARACTERISTIC_UUID,
        }
    }

    /// Look up the property backed by a characteristic
    pub fn from_characteristic(uuid: Uuid) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|property| property.characteristic_uuid() == uuid)
    }

    pub const fn width(self) -> ValueWidth {
        match self {
            Property::Power | Property::Brightness => ValueWidth::Byte,
            Property::ColorTemperature => ValueWidth::Word,
        }
    }

    /// Values the accessory is expected to report
    pub const fn valid_range(self) -> RangeInclusive<u32> {
        match self {
            Property::Power => 0..=1,
            Property::Brightness => 0..=255,
            Property::ColorTemperature => 153..=500,
        }
    }

    pub fn is_valid(self, value: u32) -> bool {
        self.valid_range().contains(&value)
    }

    /// Whether the presentation layer may write this property.
    ///
    /// Color temperature is reported by the accessory but has no write path.
    pub const fn is_writable(self) -> bool {
        !matches!(self, Property::ColorTemperature)
    }

    pub const fn supports_notifications(self) -> bool {
        true
    }

    pub const fn name(self) -> &'static str {
        match self {
            Property::Power => "power",
            Property::Brightness => "brightness",
            Property::ColorTemperature => "color temperature",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
