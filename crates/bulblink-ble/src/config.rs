//! btleplug transport configuration

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the btleplug transport
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BtleplugConfig {
    /// Index into the adapters reported by the platform, in platform order
    pub adapter_index: usize,
    /// Forward `DeviceUpdated` events as discoveries, so peripherals whose
    /// name arrives in a later advertisement still show up
    pub report_updates: bool,
}

impl Default for BtleplugConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            report_updates: true,
        }
    }
}

impl BtleplugConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the adapter to use
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Enable or disable forwarding of advertisement updates
    pub fn with_report_updates(mut self, enabled: bool) -> Self {
        self.report_updates = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = BtleplugConfig::new()
            .with_adapter_index(2)
            .with_report_updates(false);

        assert_eq!(config.adapter_index, 2);
        assert!(!config.report_updates);
        assert_eq!(BtleplugConfig::default().adapter_index, 0);
    }
}
