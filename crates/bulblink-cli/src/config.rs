//! bulblink CLI configuration management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - `bulblink.toml` in the working directory
//! - the file passed with `--config`
//! - environment variables prefixed with `BULBLINK_`, with `__` separating
//!   sections from keys (`BULBLINK_BLE__ADAPTER_INDEX=1`)

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use bulblink_ble::BtleplugConfig;
use bulblink_core::ControllerConfig;

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the bulblink CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Connection and operation policy
    pub bulb: BulbConfig,

    /// Bluetooth adapter configuration
    pub ble: BtleplugConfig,

    /// CLI-specific configuration
    pub cli: CliConfig,
}

/// Connection and operation policy, in whole seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulbConfig {
    pub connection_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
    pub operation_timeout_secs: u64,
    /// Subscribe to notifications after connecting
    pub subscribe_on_connect: bool,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default scan duration for `scan`, and how long commands that take a
    /// peripheral id scan for it before giving up
    pub scan_duration_secs: u64,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for BulbConfig {
    fn default() -> Self {
        let controller = ControllerConfig::default();
        Self {
            connection_timeout_secs: controller.connection_timeout.as_secs(),
            discovery_timeout_secs: controller.discovery_timeout.as_secs(),
            operation_timeout_secs: controller.operation_timeout.as_secs(),
            subscribe_on_connect: controller.subscribe_on_connect,
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            scan_duration_secs: 10,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration with the standard priority order.
    ///
    /// `bulblink.toml` is optional; an explicitly named file must exist.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(ConfigError::Loading(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
        }
        Self::from_figment(Self::figment(config_file))
    }

    /// The layered sources, without extracting them
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("bulblink.toml"));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed("BULBLINK_").split("__"))
    }

    /// Extract and validate a configuration
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::FileSystem(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        std::fs::write(path.as_ref(), self.to_toml()?)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("connection", self.bulb.connection_timeout_secs),
            ("discovery", self.bulb.discovery_timeout_secs),
            ("operation", self.bulb.operation_timeout_secs),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "{} timeout must be greater than 0",
                    name
                )));
            }
        }

        if self.cli.scan_duration_secs == 0 {
            return Err(ConfigError::Validation(
                "Scan duration must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Controller policy derived from the `[bulb]` section
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::new()
            .with_connection_timeout(Duration::from_secs(self.bulb.connection_timeout_secs))
            .with_discovery_timeout(Duration::from_secs(self.bulb.discovery_timeout_secs))
            .with_operation_timeout(Duration::from_secs(self.bulb.operation_timeout_secs))
            .with_subscribe_on_connect(self.bulb.subscribe_on_connect)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.cli.scan_duration_secs)
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
