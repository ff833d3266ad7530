//! Command handlers for the bulblink CLI

use std::path::Path;
use std::time::Duration;

use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{info, warn};

use bulblink_core::{BleTransport, BulbController, ControllerEvent, PeripheralDescriptor, PeripheralId};

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher<T: BleTransport> {
    controller: BulbController<T>,
    config: AppConfig,
}

impl<T: BleTransport> CommandDispatcher<T> {
    pub fn new(controller: BulbController<T>, config: AppConfig) -> Self {
        Self { controller, config }
    }

    /// Execute a CLI command
    pub async fn execute(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Scan { duration_secs } => {
                let duration = duration_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.config.scan_duration());
                self.handle_scan(duration).await
            }
            Commands::Status { id } => {
                self.connect(&id).await?;
                self.finish(Ok(())).await
            }
            Commands::Power { id, state } => {
                self.connect(&id).await?;
                let result = self.controller.set_power(state.is_on()).await;
                self.finish(result).await
            }
            Commands::Brightness { id, value } => {
                self.connect(&id).await?;
                let result = self.controller.set_brightness(value).await;
                self.finish(result).await
            }
            Commands::ColorTemp { id, value } => {
                self.connect(&id).await?;
                let result = self.controller.set_color_temperature(value);
                self.finish(result).await
            }
            Commands::Watch { id } => self.handle_watch(&id).await,
            Commands::Config { write } => handle_config(&self.config, write.as_deref().map(Path::new)),
        }
    }

    /// Handle the scan command
    async fn handle_scan(&mut self, duration: Duration) -> Result<()> {
        self.controller.start_scan().await?;
        println!("Scanning for {}s... Press Ctrl+C to stop", duration.as_secs());

        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                _ = tokio::signal::ctrl_c() => {
                    info!("Scan interrupted");
                    break;
                }
                event = self.controller.next_event() => match event {
                    Some(ControllerEvent::PeripheralDiscovered(peripheral)) => {
                        println!("{}", format_peripheral(&peripheral));
                    }
                    Some(ControllerEvent::ScanDiagnostic(reason)) => {
                        warn!("Scan problem: {}", reason);
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        self.controller.stop_scan().await?;
        println!("Found {} peripheral(s)", self.controller.peripherals().len());
        Ok(())
    }

    /// Handle the watch command
    async fn handle_watch(&mut self, id: &str) -> Result<()> {
        self.connect(id).await?;
        println!("{}", self.controller.state());
        info!("Watching {}... Press Ctrl+C to stop", id);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Watch interrupted");
                    break;
                }
                event = self.controller.next_event() => match event {
                    Some(ControllerEvent::PropertyUpdated { state, .. }) => println!("{}", state),
                    Some(ControllerEvent::Disconnected(peripheral)) => {
                        println!("{}: not connected", peripheral);
                        return Ok(());
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        self.controller.disconnect().await?;
        Ok(())
    }

    /// Scan until `id` shows up, then connect to it
    async fn connect(&mut self, id: &str) -> Result<()> {
        let id = PeripheralId::new(id);
        self.controller.start_scan().await?;

        let deadline = Instant::now() + self.config.scan_duration();
        let found = loop {
            match timeout_at(deadline, self.controller.next_event()).await {
                Ok(Some(ControllerEvent::PeripheralDiscovered(peripheral))) if peripheral.id == id => {
                    break true;
                }
                Ok(Some(ControllerEvent::ScanDiagnostic(reason))) => {
                    warn!("Scan problem: {}", reason);
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break false,
            }
        };

        if !found {
            self.controller.stop_scan().await?;
            return Err(CliError::PeripheralNotFound {
                id: id.to_string(),
                secs: self.config.cli.scan_duration_secs,
            });
        }

        info!("Connecting to {}", id);
        if let Err(e) = self.controller.connect(&id).await {
            // A failed attempt can leave the scan running
            if self.controller.is_scanning() {
                if let Err(stop) = self.controller.stop_scan().await {
                    warn!("Could not stop scan: {}", stop);
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Print the mirrored state and drop the link, keeping the first error
    async fn finish(&mut self, result: bulblink_core::Result<()>) -> Result<()> {
        if self.controller.is_connected() {
            println!("{}", self.controller.state());
        }
        let disconnected = self.controller.disconnect().await;
        result?;
        disconnected?;
        Ok(())
    }
}

/// Print the effective configuration and optionally write it out
pub fn handle_config(config: &AppConfig, write: Option<&Path>) -> Result<()> {
    print!("{}", config.to_toml()?);
    if let Some(path) = write {
        config.save_to_file(path)?;
        info!("Configuration written to {}", path.display());
    }
    Ok(())
}

/// One line of `scan` output
pub fn format_peripheral(peripheral: &PeripheralDescriptor) -> String {
    let name = peripheral.display_name().unwrap_or("<unnamed>");
    match peripheral.rssi {
        Some(rssi) => format!("{}  {}  {} dBm", peripheral.id, name, rssi),
        None => format!("{}  {}", peripheral.id, name),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cli::PowerArg;
    use bulblink_core::mock::MockTransport;
    use bulblink_core::{BulbError, Payload, Property, StaticPermission};

    const BULB_ID: &str = "C4:7C:8D:6A:2B:01";

    fn setup() -> (Arc<MockTransport>, CommandDispatcher<MockTransport>) {
        let transport = Arc::new(MockTransport::new().with_peripheral(
            PeripheralDescriptor::new(BULB_ID, Some("Smart Bulb".to_string())).with_rssi(-58),
        ));
        let config = AppConfig::default();
        let controller = BulbController::new(
            Arc::clone(&transport),
            StaticPermission::granted(),
            config.controller_config(),
        );
        (transport, CommandDispatcher::new(controller, config))
    }

    #[test]
    fn test_format_peripheral() {
        let bulb = PeripheralDescriptor::new("AA:BB", Some("Lamp".to_string()));
        assert_eq!(format_peripheral(&bulb), "AA:BB  Lamp");
        assert_eq!(
            format_peripheral(&bulb.with_rssi(-70)),
            "AA:BB  Lamp  -70 dBm"
        );
    }

    #[tokio::test]
    async fn test_power_command_writes_and_disconnects() {
        let (transport, mut dispatcher) = setup();

        dispatcher
            .execute(Commands::Power {
                id: BULB_ID.to_string(),
                state: PowerArg::Off,
            })
            .await
            .unwrap();

        assert_eq!(
            transport.writes(),
            vec![(Property::Power.characteristic_uuid(), Payload::Bytes(vec![0]))]
        );
        assert_eq!(transport.connected(), None);
    }

    #[tokio::test]
    async fn test_brightness_command() {
        let (transport, mut dispatcher) = setup();

        dispatcher
            .execute(Commands::Brightness {
                id: BULB_ID.to_string(),
                value: 42,
            })
            .await
            .unwrap();

        assert_eq!(
            transport.writes().last().map(|(_, payload)| payload.clone()),
            Some(Payload::Bytes(vec![42]))
        );
    }

    #[tokio::test]
    async fn test_color_temperature_is_reported_unsupported() {
        let (transport, mut dispatcher) = setup();

        let err = dispatcher
            .execute(Commands::ColorTemp {
                id: BULB_ID.to_string(),
                value: 300,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CliError::Bulb(BulbError::Unsupported {
                property: Property::ColorTemperature
            })
        ));
        assert!(transport.writes().is_empty());
        assert_eq!(transport.connected(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_peripheral_times_out() {
        let (transport, mut dispatcher) = setup();

        let err = dispatcher
            .execute(Commands::Status {
                id: "AA:BB:CC:DD:EE:FF".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::PeripheralNotFound { secs: 10, .. }));
        assert!(!transport.is_scanning());
        assert_eq!(transport.connected(), None);
    }

    #[tokio::test]
    async fn test_failed_connect_stops_scan() {
        let (transport, mut dispatcher) = setup();
        transport.fail_connect(Some("out of range"));

        let err = dispatcher
            .execute(Commands::Status {
                id: BULB_ID.to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Bulb(BulbError::Transport { .. })));
        assert!(!dispatcher.controller.is_scanning());
        assert!(!transport.is_scanning());
        assert_eq!(transport.connected(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_runs_for_the_requested_duration() {
        let (transport, mut dispatcher) = setup();
        let started = Instant::now();

        dispatcher
            .execute(Commands::Scan {
                duration_secs: Some(3),
            })
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(transport.scan_starts(), 1);
        assert!(!transport.is_scanning());
        assert_eq!(dispatcher.controller.peripherals().len(), 1);
    }

    #[tokio::test]
    async fn test_watch_ends_on_link_loss() {
        let (transport, mut dispatcher) = setup();
        let dropper = Arc::clone(&transport);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            dropper.drop_link();
        });

        dispatcher
            .execute(Commands::Watch {
                id: BULB_ID.to_string(),
            })
            .await
            .unwrap();

        assert!(!dispatcher.controller.is_connected());
    }
}
