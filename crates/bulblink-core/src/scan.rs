//! Peripheral discovery
//!
//! A [`ScanSession`] drives an unfiltered scan and keeps the ordered list of
//! named peripherals seen so far. Identity is the dedup key; the first
//! descriptor seen for an identity wins.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::transport::{BleTransport, EventSink, PeripheralDescriptor, PeripheralId};

// ----------------------------------------------------------------------------
// Scan Session
// ----------------------------------------------------------------------------

/// Discovered peripherals for the lifetime of one scan
#[derive(Debug, Default)]
pub struct ScanSession {
    active: bool,
    discovered: Vec<PeripheralDescriptor>,
    seen: HashSet<PeripheralId>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start scanning, discarding results from any previous scan
    pub async fn start<T: BleTransport + ?Sized>(
        &mut self,
        transport: &T,
        sink: EventSink,
    ) -> Result<()> {
        if self.active {
            debug!("Scan already running");
            return Ok(());
        }

        self.clear();
        transport.start_scan(sink).await?;
        self.active = true;
        info!("Started scanning for peripherals");
        Ok(())
    }

    /// Stop scanning; results are kept until the next start
    pub async fn stop<T: BleTransport + ?Sized>(&mut self, transport: &T) -> Result<()> {
        if !self.active {
            return Ok(());
        }

        // The session is considered stopped even if the stack complains
        self.active = false;
        transport.stop_scan().await?;
        info!(
            "Stopped scanning ({} peripherals found)",
            self.discovered.len()
        );
        Ok(())
    }

    /// Record a discovery. Returns `true` if the peripheral was added.
    pub fn accept(&mut self, descriptor: PeripheralDescriptor) -> bool {
        if descriptor.display_name().is_none() {
            return false;
        }
        if !self.seen.insert(descriptor.id.clone()) {
            return false;
        }

        debug!(
            "Discovered peripheral {} ({})",
            descriptor.id,
            descriptor.display_name().unwrap_or_default()
        );
        self.discovered.push(descriptor);
        true
    }

    /// Drop all discovered peripherals
    pub fn clear(&mut self) {
        self.discovered.clear();
        self.seen.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Discovered peripherals in arrival order
    pub fn peripherals(&self) -> &[PeripheralDescriptor] {
        &self.discovered
    }

    pub fn find(&self, id: &PeripheralId) -> Option<&PeripheralDescriptor> {
        self.discovered.iter().find(|descriptor| &descriptor.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use tokio::sync::mpsc;

    fn named(id: &str, name: &str) -> PeripheralDescriptor {
        PeripheralDescriptor::new(id, Some(name.to_string()))
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let mut session = ScanSession::new();

        assert!(session.accept(named("aa", "Bulb")));
        assert!(!session.accept(named("aa", "Bulb (renamed)")));
        assert!(session.accept(named("bb", "Lamp")));
        for _ in 0..10 {
            session.accept(named("aa", "Bulb"));
        }

        let ids: Vec<_> = session.peripherals().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["aa", "bb"]);
        // First seen wins
        assert_eq!(
            session.find(&"aa".into()).and_then(|p| p.name.as_deref()),
            Some("Bulb")
        );
    }

    #[test]
    fn test_unnamed_peripherals_are_ignored() {
        let mut session = ScanSession::new();

        assert!(!session.accept(PeripheralDescriptor::new("aa", None)));
        assert!(!session.accept(PeripheralDescriptor::new("bb", Some(String::new()))));
        assert!(!session.accept(PeripheralDescriptor::new("cc", Some("  ".to_string()))));
        assert!(session.peripherals().is_empty());

        // A later advertisement carrying a name is still accepted
        assert!(session.accept(named("aa", "Bulb")));
    }

    #[tokio::test]
    async fn test_restart_discards_previous_results() {
        let transport = MockTransport::new();
        let (sink, _events) = mpsc::unbounded_channel();
        let mut session = ScanSession::new();

        session.start(&transport, sink.clone()).await.unwrap();
        assert!(session.is_active());
        session.accept(named("aa", "Bulb"));

        // Starting twice is a no-op
        session.start(&transport, sink.clone()).await.unwrap();
        assert_eq!(session.peripherals().len(), 1);
        assert_eq!(transport.scan_starts(), 1);

        session.stop(&transport).await.unwrap();
        assert!(!session.is_active());
        assert_eq!(session.peripherals().len(), 1);

        session.start(&transport, sink).await.unwrap();
        assert!(session.peripherals().is_empty());
        assert_eq!(transport.scan_starts(), 2);
    }
}
