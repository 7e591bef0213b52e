//! Configuration types for the store.

use crate::error::{Error, Result};
use crate::types::Position;
use std::time::Duration;

/// Main configuration for a store node.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Address this node binds and advertises (host:port).
    pub addr: String,

    /// Replication factor R: the number of nodes holding each key.
    pub redundancy: usize,

    /// Tick period for the sync, clean and migrate workers.
    pub sync_interval: Duration,

    /// Minimum owned-size ratio against the successor before the node
    /// migrates its position.
    pub migrate_hysteresis: f64,

    /// Quiescence multiplier: migration waits this many tick periods of
    /// silence after the last sync, reroute or migrate event.
    pub migrate_wait_factor: u32,

    /// Period between clock samples against the successor.
    pub clock_interval: Duration,

    /// Pinned ring position.
    ///
    /// When unset the position starts as the digest of the address, and
    /// joining a cluster adopts the midpoint of the largest free slot
    /// instead.
    pub position: Option<Position>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9000".to_string(),
            redundancy: 3,
            sync_interval: Duration::from_secs(1),
            migrate_hysteresis: 1.5,
            migrate_wait_factor: 2,
            clock_interval: Duration::from_secs(10),
            position: None,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration for the given advertise address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set the replication factor.
    pub fn with_redundancy(mut self, redundancy: usize) -> Self {
        self.redundancy = redundancy.max(1);
        self
    }

    /// Set the worker tick period.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the migration hysteresis ratio.
    pub fn with_migrate_hysteresis(mut self, ratio: f64) -> Self {
        self.migrate_hysteresis = ratio;
        self
    }

    /// Set the migration quiescence multiplier.
    pub fn with_migrate_wait_factor(mut self, factor: u32) -> Self {
        self.migrate_wait_factor = factor;
        self
    }

    /// Set the clock sampling period.
    pub fn with_clock_interval(mut self, interval: Duration) -> Self {
        self.clock_interval = interval;
        self
    }

    /// Pin the node's ring position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Check for values the workers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.addr.is_empty() {
            return Err(Error::Config("addr must not be empty".to_string()));
        }
        if self.sync_interval.is_zero() || self.clock_interval.is_zero() {
            return Err(Error::Config(
                "sync_interval and clock_interval must be nonzero".to_string(),
            ));
        }
        if self.migrate_hysteresis < 1.0 {
            return Err(Error::Config(format!(
                "migrate_hysteresis must be at least 1, got {}",
                self.migrate_hysteresis
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.redundancy, 3);
        assert_eq!(config.sync_interval, Duration::from_secs(1));
        assert_eq!(config.migrate_hysteresis, 1.5);
        assert_eq!(config.migrate_wait_factor, 2);
        assert!(config.position.is_none());
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new("127.0.0.1:7000")
            .with_redundancy(2)
            .with_sync_interval(Duration::from_millis(50))
            .with_position(Position::from_slice(&[0x80]));

        assert_eq!(config.addr, "127.0.0.1:7000");
        assert_eq!(config.redundancy, 2);
        assert_eq!(config.sync_interval, Duration::from_millis(50));
        assert_eq!(config.position, Some(Position::from_slice(&[0x80])));
    }

    #[test]
    fn test_redundancy_floor() {
        let config = StoreConfig::default().with_redundancy(0);
        assert_eq!(config.redundancy, 1);
    }

    #[test]
    fn test_validate() {
        assert!(StoreConfig::default().validate().is_ok());

        let bad = StoreConfig::default().with_sync_interval(Duration::ZERO);
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let bad = StoreConfig::default().with_migrate_hysteresis(0.5);
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let bad = StoreConfig::new("");
        assert!(matches!(bad.validate(), Err(Error::Config(_))));
    }
}
