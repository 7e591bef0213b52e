//! Network-adjusted monotonic clock.
//!
//! Entry timestamps must be comparable across nodes, so every node keeps a
//! clock anchored to a process-local [`Instant`] (monotonic by
//! construction) plus an offset nudged toward its peers.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic nanosecond clock with an atomically adjusted network offset.
pub struct NetworkClock {
    origin: Instant,
    origin_ns: i64,
    offset: AtomicI64,
}

impl Default for NetworkClock {
    fn default() -> Self {
        let origin_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Self {
            origin: Instant::now(),
            origin_ns,
            offset: AtomicI64::new(0),
        }
    }
}

impl NetworkClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-local monotonic nanoseconds, unaffected by network
    /// adjustment. Used for quiescence bookkeeping.
    pub fn monotonic_ns(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }

    /// Network-adjusted nanoseconds since the Unix epoch.
    pub fn now(&self) -> i64 {
        self.origin_ns + self.monotonic_ns() + self.offset.load(Ordering::Relaxed)
    }

    /// Adopt a peer's time wholesale. Used once when joining a cluster.
    pub fn conform(&self, sample_ns: i64) {
        let local = self.origin_ns + self.monotonic_ns();
        self.offset.store(sample_ns - local, Ordering::Relaxed);
    }

    /// Damp half of an observed error against a peer into the offset.
    pub fn adjust(&self, error_ns: i64) {
        self.offset.fetch_add(error_ns / 2, Ordering::Relaxed);
    }
}
