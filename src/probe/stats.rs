//! Run statistics shared between workers

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time view of a run's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub checks: u64,
    pub hits: u64,
    pub errors: u64,
    /// Checks per minute
    pub cpm: u64,
    pub proxy_count: usize,
}

/// Checks per minute, floored. Zero until a full second has elapsed.
pub fn throughput_for(checks: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs < 1.0 {
        return 0;
    }
    (checks as f64 / secs * 60.0).floor() as u64
}

/// Lock-free counters plus the run clock
#[derive(Debug, Default)]
pub struct RunStats {
    checks: AtomicU64,
    hits: AtomicU64,
    errors: AtomicU64,
    started: RwLock<Option<Instant>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the counters and restart the clock
    pub fn reset(&self) {
        self.checks.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        *self.started.write() = Some(Instant::now());
    }

    pub fn record_check(&self) {
        self.checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started
            .read()
            .map_or(Duration::ZERO, |started| started.elapsed())
    }

    pub fn throughput(&self) -> u64 {
        throughput_for(self.checks(), self.elapsed())
    }

    pub fn snapshot(&self, proxy_count: usize) -> StatsSnapshot {
        StatsSnapshot {
            checks: self.checks(),
            hits: self.hits(),
            errors: self.errors(),
            cpm: self.throughput(),
            proxy_count,
        }
    }
}
