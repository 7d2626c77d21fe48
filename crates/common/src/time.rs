//! Wall-clock helpers and the injectable [`Clock`] trait.
//!
//! Gateway timestamps are Unix milliseconds stored as `u64`. Staleness
//! and grace-period decisions in the mempool tracker compare these
//! timestamps against "now", so the current instant is obtained through
//! the [`Clock`] trait rather than directly from the system: production
//! code uses [`SystemClock`], tests drive a [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// If the system clock is before the Unix epoch (which should never
/// happen in practice), returns 0.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// A source of "now" in Unix milliseconds.
///
/// Implementations must be cheap to call; the mempool tracker reads the
/// clock once per reconciliation cycle and once per node snapshot.
pub trait Clock: Send + Sync {
    /// The current instant, as Unix milliseconds.
    fn now_ms(&self) -> u64;
}

/// The production clock, backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        current_timestamp_ms()
    }
}

/// A manually advanced clock for tests.
///
/// Starts at the instant given to [`ManualClock::new`] and only moves
/// when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock fixed at `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// Sets the current instant.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::Release);
    }

    /// Advances the current instant by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.now_ms
            .fetch_add(duration.as_millis() as u64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }
}
