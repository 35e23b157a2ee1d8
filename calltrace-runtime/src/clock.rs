//! Monotonic nanosecond clocks used to timestamp call markers.
//!
//! The tracer never looks at wall-clock dates, only at differences between
//! two readings of the same clock, so a clock just has to be monotonic.
//! `MonotonicClock` anchors `Instant` at its creation; `ManualClock` is
//! driven by hand for deterministic timing in tests and replays.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic timestamps in nanoseconds.
pub trait Clock: Send + Sync {
    /// Current reading in nanoseconds since an arbitrary, fixed origin.
    fn now(&self) -> u64;
}

/// `Instant`-backed clock anchored at construction time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> u64 {
        // u64 nanoseconds covers ~584 years of uptime.
        Instant::now().duration_since(self.epoch).as_nanos() as u64
    }
}

/// Hand-driven clock. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(delta.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Jump to an absolute reading. Callers must keep readings monotonic.
    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> u64 {
        self.nanos.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let mut last = clock.now();
        for _ in 0..1_000 {
            let now = clock.now();
            assert!(now >= last, "clock went backwards: {now} < {last}");
            last = now;
        }
    }

    #[test]
    fn manual_clock_clones_share_reading() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_micros(5));
        assert_eq!(other.now(), 5_000);
        other.set(42_000);
        assert_eq!(clock.now(), 42_000);
    }
}
