//! Clock capability used by the cost profiler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic elapsed-time source, in seconds from an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to.
///
/// Lets tests and simulations assign deterministic costs to work. Time is
/// stored as nanoseconds in an atomic so the clock can be shared between
/// a profiler and whatever drives it.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Advance by a (non-negative) number of seconds.
    pub fn advance_secs(&self, secs: f64) {
        if secs > 0.0 {
            self.advance(Duration::from_secs_f64(secs));
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.nanos.load(Ordering::Relaxed) as f64 / 1e9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);

        clock.advance_secs(2.5);
        clock.advance(Duration::from_millis(500));
        assert!((clock.now() - 3.0).abs() < 1e-12);

        clock.advance_secs(-1.0); // ignored
        assert!((clock.now() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
