//! Monotonic time sources.
//!
//! The texture cache measures idle time and request ticks through the
//! [`Clock`] trait so that eviction can be tested without sleeping.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Milliseconds elapsed since the clock's epoch.
    ///
    /// Used as the request tick of throttle bases; never decreases.
    fn ticks(&self) -> i64;
}

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Milliseconds since the first call to any Vellum clock in this process.
pub fn tick_now() -> i64 {
    duration_to_ticks(Instant::now().saturating_duration_since(process_epoch()))
}

fn duration_to_ticks(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn ticks(&self) -> i64 {
        tick_now()
    }
}

/// A clock that only moves when told to.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vellum_core::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_millis(5000));
/// assert_eq!(clock.now() - start, Duration::from_millis(5000));
/// assert_eq!(clock.ticks(), 5000);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    epoch: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Total time advanced so far.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.epoch + *self.offset.lock()
    }

    fn ticks(&self) -> i64 {
        duration_to_ticks(*self.offset.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_now_is_monotonic() {
        let a = tick_now();
        let b = tick_now();
        assert!(b >= a);
        assert!(a >= 0);
    }

    #[test]
    fn test_manual_clock_only_moves_on_advance() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);
        assert_eq!(clock.ticks(), 0);

        clock.advance(Duration::from_millis(250));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - t0, Duration::from_millis(500));
        assert_eq!(clock.ticks(), 500);
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
    }

    #[test]
    fn test_system_clock_ticks_track_tick_now() {
        let clock = SystemClock;
        let before = tick_now();
        let ticks = clock.ticks();
        assert!(ticks >= before);
    }
}
