//! Priority inputs for throttled loads.
//!
//! Every load submitted to the [`LoadThrottler`](crate::LoadThrottler) carries a
//! throttle basis. The throttler re-reads it on every scan of the pending list,
//! so a basis that changes while its load is waiting (a texture requested again,
//! or promoted from prefetch to an explicit request) is honoured immediately.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering as AtomicOrdering};

use vellum_core::time::tick_now;

/// Read access to the priority inputs of one load request.
pub trait ThrottleBasisProvider: Send + Sync {
    /// Whether the request is speculative and may be abandoned.
    fn is_opportunistic(&self) -> bool;

    /// Tick of the first request.
    fn first_requested_tick(&self) -> i64;

    /// Tick of the most recent request. Never smaller than the first tick.
    fn latest_requested_tick(&self) -> i64;
}

/// A fixed throttle basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleBasis {
    /// Whether the request is speculative.
    pub is_opportunistic: bool,
    /// Tick of the first request.
    pub first_requested_tick: i64,
    /// Tick of the most recent request.
    pub latest_requested_tick: i64,
}

impl ThrottleBasis {
    /// Create a basis from its three fields.
    ///
    /// `latest_requested_tick` is raised to `first_requested_tick` if smaller.
    pub fn new(is_opportunistic: bool, first_requested_tick: i64, latest_requested_tick: i64) -> Self {
        Self {
            is_opportunistic,
            first_requested_tick,
            latest_requested_tick: latest_requested_tick.max(first_requested_tick),
        }
    }

    /// An explicit request made at `tick`.
    pub fn eager(tick: i64) -> Self {
        Self::new(false, tick, tick)
    }

    /// A speculative request made at `tick`.
    pub fn opportunistic(tick: i64) -> Self {
        Self::new(true, tick, tick)
    }

    /// An explicit request made now.
    pub fn eager_now() -> Self {
        Self::eager(tick_now())
    }

    /// A speculative request made now.
    pub fn opportunistic_now() -> Self {
        Self::opportunistic(tick_now())
    }
}

impl ThrottleBasisProvider for ThrottleBasis {
    fn is_opportunistic(&self) -> bool {
        self.is_opportunistic
    }

    fn first_requested_tick(&self) -> i64 {
        self.first_requested_tick
    }

    fn latest_requested_tick(&self) -> i64 {
        self.latest_requested_tick
    }
}

/// A throttle basis that can be updated while its load is pending.
///
/// Starts opportunistic; an eager request promotes it permanently.
#[derive(Debug)]
pub struct SharedBasis {
    opportunistic: AtomicBool,
    first_requested_tick: AtomicI64,
    latest_requested_tick: AtomicI64,
}

impl SharedBasis {
    /// Create a basis for a first request made at `tick`.
    pub fn new(eager: bool, tick: i64) -> Self {
        Self {
            opportunistic: AtomicBool::new(!eager),
            first_requested_tick: AtomicI64::new(tick),
            latest_requested_tick: AtomicI64::new(tick),
        }
    }

    /// Record another request made at `tick`.
    pub fn request(&self, eager: bool, tick: i64) {
        if eager {
            self.opportunistic.store(false, AtomicOrdering::Relaxed);
        }
        self.latest_requested_tick
            .fetch_max(tick, AtomicOrdering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> ThrottleBasis {
        ThrottleBasis::new(
            self.is_opportunistic(),
            self.first_requested_tick(),
            self.latest_requested_tick(),
        )
    }
}

impl ThrottleBasisProvider for SharedBasis {
    fn is_opportunistic(&self) -> bool {
        self.opportunistic.load(AtomicOrdering::Relaxed)
    }

    fn first_requested_tick(&self) -> i64 {
        self.first_requested_tick.load(AtomicOrdering::Relaxed)
    }

    fn latest_requested_tick(&self) -> i64 {
        self.latest_requested_tick.load(AtomicOrdering::Relaxed)
    }
}

/// Order two requests by service priority.
///
/// Returns [`Ordering::Less`] when `a` should be serviced before `b`:
/// - eager requests precede opportunistic ones;
/// - among opportunistic requests the most recently re-requested wins;
/// - among eager requests the oldest wins.
pub fn compare_priority(a: &dyn ThrottleBasisProvider, b: &dyn ThrottleBasisProvider) -> Ordering {
    let a_opportunistic = a.is_opportunistic();
    let b_opportunistic = b.is_opportunistic();

    if a_opportunistic != b_opportunistic {
        return if a_opportunistic {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }

    if a_opportunistic {
        b.latest_requested_tick().cmp(&a.latest_requested_tick())
    } else {
        a.first_requested_tick().cmp(&b.first_requested_tick())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eager_precedes_opportunistic() {
        let eager = ThrottleBasis::eager(1_000);
        let opportunistic = ThrottleBasis::opportunistic(1);
        assert_eq!(compare_priority(&eager, &opportunistic), Ordering::Less);
        assert_eq!(compare_priority(&opportunistic, &eager), Ordering::Greater);
    }

    #[test]
    fn test_eager_oldest_first() {
        let old = ThrottleBasis::new(false, 5, 50);
        let new = ThrottleBasis::new(false, 10, 10);
        assert_eq!(compare_priority(&old, &new), Ordering::Less);
    }

    #[test]
    fn test_opportunistic_latest_first() {
        let recent = ThrottleBasis::new(true, 1, 100);
        let stale = ThrottleBasis::new(true, 0, 20);
        assert_eq!(compare_priority(&recent, &stale), Ordering::Less);
        assert_eq!(compare_priority(&stale, &recent), Ordering::Greater);
    }

    #[test]
    fn test_equal_ticks_compare_equal() {
        let a = ThrottleBasis::eager(7);
        let b = ThrottleBasis::eager(7);
        assert_eq!(compare_priority(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_new_keeps_latest_not_below_first() {
        let basis = ThrottleBasis::new(true, 10, 3);
        assert_eq!(basis.latest_requested_tick, 10);
    }

    #[test]
    fn test_shared_basis_latest_tick_only_grows() {
        let prefetch = SharedBasis::new(false, 5);
        prefetch.request(false, 40);
        prefetch.request(false, 30);
        assert_eq!(prefetch.latest_requested_tick(), 40);
        assert_eq!(prefetch.first_requested_tick(), 5);
    }

    #[test]
    fn test_shared_basis_eager_from_start() {
        let basis = SharedBasis::new(true, 10);
        assert!(!basis.is_opportunistic());
        assert_eq!(basis.snapshot(), ThrottleBasis::eager(10));
    }

    #[test]
    fn test_shared_basis_eager_request_promotes() {
        let basis = SharedBasis::new(false, 1);
        assert!(basis.is_opportunistic());
        basis.request(true, 2);
        assert!(!basis.is_opportunistic());
        basis.request(false, 3);
        assert!(!basis.is_opportunistic());
        assert_eq!(basis.snapshot(), ThrottleBasis::new(false, 1, 3));
    }
}
