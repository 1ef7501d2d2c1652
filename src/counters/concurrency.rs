//! In-flight operation gauge.
//!
//! [`ConcurrencyGauge`] tracks how many measured operations are currently
//! running and the highest value ever reached. It is independent from the
//! statistical moments of a counter: updating it never takes the
//! accumulator lock, and resetting a counter leaves it untouched.

use crossbeam_utils::CachePadded;
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

/// Current and peak number of operations in flight.
///
/// # Examples
///
/// ```rust
/// use contatori_stats::counters::ConcurrencyGauge;
///
/// let gauge = ConcurrencyGauge::new();
/// gauge.start();
/// gauge.start();
/// gauge.stop();
///
/// assert_eq!(gauge.current(), 1);
/// assert_eq!(gauge.max(), 2);
/// ```
pub struct ConcurrencyGauge {
    current: CachePadded<AtomicI64>,
    max: CachePadded<AtomicI64>,
}

impl ConcurrencyGauge {
    pub const fn new() -> Self {
        ConcurrencyGauge {
            current: CachePadded::new(AtomicI64::new(0)),
            max: CachePadded::new(AtomicI64::new(0)),
        }
    }

    /// Marks the beginning of an operation, returning the new in-flight count.
    #[inline]
    pub fn start(&self) -> i64 {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.max.fetch_max(current, Ordering::Relaxed);
        current
    }

    /// Marks the end of an operation, returning the new in-flight count.
    #[inline]
    pub fn stop(&self) -> i64 {
        self.current.fetch_sub(1, Ordering::Relaxed) - 1
    }

    /// Overwrites the in-flight count, e.g. with a value reported by a remote node.
    ///
    /// The peak still only ever grows.
    pub fn set(&self, value: i64) {
        self.current.store(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Highest in-flight count observed so far.
    #[inline]
    pub fn max(&self) -> i64 {
        self.max.load(Ordering::Relaxed)
    }
}

impl Default for ConcurrencyGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ConcurrencyGauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ current={}, max={} }}", self.current(), self.max())
    }
}
