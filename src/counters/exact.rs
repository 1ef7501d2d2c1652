//! Exact accumulator with sharded storage.
//!
//! This module provides [`Exact`], which keeps one [`OnlineStatistics`] per
//! thread slot and merges them when read. Writers from different threads lock
//! different slots; readers and resets take an accumulator-wide write lock so
//! they always see (or clear) a state that contains whole observations only.

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, RwLock};
use std::fmt::Debug;

use crate::counters::{NUM_COMPONENTS, THREAD_SLOT_INDEX};
use crate::statistics::OnlineStatistics;

/// Exact streaming statistics over the whole history of a counter.
///
/// # Locking
///
/// * `add` takes the shared side of the accumulator lock and the mutex of the
///   calling thread's slot.
/// * `statistics`, `reset`, `take` and `replace` take the exclusive side,
///   so no `add` is half-applied while they run and none is lost.
///
/// # Examples
///
/// ```rust
/// use contatori_stats::counters::exact::Exact;
///
/// let exact = Exact::new();
/// exact.add(2.0);
/// exact.add(4.0);
/// exact.add(6.0);
///
/// let stats = exact.statistics();
/// assert_eq!(stats.n(), 3);
/// assert_eq!(stats.mean(), 4.0);
/// assert_eq!(stats.variance(), 4.0);
/// ```
pub struct Exact {
    state: RwLock<()>,
    components: Box<[CachePadded<Mutex<OnlineStatistics>>]>,
}

impl Exact {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Exact {
            state: RwLock::new(()),
            components: (0..NUM_COMPONENTS)
                .map(|_| CachePadded::new(Mutex::new(OnlineStatistics::new())))
                .collect(),
        }
    }

    /// Returns the current thread's shard.
    #[inline]
    fn local_component(&self) -> &Mutex<OnlineStatistics> {
        THREAD_SLOT_INDEX.with(|idx| &*self.components[*idx])
    }

    /// Records one observation.
    #[inline]
    pub fn add(&self, value: f64) {
        let _state = self.state.read();
        self.local_component().lock().add_value(value);
    }

    fn merge_components(&self) -> OnlineStatistics {
        self.components
            .iter()
            .fold(OnlineStatistics::new(), |acc, c| acc.merged(&c.lock()))
    }

    /// Merges all shards into a single summary.
    pub fn statistics(&self) -> OnlineStatistics {
        let _state = self.state.write();
        self.merge_components()
    }

    /// Empties every shard.
    pub fn reset(&self) {
        let _state = self.state.write();
        for component in self.components.iter() {
            component.lock().reset();
        }
    }

    /// Returns the merged summary and empties every shard in one step.
    pub fn take(&self) -> OnlineStatistics {
        let _state = self.state.write();
        let mut total = OnlineStatistics::new();
        for component in self.components.iter() {
            let mut stats = component.lock();
            total.merge(&stats);
            stats.reset();
        }
        total
    }

    /// Replaces the whole history with `stats`.
    pub fn replace(&self, stats: &OnlineStatistics) {
        let _state = self.state.write();
        for component in self.components.iter() {
            component.lock().reset();
        }
        *self.components[0].lock() = *stats;
    }
}

impl Default for Exact {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Exact {
    /// Formats the accumulator showing non-empty shards.
    ///
    /// Output format: `{ [slot]:n=X,mean=Y ... }`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, component) in self.components.iter().enumerate() {
            let stats = component.lock();
            if !stats.is_empty() {
                write!(f, " [{i}]:n={},mean={}", stats.n(), stats.mean())?;
            }
        }
        write!(f, " }}")
    }
}
