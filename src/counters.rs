//! Counters: per-key aggregation units and the sharding they rely on.
//!
//! A [`Counter`] is identified by a [`Key`](crate::key::Key) and owns one
//! accumulator of observations plus a [`ConcurrencyGauge`]. Two accumulators
//! are available, selected with a [`CounterPolicy`]:
//!
//! | Accumulator | Memory | Statistics |
//! |-------------|--------|------------|
//! | [`Exact`](exact::Exact) | ~4KB per counter | exact over the whole history |
//! | [`ExponentialDecay`](decaying::ExponentialDecay) | bounded by the sampling size | approximate, biased toward recent values |
//!
//! # Sharding
//!
//! The exact accumulator keeps one Welford summary per slot and merges them
//! on read, so concurrent writers rarely touch the same lock:
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │           Exact accumulator         │
//!                          ├─────────────────────────────────────┤
//!   Thread 0 ──writes──►   │ [Slot 0] Mutex<OnlineStatistics>    │
//!   Thread 1 ──writes──►   │ [Slot 1] Mutex<OnlineStatistics>    │
//!        ...               │    ...                              │
//!   Thread 63 ─writes──►   │ [Slot 63] Mutex<OnlineStatistics>   │
//!                          └─────────────────────────────────────┘
//!                                          │
//!                                          ▼
//!                                 view() merges all slots
//! ```
//!
//! Slots are assigned round-robin: the first thread gets slot 0, the second
//! slot 1, and so on. After 64 threads assignment wraps around and threads
//! share a slot, which only adds contention.

pub mod concurrency;
pub mod decaying;
pub mod exact;

mod counter;

pub use concurrency::ConcurrencyGauge;
pub use counter::{Counter, CounterPolicy};

use crate::key::Key;
use crate::statistics::StatisticsView;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of shards (slots) used by each exact accumulator.
///
/// Each slot is cache-line padded, so an exact counter uses about
/// `64 slots × 64 bytes = 4,096 bytes`.
pub(crate) const NUM_COMPONENTS: usize = 64;

/// Global counter for assigning slot IDs to threads.
static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Slot index of the current thread, assigned lazily on first use.
    pub(crate) static THREAD_SLOT_INDEX: usize = get_next_slot_id();
}

/// Assigns the next available slot ID to a thread, in `[0, NUM_COMPONENTS)`.
///
/// `Ordering::Relaxed` is enough: two threads occasionally landing on the
/// same slot only increases contention.
pub fn get_next_slot_id() -> usize {
    NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed) % NUM_COMPONENTS
}

/// Anything that can hand out point-in-time statistics under a key.
///
/// Implemented by [`Counter`] and by the collector-side
/// [`AggregatedCounter`](crate::collector::AggregatedCounter), so snapshots
/// and exporters can treat both alike.
pub trait Observable: Debug + Send + Sync {
    /// Returns the key of this counter.
    fn key(&self) -> &Key;

    /// Returns an immutable copy of the current statistics.
    fn view(&self) -> StatisticsView;

    /// Returns the current statistics and resets them in one step.
    ///
    /// Observations racing with this call land either in the returned view
    /// or in the next one, never in neither.
    fn view_and_reset(&self) -> StatisticsView;
}
