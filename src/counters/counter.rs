//! The [`Counter`] aggregation unit.

use atomic_time::AtomicOptionInstant;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::counters::concurrency::ConcurrencyGauge;
use crate::counters::decaying::{DecaySettings, ExponentialDecay};
use crate::counters::exact::Exact;
use crate::counters::Observable;
use crate::key::Key;
use crate::statistics::{OnlineStatistics, StatisticsView};

/// Selects the accumulator used by newly created counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CounterPolicy {
    /// Exact statistics over the whole history.
    #[default]
    Exact,
    /// Approximate statistics over a bounded, decaying sample.
    ExponentialDecay(DecaySettings),
}

/// Storage of the observations of a [`Counter`].
#[derive(Debug)]
pub(crate) enum Accumulator {
    Exact(Exact),
    ExponentialDecay(ExponentialDecay),
}

impl Accumulator {
    fn new(policy: &CounterPolicy) -> Self {
        match policy {
            CounterPolicy::Exact => Accumulator::Exact(Exact::new()),
            CounterPolicy::ExponentialDecay(settings) => {
                Accumulator::ExponentialDecay(ExponentialDecay::new(*settings))
            }
        }
    }

    #[inline]
    fn add(&self, value: f64) {
        match self {
            Accumulator::Exact(exact) => exact.add(value),
            Accumulator::ExponentialDecay(decay) => decay.add(value),
        }
    }

    fn statistics(&self) -> OnlineStatistics {
        match self {
            Accumulator::Exact(exact) => exact.statistics(),
            Accumulator::ExponentialDecay(decay) => decay.statistics(),
        }
    }

    fn reset(&self) {
        match self {
            Accumulator::Exact(exact) => exact.reset(),
            Accumulator::ExponentialDecay(decay) => decay.reset(),
        }
    }

    fn take(&self) -> OnlineStatistics {
        match self {
            Accumulator::Exact(exact) => exact.take(),
            Accumulator::ExponentialDecay(decay) => decay.take(),
        }
    }
}

/// One aggregation unit: statistics and a concurrency gauge under a [`Key`].
///
/// All methods take `&self` and are safe to call from any number of threads;
/// counters are normally shared as `Arc<Counter>` handed out by a
/// [`CounterRegistry`](crate::registry::CounterRegistry).
///
/// # Examples
///
/// ```rust
/// use contatori_stats::counters::{Counter, CounterPolicy, Observable};
/// use contatori_stats::key::Key;
///
/// let counter = Counter::new(Key::performance("checkout"), &CounterPolicy::Exact);
/// counter.add(2.0);
/// counter.add(4.0);
/// counter.add(6.0);
///
/// let view = counter.view();
/// assert_eq!(view.hits, 3);
/// assert_eq!(view.sum, 12.0);
/// assert_eq!(view.mean, 4.0);
/// assert_eq!(view.variance, 4.0);
/// ```
pub struct Counter {
    key: Key,
    accumulator: Accumulator,
    gauge: ConcurrencyGauge,
    cancellations: AtomicU64,
    created: Instant,
    last_write: AtomicOptionInstant,
    evictable: bool,
}

impl Counter {
    /// Creates an evictable counter using the accumulator selected by `policy`.
    pub fn new(key: Key, policy: &CounterPolicy) -> Self {
        Counter {
            key,
            accumulator: Accumulator::new(policy),
            gauge: ConcurrencyGauge::new(),
            cancellations: AtomicU64::new(0),
            created: Instant::now(),
            last_write: AtomicOptionInstant::none(),
            evictable: true,
        }
    }

    /// Marks whether a bounded registry may evict this counter.
    pub fn with_evictable(self, evictable: bool) -> Self {
        Self { evictable, ..self }
    }

    /// Records one observation.
    ///
    /// Values are not validated; see [`statistics`](crate::statistics).
    #[inline]
    pub fn add(&self, delta: f64) {
        self.accumulator.add(delta);
        self.touch();
    }

    #[inline]
    fn touch(&self) {
        self.last_write.store(Some(Instant::now()), Ordering::Relaxed);
    }

    /// Resets the statistics. The concurrency gauge keeps reflecting live work.
    pub fn reset(&self) {
        self.accumulator.reset();
    }

    /// Marks the beginning of an operation on this counter.
    #[inline]
    pub fn start_concurrent(&self) -> i64 {
        self.gauge.start()
    }

    /// Marks the end of an operation on this counter.
    #[inline]
    pub fn stop_concurrent(&self) -> i64 {
        self.gauge.stop()
    }

    /// Marks the end of an operation that was abandoned before completion.
    pub fn cancel_concurrent(&self) -> i64 {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
        self.gauge.stop()
    }

    /// Installs an in-flight count reported from elsewhere.
    pub fn update_concurrency(&self, concurrency: i64) {
        self.gauge.set(concurrency);
        self.touch();
    }

    /// Replaces the whole history with a summary computed elsewhere.
    ///
    /// Only exact counters can adopt a summary; a decaying counter keeps its
    /// sample and logs the attempt.
    pub fn replace_statistics(&self, stats: &OnlineStatistics) {
        match &self.accumulator {
            Accumulator::Exact(exact) => exact.replace(stats),
            Accumulator::ExponentialDecay(_) => {
                tracing::warn!(key = %self.key, "cannot replace the sample of a decaying counter");
                return;
            }
        }
        self.touch();
    }

    pub fn concurrency(&self) -> i64 {
        self.gauge.current()
    }

    pub fn max_concurrency(&self) -> i64 {
        self.gauge.max()
    }

    /// Number of operations ended through [`cancel_concurrent`](Self::cancel_concurrent).
    pub fn cancellations(&self) -> u64 {
        self.cancellations.load(Ordering::Relaxed)
    }

    /// Instant of the last write, or the creation time if never written.
    pub fn last_write(&self) -> Instant {
        self.last_write
            .load(Ordering::Relaxed)
            .unwrap_or(self.created)
    }

    pub fn is_evictable(&self) -> bool {
        self.evictable
    }

    pub fn statistics(&self) -> OnlineStatistics {
        self.accumulator.statistics()
    }

    fn with_gauge(&self, stats: &OnlineStatistics) -> StatisticsView {
        stats
            .view()
            .with_concurrency(self.gauge.current(), self.gauge.max())
    }
}

impl Observable for Counter {
    fn key(&self) -> &Key {
        &self.key
    }

    fn view(&self) -> StatisticsView {
        self.with_gauge(&self.accumulator.statistics())
    }

    fn view_and_reset(&self) -> StatisticsView {
        self.with_gauge(&self.accumulator.take())
    }
}

impl Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Counter")
            .field("key", &self.key)
            .field("accumulator", &self.accumulator)
            .field("gauge", &self.gauge)
            .field("evictable", &self.evictable)
            .finish()
    }
}
