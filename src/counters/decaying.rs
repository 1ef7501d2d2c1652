//! Bounded-memory accumulator using forward-decaying reservoir sampling.
//!
//! [`ExponentialDecay`] keeps at most `sampling_size` observations. Each
//! incoming value receives the priority
//!
//! ```text
//! priority = exp(alpha * (now - landmark)) / u,    u uniform in (0, 1]
//! ```
//!
//! and the sample retains the values with the highest priorities, so recent
//! values are exponentially more likely to be kept than old ones. Priorities
//! are stored as their logarithm, `alpha * (now - landmark) - ln(u)`, and
//! grow with time; every `refresh` interval the landmark moves to the present
//! and the same offset is subtracted from every stored priority. Working in
//! log space keeps them finite after arbitrarily long idle gaps without
//! changing their order. Equal priorities are told apart by arrival order.
//!
//! Statistics are recomputed from the current sample. They are an
//! approximation biased toward recent behavior and are **not**
//! interchangeable with the [`Exact`](super::exact::Exact) accumulator: the
//! hit count, in particular, never exceeds the sampling size.
//!
//! # Locking
//!
//! The sample lives behind the accumulator's own `RwLock`. Insertion and
//! rescaling take the write side and complete in `O(log n)` without retries;
//! reading takes the read side.

use parking_lot::RwLock;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::statistics::OnlineStatistics;

/// Parameters of the [`ExponentialDecay`] accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecaySettings {
    /// Decay factor per second; higher values favor recent observations more.
    pub alpha: f64,
    /// Maximum number of retained observations.
    pub sampling_size: usize,
    /// Interval between two rescaling of the priorities.
    pub refresh: Duration,
}

impl DecaySettings {
    pub const DEFAULT_ALPHA: f64 = 0.015;
    pub const DEFAULT_SAMPLING_SIZE: usize = 1028;
    pub const DEFAULT_REFRESH: Duration = Duration::from_secs(3600);
}

impl Default for DecaySettings {
    fn default() -> Self {
        DecaySettings {
            alpha: Self::DEFAULT_ALPHA,
            sampling_size: Self::DEFAULT_SAMPLING_SIZE,
            refresh: Self::DEFAULT_REFRESH,
        }
    }
}

/// Totally ordered sampling priority: log weight, then arrival order.
#[derive(Debug, Clone, Copy)]
struct Priority {
    log_weight: f64,
    seq: u64,
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.log_weight
            .total_cmp(&other.log_weight)
            .then(self.seq.cmp(&other.seq))
    }
}

struct Reservoir {
    values: BTreeMap<Priority, f64>,
    landmark: Instant,
    next_rescale: Instant,
    observed: u64,
}

impl Reservoir {
    fn new(now: Instant, refresh: Duration) -> Self {
        Reservoir {
            values: BTreeMap::new(),
            landmark: now,
            next_rescale: now + refresh,
            observed: 0,
        }
    }

    fn insert(&mut self, log_weight: f64, value: f64, sampling_size: usize) {
        let priority = Priority {
            log_weight,
            seq: self.observed,
        };
        self.observed += 1;
        if self.values.len() < sampling_size {
            self.values.insert(priority, value);
            return;
        }
        let lowest = match self.values.first_key_value() {
            Some((lowest, _)) => *lowest,
            None => return,
        };
        if lowest < priority {
            self.values.insert(priority, value);
            self.values.pop_first();
        }
    }

    fn rescale(&mut self, now: Instant, alpha: f64, refresh: Duration) {
        let elapsed = now.saturating_duration_since(self.landmark).as_secs_f64();
        let offset = alpha * elapsed;
        self.values = std::mem::take(&mut self.values)
            .into_iter()
            .map(|(priority, value)| {
                let log_weight = priority.log_weight - offset;
                (Priority { log_weight, ..priority }, value)
            })
            .collect();
        self.landmark = now;
        self.next_rescale = now + refresh;
    }
}

/// Approximate statistics over a decaying, bounded sample of observations.
///
/// # Examples
///
/// ```rust
/// use contatori_stats::counters::decaying::{DecaySettings, ExponentialDecay};
///
/// let decay = ExponentialDecay::new(DecaySettings {
///     sampling_size: 2,
///     ..DecaySettings::default()
/// });
///
/// for i in 0..1000 {
///     decay.add(i as f64);
/// }
///
/// assert_eq!(decay.observed(), 1000);
/// assert_eq!(decay.statistics().n(), 2);
/// ```
pub struct ExponentialDecay {
    settings: DecaySettings,
    reservoir: RwLock<Reservoir>,
}

impl ExponentialDecay {
    pub fn new(settings: DecaySettings) -> Self {
        ExponentialDecay {
            reservoir: RwLock::new(Reservoir::new(Instant::now(), settings.refresh)),
            settings,
        }
    }

    pub fn settings(&self) -> &DecaySettings {
        &self.settings
    }

    /// Records one observation at the current time.
    pub fn add(&self, value: f64) {
        self.add_at(value, Instant::now());
    }

    pub(crate) fn add_at(&self, value: f64, now: Instant) {
        // gen() yields [0, 1); flip it so the divisor is never zero
        let u = 1.0 - rand::thread_rng().gen::<f64>();
        let mut reservoir = self.reservoir.write();
        if now >= reservoir.next_rescale {
            reservoir.rescale(now, self.settings.alpha, self.settings.refresh);
        }
        let elapsed = now
            .saturating_duration_since(reservoir.landmark)
            .as_secs_f64();
        let log_weight = self.settings.alpha * elapsed - u.ln();
        reservoir.insert(log_weight, value, self.settings.sampling_size);
    }

    /// Statistics of the values currently in the sample.
    pub fn statistics(&self) -> OnlineStatistics {
        self.reservoir.read().values.values().copied().collect()
    }

    /// Number of values currently retained.
    pub fn len(&self) -> usize {
        self.reservoir.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of observations offered since creation or the last reset.
    pub fn observed(&self) -> u64 {
        self.reservoir.read().observed
    }

    /// Drops the sample and restarts the decay from now.
    pub fn reset(&self) {
        *self.reservoir.write() = Reservoir::new(Instant::now(), self.settings.refresh);
    }

    /// Returns the statistics of the sample and drops it in one step.
    pub fn take(&self) -> OnlineStatistics {
        let mut reservoir = self.reservoir.write();
        let stats = reservoir.values.values().copied().collect();
        *reservoir = Reservoir::new(Instant::now(), self.settings.refresh);
        stats
    }

    #[cfg(test)]
    fn priorities(&self) -> Vec<f64> {
        self.reservoir.read().values.keys().map(|p| p.log_weight).collect()
    }
}

impl Debug for ExponentialDecay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reservoir = self.reservoir.read();
        write!(
            f,
            "{{ sampled={}/{}, observed={} }}",
            reservoir.values.len(),
            self.settings.sampling_size,
            reservoir.observed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn with_size(sampling_size: usize) -> ExponentialDecay {
        ExponentialDecay::new(DecaySettings {
            sampling_size,
            ..DecaySettings::default()
        })
    }

    #[test]
    fn test_default_settings() {
        let settings = DecaySettings::default();
        assert_eq!(settings.alpha, 0.015);
        assert_eq!(settings.sampling_size, 1028);
        assert_eq!(settings.refresh, Duration::from_secs(3600));
    }

    #[test]
    fn test_below_sampling_size_keeps_everything() {
        let decay = with_size(100);
        decay.add(2.0);
        decay.add(4.0);
        decay.add(6.0);
        let stats = decay.statistics();
        assert_eq!(stats.n(), 3);
        assert_eq!(stats.sum(), 12.0);
        assert_eq!(stats.mean(), 4.0);
    }

    #[test]
    fn test_sample_is_bounded() {
        let decay = with_size(2);
        for i in 0..1000 {
            decay.add(i as f64);
        }
        assert_eq!(decay.len(), 2);
        assert_eq!(decay.statistics().n(), 2);
        assert_eq!(decay.observed(), 1000);
    }

    #[test]
    fn test_sampled_values_come_from_input() {
        let decay = with_size(10);
        for i in 0..500 {
            decay.add(i as f64);
        }
        let stats = decay.statistics();
        assert!(stats.min() >= 0.0);
        assert!(stats.max() <= 499.0);
    }

    #[test]
    fn test_recent_values_are_favored() {
        let decay = ExponentialDecay::new(DecaySettings {
            alpha: 1.0,
            sampling_size: 10,
            refresh: Duration::from_secs(3600),
        });
        let start = Instant::now();
        for i in 0..10 {
            decay.add_at(0.0, start + Duration::from_millis(i));
        }
        // 60 seconds later the weight is e^60 times larger than any random
        // divisor can compensate for
        for i in 0..10 {
            decay.add_at(1.0, start + Duration::from_secs(60) + Duration::from_millis(i));
        }
        assert_eq!(decay.statistics().sum(), 10.0);
    }

    #[test]
    fn test_rescale_keeps_priorities_finite() {
        let decay = ExponentialDecay::new(DecaySettings {
            alpha: 10.0,
            sampling_size: 4,
            refresh: Duration::from_secs(10),
        });
        let start = Instant::now();
        for step in 0..200u64 {
            decay.add_at(step as f64, start + Duration::from_secs(step * 5));
        }
        assert!(decay.priorities().iter().all(|p| p.is_finite()));
        assert_eq!(decay.len(), 4);
    }

    #[test]
    fn test_long_idle_gap_keeps_sample() {
        let decay = with_size(1028);
        let start = Instant::now();
        for i in 0..100 {
            decay.add_at(i as f64, start + Duration::from_millis(i));
        }
        // exp(-0.015 * 14h) is below the smallest positive f64
        decay.add_at(100.0, start + Duration::from_secs(14 * 3600));

        assert_eq!(decay.len(), 101);
        assert_eq!(decay.statistics().n(), 101);
        assert_eq!(decay.statistics().sum(), 5050.0);
        assert!(decay.priorities().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_equal_priorities_are_all_kept() {
        let mut reservoir = Reservoir::new(Instant::now(), Duration::from_secs(3600));
        for i in 0..5 {
            reservoir.insert(0.0, i as f64, 10);
        }
        assert_eq!(reservoir.values.len(), 5);
    }

    #[test]
    fn test_reset() {
        let decay = with_size(5);
        decay.add(1.0);
        decay.reset();
        assert!(decay.is_empty());
        assert_eq!(decay.observed(), 0);
        decay.add(5.0);
        assert_eq!(decay.statistics().mean(), 5.0);
    }

    #[test]
    fn test_take() {
        let decay = with_size(5);
        decay.add(1.0);
        decay.add(3.0);
        let taken = decay.take();
        assert_eq!(taken.n(), 2);
        assert_eq!(taken.mean(), 2.0);
        assert!(decay.is_empty());
    }

    #[test]
    fn test_debug() {
        let decay = with_size(3);
        decay.add(1.0);
        assert_eq!(format!("{:?}", decay), "{ sampled=1/3, observed=1 }");
    }

    #[test]
    fn test_multiple_threads() {
        let decay = Arc::new(with_size(64));
        let mut handles = vec![];

        for t in 0..8 {
            let decay_clone = Arc::clone(&decay);
            handles.push(thread::spawn(move || {
                for j in 0..1000 {
                    decay_clone.add((t * 1000 + j) as f64);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(decay.observed(), 8000);
        assert_eq!(decay.len(), 64);
    }
}
