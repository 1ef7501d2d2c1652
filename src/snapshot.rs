//! Snapshot types handed to exporters.
//!
//! A [`MetricsSnapshot`] is the batch produced on each scheduler tick: a
//! timestamp and one [`CounterSnapshot`] per key. With the `serde` feature
//! both types are serializable, so exporters can ship them in any
//! serde-compatible format:
//!
//! ```toml
//! [dependencies]
//! contatori-stats = { version = "0.1", features = ["serde"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use contatori_stats::counters::{Counter, CounterPolicy, Observable};
//! use contatori_stats::key::Key;
//! use contatori_stats::snapshot::MetricsSnapshot;
//!
//! let requests = Counter::new(Key::performance("requests"), &CounterPolicy::Exact);
//! requests.add(42.0);
//!
//! let counters: Vec<&dyn Observable> = vec![&requests];
//! let snapshot = MetricsSnapshot::collect(counters.into_iter());
//!
//! assert_eq!(snapshot.get(&Key::performance("requests")).unwrap().statistics.sum, 42.0);
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::counters::Observable;
use crate::key::Key;
use crate::statistics::StatisticsView;

/// Statistics of a single counter at a point in time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CounterSnapshot {
    pub key: Key,
    pub statistics: StatisticsView,
}

impl CounterSnapshot {
    pub fn new(key: Key, statistics: StatisticsView) -> Self {
        Self { key, statistics }
    }

    /// Creates a snapshot from an observable counter.
    pub fn from_observable(counter: &dyn Observable) -> Self {
        Self::new(counter.key().clone(), counter.view())
    }

    /// Creates a snapshot from an observable counter and resets it.
    pub fn from_observable_and_reset(counter: &dyn Observable) -> Self {
        Self::new(counter.key().clone(), counter.view_and_reset())
    }
}

impl From<(Key, StatisticsView)> for CounterSnapshot {
    fn from((key, statistics): (Key, StatisticsView)) -> Self {
        Self::new(key, statistics)
    }
}

/// A batch of counter snapshots.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricsSnapshot {
    /// Optional timestamp in milliseconds since Unix epoch.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub timestamp_ms: Option<u64>,
    pub counters: Vec<CounterSnapshot>,
}

impl MetricsSnapshot {
    pub fn new(counters: Vec<CounterSnapshot>) -> Self {
        Self {
            timestamp_ms: None,
            counters,
        }
    }

    pub fn with_timestamp(counters: Vec<CounterSnapshot>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            counters,
        }
    }

    /// Builds a batch stamped with the current wall-clock time.
    pub fn now(counters: Vec<CounterSnapshot>) -> Self {
        Self::with_timestamp(counters, current_time_ms())
    }

    /// Finds a counter by key.
    pub fn get(&self, key: &Key) -> Option<&CounterSnapshot> {
        self.counters.iter().find(|c| &c.key == key)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Collects snapshots from an iterator of observable counters.
    pub fn collect<'a>(counters: impl Iterator<Item = &'a dyn Observable>) -> Self {
        Self::new(counters.map(CounterSnapshot::from_observable).collect())
    }

    /// Collects snapshots from an iterator of observable counters and resets them.
    pub fn collect_and_reset<'a>(counters: impl Iterator<Item = &'a dyn Observable>) -> Self {
        Self::new(
            counters
                .map(CounterSnapshot::from_observable_and_reset)
                .collect(),
        )
    }
}

/// Milliseconds since Unix epoch; 0 if the clock is before the epoch.
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::{Counter, CounterPolicy};

    fn counter(name: &str) -> Counter {
        Counter::new(Key::performance(name), &CounterPolicy::Exact)
    }

    #[test]
    fn test_counter_snapshot_from_observable() {
        let counter = counter("requests");
        counter.add(100.0);

        let snapshot = CounterSnapshot::from_observable(&counter);
        assert_eq!(snapshot.key, Key::performance("requests"));
        assert_eq!(snapshot.statistics.sum, 100.0);
        assert_eq!(counter.view().hits, 1);
    }

    #[test]
    fn test_counter_snapshot_from_observable_and_reset() {
        let counter = counter("resettable");
        counter.add(75.0);

        let snapshot = CounterSnapshot::from_observable_and_reset(&counter);
        assert_eq!(snapshot.statistics.sum, 75.0);
        assert_eq!(counter.view().hits, 0);
    }

    #[test]
    fn test_metrics_snapshot_with_timestamp() {
        let snapshot = MetricsSnapshot::with_timestamp(vec![], 1234567890);
        assert_eq!(snapshot.timestamp_ms, Some(1234567890));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_metrics_snapshot_now() {
        let before = current_time_ms();
        let snapshot = MetricsSnapshot::now(vec![]);
        assert!(snapshot.timestamp_ms.unwrap() >= before);
    }

    #[test]
    fn test_metrics_snapshot_get() {
        let snapshot = MetricsSnapshot::new(vec![
            (Key::performance("foo"), StatisticsView::empty()).into(),
            (Key::performance("bar"), StatisticsView::empty()).into(),
        ]);

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get(&Key::performance("foo")).is_some());
        assert!(snapshot.get(&Key::performance("baz")).is_none());
    }

    #[test]
    fn test_metrics_snapshot_collect() {
        let c1 = counter("c1");
        let c2 = counter("c2");
        c1.add(10.0);
        c2.add(20.0);

        let counters: Vec<&dyn Observable> = vec![&c1, &c2];
        let snapshot = MetricsSnapshot::collect(counters.into_iter());

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&Key::performance("c1")).unwrap().statistics.sum, 10.0);
        assert_eq!(snapshot.get(&Key::performance("c2")).unwrap().statistics.sum, 20.0);
    }

    #[test]
    fn test_metrics_snapshot_collect_and_reset() {
        let c1 = counter("c1");
        c1.add(10.0);
        let counters: Vec<&dyn Observable> = vec![&c1];
        let snapshot = MetricsSnapshot::collect_and_reset(counters.into_iter());
        assert_eq!(snapshot.counters[0].statistics.hits, 1);
        assert_eq!(c1.view().hits, 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_metrics_snapshot() {
        let c1 = counter("c1");
        c1.add(2.0);
        c1.add(4.0);
        let snapshot = MetricsSnapshot::with_timestamp(vec![CounterSnapshot::from_observable(&c1)], 1234567890);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"timestamp_ms\":1234567890"));
        assert!(json.contains("\"performances\""));
        assert!(json.contains("\"hits\":2"));
        assert!(json.contains("\"mean\":3.0"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_round_trip_with_undefined_statistics() {
        let single = counter("single");
        single.add(3.0);
        let idle = counter("idle");
        let counters: Vec<&dyn Observable> = vec![&single, &idle];
        let snapshot = MetricsSnapshot::collect(counters.into_iter());

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"variance\":null"));
        let decoded: MetricsSnapshot = serde_json::from_str(&json).unwrap();

        let single = decoded.get(&Key::performance("single")).unwrap();
        assert_eq!(single.statistics.hits, 1);
        assert_eq!(single.statistics.mean, 3.0);
        assert!(single.statistics.variance.is_nan());

        let idle = decoded.get(&Key::performance("idle")).unwrap();
        assert_eq!(idle.statistics.hits, 0);
        assert!(idle.statistics.mean.is_nan());
        assert!(idle.statistics.to_statistics().is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_skips_missing_timestamp() {
        let snapshot = MetricsSnapshot::new(vec![]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"counters":[]}"#);
    }
}
