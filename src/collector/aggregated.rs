//! Cross-node aggregate of one key.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::counters::{Counter, CounterPolicy, Observable};
use crate::key::Key;
use crate::statistics::{OnlineStatistics, StatisticsView};

/// Statistics of one key merged across the nodes reporting it.
///
/// Each node is represented by an exact leaf [`Counter`] holding the last
/// summary it reported. The aggregate is recomputed from every leaf on each
/// update; leaves are few (one per node), so recomputing from scratch costs
/// little and the aggregate always equals the merge of the leaves.
///
/// # Example
///
/// ```rust
/// use contatori_stats::collector::AggregatedCounter;
/// use contatori_stats::counters::Observable;
/// use contatori_stats::key::Key;
/// use contatori_stats::statistics::OnlineStatistics;
///
/// let counter = AggregatedCounter::new(Key::performance("op"));
/// counter.update("a", &OnlineStatistics::from_parts(10, 0.0, 10.0, 50.0, 5.0, 0.0).view(), 0);
/// counter.update("b", &OnlineStatistics::from_parts(20, 0.0, 16.0, 160.0, 8.0, 0.0).view(), 0);
///
/// assert_eq!(counter.view().hits, 30);
/// assert_eq!(counter.markers().len(), 2);
/// ```
pub struct AggregatedCounter {
    key: Key,
    leaves: RwLock<HashMap<String, Arc<Counter>>>,
    aggregate: RwLock<StatisticsView>,
    max_concurrency: AtomicI64,
}

impl AggregatedCounter {
    pub fn new(key: Key) -> Self {
        AggregatedCounter {
            key,
            leaves: RwLock::new(HashMap::new()),
            aggregate: RwLock::new(StatisticsView::empty()),
            max_concurrency: AtomicI64::new(0),
        }
    }

    /// Installs the point-in-time `stats` reported by `marker` and recomputes
    /// the aggregate.
    pub fn update(&self, marker: &str, stats: &StatisticsView, concurrency: i64) {
        let mut leaves = self.leaves.write();
        let leaf = leaves
            .entry(marker.to_string())
            .or_insert_with(|| Arc::new(Counter::new(self.key.clone(), &CounterPolicy::Exact)));
        leaf.replace_statistics(&stats.to_statistics());
        leaf.update_concurrency(concurrency);
        self.recompute(&leaves);
    }

    /// Drops the leaf of `marker`, e.g. after a node is decommissioned.
    pub fn remove_marker(&self, marker: &str) -> Option<Arc<Counter>> {
        let mut leaves = self.leaves.write();
        let removed = leaves.remove(marker);
        if removed.is_some() {
            self.recompute(&leaves);
        }
        removed
    }

    fn recompute(&self, leaves: &HashMap<String, Arc<Counter>>) {
        let mut merged = OnlineStatistics::new();
        let mut concurrency = 0;
        for leaf in leaves.values() {
            merged.merge(&leaf.statistics());
            concurrency += leaf.concurrency();
        }
        let max_concurrency = self
            .max_concurrency
            .fetch_max(concurrency, Ordering::Relaxed)
            .max(concurrency);
        *self.aggregate.write() = merged.view().with_concurrency(concurrency, max_concurrency);
    }

    /// Markers of the nodes that reported this key.
    pub fn markers(&self) -> Vec<String> {
        self.leaves.read().keys().cloned().collect()
    }

    /// Leaf counter holding the last summary reported by `marker`.
    pub fn leaf(&self, marker: &str) -> Option<Arc<Counter>> {
        self.leaves.read().get(marker).cloned()
    }

    /// Last summary reported by `marker`, with its in-flight count.
    pub fn leaf_view(&self, marker: &str) -> Option<StatisticsView> {
        self.leaf(marker).map(|leaf| leaf.view())
    }

    /// All leaves, paired with their marker.
    pub fn leaves(&self) -> Vec<(String, Arc<Counter>)> {
        self.leaves
            .read()
            .iter()
            .map(|(marker, leaf)| (marker.clone(), Arc::clone(leaf)))
            .collect()
    }

    /// Sum of the in-flight counts last reported by every node.
    pub fn concurrency(&self) -> i64 {
        self.aggregate.read().concurrency
    }
}

impl Observable for AggregatedCounter {
    fn key(&self) -> &Key {
        &self.key
    }

    fn view(&self) -> StatisticsView {
        *self.aggregate.read()
    }

    /// Returns the aggregate and forgets every leaf.
    fn view_and_reset(&self) -> StatisticsView {
        let mut leaves = self.leaves.write();
        let view = *self.aggregate.read();
        leaves.clear();
        self.recompute(&leaves);
        view
    }
}

impl Debug for AggregatedCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatedCounter")
            .field("key", &self.key)
            .field("markers", &self.markers())
            .field("aggregate", &*self.aggregate.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn summary(n: u64, mean: f64) -> StatisticsView {
        OnlineStatistics::from_parts(n, mean - 1.0, mean + 1.0, n as f64 * mean, mean, 0.0).view()
    }

    #[test]
    fn test_new_is_empty() {
        let counter = AggregatedCounter::new(Key::performance("op"));
        assert_eq!(counter.view().hits, 0);
        assert!(counter.markers().is_empty());
    }

    #[test]
    fn test_weighted_mean_across_leaves() {
        let counter = AggregatedCounter::new(Key::performance("op"));
        counter.update("node-1", &summary(10, 5.0), 0);
        counter.update("node-2", &summary(20, 8.0), 0);

        let view = counter.view();
        assert_eq!(view.hits, 30);
        assert!((view.mean - 7.0).abs() < 1e-12);
        assert_eq!(view.sum, 210.0);
        assert_eq!(view.min, 4.0);
        assert_eq!(view.max, 9.0);
    }

    #[test]
    fn test_update_replaces_leaf() {
        let counter = AggregatedCounter::new(Key::performance("op"));
        counter.update("node-1", &summary(10, 5.0), 0);
        counter.update("node-1", &summary(4, 2.0), 0);

        let view = counter.view();
        assert_eq!(view.hits, 4);
        assert_eq!(view.mean, 2.0);
        assert_eq!(counter.leaf("node-1").unwrap().statistics().n(), 4);
    }

    #[test]
    fn test_aggregate_equals_merge_of_leaves() {
        let counter = AggregatedCounter::new(Key::performance("op"));
        let a: OnlineStatistics = [1.0, 2.0, 3.0].into_iter().collect();
        let b: OnlineStatistics = [10.0, 20.0].into_iter().collect();
        counter.update("a", &a.view(), 0);
        counter.update("b", &b.view(), 0);

        let expected = a.merged(&b);
        let view = counter.view();
        assert_eq!(view.hits, expected.n());
        assert!((view.second_moment - expected.second_moment()).abs() < 1e-9);
        assert!((view.variance - expected.variance()).abs() < 1e-9);
    }

    #[test]
    fn test_stale_leaf_persists() {
        let counter = AggregatedCounter::new(Key::performance("op"));
        counter.update("down", &summary(10, 5.0), 0);
        counter.update("up", &summary(10, 5.0), 0);
        counter.update("up", &summary(10, 5.0), 0);
        assert_eq!(counter.view().hits, 20);
    }

    #[test]
    fn test_concurrency_summed() {
        let counter = AggregatedCounter::new(Key::performance("op"));
        counter.update("a", &summary(1, 1.0), 3);
        counter.update("b", &summary(1, 1.0), 4);
        assert_eq!(counter.concurrency(), 7);
        counter.update("a", &summary(1, 1.0), 0);
        let view = counter.view();
        assert_eq!(view.concurrency, 4);
        assert_eq!(view.max_concurrency, 7);
    }

    #[test]
    fn test_remove_marker() {
        let counter = AggregatedCounter::new(Key::performance("op"));
        counter.update("a", &summary(10, 5.0), 0);
        counter.update("b", &summary(20, 8.0), 0);
        assert!(counter.remove_marker("a").is_some());
        assert!(counter.remove_marker("a").is_none());
        assert_eq!(counter.view().hits, 20);
        assert_eq!(counter.markers(), vec!["b".to_string()]);
    }

    #[test]
    fn test_view_and_reset() {
        let counter = AggregatedCounter::new(Key::performance("op"));
        counter.update("a", &summary(10, 5.0), 0);
        assert_eq!(counter.view_and_reset().hits, 10);
        assert_eq!(counter.view().hits, 0);
        assert!(counter.leaves().is_empty());
    }

    #[test]
    fn test_concurrent_updates_from_many_nodes() {
        let counter = Arc::new(AggregatedCounter::new(Key::performance("op")));
        let mut handles = vec![];

        for node in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                let marker = format!("node-{node}");
                for n in 1..=100 {
                    counter.update(&marker, &summary(n, 2.0), 0);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let view = counter.view();
        assert_eq!(counter.markers().len(), 8);
        assert_eq!(view.hits, 800);
        assert!((view.mean - 2.0).abs() < 1e-12);
    }
}
