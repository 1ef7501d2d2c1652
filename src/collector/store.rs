//! Concurrent store of aggregated counters.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::collector::AggregatedCounter;
use crate::counters::Observable;
use crate::key::Key;
use crate::statistics::StatisticsView;

/// Map from [`Key`] to [`AggregatedCounter`], fed by remote nodes.
///
/// Lookup-or-create follows the same single-instance rule as the
/// [`CounterRegistry`](crate::registry::CounterRegistry): concurrent
/// ingestion of a new key ends up in one aggregated counter.
#[derive(Default)]
pub struct CollectorStore {
    counters: DashMap<Key, Arc<AggregatedCounter>>,
}

impl CollectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the aggregated counter for `key`, creating it on first use.
    pub fn get_or_create(&self, key: &Key) -> Arc<AggregatedCounter> {
        if let Some(counter) = self.get(key) {
            return counter;
        }
        let candidate = Arc::new(AggregatedCounter::new(key.clone()));
        match self.counters.entry(key.clone()) {
            Entry::Occupied(winner) => Arc::clone(winner.get()),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&candidate));
                candidate
            }
        }
    }

    /// Ingests the statistics a remote node reported for `key`.
    ///
    /// Decoding the node's payload is up to the caller; this never fails.
    pub fn ingest_remote(&self, key: &Key, marker: &str, stats: &StatisticsView, concurrency: i64) {
        self.get_or_create(key).update(marker, stats, concurrency);
    }

    pub fn get(&self, key: &Key) -> Option<Arc<AggregatedCounter>> {
        self.counters.get(key).map(|c| Arc::clone(c.value()))
    }

    pub fn all(&self) -> Vec<Arc<AggregatedCounter>> {
        self.counters
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Aggregated statistics of every key.
    pub fn snapshot_all(&self) -> Vec<(Key, StatisticsView)> {
        self.all()
            .into_iter()
            .map(|counter| (counter.key().clone(), counter.view()))
            .collect()
    }

    /// Every marker that reported at least one key, sorted.
    pub fn markers(&self) -> Vec<String> {
        self.all()
            .iter()
            .flat_map(|counter| counter.markers())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Drops `marker` from every aggregated counter.
    pub fn remove_marker(&self, marker: &str) {
        for counter in self.all() {
            counter.remove_marker(marker);
        }
    }

    pub fn clear(&self) {
        self.counters.clear();
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl Debug for CollectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorStore")
            .field("size", &self.counters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::OnlineStatistics;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_ingest_two_nodes() {
        let store = CollectorStore::new();
        let key = Key::performance("op");
        let a = OnlineStatistics::from_parts(10, 4.0, 6.0, 50.0, 5.0, 0.0);
        let b = OnlineStatistics::from_parts(20, 7.0, 9.0, 160.0, 8.0, 0.0);

        store.ingest_remote(&key, "a", &a.view(), 0);
        store.ingest_remote(&key, "b", &b.view(), 0);

        let view = store.get(&key).unwrap().view();
        assert_eq!(view.hits, 30);
        assert!((view.mean - 7.0).abs() < 1e-12);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_markers_across_keys() {
        let store = CollectorStore::new();
        let stats = OnlineStatistics::from_parts(1, 1.0, 1.0, 1.0, 1.0, 0.0).view();
        store.ingest_remote(&Key::performance("x"), "node-b", &stats, 0);
        store.ingest_remote(&Key::performance("y"), "node-a", &stats, 0);
        store.ingest_remote(&Key::performance("y"), "node-b", &stats, 0);
        assert_eq!(store.markers(), vec!["node-a".to_string(), "node-b".to_string()]);
    }

    #[test]
    fn test_remove_marker() {
        let store = CollectorStore::new();
        let stats = OnlineStatistics::from_parts(1, 1.0, 1.0, 1.0, 1.0, 0.0).view();
        let key = Key::performance("x");
        store.ingest_remote(&key, "gone", &stats, 0);
        store.ingest_remote(&key, "alive", &stats, 0);
        store.remove_marker("gone");
        assert_eq!(store.markers(), vec!["alive".to_string()]);
        assert_eq!(store.get(&key).unwrap().view().hits, 1);
    }

    #[test]
    fn test_snapshot_and_clear() {
        let store = CollectorStore::new();
        let stats = OnlineStatistics::from_parts(2, 1.0, 3.0, 4.0, 2.0, 2.0).view();
        store.ingest_remote(&Key::performance("x"), "n", &stats, 0);
        store.ingest_remote(&Key::performance("y"), "n", &stats, 0);
        assert_eq!(store.snapshot_all().len(), 2);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_single_instance_under_contention() {
        const THREADS: usize = 32;
        let store = Arc::new(CollectorStore::new());
        let barrier = Arc::new(Barrier::new(THREADS));
        let mut handles = vec![];

        for i in 0..THREADS {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                let stats = OnlineStatistics::from_parts(1, 1.0, 1.0, 1.0, 1.0, 0.0).view();
                store.ingest_remote(&Key::performance("shared"), &format!("n{i}"), &stats, 0);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1);
        let counter = store.get(&Key::performance("shared")).unwrap();
        assert_eq!(counter.markers().len(), THREADS);
        assert_eq!(counter.view().hits, THREADS as u64);
    }
}
