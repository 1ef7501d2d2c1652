//! Collector-side aggregation of statistics pushed by remote nodes.
//!
//! In a multi-node deployment every node runs its own
//! [`CounterRegistry`](crate::registry::CounterRegistry) and periodically
//! ships its snapshot to a collector. The collector keeps, for every key, one
//! leaf counter per reporting node (identified by a *marker*, usually the
//! host name) and an aggregate recomputed from all leaves.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`AggregatedCounter`] | Leaves of one key and their merged statistics |
//! | [`CollectorStore`] | Concurrent map of aggregated counters, ingestion entry point |
//!
//! # Example
//!
//! ```rust
//! use contatori_stats::collector::CollectorStore;
//! use contatori_stats::counters::Observable;
//! use contatori_stats::key::Key;
//! use contatori_stats::statistics::OnlineStatistics;
//!
//! let store = CollectorStore::new();
//! let key = Key::performance("checkout");
//!
//! let node_a = OnlineStatistics::from_parts(10, 1.0, 9.0, 50.0, 5.0, 20.0);
//! let node_b = OnlineStatistics::from_parts(20, 2.0, 14.0, 160.0, 8.0, 40.0);
//! store.ingest_remote(&key, "node-a", &node_a.view(), 1);
//! store.ingest_remote(&key, "node-b", &node_b.view(), 2);
//!
//! let view = store.get(&key).unwrap().view();
//! assert_eq!(view.hits, 30);
//! assert!((view.mean - 7.0).abs() < 1e-12);
//! assert_eq!(view.concurrency, 3);
//! ```
//!
//! A node that stops reporting keeps contributing its last known values to
//! the aggregate until its leaf is removed, so staleness stays visible.

mod aggregated;
mod store;

pub use aggregated::AggregatedCounter;
pub use store::CollectorStore;
