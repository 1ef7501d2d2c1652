//! # Contatori Stats - Concurrent Counter Aggregation
//!
//! An in-memory engine that aggregates numeric observations into per-key
//! statistics (count, sum, min, max, mean, variance, standard deviation and
//! concurrency), shares counters across threads through a registry, and
//! periodically hands the accumulated batch to an exporter.
//!
//! ## The Problem
//!
//! Recording a latency or a payload size from many threads at once is easy to
//! get wrong: a single mutex around the statistics serializes every worker, and
//! lock-free tricks on floating point values drop updates. Long-running
//! processes also need a bounded memory footprint, a way to weigh recent
//! behavior more than old behavior, and a way to merge summaries coming from
//! several nodes without replaying the raw values.
//!
//! ## Design
//!
//! 1. **Per-Thread Sharding**: an exact counter keeps 64 cache-padded shards of
//!    [`OnlineStatistics`](statistics::OnlineStatistics). Each thread is pinned
//!    to a shard through a `thread_local!` slot index, so concurrent writers
//!    rarely touch the same lock or cache line.
//!
//! 2. **Mergeable Summaries**: the accumulator stores `(n, min, max, sum, mean, m2)`
//!    and merges with the pairwise formula, so shards, nodes and batches
//!    combine exactly as if every value had been added to one accumulator.
//!
//! 3. **Aggregation on Read**: shards are merged when statistics are read.
//!    Writes stay cheap; reads and resets briefly take the counter's write lock
//!    so they observe a consistent state.
//!
//! 4. **Forward Decay**: the optional exponential-decay policy keeps a bounded
//!    weighted reservoir that favors recent values, for long-lived latency
//!    distributions.
//!
//! ## Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`OnlineStatistics`](statistics::OnlineStatistics) | Single-writer mergeable accumulator |
//! | [`Counter`](counters::Counter) | Thread-safe counter with concurrency tracking |
//! | [`CounterRegistry`](registry::CounterRegistry) | Get-or-create map of counters, optionally bounded |
//! | [`StopWatch`](stopwatch::StopWatch) | Times an operation into a counter |
//! | [`BatchScheduler`](batch::BatchScheduler) | Periodic collection and export |
//! | [`CollectorStore`](collector::CollectorStore) | Merges summaries reported by remote nodes |
//!
//! ## Quick Start
//!
//! ```rust
//! use contatori_stats::key::Key;
//! use contatori_stats::registry::CounterRegistry;
//!
//! let registry = CounterRegistry::new();
//! let key = Key::performance("db.query");
//!
//! // Record from any thread.
//! registry.add_observation(&key, 12.0);
//! registry.add_observation(&key, 18.0);
//!
//! // Track in-flight operations.
//! registry.start_operation(&key);
//! registry.stop_operation(&key, false);
//!
//! let stats = registry.get(&key).unwrap().statistics();
//! assert_eq!(stats.n(), 2);
//! assert_eq!(stats.mean(), 15.0);
//! ```
//!
//! ## Thread Safety
//!
//! Every shared type is `Send + Sync`. Counters are handed out as
//! `Arc<Counter>` and a registry can be shared with `Arc<CounterRegistry>`.
//!
//! ## Memory Usage
//!
//! An exact counter holds 64 padded shards, a few kilobytes per key. A
//! bounded registry caps the number of keys; see
//! [`Settings::with_max_size`](settings::Settings::with_max_size).
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: lifecycle at `info`, evictions and
//! exports at `debug`, dropped batches at `error`. Install any subscriber to
//! see them.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | `Serialize`/`Deserialize` for keys, statistics, snapshots and settings |
//! | `json` | [`JsonExporter`](exporters::json::JsonExporter), implies `serde` |
//! | `full` | All of the above |

pub mod batch;
pub mod collector;
pub mod counters;
pub mod error;
pub mod exporters;
pub mod key;
pub mod registry;
pub mod settings;
pub mod snapshot;
pub mod statistics;
pub mod stopwatch;
