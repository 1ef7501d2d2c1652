//! Concurrent registry of counters.
//!
//! [`CounterRegistry`] maps each [`Key`] to exactly one [`Counter`]. It is the
//! entry point of instrumented code (`add_observation`, `start_operation`,
//! `stop_operation`, [`start`](CounterRegistry::start)) and of the export
//! side (`snapshot_all`, `drain`, `clear`).
//!
//! The registry is an ordinary value: build it once at startup and share it
//! as `Arc<CounterRegistry>` with everything that records or exports.
//!
//! # Consistency
//!
//! * At most one counter exists per key. Concurrent creators race on an
//!   insert-if-absent; losers discard their instance and use the winner's.
//! * A registry-wide state lock is taken shared by every lookup-or-create
//!   and exclusively by `clear`/`drain`, so a counter created (or an
//!   observation recorded through the registry) while the registry is being
//!   cleared is never silently dropped.
//! * `clear`/`drain` keep counters that have operations in flight, resetting
//!   only their statistics, so a later `stop_operation` lands on the gauge
//!   that saw the matching start.
//! * `all` and `snapshot_all` are best-effort views: they may miss counters
//!   created or evicted while they run.
//!
//! # Bounded registries
//!
//! With a non-zero `max_size`, every creation that pushes the registry past
//! the bound triggers an eviction pass removing the `eviction_ratio` share of
//! evictable counters with the oldest last write. This is an approximate LRU
//! acting as a memory safety valve; evicting a counter whose observations
//! were never exported loses them, which is logged as a warning.
//!
//! # Examples
//!
//! ```rust
//! use contatori_stats::key::Key;
//! use contatori_stats::registry::CounterRegistry;
//!
//! let registry = CounterRegistry::new();
//! let key = Key::performance("checkout");
//!
//! registry.add_observation(&key, 2.0);
//! registry.add_observation(&key, 4.0);
//! registry.add_observation(&key, 6.0);
//!
//! let snapshot = registry.snapshot_all();
//! assert_eq!(snapshot.len(), 1);
//! assert_eq!(snapshot[0].1.mean, 4.0);
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::counters::{Counter, CounterPolicy, Observable};
use crate::key::{Key, Role};
use crate::settings::Settings;
use crate::statistics::StatisticsView;
use crate::stopwatch::StopWatch;

/// Hook notified when a counter leaves a bounded registry through eviction.
///
/// Used to deregister whatever was registered on the side for the key
/// (gauges, management beans, exporter state).
pub trait EvictionListener: Send + Sync {
    fn on_evicted(&self, key: &Key);
}

impl<F> EvictionListener for F
where
    F: Fn(&Key) + Send + Sync,
{
    fn on_evicted(&self, key: &Key) {
        self(key)
    }
}

/// Concurrent map from [`Key`] to [`Counter`]; see the [module documentation](self).
pub struct CounterRegistry {
    counters: DashMap<Key, Arc<Counter>>,
    state: RwLock<()>,
    policy: CounterPolicy,
    max_size: usize,
    eviction_ratio: f64,
    non_evictable_roles: Vec<Role>,
    evicting: AtomicBool,
    listeners: RwLock<Vec<Arc<dyn EvictionListener>>>,
}

impl CounterRegistry {
    /// Creates an unbounded registry of exact counters.
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    /// Creates a registry using the counter policy and bounds of `settings`.
    ///
    /// Settings failing [`Settings::validate`] are replaced by the defaults.
    pub fn with_settings(settings: &Settings) -> Self {
        let fallback;
        let settings = match settings.validate() {
            Ok(()) => settings,
            Err(err) => {
                tracing::warn!(error = %err, "invalid registry settings, using defaults");
                fallback = Settings::default();
                &fallback
            }
        };
        CounterRegistry {
            counters: DashMap::new(),
            state: RwLock::new(()),
            policy: settings.counter_policy(),
            max_size: settings.max_size,
            eviction_ratio: settings.eviction_ratio,
            non_evictable_roles: settings.non_evictable_roles.clone(),
            evicting: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Creates a registry bounded to `max_size` counters.
    pub fn bounded(max_size: usize, eviction_ratio: f64) -> Self {
        Self::with_settings(&Settings::default().with_max_size(max_size, eviction_ratio))
    }

    pub fn policy(&self) -> &CounterPolicy {
        &self.policy
    }

    /// Maximum number of counters, 0 when unbounded.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Registers a hook called for every evicted key.
    pub fn add_eviction_listener(&self, listener: Arc<dyn EvictionListener>) {
        self.listeners.write().push(listener);
    }

    fn new_counter(&self, key: &Key) -> Counter {
        let evictable = !self.non_evictable_roles.contains(key.role());
        Counter::new(key.clone(), &self.policy).with_evictable(evictable)
    }

    /// Lookup-or-create; the caller holds the shared state lock.
    fn get_or_create_locked(&self, key: &Key) -> Arc<Counter> {
        if let Some(counter) = self.counters.get(key).map(|c| Arc::clone(c.value())) {
            return counter;
        }
        let candidate = Arc::new(self.new_counter(key));
        match self.counters.entry(key.clone()) {
            Entry::Occupied(winner) => Arc::clone(winner.get()),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&candidate));
                candidate
            }
        }
    }

    fn with_counter<R>(&self, key: &Key, f: impl FnOnce(&Arc<Counter>) -> R) -> R {
        let result = {
            let _state = self.state.read();
            let counter = self.get_or_create_locked(key);
            f(&counter)
        };
        self.evict_if_needed();
        result
    }

    /// Returns the counter for `key`, creating it on first use.
    ///
    /// Every caller gets the same instance for the same key.
    pub fn get_or_create(&self, key: &Key) -> Arc<Counter> {
        self.with_counter(key, |counter| Arc::clone(counter))
    }

    /// Returns the counter for `key` if it exists.
    pub fn get(&self, key: &Key) -> Option<Arc<Counter>> {
        self.counters.get(key).map(|c| Arc::clone(c.value()))
    }

    /// Records one observation under `key`.
    pub fn add_observation(&self, key: &Key, delta: f64) {
        self.with_counter(key, |counter| counter.add(delta));
    }

    /// Marks the beginning of an operation under `key`.
    pub fn start_operation(&self, key: &Key) {
        self.with_counter(key, |counter| {
            counter.start_concurrent();
        });
    }

    /// Marks the end of an operation under `key`.
    ///
    /// Canceled operations are counted in [`Counter::cancellations`].
    pub fn stop_operation(&self, key: &Key, canceled: bool) {
        self.with_counter(key, |counter| {
            if canceled {
                counter.cancel_concurrent();
            } else {
                counter.stop_concurrent();
            }
        });
    }

    /// Starts a scoped measurement under `key`.
    pub fn start(&self, key: &Key) -> StopWatch {
        StopWatch::start(self.get_or_create(key))
    }

    /// Removes the counter for `key`, without notifying eviction listeners.
    pub fn remove(&self, key: &Key) -> Option<Arc<Counter>> {
        self.counters.remove(key).map(|(_, counter)| counter)
    }

    /// Current counters. May race with concurrent creation or eviction.
    pub fn all(&self) -> Vec<Arc<Counter>> {
        self.counters
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Point-in-time statistics of every counter.
    pub fn snapshot_all(&self) -> Vec<(Key, StatisticsView)> {
        self.all()
            .into_iter()
            .map(|counter| (counter.key().clone(), counter.view()))
            .collect()
    }

    /// Removes every counter.
    ///
    /// Counters with operations in flight are reset instead of removed, so
    /// their gauge keeps tracking the live work.
    pub fn clear(&self) {
        let _state = self.state.write();
        self.counters.retain(|_, counter| {
            if counter.concurrency() == 0 {
                return false;
            }
            counter.reset();
            true
        });
    }

    /// Snapshots and removes every counter in one step.
    ///
    /// Nothing recorded through the registry can fall between the snapshot
    /// and the removal. As with [`clear`](Self::clear), counters with
    /// operations in flight stay registered with their statistics reset.
    pub fn drain(&self) -> Vec<(Key, StatisticsView)> {
        let _state = self.state.write();
        let mut drained = Vec::with_capacity(self.counters.len());
        self.counters.retain(|key, counter| {
            if counter.concurrency() == 0 {
                drained.push((key.clone(), counter.view()));
                false
            } else {
                drained.push((key.clone(), counter.view_and_reset()));
                true
            }
        });
        drained
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn over_capacity(&self) -> bool {
        self.max_size > 0 && self.counters.len() > self.max_size
    }

    fn evict_if_needed(&self) {
        if !self.over_capacity() {
            return;
        }
        if self
            .evicting
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        while self.over_capacity() {
            let evicted = self.evict();
            for counter in evicted.iter().filter(|c| c.statistics().n() > 0) {
                tracing::warn!(
                    key = %counter.key(),
                    hits = counter.statistics().n(),
                    "evicted counter with observations, those since the last export are lost"
                );
            }
            if evicted.is_empty() {
                tracing::warn!(
                    size = self.counters.len(),
                    max_size = self.max_size,
                    "registry over capacity but no counter is evictable"
                );
                break;
            }
        }
        self.evicting.store(false, Ordering::Release);
    }

    /// Removes the `eviction_ratio` share of the evictable counters with the
    /// oldest last write, returning them.
    ///
    /// Non-evictable counters and counters with operations in flight are
    /// skipped. Eviction listeners are notified for every removed key.
    pub fn evict(&self) -> Vec<Arc<Counter>> {
        let size = self.counters.len();
        let target = ((size as f64) * self.eviction_ratio).ceil() as usize;

        let mut candidates: Vec<_> = self
            .counters
            .iter()
            .filter(|entry| entry.value().is_evictable() && entry.value().concurrency() == 0)
            .map(|entry| (entry.value().last_write(), entry.key().clone()))
            .collect();
        candidates.sort_by_key(|(last_write, _)| *last_write);

        let mut evicted = Vec::with_capacity(target.min(candidates.len()));
        for (last_write, key) in candidates.into_iter().take(target) {
            // A write since the scan makes the counter recent again.
            let removed = self
                .counters
                .remove_if(&key, |_, counter| counter.last_write() <= last_write);
            if let Some((key, counter)) = removed {
                for listener in self.listeners.read().iter() {
                    listener.on_evicted(&key);
                }
                evicted.push(counter);
            }
        }

        tracing::debug!(
            evicted = evicted.len(),
            remaining = self.counters.len(),
            "registry eviction pass"
        );
        evicted
    }
}

impl Default for CounterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for CounterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterRegistry")
            .field("size", &self.counters.len())
            .field("max_size", &self.max_size)
            .field("policy", &self.policy)
            .finish()
    }
}
