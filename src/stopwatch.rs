//! Scoped measurement of one operation.
//!
//! A [`StopWatch`] is obtained from
//! [`CounterRegistry::start`](crate::registry::CounterRegistry::start). It
//! increments the concurrency gauge of its counter when created and releases
//! it exactly once: on [`stop`](StopWatch::stop), on
//! [`cancel`](StopWatch::cancel), or when dropped. Dropping a running watch
//! counts as a completed measurement, so early returns and `?` still record
//! the elapsed time.
//!
//! # Examples
//!
//! ```rust
//! use contatori_stats::key::Key;
//! use contatori_stats::registry::CounterRegistry;
//!
//! let registry = CounterRegistry::new();
//! let key = Key::performance("db.query");
//!
//! {
//!     let _watch = registry.start(&key);
//!     // ... measured work ...
//! }
//!
//! let counter = registry.get(&key).unwrap();
//! assert_eq!(counter.statistics().n(), 1);
//! assert_eq!(counter.concurrency(), 0);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::counters::{Counter, Observable};
use crate::key::{Unit, UnitFamily};

/// Handle on a running measurement; see the [module documentation](self).
#[must_use = "dropping a StopWatch immediately records a near-zero duration"]
#[derive(Debug)]
pub struct StopWatch {
    counter: Arc<Counter>,
    started: Instant,
    running: bool,
}

impl StopWatch {
    pub(crate) fn start(counter: Arc<Counter>) -> Self {
        counter.start_concurrent();
        StopWatch {
            counter,
            started: Instant::now(),
            running: true,
        }
    }

    /// Time elapsed since the watch was started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn counter(&self) -> &Arc<Counter> {
        &self.counter
    }

    /// Ends the measurement and records the elapsed time in the unit of the
    /// counter's role.
    pub fn stop(mut self) -> Duration {
        self.finish()
    }

    /// Ends the measurement without recording it.
    pub fn cancel(mut self) {
        self.running = false;
        self.counter.cancel_concurrent();
    }

    fn finish(&mut self) -> Duration {
        let elapsed = self.elapsed();
        self.running = false;
        self.counter.stop_concurrent();
        self.counter.add(to_role_unit(elapsed, self.counter.key().role().unit()));
        elapsed
    }
}

/// Expresses `elapsed` in `unit`, or in nanoseconds when `unit` is not a time unit.
fn to_role_unit(elapsed: Duration, unit: Unit) -> f64 {
    let nanos = elapsed.as_nanos() as f64;
    match unit.family() {
        UnitFamily::Time => unit.convert(nanos, Unit::Nanoseconds).unwrap_or(nanos),
        UnitFamily::Binary | UnitFamily::Unary => nanos,
    }
}

impl Drop for StopWatch {
    fn drop(&mut self) {
        if self.running {
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterPolicy;
    use crate::key::{Key, Role};
    use std::thread;

    fn counter(unit: Unit) -> Arc<Counter> {
        Arc::new(Counter::new(
            Key::new(Role::new("timed", unit), "op"),
            &CounterPolicy::Exact,
        ))
    }

    #[test]
    fn test_stop_records_elapsed() {
        let counter = counter(Unit::Nanoseconds);
        let watch = StopWatch::start(Arc::clone(&counter));
        assert_eq!(counter.concurrency(), 1);
        thread::sleep(Duration::from_millis(5));
        let elapsed = watch.stop();

        assert!(elapsed >= Duration::from_millis(5));
        assert_eq!(counter.concurrency(), 0);
        assert_eq!(counter.max_concurrency(), 1);
        let view = counter.view();
        assert_eq!(view.hits, 1);
        assert_eq!(view.sum, elapsed.as_nanos() as f64);
    }

    #[test]
    fn test_stop_converts_to_role_unit() {
        let counter = counter(Unit::Milliseconds);
        let watch = StopWatch::start(Arc::clone(&counter));
        thread::sleep(Duration::from_millis(5));
        let elapsed = watch.stop();
        let recorded = counter.view().sum;
        assert!((recorded - elapsed.as_secs_f64() * 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_cancel_records_nothing() {
        let counter = counter(Unit::Nanoseconds);
        let watch = StopWatch::start(Arc::clone(&counter));
        watch.cancel();
        assert_eq!(counter.concurrency(), 0);
        assert_eq!(counter.cancellations(), 1);
        assert_eq!(counter.view().hits, 0);
    }

    #[test]
    fn test_drop_records_once() {
        let counter = counter(Unit::Nanoseconds);
        {
            let _watch = StopWatch::start(Arc::clone(&counter));
        }
        assert_eq!(counter.concurrency(), 0);
        assert_eq!(counter.view().hits, 1);
    }

    #[test]
    fn test_nested_watches_track_peak() {
        let counter = counter(Unit::Nanoseconds);
        let outer = StopWatch::start(Arc::clone(&counter));
        let inner = StopWatch::start(Arc::clone(&counter));
        assert_eq!(counter.concurrency(), 2);
        inner.stop();
        outer.stop();
        assert_eq!(counter.concurrency(), 0);
        assert_eq!(counter.max_concurrency(), 2);
        assert_eq!(counter.view().hits, 2);
    }

    #[test]
    fn test_non_time_unit_records_nanoseconds() {
        assert_eq!(to_role_unit(Duration::from_micros(3), Unit::Unary), 3000.0);
        assert_eq!(to_role_unit(Duration::from_secs(2), Unit::Seconds), 2.0);
    }
}
