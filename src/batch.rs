//! Periodic export of the registry.
//!
//! [`BatchScheduler`] owns a background thread that, every `batch_period`,
//! collects the registry into a [`MetricsSnapshot`] and hands it to an
//! [`Exporter`]. With `clear_after_collect` the registry is drained instead
//! of merely read, so each batch only carries what happened since the last
//! one.
//!
//! ```text
//!   Idle ──► Scheduled ──(period elapsed)──► Running ──► Idle ──► ...
//!                │
//!                └──(stop)──► Stopped
//! ```
//!
//! Export is best effort. An exporter error or panic is logged and the
//! batch is dropped; the next tick runs as usual. A slow exporter delays the
//! following tick but never blocks threads recording observations.
//!
//! # Examples
//!
//! ```rust
//! use contatori_stats::batch::BatchScheduler;
//! use contatori_stats::error::ExportError;
//! use contatori_stats::key::Key;
//! use contatori_stats::registry::CounterRegistry;
//! use contatori_stats::settings::Settings;
//! use contatori_stats::snapshot::MetricsSnapshot;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let registry = Arc::new(CounterRegistry::new());
//! let exporter = Arc::new(|batch: &MetricsSnapshot| -> Result<(), ExportError> {
//!     println!("exporting {} counters", batch.len());
//!     Ok(())
//! });
//!
//! let settings = Settings::new().with_batch_period(Duration::from_millis(50));
//! let mut scheduler = BatchScheduler::start(Arc::clone(&registry), exporter, &settings).unwrap();
//!
//! registry.add_observation(&Key::performance("op"), 1.0);
//! scheduler.tick();
//! assert_eq!(scheduler.ticks(), 1);
//!
//! scheduler.stop();
//! ```

use parking_lot::{Condvar, Mutex};
use std::fmt::{self, Debug};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::ExportError;
use crate::registry::CounterRegistry;
use crate::settings::Settings;
use crate::snapshot::{CounterSnapshot, MetricsSnapshot};

/// Destination of the batches produced by a [`BatchScheduler`].
///
/// Any `Fn(&MetricsSnapshot) -> Result<(), ExportError>` closure is an exporter.
pub trait Exporter: Send + Sync {
    fn export(&self, batch: &MetricsSnapshot) -> Result<(), ExportError>;
}

impl<F> Exporter for F
where
    F: Fn(&MetricsSnapshot) -> Result<(), ExportError> + Send + Sync,
{
    fn export(&self, batch: &MetricsSnapshot) -> Result<(), ExportError> {
        self(batch)
    }
}

/// Lifecycle state of a [`BatchScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BatchState {
    /// Not waiting for the next tick yet.
    Idle = 0,
    /// Waiting for the period to elapse.
    Scheduled = 1,
    /// Collecting and exporting a batch.
    Running = 2,
    /// Shut down; no more ticks will run.
    Stopped = 3,
}

impl BatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BatchState::Idle,
            1 => BatchState::Scheduled,
            2 => BatchState::Running,
            _ => BatchState::Stopped,
        }
    }
}

struct Shared {
    registry: Arc<CounterRegistry>,
    exporter: Arc<dyn Exporter>,
    period: Duration,
    clear_after_collect: bool,
    state: AtomicU8,
    ticks: AtomicU64,
    failures: AtomicU64,
    shutdown: Mutex<bool>,
    wakeup: Condvar,
    // serializes ticks from the worker and from `tick()`
    running: Mutex<()>,
}

impl Shared {
    fn set_state(&self, state: BatchState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn collect(&self) -> MetricsSnapshot {
        let counters = if self.clear_after_collect {
            self.registry.drain()
        } else {
            self.registry.snapshot_all()
        };
        MetricsSnapshot::now(counters.into_iter().map(CounterSnapshot::from).collect())
    }

    /// Runs one batch, then leaves the scheduler in `after`, or in the state
    /// found before the batch when `after` is `None`.
    fn tick(&self, after: Option<BatchState>) {
        let _running = self.running.lock();
        let before = BatchState::from_u8(self.state.load(Ordering::Acquire));
        if before != BatchState::Stopped {
            self.set_state(BatchState::Running);
        }

        let batch = self.collect();
        let started = Instant::now();
        match panic::catch_unwind(AssertUnwindSafe(|| self.exporter.export(&batch))) {
            Ok(Ok(())) => {
                tracing::debug!(
                    counters = batch.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "exported batch"
                );
            }
            Ok(Err(err)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %err, counters = batch.len(), "batch export failed");
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(counters = batch.len(), "exporter panicked, batch dropped");
            }
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);

        if self.state.load(Ordering::Acquire) == BatchState::Running as u8 {
            self.set_state(after.unwrap_or(before));
        }
    }

    fn run(&self) {
        loop {
            self.set_state(BatchState::Scheduled);
            let deadline = Instant::now() + self.period;
            let mut shutdown = self.shutdown.lock();
            while !*shutdown {
                if self.wakeup.wait_until(&mut shutdown, deadline).timed_out() {
                    break;
                }
            }
            if *shutdown {
                break;
            }
            drop(shutdown);
            self.tick(Some(BatchState::Idle));
        }
        self.set_state(BatchState::Stopped);
    }
}

/// Background exporter of a [`CounterRegistry`]; see the [module documentation](self).
pub struct BatchScheduler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl BatchScheduler {
    /// Spawns the worker thread. The first batch is exported one period from now.
    ///
    /// A zero `batch_period` falls back to [`Settings::DEFAULT_BATCH_PERIOD`].
    pub fn start(
        registry: Arc<CounterRegistry>,
        exporter: Arc<dyn Exporter>,
        settings: &Settings,
    ) -> io::Result<Self> {
        let period = if settings.batch_period.is_zero() {
            tracing::warn!(
                default_ms = Settings::DEFAULT_BATCH_PERIOD.as_millis() as u64,
                "zero batch period, using the default"
            );
            Settings::DEFAULT_BATCH_PERIOD
        } else {
            settings.batch_period
        };
        let shared = Arc::new(Shared {
            registry,
            exporter,
            period,
            clear_after_collect: settings.clear_after_collect,
            state: AtomicU8::new(BatchState::Idle as u8),
            ticks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            shutdown: Mutex::new(false),
            wakeup: Condvar::new(),
            running: Mutex::new(()),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("contatori-batch".to_string())
            .spawn(move || worker.run())?;

        tracing::info!(
            period_ms = period.as_millis() as u64,
            clear_after_collect = settings.clear_after_collect,
            "batch scheduler started"
        );

        Ok(BatchScheduler {
            shared,
            handle: Some(handle),
        })
    }

    /// Collects and exports one batch on the calling thread.
    ///
    /// The worker's schedule is not affected.
    pub fn tick(&self) {
        self.shared.tick(None);
    }

    pub fn state(&self) -> BatchState {
        BatchState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Number of batches collected so far, successful or not.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Number of batches whose export failed.
    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// Stops the worker and waits for it, letting a running export finish.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        *self.shared.shutdown.lock() = true;
        self.shared.wakeup.notify_all();
        if handle.join().is_err() {
            tracing::error!("batch scheduler thread panicked");
        }
        self.shared.set_state(BatchState::Stopped);
        tracing::info!(ticks = self.ticks(), "batch scheduler stopped");
    }
}

impl Drop for BatchScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Debug for BatchScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("state", &self.state())
            .field("period", &self.shared.period)
            .field("ticks", &self.ticks())
            .field("failures", &self.failures())
            .finish()
    }
}
