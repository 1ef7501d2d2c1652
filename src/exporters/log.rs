use crate::batch::Exporter;
use crate::error::ExportError;
use crate::snapshot::MetricsSnapshot;

/// Writes each batch to the `tracing` pipeline, one `info` event per counter.
///
/// Events are emitted under the `contatori_stats::exporters` target, so a
/// subscriber filter can route or silence them independently.
///
/// # Examples
///
/// ```rust
/// use contatori_stats::batch::Exporter;
/// use contatori_stats::exporters::LogExporter;
/// use contatori_stats::snapshot::MetricsSnapshot;
///
/// let exporter = LogExporter::new().skip_empty(true);
/// exporter.export(&MetricsSnapshot::now(vec![])).unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogExporter {
    skip_empty: bool,
}

impl LogExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips counters that saw no observation during the batch.
    pub fn skip_empty(mut self, enabled: bool) -> Self {
        self.skip_empty = enabled;
        self
    }

    fn is_skipped(&self, hits: u64) -> bool {
        self.skip_empty && hits == 0
    }
}

impl Exporter for LogExporter {
    fn export(&self, batch: &MetricsSnapshot) -> Result<(), ExportError> {
        let mut emitted = 0usize;
        for counter in &batch.counters {
            let stats = &counter.statistics;
            if self.is_skipped(stats.hits) {
                continue;
            }
            tracing::info!(
                target: "contatori_stats::exporters",
                key = %counter.key,
                hits = stats.hits,
                sum = stats.sum,
                min = stats.min,
                max = stats.max,
                mean = stats.mean,
                stddev = stats.standard_deviation,
                concurrency = stats.concurrency,
                max_concurrency = stats.max_concurrency,
                "counter"
            );
            emitted += 1;
        }
        tracing::debug!(
            target: "contatori_stats::exporters",
            timestamp_ms = batch.timestamp_ms,
            emitted,
            total = batch.len(),
            "batch logged"
        );
        Ok(())
    }
}
