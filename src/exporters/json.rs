//! JSON exporter.
//!
//! [`JsonExporter`] serializes every batch as one JSON document and writes
//! it, newline terminated, to a sink. The default sink is standard output;
//! files, sockets and in-memory buffers work the same way.
//!
//! # Feature Flag
//!
//! ```toml
//! [dependencies]
//! contatori-stats = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use contatori_stats::exporters::json::JsonExporter;
//! use contatori_stats::key::Key;
//! use contatori_stats::snapshot::{CounterSnapshot, MetricsSnapshot};
//! use contatori_stats::statistics::OnlineStatistics;
//!
//! let stats: OnlineStatistics = [1.0, 3.0].into_iter().collect();
//! let batch = MetricsSnapshot::with_timestamp(
//!     vec![CounterSnapshot::new(Key::performance("requests"), stats.view())],
//!     1_700_000_000_000,
//! );
//!
//! let json = JsonExporter::to_json(&batch, false).unwrap();
//! assert!(json.contains("\"hits\":2"));
//! ```

use parking_lot::Mutex;
use std::fmt::{self, Debug};
use std::io::{self, Write};

use crate::batch::Exporter;
use crate::error::ExportError;
use crate::snapshot::MetricsSnapshot;

/// Configuration for the JSON exporter.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
}

/// Serializes batches to JSON and writes them to a sink.
pub struct JsonExporter {
    config: JsonConfig,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl JsonExporter {
    /// Creates an exporter writing to standard output.
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            config: JsonConfig::default(),
            sink: Mutex::new(Box::new(writer)),
        }
    }

    pub fn with_config(mut self, config: JsonConfig) -> Self {
        self.config = config;
        self
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Serializes a batch to a JSON string.
    ///
    /// Statistics that are undefined for the batch (e.g. the mean of an empty
    /// counter) are written as `null`.
    pub fn to_json(batch: &MetricsSnapshot, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(batch)
        } else {
            serde_json::to_string(batch)
        }
    }
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter for JsonExporter {
    fn export(&self, batch: &MetricsSnapshot) -> Result<(), ExportError> {
        let json = Self::to_json(batch, self.config.pretty)?;
        let mut sink = self.sink.lock();
        sink.write_all(json.as_bytes())?;
        sink.write_all(b"\n")?;
        sink.flush()?;
        Ok(())
    }
}

impl Debug for JsonExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonExporter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
