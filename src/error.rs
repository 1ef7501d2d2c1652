//! Error types.
//!
//! Nothing on the observation path returns an error: recording, gauges and
//! remote ingestion are infallible. Errors only come out of configuration
//! ([`SettingsError`]) and exporters ([`ExportError`]), and the latter are
//! contained by the [`BatchScheduler`](crate::batch::BatchScheduler).

use thiserror::Error;

/// Invalid or unparsable configuration.
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    /// A property value could not be parsed.
    #[error("cannot parse `{key}` = `{value}`: {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },

    /// A value parsed fine but is outside its allowed range.
    #[error("invalid `{key}`: {reason}")]
    Invalid { key: &'static str, reason: &'static str },
}

/// Failure of an exporter while shipping a batch.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Error writing to the exporter's sink.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Error serializing the batch.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Exporter-defined failure, e.g. the collector refused the batch.
    #[error("export rejected: {0}")]
    Rejected(String),
}

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;
