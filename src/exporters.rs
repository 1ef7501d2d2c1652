//! Ready-made [`Exporter`](crate::batch::Exporter) implementations.
//!
//! | Exporter | Feature | Output |
//! |----------|---------|--------|
//! | [`LogExporter`] | - | One `tracing` event per counter |
//! | [`json::JsonExporter`] | `json` | One JSON document per batch, written to any `io::Write` |
//!
//! Anything else can be plugged in as a closure; see [`crate::batch`].

mod log;

#[cfg(feature = "json")]
pub mod json;

pub use log::LogExporter;
