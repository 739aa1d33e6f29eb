//! OTLP trace exporter.
//!
//! Converts batches of completed spans into OTLP protobuf requests and sends
//! them to a collector over gRPC or HTTP.
//!
//! # Architecture
//!
//! - `core`: span model, resource, header parsing, configuration, errors
//! - `export`: the [`TraceExporter`] and the span mapper
//! - `client`: protocol-specific export clients
//! - `transport`: network calls with cancellation and timeouts
//! - `cli`: the `otlp-send` command
//!
//! # Example
//!
//! ```no_run
//! use otlp_exporter::core::{ConfigBuilder, Protocol};
//! use otlp_exporter::TraceExporter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigBuilder::new()
//!         .endpoint("http://localhost:4318")
//!         .protocol(Protocol::HttpProtobuf)
//!         .headers("api-key=secret")
//!         .build()?;
//!     let exporter = TraceExporter::new(config)?;
//!     let result = exporter.export(&[]).await;
//!     assert!(result.is_success());
//!     exporter.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod client;
pub mod core;
pub mod export;
pub mod transport;

// Re-export core types for convenience
pub use crate::core::{ExporterConfig, ExporterError, Result};
pub use crate::export::{ExportResult, ExporterState, TraceExporter};
