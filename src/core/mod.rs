//! Core domain types for the exporter.
//!
//! Spans as delivered by the batching layer, the process resource, header
//! parsing and configuration all live here. Nothing in this module performs
//! network I/O.

pub mod config;
pub mod error;
pub mod headers;
pub mod resource;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigBuilder, ExporterConfig, LogLevel, LoggingConfig, Protocol};
pub use error::{ExporterError, Result};
pub use headers::{parse_headers, Headers};
pub use resource::{Resource, ResourceConfig};
pub use types::{InstrumentationScope, Span, SpanBuilder, SpanEvent, SpanLink};
