//! Trace export entry point.
//!
//! [`TraceExporter`] is what the batching layer talks to: it resolves the
//! process resource once, maps each batch with [`mapper`] and hands it to the
//! configured [`ExportClient`]. Every failure is reduced to an
//! [`ExportResult`]; only construction can return an error.

pub mod mapper;

use crate::client::{build_client, ExportClient};
use crate::core::{ExporterConfig, Headers, Resource, ResourceConfig, Result, Span};
use futures::FutureExt;
use once_cell::sync::OnceCell;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use mapper::map_batch;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one export call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportResult {
    /// The collector accepted the batch
    Success,
    /// The batch was not delivered; retrying may help
    Failure,
    /// The collector rejected the batch; retrying will not help
    FailedNotRetryable,
}

impl ExportResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExportResult::Success)
    }
}

impl fmt::Display for ExportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExportResult::Success => "success",
            ExportResult::Failure => "failure",
            ExportResult::FailedNotRetryable => "failed_not_retryable",
        };
        f.write_str(s)
    }
}

/// Lifecycle of an exporter.
///
/// `Exporting` is never stored; [`TraceExporter::state`] reports it while a
/// `Ready` exporter has a send in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExporterState {
    /// Constructed, resource not resolved yet
    Created = 0,
    /// Resource resolved, exports go out
    Ready = 1,
    /// At least one export is waiting on the collector
    Exporting = 2,
    /// Every later export fails without I/O
    ShutDown = 3,
}

impl ExporterState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExporterState::Created,
            1 => ExporterState::Ready,
            2 => ExporterState::Exporting,
            _ => ExporterState::ShutDown,
        }
    }
}

/// Counts one export as in flight for its lifetime.
struct ExportGuard<'a>(&'a AtomicUsize);

impl<'a> ExportGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct TraceExporter {
    client: Arc<dyn ExportClient>,
    resource_config: ResourceConfig,
    resource: OnceCell<Resource>,
    state: AtomicU8,
    in_flight: AtomicUsize,
    shutdown_timeout: Duration,
}

impl TraceExporter {
    /// Builds an exporter for the configured protocol.
    ///
    /// Fails only on invalid configuration. For gRPC, calling this outside a
    /// tokio runtime is a configuration error; the channel connects on first
    /// use.
    pub fn new(config: ExporterConfig) -> Result<Self> {
        config.validate()?;
        let headers = Headers::parse(config.headers.as_deref());
        let client = build_client(&config, headers)?;

        Ok(Self::with_client(client, config.resource).with_shutdown_timeout(config.shutdown_timeout))
    }

    /// Uses an already built client.
    pub fn with_client(client: Arc<dyn ExportClient>, resource: ResourceConfig) -> Self {
        Self {
            client,
            resource_config: resource,
            resource: OnceCell::new(),
            state: AtomicU8::new(ExporterState::Created as u8),
            in_flight: AtomicUsize::new(0),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn state(&self) -> ExporterState {
        match ExporterState::from_u8(self.state.load(Ordering::Acquire)) {
            ExporterState::Ready if self.in_flight.load(Ordering::Acquire) > 0 => ExporterState::Exporting,
            state => state,
        }
    }

    /// The process resource, resolved on first use.
    pub fn resource(&self) -> &Resource {
        let resource = self.resource.get_or_init(|| {
            let resource = Resource::from_config(&self.resource_config);
            tracing::debug!(service_name = %resource.service_name(), "Resolved exporter resource");
            resource
        });
        let _ = self.state.compare_exchange(
            ExporterState::Created as u8,
            ExporterState::Ready as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        resource
    }

    /// Exports one batch. Never panics and never returns an error.
    pub async fn export(&self, batch: &[Span]) -> ExportResult {
        if self.state() == ExporterState::ShutDown {
            tracing::debug!(spans = batch.len(), "Exporter is shut down, dropping batch");
            return ExportResult::Failure;
        }
        if batch.is_empty() {
            return ExportResult::Success;
        }

        match AssertUnwindSafe(self.export_batch(batch)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(spans = batch.len(), "Export panicked, batch dropped");
                ExportResult::Failure
            },
        }
    }

    async fn export_batch(&self, batch: &[Span]) -> ExportResult {
        let request = match mapper::map_batch(batch, self.resource()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, category = e.category(), "Failed to map span batch");
                return ExportResult::Failure;
            },
        };

        let sent = {
            let _guard = ExportGuard::enter(&self.in_flight);
            self.client.send_export_request(request).await
        };

        match sent {
            Ok(()) => {
                tracing::debug!(spans = batch.len(), protocol = %self.client.protocol(), "Exported span batch");
                ExportResult::Success
            },
            Err(e) if e.is_permanent_rejection() => {
                tracing::warn!(error = %e, spans = batch.len(), "Collector rejected span batch");
                ExportResult::FailedNotRetryable
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    category = e.category(),
                    retryable = e.is_retryable(),
                    spans = batch.len(),
                    "Failed to export span batch"
                );
                ExportResult::Failure
            },
        }
    }

    /// Cancels in-flight exports and releases the transport.
    ///
    /// Returns whether in-flight calls finished within the shutdown timeout.
    /// Later calls return `true` immediately.
    pub async fn shutdown(&self) -> bool {
        let previous = self.state.swap(ExporterState::ShutDown as u8, Ordering::AcqRel);
        if ExporterState::from_u8(previous) == ExporterState::ShutDown {
            return true;
        }

        let acknowledged = tokio::time::timeout(
            self.shutdown_timeout,
            self.client.cancel_export_request(self.shutdown_timeout),
        )
        .await
        .unwrap_or(false);
        self.client.dispose();

        if acknowledged {
            tracing::debug!("Exporter shut down");
        } else {
            tracing::warn!(
                timeout_ms = u64::try_from(self.shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
                "In-flight exports did not finish before shutdown timeout"
            );
        }
        acknowledged
    }
}

impl fmt::Debug for TraceExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceExporter")
            .field("protocol", &self.client.protocol())
            .field("state", &self.state())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
