//! Protocol-specific export clients.
//!
//! A client turns an [`ExportTraceServiceRequest`] into a transport envelope,
//! sends it and decides whether the collector accepted it.

pub mod grpc;
pub mod http;

use crate::core::{ExporterConfig, ExporterError, Headers, Protocol, Result};
use crate::transport::{GrpcTransport, HttpTransport};
use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Uri;

pub use grpc::GrpcExportClient;
pub use http::HttpExportClient;

/// Path appended to HTTP endpoints.
pub const TRACES_PATH: &str = "/v1/traces";

/// Sends encoded batches to a collector.
#[async_trait]
pub trait ExportClient: Send + Sync {
    /// Sends one request. `Ok` only for HTTP 2xx or gRPC OK; never retries.
    async fn send_export_request(&self, request: ExportTraceServiceRequest) -> Result<()>;

    /// Cancels in-flight requests and waits up to `timeout` for them to finish.
    async fn cancel_export_request(&self, timeout: Duration) -> bool;

    /// Releases the transport. Later sends fail with [`ExporterError::Disposed`].
    fn dispose(&self);

    fn protocol(&self) -> Protocol;
}

/// Full request URI for an HTTP endpoint.
///
/// A path already ending in `/v1/traces` (ignoring ASCII case and trailing
/// slashes) is kept verbatim; otherwise the suffix is appended.
pub fn resolve_http_endpoint(endpoint: &Uri) -> String {
    let path = endpoint.path();
    if has_traces_suffix(path) {
        return endpoint.to_string();
    }

    let scheme = endpoint.scheme_str().unwrap_or("http");
    let authority = endpoint.authority().map(|a| a.as_str()).unwrap_or_default();
    let mut uri = format!("{scheme}://{authority}{}{TRACES_PATH}", path.trim_end_matches('/'));
    if let Some(query) = endpoint.query() {
        uri.push('?');
        uri.push_str(query);
    }
    uri
}

fn has_traces_suffix(path: &str) -> bool {
    let path = path.trim_end_matches('/').as_bytes();
    path.len() >= TRACES_PATH.len()
        && path[path.len() - TRACES_PATH.len()..].eq_ignore_ascii_case(TRACES_PATH.as_bytes())
}

/// `scheme://authority` the gRPC channel connects to; the path is ignored.
pub fn resolve_grpc_target(endpoint: &Uri) -> Result<String> {
    let authority = endpoint
        .authority()
        .ok_or_else(|| ExporterError::config(format!("Endpoint '{endpoint}' has no host")))?;
    let scheme = endpoint.scheme_str().unwrap_or("http");
    Ok(format!("{scheme}://{authority}"))
}

/// Builds the client for the configured protocol.
pub fn build_client(config: &ExporterConfig, headers: Headers) -> Result<Arc<dyn ExportClient>> {
    let endpoint = config.endpoint_uri()?;

    let client: Arc<dyn ExportClient> = match config.protocol {
        Protocol::HttpProtobuf => {
            let uri = resolve_http_endpoint(&endpoint);
            let transport = HttpTransport::new(config.timeout)?;
            Arc::new(HttpExportClient::with_transport(uri, &headers, transport))
        },
        Protocol::Grpc => {
            let target = resolve_grpc_target(&endpoint)?;
            let transport = GrpcTransport::connect_lazy(&target, config.timeout)?;
            Arc::new(GrpcExportClient::with_transport(&headers, config.timeout, transport))
        },
    };

    tracing::debug!(
        protocol = %config.protocol,
        endpoint = %endpoint,
        headers = %headers,
        "Created OTLP export client"
    );
    Ok(client)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Transport double shared by the client tests.

    use crate::core::{ExporterError, Result};
    use crate::transport::TransportHandler;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Records requests and answers each with the next queued response.
    pub struct RecordingTransport<Req, Resp> {
        pub requests: Mutex<Vec<Req>>,
        responses: Mutex<Vec<Result<Resp>>>,
        pub cancels: AtomicUsize,
        pub disposed: AtomicUsize,
    }

    impl<Req, Resp> RecordingTransport<Req, Resp> {
        pub fn new(responses: Vec<Result<Resp>>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into_iter().rev().collect()),
                cancels: AtomicUsize::new(0),
                disposed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl<Req, Resp> TransportHandler for RecordingTransport<Req, Resp>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        type Request = Req;
        type Response = Resp;

        async fn send(&self, request: Req, _cancel: CancellationToken) -> Result<Resp> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop()
                .unwrap_or_else(|| Err(ExporterError::network("no response queued")))
        }

        fn cancel_pending(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }

        async fn wait_idle(&self, _timeout: Duration) -> bool {
            true
        }

        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
