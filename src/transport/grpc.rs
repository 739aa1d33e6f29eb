//! Unary gRPC transport on a lazily connected tonic channel.

use super::{CallTracker, TransportHandler};
use crate::core::{ExporterError, Result};
use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::trace::v1::{
    trace_service_client::TraceServiceClient, ExportTraceServiceRequest,
    ExportTraceServiceResponse,
};
use parking_lot::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

pub struct GrpcTransport {
    /// `None` once disposed; dropping the last clone closes the channel.
    client: Mutex<Option<TraceServiceClient<Channel>>>,
    calls: CallTracker,
}

impl GrpcTransport {
    /// Creates a channel to `target` (`scheme://authority`).
    ///
    /// No connection is made until the first call. Fails with a config
    /// error outside a tokio runtime.
    pub fn connect_lazy(target: &str, timeout: Duration) -> Result<Self> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            ExporterError::config("gRPC exporter must be created inside a tokio runtime")
        })?;

        let mut endpoint = Endpoint::from_shared(target.to_string())
            .map_err(|e| ExporterError::config(format!("Invalid gRPC endpoint '{target}': {e}")))?
            .timeout(timeout)
            .connect_timeout(timeout);

        if target.starts_with("https://") {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_webpki_roots())
                .map_err(|e| ExporterError::config(format!("Invalid TLS configuration: {e}")))?;
        }

        Ok(Self::from_channel(endpoint.connect_lazy(), timeout))
    }

    /// Wraps an existing channel.
    pub fn from_channel(channel: Channel, timeout: Duration) -> Self {
        Self {
            client: Mutex::new(Some(TraceServiceClient::new(channel))),
            calls: CallTracker::new(timeout),
        }
    }
}

#[async_trait]
impl TransportHandler for GrpcTransport {
    type Request = tonic::Request<ExportTraceServiceRequest>;
    type Response = ExportTraceServiceResponse;

    async fn send(
        &self,
        request: tonic::Request<ExportTraceServiceRequest>,
        cancel: CancellationToken,
    ) -> Result<ExportTraceServiceResponse> {
        // Clones share the underlying channel.
        let mut client = self.client.lock().clone().ok_or(ExporterError::Disposed)?;
        let call = async move {
            let response = client.export(request).await?;
            Ok(response.into_inner())
        };

        self.calls.run(&cancel, call).await
    }

    fn cancel_pending(&self) {
        self.calls.cancel_pending();
    }

    async fn wait_idle(&self, timeout: Duration) -> bool {
        self.calls.wait_idle(timeout).await
    }

    fn dispose(&self) {
        self.calls.dispose();
        self.client.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_outside_runtime_is_config_error() {
        let err = GrpcTransport::connect_lazy("http://127.0.0.1:4317", Duration::from_secs(1))
            .err()
            .unwrap();
        assert_eq!(err.category(), "config");
    }

    #[tokio::test]
    async fn test_dispose_releases_channel() {
        let transport =
            GrpcTransport::connect_lazy("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        assert!(transport.client.lock().is_some());

        transport.dispose();
        assert!(transport.client.lock().is_none());

        let result = transport
            .send(
                tonic::Request::new(ExportTraceServiceRequest::default()),
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(ExporterError::Disposed)));
    }
}
