//! OTLP/gRPC client.

use super::ExportClient;
use crate::core::{Headers, Protocol, Result};
use crate::transport::TransportHandler;
use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};

pub struct GrpcExportClient<T = crate::transport::GrpcTransport> {
    metadata: MetadataMap,
    timeout: Duration,
    transport: T,
}

impl<T> GrpcExportClient<T>
where
    T: TransportHandler<
        Request = tonic::Request<ExportTraceServiceRequest>,
        Response = ExportTraceServiceResponse,
    >,
{
    pub fn with_transport(headers: &Headers, timeout: Duration, transport: T) -> Self {
        Self {
            metadata: metadata_map(headers),
            timeout,
            transport,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn envelope(&self, request: ExportTraceServiceRequest) -> tonic::Request<ExportTraceServiceRequest> {
        let mut envelope = tonic::Request::new(request);
        *envelope.metadata_mut() = self.metadata.clone();
        envelope.set_timeout(self.timeout);
        envelope
    }
}

/// Converts parsed headers to ASCII metadata. Names are lowercased as gRPC requires.
fn metadata_map(headers: &Headers) -> MetadataMap {
    let mut map = MetadataMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let key = AsciiMetadataKey::from_bytes(name.to_ascii_lowercase().as_bytes());
        let parsed = key.ok().zip(AsciiMetadataValue::try_from(value).ok());
        match parsed {
            Some((key, value)) => {
                map.append(key, value);
            },
            None => tracing::warn!(header = %name, "Skipping invalid gRPC metadata entry"),
        }
    }
    map
}

#[async_trait]
impl<T> ExportClient for GrpcExportClient<T>
where
    T: TransportHandler<
        Request = tonic::Request<ExportTraceServiceRequest>,
        Response = ExportTraceServiceResponse,
    >,
{
    async fn send_export_request(&self, request: ExportTraceServiceRequest) -> Result<()> {
        tracing::debug!(
            resource_spans = request.resource_spans.len(),
            "Sending OTLP/gRPC export request"
        );

        let response = self
            .transport
            .send(self.envelope(request), CancellationToken::new())
            .await?;

        if let Some(partial) = response.partial_success {
            if partial.rejected_spans > 0 || !partial.error_message.is_empty() {
                tracing::warn!(
                    rejected_spans = partial.rejected_spans,
                    message = %partial.error_message,
                    "Collector partially accepted the batch"
                );
            }
        }

        Ok(())
    }

    async fn cancel_export_request(&self, timeout: Duration) -> bool {
        self.transport.cancel_pending();
        self.transport.wait_idle(timeout).await
    }

    fn dispose(&self) {
        self.transport.dispose();
    }

    fn protocol(&self) -> Protocol {
        Protocol::Grpc
    }
}
