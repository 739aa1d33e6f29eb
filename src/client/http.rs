//! OTLP/HTTP binary protobuf client.

use super::ExportClient;
use crate::core::{ExporterError, Headers, Protocol, Result};
use crate::transport::{HttpRequest, HttpResponse, TransportHandler};
use async_trait::async_trait;
use bytes::BytesMut;
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use prost::Message;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Media type of a binary OTLP payload.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Longest collector error body echoed into logs and errors.
const MAX_ERROR_BODY: usize = 512;

pub struct HttpExportClient<T = crate::transport::HttpTransport> {
    uri: String,
    headers: HeaderMap,
    transport: T,
}

impl<T> HttpExportClient<T>
where
    T: TransportHandler<Request = HttpRequest, Response = HttpResponse>,
{
    /// `uri` is the fully resolved request URI, see [`super::resolve_http_endpoint`].
    pub fn with_transport(uri: impl Into<String>, headers: &Headers, transport: T) -> Self {
        Self {
            uri: uri.into(),
            headers: header_map(headers),
            transport,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn encode(request: &ExportTraceServiceRequest) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(request.encoded_len());
        request.encode(&mut buf)?;
        Ok(buf)
    }
}

/// Converts parsed headers, skipping pairs that are not valid HTTP.
fn header_map(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len() + 1);
    for (name, value) in headers.iter() {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .ok()
            .zip(HeaderValue::from_str(value).ok());
        match parsed {
            Some((name, value)) => {
                map.append(name, value);
            },
            None => tracing::warn!(header = %name, "Skipping invalid HTTP header"),
        }
    }
    map.insert(CONTENT_TYPE, HeaderValue::from_static(PROTOBUF_CONTENT_TYPE));
    map
}

fn error_message(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl<T> ExportClient for HttpExportClient<T>
where
    T: TransportHandler<Request = HttpRequest, Response = HttpResponse>,
{
    async fn send_export_request(&self, request: ExportTraceServiceRequest) -> Result<()> {
        let body = Self::encode(&request)?;
        tracing::debug!(uri = %self.uri, bytes = body.len(), "Sending OTLP/HTTP export request");

        let response = self
            .transport
            .send(
                HttpRequest {
                    uri: self.uri.clone(),
                    headers: self.headers.clone(),
                    body: body.freeze(),
                },
                CancellationToken::new(),
            )
            .await?;

        if !response.is_success() {
            return Err(ExporterError::HttpStatus {
                status: response.status,
                message: error_message(&response.body),
            });
        }

        // An empty or undecodable 2xx body is still an accepted batch.
        if let Ok(decoded) = ExportTraceServiceResponse::decode(response.body) {
            if let Some(partial) = decoded.partial_success {
                if partial.rejected_spans > 0 || !partial.error_message.is_empty() {
                    tracing::warn!(
                        rejected_spans = partial.rejected_spans,
                        message = %partial.error_message,
                        "Collector partially accepted the batch"
                    );
                }
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
        Protocol::HttpProtobuf
    }
}
