//! HTTP POST transport on top of `reqwest`.

use super::{duration_ms, CallTracker, TransportHandler};
use crate::core::{ExporterError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One POST request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Status and body of a completed POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct HttpTransport {
    /// `None` once disposed; dropping the last clone closes pooled connections.
    client: Mutex<Option<reqwest::Client>>,
    calls: CallTracker,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExporterError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: Mutex::new(Some(client)),
            calls: CallTracker::new(timeout),
        })
    }

    fn map_error(&self, err: reqwest::Error) -> ExporterError {
        if err.is_timeout() {
            ExporterError::Timeout {
                timeout_ms: duration_ms(self.calls.timeout()),
            }
        } else {
            ExporterError::network(err.to_string())
        }
    }
}

#[async_trait]
impl TransportHandler for HttpTransport {
    type Request = HttpRequest;
    type Response = HttpResponse;

    async fn send(&self, request: HttpRequest, cancel: CancellationToken) -> Result<HttpResponse> {
        let client = self.client.lock().clone().ok_or(ExporterError::Disposed)?;
        let call = async {
            let response = client
                .post(&request.uri)
                .headers(request.headers)
                .body(request.body)
                .send()
                .await
                .map_err(|e| self.map_error(e))?;

            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(|e| self.map_error(e))?;
            Ok(HttpResponse { status, body })
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

    #[tokio::test]
    async fn test_send_after_dispose_is_rejected() {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        transport.dispose();
        assert!(transport.client.lock().is_none());

        let request = HttpRequest {
            uri: "http://127.0.0.1:1/v1/traces".into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        let result = transport.send(request, CancellationToken::new()).await;
        assert!(matches!(result, Err(ExporterError::Disposed)));
    }
}
