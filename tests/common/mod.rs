//! Common test utilities and fixtures.

#![allow(dead_code)]

use opentelemetry::trace::{SpanId, SpanKind, TraceId};
use opentelemetry::KeyValue;
use opentelemetry_proto::tonic::collector::trace::v1::{
    trace_service_server::{TraceService, TraceServiceServer},
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use opentelemetry_proto::tonic::common::v1::any_value;
use opentelemetry_proto::tonic::common::v1::KeyValue as ProtoKeyValue;
use otlp_exporter::core::{InstrumentationScope, Span};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};

/// Test fixture builder for creating spans with sensible defaults.
pub struct TestSpanBuilder {
    trace_num: u128,
    span_num: u64,
    scope: InstrumentationScope,
    kind: Option<SpanKind>,
}

impl TestSpanBuilder {
    pub fn new(trace_num: u128, span_num: u64) -> Self {
        Self {
            trace_num,
            span_num,
            scope: InstrumentationScope::new("test-lib").with_version("0.1.0"),
            kind: None,
        }
    }

    pub fn scope(mut self, name: &'static str) -> Self {
        self.scope = InstrumentationScope::new(name);
        self
    }

    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn build(self) -> Span {
        let start = UNIX_EPOCH + Duration::from_secs(1_700_000_000 + self.span_num);
        let mut builder = Span::builder(TraceId::from(self.trace_num), SpanId::from(self.span_num))
            .name(format!("operation-{}", self.span_num))
            .start_time(start)
            .end_time(start + Duration::from_millis(25))
            .attribute(KeyValue::new("test.index", self.span_num as i64))
            .scope(self.scope);
        if let Some(kind) = self.kind {
            builder = builder.kind(kind);
        }
        builder.build()
    }
}

/// `count` spans of one trace, all from the same scope.
pub fn create_test_batch(count: u64) -> Vec<Span> {
    (1..=count).map(|i| TestSpanBuilder::new(0xfeed, i).build()).collect()
}

/// String value of `key`, if present.
pub fn string_attribute(attributes: &[ProtoKeyValue], key: &str) -> Option<String> {
    attributes
        .iter()
        .find(|kv| kv.key == key)
        .and_then(|kv| kv.value.clone())
        .and_then(|v| match v.value {
            Some(any_value::Value::StringValue(s)) => Some(s),
            _ => None,
        })
}

/// One request as seen by [`TestCollector`].
#[derive(Debug, Clone)]
pub struct ReceivedExport {
    pub metadata: MetadataMap,
    pub request: ExportTraceServiceRequest,
}

/// In-process OTLP/gRPC collector.
#[derive(Clone, Default)]
pub struct TestCollector {
    pub received: Arc<Mutex<Vec<ReceivedExport>>>,
    reject_with: Option<Status>,
    delay: Option<Duration>,
}

impl TestCollector {
    pub fn rejecting(status: Status) -> Self {
        Self {
            reject_with: Some(status),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Serves on an ephemeral localhost port and returns its address.
    pub async fn start(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = TraceServiceServer::new(self.clone());

        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });
        addr
    }

    pub fn requests(&self) -> Vec<ReceivedExport> {
        self.received.lock().clone()
    }
}

#[tonic::async_trait]
impl TraceService for TestCollector {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let (metadata, _, request) = request.into_parts();
        self.received.lock().push(ReceivedExport { metadata, request });

        match &self.reject_with {
            Some(status) => Err(status.clone()),
            None => Ok(Response::new(ExportTraceServiceResponse::default())),
        }
    }
}
