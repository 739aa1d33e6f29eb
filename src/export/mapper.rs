//! Conversion of exporter spans into the OTLP protobuf message tree.
//!
//! One batch produces a single `ResourceSpans` holding one `ScopeSpans` per
//! distinct instrumentation scope, appended in first-seen order.

use crate::core::{ExporterError, InstrumentationScope, Resource, Result, Span, SpanEvent, SpanLink};
use opentelemetry::trace::{SpanId, SpanKind, Status, TraceId};
use opentelemetry::{Array, KeyValue, Value};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{
    any_value, AnyValue, ArrayValue, InstrumentationScope as ProtoScope, KeyValue as ProtoKeyValue,
};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
use opentelemetry_proto::tonic::trace::v1::{
    span::{Event as ProtoEvent, Link as ProtoLink, SpanKind as ProtoSpanKind},
    status::StatusCode as ProtoStatusCode,
    ResourceSpans, ScopeSpans, Span as ProtoSpan, Status as ProtoStatus,
};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maps a batch and the exporter's resource to one export request.
///
/// Fails only for spans with an invalid (all-zero) trace or span id.
pub fn map_batch(spans: &[Span], resource: &Resource) -> Result<ExportTraceServiceRequest> {
    let mut scope_index: HashMap<&InstrumentationScope, usize> = HashMap::new();
    let mut groups: Vec<(&InstrumentationScope, Vec<ProtoSpan>)> = Vec::new();

    for span in spans {
        let mapped = map_span(span)?;
        match scope_index.get(&span.scope) {
            Some(&idx) => groups[idx].1.push(mapped),
            None => {
                scope_index.insert(&span.scope, groups.len());
                groups.push((&span.scope, vec![mapped]));
            },
        }
    }

    let scope_spans = groups
        .into_iter()
        .map(|(scope, spans)| ScopeSpans {
            scope: Some(map_scope(scope)),
            spans,
            ..Default::default()
        })
        .collect();

    Ok(ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(map_resource(resource)),
            scope_spans,
            ..Default::default()
        }],
    })
}

pub fn map_resource(resource: &Resource) -> ProtoResource {
    ProtoResource {
        attributes: map_attributes(resource.attributes()),
        ..Default::default()
    }
}

fn map_scope(scope: &InstrumentationScope) -> ProtoScope {
    ProtoScope {
        name: scope.name.to_string(),
        version: scope.version.as_deref().unwrap_or_default().to_string(),
        ..Default::default()
    }
}

/// Maps a single span.
pub fn map_span(span: &Span) -> Result<ProtoSpan> {
    if span.trace_id == TraceId::INVALID {
        return Err(ExporterError::invalid_span(format!(
            "span '{}' has an all-zero trace id",
            span.name
        )));
    }
    if span.span_id == SpanId::INVALID {
        return Err(ExporterError::invalid_span(format!(
            "span '{}' has an all-zero span id",
            span.name
        )));
    }

    Ok(ProtoSpan {
        trace_id: span.trace_id.to_bytes().to_vec(),
        span_id: span.span_id.to_bytes().to_vec(),
        trace_state: span.trace_state.clone(),
        parent_span_id: span
            .parent_span_id
            .filter(|id| *id != SpanId::INVALID)
            .map(|id| id.to_bytes().to_vec())
            .unwrap_or_default(),
        flags: u32::from(span.trace_flags),
        name: span.name.to_string(),
        kind: map_kind(span.kind.as_ref()) as i32,
        start_time_unix_nano: to_unix_nanos(span.start_time),
        end_time_unix_nano: to_unix_nanos(span.end_time),
        attributes: map_attributes(&span.attributes),
        dropped_attributes_count: span.dropped_attributes_count,
        events: span.events.iter().map(map_event).collect(),
        dropped_events_count: span.dropped_events_count,
        links: span.links.iter().map(map_link).collect(),
        dropped_links_count: span.dropped_links_count,
        status: Some(map_status(&span.status)),
    })
}

fn map_event(event: &SpanEvent) -> ProtoEvent {
    ProtoEvent {
        time_unix_nano: to_unix_nanos(event.timestamp),
        name: event.name.to_string(),
        attributes: map_attributes(&event.attributes),
        dropped_attributes_count: event.dropped_attributes_count,
    }
}

fn map_link(link: &SpanLink) -> ProtoLink {
    ProtoLink {
        trace_id: link.trace_id.to_bytes().to_vec(),
        span_id: link.span_id.to_bytes().to_vec(),
        trace_state: link.trace_state.clone(),
        attributes: map_attributes(&link.attributes),
        dropped_attributes_count: link.dropped_attributes_count,
        ..Default::default()
    }
}

/// Unset kind is exported as internal.
pub fn map_kind(kind: Option<&SpanKind>) -> ProtoSpanKind {
    match kind {
        Some(SpanKind::Server) => ProtoSpanKind::Server,
        Some(SpanKind::Client) => ProtoSpanKind::Client,
        Some(SpanKind::Producer) => ProtoSpanKind::Producer,
        Some(SpanKind::Consumer) => ProtoSpanKind::Consumer,
        Some(SpanKind::Internal) | None => ProtoSpanKind::Internal,
    }
}

pub fn map_status(status: &Status) -> ProtoStatus {
    match status {
        Status::Unset => ProtoStatus {
            code: ProtoStatusCode::Unset as i32,
            message: String::new(),
        },
        Status::Ok => ProtoStatus {
            code: ProtoStatusCode::Ok as i32,
            message: String::new(),
        },
        Status::Error { description } => ProtoStatus {
            code: ProtoStatusCode::Error as i32,
            message: description.to_string(),
        },
    }
}

/// Nanoseconds since the epoch; 0 for pre-epoch or overflowing times.
pub fn to_unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_nanos()).ok())
        .unwrap_or(0)
}

/// Maps attributes in order, dropping any the wire cannot represent.
pub fn map_attributes(attributes: &[KeyValue]) -> Vec<ProtoKeyValue> {
    attributes
        .iter()
        .filter(|kv| !kv.key.as_str().is_empty())
        .filter_map(|kv| {
            map_value(&kv.value).map(|value| ProtoKeyValue {
                key: kv.key.to_string(),
                value: Some(value),
            })
        })
        .collect()
}

fn map_value(value: &Value) -> Option<AnyValue> {
    let value = match value {
        Value::Bool(b) => any_value::Value::BoolValue(*b),
        Value::I64(i) => any_value::Value::IntValue(*i),
        Value::F64(f) => any_value::Value::DoubleValue(*f),
        Value::String(s) => any_value::Value::StringValue(s.to_string()),
        Value::Array(array) => any_value::Value::ArrayValue(map_array(array)?),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(AnyValue { value: Some(value) })
}

fn map_array(array: &Array) -> Option<ArrayValue> {
    fn wrap(value: any_value::Value) -> AnyValue {
        AnyValue { value: Some(value) }
    }

    let values = match array {
        Array::Bool(items) => items.iter().map(|b| wrap(any_value::Value::BoolValue(*b))).collect(),
        Array::I64(items) => items.iter().map(|i| wrap(any_value::Value::IntValue(*i))).collect(),
        Array::F64(items) => items.iter().map(|f| wrap(any_value::Value::DoubleValue(*f))).collect(),
        Array::String(items) => items
            .iter()
            .map(|s| wrap(any_value::Value::StringValue(s.to_string())))
            .collect(),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(ArrayValue { values })
}
