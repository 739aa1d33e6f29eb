use opentelemetry::trace::{SpanId, SpanKind, Status, TraceId};
use opentelemetry::KeyValue;
use std::borrow::Cow;
use std::time::SystemTime;

/// Name and version of the instrumentation that produced a span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct InstrumentationScope {
    /// Library or module name, e.g. `my-crate::http`
    pub name: Cow<'static, str>,
    /// Optional library version
    pub version: Option<Cow<'static, str>>,
}

impl InstrumentationScope {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Timestamped annotation recorded on a span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanEvent {
    pub name: Cow<'static, str>,
    pub timestamp: SystemTime,
    pub attributes: Vec<KeyValue>,
    pub dropped_attributes_count: u32,
}

impl SpanEvent {
    pub fn new(name: impl Into<Cow<'static, str>>, timestamp: SystemTime) -> Self {
        Self {
            name: name.into(),
            timestamp,
            attributes: Vec::new(),
            dropped_attributes_count: 0,
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Reference from a span to another span, possibly in another trace.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanLink {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub trace_state: String,
    pub attributes: Vec<KeyValue>,
    pub dropped_attributes_count: u32,
}

impl SpanLink {
    pub fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            trace_state: String::new(),
            attributes: Vec::new(),
            dropped_attributes_count: 0,
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// A completed span as handed over by the batching layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    /// Trace this span belongs to
    pub trace_id: TraceId,
    /// Identifier of this span
    pub span_id: SpanId,
    /// Parent span ID if this is a child span
    pub parent_span_id: Option<SpanId>,
    /// W3C trace flags; bit 0 is the sampled flag
    pub trace_flags: u8,
    /// W3C tracestate header value
    pub trace_state: String,
    /// Name of the operation this span represents
    pub name: Cow<'static, str>,
    /// Span kind; `None` is exported as internal
    pub kind: Option<SpanKind>,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    /// Outcome of the operation; defaults to unset
    pub status: Status,
    pub attributes: Vec<KeyValue>,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
    /// Scope that produced the span
    pub scope: InstrumentationScope,
    pub dropped_attributes_count: u32,
    pub dropped_events_count: u32,
    pub dropped_links_count: u32,
}

impl Span {
    /// Creates a new span builder
    pub fn builder(trace_id: TraceId, span_id: SpanId) -> SpanBuilder {
        SpanBuilder::new(trace_id, span_id)
    }

    /// Returns true if this span is a root span (has no parent)
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Returns true if the span carries the sampled flag
    pub fn is_sampled(&self) -> bool {
        self.trace_flags & 0x01 != 0
    }
}

/// Builder for creating Span instances
pub struct SpanBuilder {
    span: Span,
}

impl SpanBuilder {
    fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        let now = SystemTime::now();
        Self {
            span: Span {
                trace_id,
                span_id,
                parent_span_id: None,
                trace_flags: 0x01,
                trace_state: String::new(),
                name: Cow::Borrowed(""),
                kind: None,
                start_time: now,
                end_time: now,
                status: Status::Unset,
                attributes: Vec::new(),
                events: Vec::new(),
                links: Vec::new(),
                scope: InstrumentationScope::default(),
                dropped_attributes_count: 0,
                dropped_events_count: 0,
                dropped_links_count: 0,
            },
        }
    }

    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.span.name = name.into();
        self
    }

    pub fn parent_span_id(mut self, parent: SpanId) -> Self {
        self.span.parent_span_id = Some(parent);
        self
    }

    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.span.kind = Some(kind);
        self
    }

    pub fn trace_flags(mut self, flags: u8) -> Self {
        self.span.trace_flags = flags;
        self
    }

    pub fn trace_state(mut self, state: impl Into<String>) -> Self {
        self.span.trace_state = state.into();
        self
    }

    pub fn start_time(mut self, start: SystemTime) -> Self {
        self.span.start_time = start;
        self
    }

    pub fn end_time(mut self, end: SystemTime) -> Self {
        self.span.end_time = end;
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.span.status = status;
        self
    }

    pub fn attribute(mut self, attribute: KeyValue) -> Self {
        self.span.attributes.push(attribute);
        self
    }

    pub fn attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.span.attributes.extend(attributes);
        self
    }

    pub fn event(mut self, event: SpanEvent) -> Self {
        self.span.events.push(event);
        self
    }

    pub fn link(mut self, link: SpanLink) -> Self {
        self.span.links.push(link);
        self
    }

    pub fn scope(mut self, scope: InstrumentationScope) -> Self {
        self.span.scope = scope;
        self
    }

    pub fn build(self) -> Span {
        self.span
    }
}
