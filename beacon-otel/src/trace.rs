//! Span handles and W3C trace-context propagation.

use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error;

use opentelemetry::global::BoxedTracer;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{SpanContext, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// A span returned by `trace_start`.
///
/// When span export is disabled this is [`TracerSpan::Noop`], which accepts
/// every operation and does nothing, so callers never need to check. A
/// recording span lives in the context returned next to it; this handle and
/// that context refer to the same span.
#[derive(Clone)]
pub enum TracerSpan {
    Recording(Context),
    Noop,
}

impl TracerSpan {
    pub fn is_recording(&self) -> bool {
        match self {
            TracerSpan::Recording(cx) => cx.span().is_recording(),
            TracerSpan::Noop => false,
        }
    }

    /// Span context; invalid for the no-op span.
    pub fn span_context(&self) -> SpanContext {
        match self {
            TracerSpan::Recording(cx) => cx.span().span_context().clone(),
            TracerSpan::Noop => SpanContext::empty_context(),
        }
    }

    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let TracerSpan::Recording(cx) = self {
            cx.span().set_attribute(attribute);
        }
    }

    pub fn add_event(&mut self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        if let TracerSpan::Recording(cx) = self {
            cx.span().add_event(name, attributes);
        }
    }

    pub fn record_error(&mut self, err: &dyn Error) {
        if let TracerSpan::Recording(cx) = self {
            cx.span().record_error(err);
        }
    }

    pub fn set_status(&mut self, status: Status) {
        if let TracerSpan::Recording(cx) = self {
            cx.span().set_status(status);
        }
    }

    pub fn end(&mut self) {
        if let TracerSpan::Recording(cx) = self {
            cx.span().end();
        }
    }
}

impl std::fmt::Debug for TracerSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TracerSpan::Recording(cx) => f
                .debug_tuple("Recording")
                .field(cx.span().span_context())
                .finish(),
            TracerSpan::Noop => f.write_str("Noop"),
        }
    }
}

/// Start a span named `name` as a child of `parent`.
///
/// The returned context has the new span active, so spans started from it
/// are local children and propagated headers continue the same trace.
pub fn start_span(tracer: &BoxedTracer, parent: &Context, name: &str) -> (Context, TracerSpan) {
    let span = tracer.start_with_context(name.to_string(), parent);
    let cx = parent.with_span(span);

    (cx.clone(), TracerSpan::Recording(cx))
}

/// Write the trace context of `cx` into `headers`.
pub fn inject(cx: &Context, headers: &mut HashMap<String, String>) {
    TraceContextPropagator::new().inject_context(cx, headers);
}

/// Read a trace context from `headers`, on top of the current context.
pub fn extract(headers: &HashMap<String, String>) -> Context {
    TraceContextPropagator::new().extract(headers)
}
