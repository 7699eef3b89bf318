//! Routes `tracing` events into a [`Logger`].
//!
//! Third-party crates (the OpenTelemetry SDK in particular) report through
//! `tracing`. This layer feeds those events into the product log fan-out so
//! they land next to everything else. Events from OpenTelemetry targets and
//! the pipeline's own diagnostics ([`INTERNAL_TARGET`]) are marked internal
//! and never exported back through the pipeline that produced them.

use std::fmt;

use beacon_common::{Field, FieldValue, INTERNAL_TARGET, Level, LogEntry, Logger};
use tracing::field::{Field as TracingField, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Target prefix of events emitted by the OpenTelemetry crates.
const OTEL_TARGET_PREFIX: &str = "opentelemetry";

/// `tracing` layer writing every event through a [`Logger`].
#[derive(Debug, Clone)]
pub struct LogCoreLayer {
    logger: Logger,
}

impl LogCoreLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

pub(crate) fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE => Level::Trace,
        tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO => Level::Info,
        tracing::Level::WARN => Level::Warn,
        tracing::Level::ERROR => Level::Error,
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<Field>,
}

impl FieldVisitor {
    fn push(&mut self, field: &TracingField, value: FieldValue) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(Field::new(field.name(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &TracingField, value: &str) {
        self.push(field, value.into());
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        self.push(field, value.into());
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        self.push(field, value.into());
    }

    fn record_f64(&mut self, field: &TracingField, value: f64) {
        self.push(field, value.into());
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        self.push(field, value.into());
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value).into());
    }
}

impl<S: Subscriber> Layer<S> for LogCoreLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = map_level(metadata.level());
        if !self.logger.enabled(level) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let target = metadata.target();
        if target.starts_with(OTEL_TARGET_PREFIX) || target == INTERNAL_TARGET {
            visitor.fields.push(Field::internal());
        }

        let entry = LogEntry::new(level, target, visitor.message.unwrap_or_default());
        self.logger.log_entry(&entry, &visitor.fields);
    }
}
