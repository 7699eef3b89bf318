//! Log core emitting OpenTelemetry log records.

use std::sync::Arc;

use beacon_common::{Field, FieldValue, Level, LogCore, LogEntry, LogError, Result};
use opentelemetry::logs::{AnyValue, LogRecord as _, Logger, LoggerProvider as _, Severity};
use opentelemetry_sdk::logs::SdkLoggerProvider;

type SdkLogger = <SdkLoggerProvider as opentelemetry::logs::LoggerProvider>::Logger;

/// Map a product level to the OTEL severity number.
pub fn severity(level: Level) -> Severity {
    match level {
        Level::Trace => Severity::Trace,
        Level::Debug => Severity::Debug,
        Level::Info => Severity::Info,
        Level::Warn => Severity::Warn,
        Level::Error => Severity::Error,
    }
}

fn attribute_value(value: &FieldValue) -> AnyValue {
    match value {
        FieldValue::Bool(v) => AnyValue::from(*v),
        FieldValue::I64(v) => AnyValue::from(*v),
        FieldValue::U64(v) => match i64::try_from(*v) {
            Ok(v) => AnyValue::from(v),
            Err(_) => AnyValue::from(v.to_string()),
        },
        FieldValue::F64(v) => AnyValue::from(*v),
        FieldValue::Str(v) => AnyValue::from(v.clone()),
    }
}

/// Log core writing every accepted entry as an OTEL log record.
///
/// Level filtering is left to the cores in front of it.
#[derive(Clone)]
pub struct OtelLogCore {
    provider: SdkLoggerProvider,
    logger: Arc<SdkLogger>,
    fields: Vec<Field>,
}

impl OtelLogCore {
    /// Create a core whose records carry the instrumentation scope `scope`.
    pub fn new(provider: SdkLoggerProvider, scope: impl Into<String>) -> Self {
        let logger = provider.logger(scope.into());

        Self {
            provider,
            logger: Arc::new(logger),
            fields: Vec::new(),
        }
    }
}

impl LogCore for OtelLogCore {
    fn enabled(&self, _level: Level) -> bool {
        true
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn LogCore> {
        let mut core = self.clone();
        core.fields.extend_from_slice(fields);
        Arc::new(core)
    }

    fn write(&self, entry: &LogEntry, fields: &[Field]) -> Result<()> {
        let mut record = self.logger.create_log_record();

        record.set_timestamp(entry.timestamp);
        record.set_body(entry.message.clone().into());
        record.set_severity_number(severity(entry.level));
        record.set_severity_text(entry.level.as_str());

        if !entry.logger_name.is_empty() {
            record.add_attribute("logger", entry.logger_name.clone());
        }
        for field in self.fields.iter().chain(fields) {
            record.add_attribute(field.key.clone(), attribute_value(&field.value));
        }

        self.logger.emit(record);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.provider
            .force_flush()
            .map_err(|e| LogError::Export(e.to_string()))
    }
}
