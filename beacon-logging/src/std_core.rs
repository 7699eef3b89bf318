//! Local log output: text or JSON lines, by default on stderr.
//!
//! Lines are produced by a private `tracing-subscriber` fmt subscriber.
//! [`StdCore`] turns each entry into a `tracing` event and hands it straight
//! to that subscriber; [`LineFormat`] lays the line out.

use std::fmt;
use std::io::IsTerminal;
use std::sync::Arc;

use beacon_common::{Field, Level, LogCore, LogEntry, Result};
use serde_json::{Map, Value};
use tracing::field::{Field as TracingField, Visit};
use tracing::{Dispatch, Event, Metadata, Subscriber};
use tracing_core::Kind;
use tracing_core::callsite::DefaultCallsite;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

use crate::config::LogFormat;
use crate::layer::map_level;

/// Concrete encoding after `auto` has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Text,
}

impl Encoding {
    /// Resolve `auto` to JSON when stderr is not a terminal.
    pub fn resolve(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Encoding::Json,
            LogFormat::Text => Encoding::Text,
            LogFormat::Auto => {
                if std::io::stderr().is_terminal() {
                    Encoding::Text
                } else {
                    Encoding::Json
                }
            }
        }
    }
}

// Every entry event carries these three fields. `fields` holds the entry's
// fields as one JSON object.
const FIELD_NAMES: &[&str] = &["message", "logger", "fields"];

macro_rules! entry_callsite {
    ($callsite:ident, $meta:ident, $level:expr) => {
        static $callsite: DefaultCallsite = DefaultCallsite::new(&$meta);
        static $meta: Metadata<'static> = tracing_core::metadata! {
            name: "log entry",
            target: "beacon",
            level: $level,
            fields: FIELD_NAMES,
            callsite: &$callsite,
            kind: Kind::EVENT,
        };
    };
}

entry_callsite!(TRACE_CALLSITE, TRACE_META, tracing::Level::TRACE);
entry_callsite!(DEBUG_CALLSITE, DEBUG_META, tracing::Level::DEBUG);
entry_callsite!(INFO_CALLSITE, INFO_META, tracing::Level::INFO);
entry_callsite!(WARN_CALLSITE, WARN_META, tracing::Level::WARN);
entry_callsite!(ERROR_CALLSITE, ERROR_META, tracing::Level::ERROR);

fn entry_metadata(level: Level) -> &'static Metadata<'static> {
    match level {
        Level::Trace => &TRACE_META,
        Level::Debug => &DEBUG_META,
        Level::Info => &INFO_META,
        Level::Warn => &WARN_META,
        Level::Error => &ERROR_META,
    }
}

fn tracing_level(level: Level) -> tracing::Level {
    *entry_metadata(level).level()
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    logger: String,
    fields: String,
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &TracingField, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "logger" => self.logger = value.to_string(),
            "fields" => self.fields = value.to_string(),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        self.record_str(field, &format!("{:?}", value));
    }
}

/// Event formatter for entry events.
///
/// JSON lines use `level`/`ts`/`msg` keys, or `severity`/`time`/`message`
/// with Google Cloud severities when `gcp_fields` is set. Text lines are
/// tab separated with the fields as a trailing JSON object.
#[derive(Debug, Clone, Copy)]
pub struct LineFormat {
    encoding: Encoding,
    gcp_fields: bool,
    timer: SystemTime,
}

impl LineFormat {
    pub fn new(encoding: Encoding, gcp_fields: bool) -> Self {
        Self {
            encoding,
            gcp_fields,
            timer: SystemTime,
        }
    }

    fn json_line(
        &self,
        level: Level,
        time: String,
        entry: EntryVisitor,
    ) -> std::result::Result<String, fmt::Error> {
        let (time_key, level_key, message_key, level) = if self.gcp_fields {
            ("time", "severity", "message", level.gcp_severity())
        } else {
            ("ts", "level", "msg", level.as_str())
        };

        let mut object = Map::new();
        object.insert(level_key.to_string(), Value::from(level));
        object.insert(time_key.to_string(), Value::from(time));
        if !entry.logger.is_empty() {
            object.insert("logger".to_string(), Value::from(entry.logger));
        }
        object.insert(message_key.to_string(), Value::from(entry.message));
        if let Ok(Value::Object(fields)) = serde_json::from_str(&entry.fields) {
            object.extend(fields);
        }

        serde_json::to_string(&Value::Object(object)).map_err(|_| fmt::Error)
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = map_level(event.metadata().level());
        let mut entry = EntryVisitor::default();
        event.record(&mut entry);

        let mut time = String::new();
        self.timer.format_time(&mut Writer::new(&mut time))?;

        match self.encoding {
            Encoding::Json => {
                let line = self.json_line(level, time, entry)?;
                writeln!(writer, "{}", line)
            }
            Encoding::Text => {
                write!(writer, "{}\t{}", time, level.as_str().to_uppercase())?;
                if !entry.logger.is_empty() {
                    write!(writer, "\t{}", entry.logger)?;
                }
                write!(writer, "\t{}", entry.message)?;
                if !entry.fields.is_empty() && entry.fields != "{}" {
                    write!(writer, "\t{}", entry.fields)?;
                }
                writeln!(writer)
            }
        }
    }
}

/// Log core writing one line per entry.
#[derive(Clone)]
pub struct StdCore {
    level: Level,
    fields: Vec<Field>,
    dispatch: Dispatch,
}

impl StdCore {
    /// Core writing lines laid out by `format` to the writers `make_writer`
    /// hands out.
    pub fn new<W>(level: Level, format: LineFormat, make_writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing_level(level))
            .with_writer(make_writer)
            .event_format(format)
            .finish();

        Self {
            level,
            fields: Vec::new(),
            dispatch: Dispatch::new(subscriber),
        }
    }
}

impl LogCore for StdCore {
    fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn LogCore> {
        let mut core = self.clone();
        core.fields.extend_from_slice(fields);
        Arc::new(core)
    }

    fn write(&self, entry: &LogEntry, fields: &[Field]) -> Result<()> {
        let mut object = Map::new();
        for field in self.fields.iter().chain(fields) {
            object.insert(field.key.clone(), serde_json::to_value(&field.value)?);
        }
        let encoded = serde_json::to_string(&Value::Object(object))?;

        let meta = entry_metadata(entry.level);
        let names = meta.fields();
        let (Some(message), Some(logger), Some(extra)) =
            (names.field("message"), names.field("logger"), names.field("fields"))
        else {
            return Ok(());
        };

        let (message_value, logger_value, extra_value) = (
            entry.message.as_str(),
            entry.logger_name.as_str(),
            encoded.as_str(),
        );
        let values = [
            (&message, Some(&message_value as &dyn tracing::Value)),
            (&logger, Some(&logger_value as &dyn tracing::Value)),
            (&extra, Some(&extra_value as &dyn tracing::Value)),
        ];

        // Dispatched directly: this may run inside another subscriber's
        // event callback, where the thread default is unavailable.
        self.dispatch.event(&Event::new(meta, &names.value_set(&values)));
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LogCoreLayer;
    use beacon_common::Logger;
    use parking_lot::Mutex;
    use std::io::Write;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn core(encoding: Encoding, gcp: bool) -> (StdCore, Buffer) {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let core = StdCore::new(
            Level::Info,
            LineFormat::new(encoding, gcp),
            move || writer.clone(),
        );
        (core, buffer)
    }

    #[test]
    fn test_json_line() {
        let (core, buffer) = core(Encoding::Json, false);
        let derived = core.with(&[Field::new("component", "api")]);

        derived
            .write(
                &LogEntry::new(Level::Warn, "api", "slow request"),
                &[Field::new("elapsed_ms", 1200u64)],
            )
            .unwrap();

        let line: Value = serde_json::from_str(&buffer.lines()[0]).unwrap();
        assert_eq!(line["level"], "warn");
        assert_eq!(line["msg"], "slow request");
        assert_eq!(line["logger"], "api");
        assert_eq!(line["component"], "api");
        assert_eq!(line["elapsed_ms"], 1200);
        assert!(line["ts"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_gcp_field_names() {
        let (core, buffer) = core(Encoding::Json, true);

        core.write(&LogEntry::new(Level::Warn, "", "careful"), &[])
            .unwrap();

        let line: Value = serde_json::from_str(&buffer.lines()[0]).unwrap();
        assert_eq!(line["severity"], "WARNING");
        assert_eq!(line["message"], "careful");
        assert!(line.get("time").is_some());
        assert!(line.get("logger").is_none());
        assert!(line.get("level").is_none());
    }

    #[test]
    fn test_text_line() {
        let (core, buffer) = core(Encoding::Text, false);

        core.write(
            &LogEntry::new(Level::Info, "api", "started"),
            &[Field::new("port", 3000)],
        )
        .unwrap();
        core.write(&LogEntry::new(Level::Error, "", "plain"), &[])
            .unwrap();

        let lines = buffer.lines();
        assert!(lines[0].contains("\tINFO\tapi\tstarted\t"));
        assert!(lines[0].ends_with(r#"{"port":3000}"#));
        assert!(lines[1].ends_with("\tERROR\tplain"));
    }

    #[test]
    fn test_write_from_inside_a_tracing_event() {
        let (core, buffer) = core(Encoding::Json, false);
        let layer = LogCoreLayer::new(Logger::new(Arc::new(core)));
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "api", port = 3000u64, "listening");
        });

        let line: Value = serde_json::from_str(&buffer.lines()[0]).unwrap();
        assert_eq!(line["msg"], "listening");
        assert_eq!(line["logger"], "api");
        assert_eq!(line["port"], 3000);
    }

    #[test]
    fn test_level_filter() {
        let (core, _) = core(Encoding::Text, false);
        assert!(!core.enabled(Level::Debug));
        assert!(core.enabled(Level::Error));
    }

    #[test]
    fn test_resolve_explicit_formats() {
        assert_eq!(Encoding::resolve(LogFormat::Json), Encoding::Json);
        assert_eq!(Encoding::resolve(LogFormat::Text), Encoding::Text);
    }
}
