//! Structured log data model and the [`LogCore`] sink contract.
//!
//! Every component logs through a [`Logger`] handle. A logger owns a shared
//! [`LogCore`], the sink that decides whether an entry is recorded (`check`)
//! and records it together with its fields (`write`).

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Reserved field key marking an entry as diagnostic-only.
///
/// Entries carrying this key are shown locally but never exported.
pub const INTERNAL_KEY: &str = "internal";

/// `tracing` target for the logging pipeline's own diagnostics.
///
/// Events on this target are shown locally and never exported.
pub const INTERNAL_TARGET: &str = "beacon::internal";

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Parse a level name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Get the level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Google Cloud Logging severity name.
    pub fn gcp_severity(&self) -> &'static str {
        match self {
            Self::Trace | Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::I64(v) => write!(f, "{}", v),
            FieldValue::U64(v) => write!(f, "{}", v),
            FieldValue::F64(v) => write!(f, "{}", v),
            FieldValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::I64(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::I64(v.into())
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::U64(v)
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::U64(v as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

/// A single key/value pair attached to a log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The diagnostic-only marker field.
    pub fn internal() -> Self {
        Self::new(INTERNAL_KEY, true)
    }

    /// Whether this field is the diagnostic-only marker.
    pub fn is_internal_marker(&self) -> bool {
        self.key == INTERNAL_KEY
    }
}

/// An immutable log record; fields travel alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: Level,
    /// Dotted logger name, e.g. `api.internal`.
    pub logger_name: String,
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    pub fn new(level: Level, logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            level,
            logger_name: logger_name.into(),
            message: message.into(),
        }
    }

    /// Copy of this entry at another level.
    pub fn with_level(&self, level: Level) -> Self {
        Self {
            level,
            ..self.clone()
        }
    }
}

/// A log sink.
///
/// Implementations must be cheap to share: `with` returns a derived sink and
/// never mutates `self`.
pub trait LogCore: Send + Sync {
    /// Whether entries at `level` would be recorded.
    fn enabled(&self, level: Level) -> bool;

    /// Derived sink that adds `fields` to every future write.
    fn with(&self, fields: &[Field]) -> Arc<dyn LogCore>;

    /// Whether `entry` should be written to this sink.
    fn check(&self, entry: &LogEntry) -> bool {
        self.enabled(entry.level)
    }

    /// Record an entry with its call-site fields.
    fn write(&self, entry: &LogEntry, fields: &[Field]) -> Result<()>;

    /// Flush buffered output.
    fn sync(&self) -> Result<()>;
}

/// A sink that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCore;

impl LogCore for NoopCore {
    fn enabled(&self, _level: Level) -> bool {
        false
    }

    fn with(&self, _fields: &[Field]) -> Arc<dyn LogCore> {
        Arc::new(NoopCore)
    }

    fn write(&self, _entry: &LogEntry, _fields: &[Field]) -> Result<()> {
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Named logging handle over a shared [`LogCore`].
#[derive(Clone)]
pub struct Logger {
    core: Arc<dyn LogCore>,
    name: String,
}

impl Logger {
    pub fn new(core: Arc<dyn LogCore>) -> Self {
        Self {
            core,
            name: String::new(),
        }
    }

    /// A logger that discards everything.
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopCore))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn core(&self) -> &Arc<dyn LogCore> {
        &self.core
    }

    /// Child logger whose name is `self.name` + `.` + `name`.
    pub fn named(&self, name: &str) -> Self {
        if name.is_empty() {
            return self.clone();
        }

        let name = if self.name.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.name, name)
        };

        Self {
            core: self.core.clone(),
            name,
        }
    }

    /// Child logger carrying additional fields.
    pub fn with(&self, fields: &[Field]) -> Self {
        Self {
            core: self.core.with(fields),
            name: self.name.clone(),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.core.enabled(level)
    }

    /// Log a message at `level`.
    pub fn log(&self, level: Level, message: impl Into<String>, fields: &[Field]) {
        let entry = LogEntry::new(level, self.name.clone(), message);
        self.log_entry(&entry, fields);
    }

    /// Log a prebuilt entry.
    ///
    /// Write failures cannot be returned to the call site. They are reported
    /// as `tracing` events on [`INTERNAL_TARGET`].
    pub fn log_entry(&self, entry: &LogEntry, fields: &[Field]) {
        if !self.core.check(entry) {
            return;
        }

        if let Err(e) = self.core.write(entry, fields) {
            tracing::warn!(
                target: INTERNAL_TARGET,
                logger = %entry.logger_name,
                error = %e,
                "log write failed"
            );
        }
    }

    pub fn trace(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Trace, message, fields);
    }

    pub fn debug(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Info, message, fields);
    }

    pub fn warn(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Warn, message, fields);
    }

    pub fn error(&self, message: impl Into<String>, fields: &[Field]) {
        self.log(Level::Error, message, fields);
    }

    /// Flush every sink behind this logger.
    pub fn sync(&self) -> Result<()> {
        self.core.sync()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("name", &self.name).finish()
    }
}
