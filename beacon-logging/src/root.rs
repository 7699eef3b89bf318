//! Root fan-out: field prefixing, level floor and broadcast to backend cores.

use std::borrow::Cow;
use std::sync::Arc;

use beacon_common::{Field, Level, LogCore, LogEntry, LogError, Result};

/// Rewrite every field key as `prefix_key`.
///
/// Returns a new collection; the caller's fields are left untouched. The
/// internal marker keeps its key so diagnostics stay recognisable downstream.
pub fn prefix_fields(prefix: &str, fields: &[Field]) -> Vec<Field> {
    fields
        .iter()
        .map(|f| {
            if prefix.is_empty() || f.is_internal_marker() {
                f.clone()
            } else {
                Field {
                    key: format!("{}_{}", prefix, f.key),
                    value: f.value.clone(),
                }
            }
        })
        .collect()
}

/// Wraps one backend core with field prefixing and a level floor.
#[derive(Clone)]
pub struct RootCore {
    inner: Arc<dyn LogCore>,
    fields_prefix: String,
    floor: Level,
}

impl RootCore {
    pub fn new(inner: Arc<dyn LogCore>, fields_prefix: impl Into<String>, floor: Level) -> Self {
        Self {
            inner,
            fields_prefix: fields_prefix.into(),
            floor,
        }
    }

    fn clamp<'a>(&self, entry: &'a LogEntry) -> Cow<'a, LogEntry> {
        if entry.level < self.floor {
            Cow::Owned(entry.with_level(self.floor))
        } else {
            Cow::Borrowed(entry)
        }
    }

    fn prefixed<'a>(&self, fields: &'a [Field]) -> Cow<'a, [Field]> {
        if self.fields_prefix.is_empty() {
            Cow::Borrowed(fields)
        } else {
            Cow::Owned(prefix_fields(&self.fields_prefix, fields))
        }
    }
}

impl LogCore for RootCore {
    fn enabled(&self, level: Level) -> bool {
        self.inner.enabled(level.max(self.floor))
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn LogCore> {
        Arc::new(Self {
            inner: self.inner.with(&self.prefixed(fields)),
            fields_prefix: self.fields_prefix.clone(),
            floor: self.floor,
        })
    }

    fn check(&self, entry: &LogEntry) -> bool {
        self.inner.enabled(self.clamp(entry).level)
    }

    fn write(&self, entry: &LogEntry, fields: &[Field]) -> Result<()> {
        self.inner.write(&self.clamp(entry), &self.prefixed(fields))
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }
}

/// Broadcasts each entry to every core that accepts it.
#[derive(Clone, Default)]
pub struct TeeCore {
    cores: Vec<Arc<dyn LogCore>>,
}

impl TeeCore {
    pub fn new(cores: Vec<Arc<dyn LogCore>>) -> Self {
        Self { cores }
    }

    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }
}

impl LogCore for TeeCore {
    fn enabled(&self, level: Level) -> bool {
        self.cores.iter().any(|c| c.enabled(level))
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn LogCore> {
        Arc::new(Self {
            cores: self.cores.iter().map(|c| c.with(fields)).collect(),
        })
    }

    fn check(&self, entry: &LogEntry) -> bool {
        self.cores.iter().any(|c| c.check(entry))
    }

    fn write(&self, entry: &LogEntry, fields: &[Field]) -> Result<()> {
        let errors: Vec<LogError> = self
            .cores
            .iter()
            .filter(|c| c.check(entry))
            .filter_map(|c| c.write(entry, fields).err())
            .collect();

        LogError::combine(errors).map_or(Ok(()), Err)
    }

    fn sync(&self) -> Result<()> {
        let errors: Vec<LogError> = self.cores.iter().filter_map(|c| c.sync().err()).collect();

        LogError::combine(errors).map_or(Ok(()), Err)
    }
}
