use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, LogError, MetricError};
use crate::log::{LogCore, Logger};

/// Kind of instrument a metric is recorded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Monotonic sum.
    Counter,
    /// Sum that can go up or down.
    UpDownCounter,
    /// Distribution of observations.
    Histogram,
    /// Last observed value.
    Gauge,
}

impl InstrumentKind {
    /// Parse an instrument name; unknown names are a configuration error.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "counter" => Ok(Self::Counter),
            "up_down_counter" => Ok(Self::UpDownCounter),
            "histogram" => Ok(Self::Histogram),
            "gauge" => Ok(Self::Gauge),
            other => Err(ConfigError::Validation(vec![format!(
                "unknown instrument: {}",
                other
            )])),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::UpDownCounter => "up_down_counter",
            Self::Histogram => "histogram",
            Self::Gauge => "gauge",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type ReadFn = Arc<dyn Fn() -> Result<f64, MetricError> + Send + Sync>;

/// A metric contributed by a component.
#[derive(Clone)]
pub struct Metric {
    /// Unique identifier. Required.
    pub name: String,
    /// Optional description.
    pub description: String,
    /// Instrument the value is recorded to.
    pub instrument: InstrumentKind,
    read: ReadFn,
}

impl Metric {
    /// Create a metric from an infallible read function.
    pub fn new<F>(name: impl Into<String>, instrument: InstrumentKind, read: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self::fallible(name, instrument, move || Ok(read()))
    }

    /// Create a metric whose read may fail.
    pub fn fallible<F>(name: impl Into<String>, instrument: InstrumentKind, read: F) -> Self
    where
        F: Fn() -> Result<f64, MetricError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            instrument,
            read: Arc::new(read),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Read the current value.
    pub fn read(&self) -> Result<f64, MetricError> {
        (self.read)()
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("instrument", &self.instrument)
            .finish_non_exhaustive()
    }
}

/// A module that hands out loggers to other modules.
pub trait LoggerProvider: Send + Sync {
    /// Logger namespaced for `component`.
    fn logger(&self, component: &str) -> Result<Logger, LogError>;
}

/// A module that accepts a log core to export to, after loggers already
/// exist.
pub trait LogExporterHook: Send + Sync {
    fn register_core(&self, core: Arc<dyn LogCore>) -> Result<(), LogError>;
}

/// A module that contributes metrics.
pub trait MetricsProvider: Send + Sync {
    fn metrics(&self) -> Result<Vec<Metric>, MetricError>;
}
