//! Error types for the telemetry lifecycle.

use beacon_common::{ConfigError, LogError, MetricError};
use thiserror::Error;

/// Errors raised while gathering collaborators from the host.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("get logger: {0}")]
    Logger(#[source] LogError),

    #[error("log export is enabled but no log exporter hook was provided")]
    MissingLogExporterHook,

    #[error("get metrics: {0}")]
    Metrics(#[from] MetricError),
}

/// Errors that abort [`Telemetry::start`](crate::Telemetry::start).
#[derive(Debug, Error)]
pub enum StartError {
    #[error("telemetry was already started")]
    AlreadyStarted,

    #[error("get hostname: {0}")]
    Hostname(#[source] std::io::Error),

    #[error("create OTLP log exporter: {0}")]
    LogExporter(String),

    #[error("create OTLP metric exporter: {0}")]
    MetricExporter(String),

    #[error("create OTLP span exporter: {0}")]
    SpanExporter(String),

    #[error("register core to hook: {0}")]
    RegisterCore(#[source] LogError),
}

/// Outcome of one provider shutdown that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// The shutdown timed out after the stop was cancelled.
    #[error("shutdown cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),

    #[error("shutdown task panicked: {0}")]
    Panicked(String),
}

impl ShutdownError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ShutdownError::Cancelled)
    }
}

/// Which provider a shutdown failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Logs,
    Metrics,
    Traces,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Logs => "log",
            Signal::Metrics => "metric",
            Signal::Traces => "tracer",
        }
    }
}

/// Every shutdown failure that survived cancellation filtering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .0.iter().map(|(s, e)| format!("{} provider: {}", s.as_str(), e)).collect::<Vec<_>>().join("; "))]
pub struct StopError(pub Vec<(Signal, ShutdownError)>);

impl StopError {
    /// Keep the failures that are not cancellations; `None` if none remain.
    pub fn from_results(results: Vec<(Signal, Result<(), ShutdownError>)>) -> Option<Self> {
        let failures: Vec<_> = results
            .into_iter()
            .filter_map(|(signal, result)| match result {
                Err(e) if !e.is_cancelled() => Some((signal, e)),
                _ => None,
            })
            .collect();

        if failures.is_empty() {
            None
        } else {
            Some(StopError(failures))
        }
    }

    pub fn failures(&self) -> &[(Signal, ShutdownError)] {
        &self.0
    }
}
