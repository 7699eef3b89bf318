//! Beacon Common Library
//!
//! This crate provides the contracts shared by the Beacon observability modules:
//!
//! - [`log`] - Structured log model (`Level`, `Field`, `LogEntry`), the `LogCore` sink trait and the `Logger` handle
//! - [`telemetry`] - Metric descriptors and the host-facing provider traits
//! - [`config`] - Configuration loading (JSON5 format) and validation helpers
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod log;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use config::{Issues, load_config, parse_config};
pub use error::{ConfigError, LogError, MetricError, Result};
pub use log::{Field, FieldValue, INTERNAL_KEY, INTERNAL_TARGET, Level, LogCore, LogEntry, Logger, NoopCore};
pub use telemetry::{InstrumentKind, LogExporterHook, LoggerProvider, Metric, MetricsProvider};
