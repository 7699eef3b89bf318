//! OpenTelemetry lifecycle for Beacon components.
//!
//! This crate builds the OTLP exporters, attaches the log exporter to the
//! product logging bridge, polls component metrics into OTEL instruments and
//! hands out spans.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌─────────────┐    ┌──────────────┐    ┌───────────────┐
//! │  Components  │───>│ Logging     │───>│ OtelLogCore  │───>│               │
//! │  (loggers,   │    │ (bridge)    │    └──────────────┘    │ OTLP Endpoint │
//! │   metrics,   │───>│ MetricPoller│───> instruments ──────>│  (Collector)  │
//! │   spans)     │───>│ Telemetry   │───> tracer ───────────>│               │
//! └──────────────┘    └─────────────┘                        └───────────────┘
//! ```
//!
//! # Usage
//!
//! Run the binary with a configuration file:
//!
//! ```bash
//! beacon-otel --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::BeaconConfig`] and [`config::OtelConfig`].

pub mod config;
pub mod error;
pub mod exporters;
pub mod lifecycle;
pub mod log_core;
pub mod metrics;
pub mod resource;
pub mod shutdown;
pub mod trace;

pub use config::{BeaconConfig, OtelConfig};
pub use error::{ProvisionError, ShutdownError, Signal, StartError, StopError};
pub use exporters::{ExporterFactory, LogPipeline, MetricPipeline, OtlpExporterFactory, TracePipeline};
pub use lifecycle::{LifecycleState, Telemetry};
pub use log_core::OtelLogCore;
pub use metrics::{InstrumentRecorder, MetricPoller, PollerSet, Recorder};
pub use shutdown::{ProviderHandle, Providers};
pub use trace::TracerSpan;
