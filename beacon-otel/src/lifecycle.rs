//! The telemetry lifecycle: provision, start, trace, stop.
//!
//! ```text
//! Disabled                                   (no exporter enabled)
//! Provisioned ──start──> Starting ──> Running ──stop──> Stopping ──> Stopped
//!                            └──── failure, rolled back ────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use beacon_common::{Field, LogExporterHook, Logger, LoggerProvider, Metric, MetricsProvider};
use opentelemetry::Context;
use opentelemetry::global::BoxedTracer;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::OtelConfig;
use crate::error::{ProvisionError, StartError, StopError};
use crate::exporters::{ExporterFactory, OtlpExporterFactory};
use crate::metrics::{InstrumentRecorder, MetricPoller, PollerSet};
use crate::resource::{build_resource, current_hostname};
use crate::shutdown::Providers;
use crate::trace::{self, TracerSpan};

/// Component name the lifecycle logs under.
pub const COMPONENT: &str = "otel";

/// Where a [`Telemetry`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No exporter is enabled; start and stop do nothing.
    Disabled,
    Provisioned,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Disabled => "disabled",
            LifecycleState::Provisioned => "provisioned",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// What a successful start leaves behind for stop.
struct Running {
    providers: Providers,
    pollers: PollerSet,
}

/// Builds, runs and tears down the OTLP exporters as one unit.
pub struct Telemetry {
    config: OtelConfig,
    version: String,
    hostname: Option<String>,
    logger: Logger,
    hook: Option<Arc<dyn LogExporterHook>>,
    metrics: Vec<Metric>,
    factory: Arc<dyn ExporterFactory>,
    state: Mutex<LifecycleState>,
    running: Mutex<Option<Running>>,
    tracer: OnceLock<BoxedTracer>,
}

impl Telemetry {
    /// Gather what the lifecycle needs from the host.
    ///
    /// The log exporter hook is required when log export is enabled. Metrics
    /// are only collected when metric export is enabled.
    pub fn provision(
        config: OtelConfig,
        loggers: &dyn LoggerProvider,
        hook: Option<Arc<dyn LogExporterHook>>,
        metrics_providers: &[Arc<dyn MetricsProvider>],
    ) -> Result<Self, ProvisionError> {
        config.validate()?;

        let logger = loggers
            .logger(COMPONENT)
            .map_err(ProvisionError::Logger)?
            .named("internal")
            .with(&[Field::internal()]);

        let hook = if config.enable_log_exporter {
            Some(hook.ok_or(ProvisionError::MissingLogExporterHook)?)
        } else {
            None
        };

        let mut metrics = Vec::new();
        if config.enable_metric_exporter {
            for provider in metrics_providers {
                metrics.extend(provider.metrics()?);
            }
        }

        let state = if config.any_enabled() {
            LifecycleState::Provisioned
        } else {
            LifecycleState::Disabled
        };

        Ok(Self {
            factory: Arc::new(OtlpExporterFactory::new(&config)),
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: None,
            logger,
            hook,
            metrics,
            state: Mutex::new(state),
            running: Mutex::new(None),
            tracer: OnceLock::new(),
        })
    }

    /// Build exporters with `factory` instead of OTLP.
    pub fn with_factory(mut self, factory: Arc<dyn ExporterFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use `hostname` instead of resolving the host name at start.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Service version reported in the resource.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn config(&self) -> &OtelConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Metrics gathered at provisioning.
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Number of running metric pollers.
    pub fn active_pollers(&self) -> usize {
        self.running.lock().as_ref().map_or(0, |r| r.pollers.len())
    }

    /// Human readable summary of the enabled exporters.
    pub fn startup_message(&self) -> String {
        if !self.config.any_enabled() {
            return "OTLP exporters are disabled".to_string();
        }

        let mut exporters = Vec::new();
        if self.config.enable_log_exporter {
            exporters.push(format!("{} log exporter", self.config.log_exporter_protocol));
        }
        if self.config.enable_metric_exporter {
            exporters.push(format!(
                "{} metric exporter",
                self.config.metric_exporter_protocol
            ));
        }
        if self.config.enable_span_exporter {
            exporters.push(format!("{} span exporter", self.config.span_exporter_protocol));
        }

        format!(
            "the following OTLP exporter(s) are enabled: {}",
            exporters.join(", ")
        )
    }

    /// Start the enabled exporters.
    ///
    /// All or nothing: on failure every provider already built is shut down
    /// and the lifecycle ends in [`LifecycleState::Stopped`].
    pub async fn start(&self) -> Result<(), StartError> {
        {
            let mut state = self.state.lock();
            match *state {
                LifecycleState::Disabled => return Ok(()),
                LifecycleState::Provisioned => *state = LifecycleState::Starting,
                _ => return Err(StartError::AlreadyStarted),
            }
        }

        let mut providers = Providers::default();
        match self.try_start(&mut providers) {
            Ok(pollers) => {
                self.logger.info(
                    self.startup_message(),
                    &[Field::new("metric_pollers", pollers.len())],
                );
                *self.running.lock() = Some(Running { providers, pollers });
                *self.state.lock() = LifecycleState::Running;
                Ok(())
            }
            Err(e) => {
                self.logger.error(
                    "telemetry start failed",
                    &[Field::new("error", e.to_string())],
                );
                if let Err(rollback) = providers.shutdown_all(&CancellationToken::new()).await {
                    self.logger.warn(
                        "rollback after failed start",
                        &[Field::new("error", rollback.to_string())],
                    );
                }
                *self.state.lock() = LifecycleState::Stopped;
                Err(e)
            }
        }
    }

    /// Build every enabled pipeline, then wire them.
    ///
    /// Each provider is recorded in `providers` as soon as it exists, so the
    /// caller can shut down whatever was built when a later step fails.
    fn try_start(&self, providers: &mut Providers) -> Result<PollerSet, StartError> {
        let hostname = match &self.hostname {
            Some(hostname) => hostname.clone(),
            None => current_hostname().map_err(StartError::Hostname)?,
        };
        let resource = build_resource(&self.config.service_name, &self.version, &hostname);
        let scope = self.config.service_name.as_str();

        let logs = if self.config.enable_log_exporter {
            let pipeline =
                self.factory
                    .log_pipeline(&self.config.log_exporter_protocol, scope, &resource)?;
            providers.logs = Some(pipeline.provider.clone());
            Some(pipeline)
        } else {
            None
        };

        let metrics = if self.config.enable_metric_exporter {
            let pipeline = self.factory.metric_pipeline(
                &self.config.metric_exporter_protocol,
                scope,
                &resource,
            )?;
            providers.metrics = Some(pipeline.provider.clone());
            Some(pipeline)
        } else {
            None
        };

        let traces = if self.config.enable_span_exporter {
            let pipeline = self.factory.trace_pipeline(
                &self.config.span_exporter_protocol,
                scope,
                &resource,
            )?;
            providers.traces = Some(pipeline.provider.clone());
            Some(pipeline)
        } else {
            None
        };

        if let (Some(pipeline), Some(hook)) = (&logs, &self.hook) {
            hook.register_core(pipeline.core.clone())
                .map_err(StartError::RegisterCore)?;
        }

        let mut pollers = PollerSet::new();
        if let Some(pipeline) = metrics {
            pipeline.provider.install_global();
            for metric in &self.metrics {
                let recorder = Arc::new(InstrumentRecorder::build(&pipeline.meter, metric));
                pollers.spawn(MetricPoller::new(
                    metric.clone(),
                    recorder,
                    self.config.collect_interval(),
                    self.logger.clone(),
                ));
            }
        }

        if let Some(pipeline) = traces {
            pipeline.provider.install_global();
            // Start runs once per lifecycle, so the cell is empty here.
            let _ = self.tracer.set(pipeline.tracer);
        }

        Ok(pollers)
    }

    /// Stop every exporter.
    ///
    /// Pollers are cancelled and joined first. The providers are then shut
    /// down concurrently. A shutdown that times out after `cancel` fired is
    /// not reported; any other shutdown error is.
    pub async fn stop(&self, cancel: CancellationToken) -> Result<(), StopError> {
        {
            let mut state = self.state.lock();
            match *state {
                LifecycleState::Disabled | LifecycleState::Stopped => return Ok(()),
                _ => *state = LifecycleState::Stopping,
            }
        }

        let running = self.running.lock().take();
        let result = match running {
            Some(running) => {
                running.pollers.shutdown().await;
                running.providers.shutdown_all(&cancel).await
            }
            None => Ok(()),
        };

        *self.state.lock() = LifecycleState::Stopped;

        match &result {
            Ok(()) => self.logger.info("OTLP exporters stopped", &[]),
            Err(e) => self.logger.error(
                "OTLP exporters stopped with errors",
                &[Field::new("error", e.to_string())],
            ),
        }

        result
    }

    /// Start a span named `name` as a child of `cx`.
    ///
    /// Without span export this returns `cx` unchanged and the no-op span.
    pub fn trace_start(&self, cx: &Context, name: &str) -> (Context, TracerSpan) {
        match self.tracer.get() {
            Some(tracer) => trace::start_span(tracer, cx, name),
            None => (cx.clone(), TracerSpan::Noop),
        }
    }

    /// Write the trace context of `cx` into `headers`. Works whether or not
    /// span export is enabled.
    pub fn inject(&self, cx: &Context, headers: &mut HashMap<String, String>) {
        trace::inject(cx, headers);
    }

    /// Continue a trace from inbound `headers`.
    pub fn extract(&self, headers: &HashMap<String, String>) -> Context {
        trace::extract(headers)
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("service_name", &self.config.service_name)
            .field("state", &self.state())
            .field("metrics", &self.metrics.len())
            .finish_non_exhaustive()
    }
}
