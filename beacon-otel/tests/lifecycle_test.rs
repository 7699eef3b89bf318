//! Integration tests for the telemetry lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use beacon_common::{InstrumentKind, LogExporterHook, Metric, MetricError, MetricsProvider};
use beacon_logging::{Logging, LoggingConfig};
use beacon_otel::{
    ExporterFactory, LifecycleState, LogPipeline, MetricPipeline, OtelConfig, OtelLogCore,
    ProviderHandle, Providers, ShutdownError, Signal, StartError, Telemetry, TracePipeline,
};
use opentelemetry::Context;
use opentelemetry::InstrumentationScope;
use opentelemetry::global::BoxedTracer;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Wraps a provider and counts its shutdowns.
struct Counted<P> {
    inner: P,
    shutdowns: Arc<AtomicUsize>,
}

impl<P: ProviderHandle> ProviderHandle for Counted<P> {
    fn shutdown(&self) -> OTelSdkResult {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.inner.shutdown()
    }
}

/// Builds in-process SDK pipelines with no exporter attached.
#[derive(Default)]
struct LocalFactory {
    fail_traces: bool,
    shutdowns: Arc<AtomicUsize>,
    scopes: Mutex<Vec<String>>,
}

impl LocalFactory {
    fn failing_traces() -> Self {
        Self {
            fail_traces: true,
            ..Default::default()
        }
    }

    fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn counted<P: ProviderHandle + 'static>(&self, inner: P) -> Arc<dyn ProviderHandle> {
        Arc::new(Counted {
            inner,
            shutdowns: self.shutdowns.clone(),
        })
    }
}

impl ExporterFactory for LocalFactory {
    fn log_pipeline(
        &self,
        _protocol: &str,
        scope: &str,
        resource: &Resource,
    ) -> Result<LogPipeline, StartError> {
        self.scopes.lock().push(scope.to_string());
        let provider = SdkLoggerProvider::builder()
            .with_resource(resource.clone())
            .build();

        Ok(LogPipeline {
            core: Arc::new(OtelLogCore::new(provider.clone(), scope)),
            provider: self.counted(provider),
        })
    }

    fn metric_pipeline(
        &self,
        _protocol: &str,
        scope: &str,
        resource: &Resource,
    ) -> Result<MetricPipeline, StartError> {
        let provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .build();
        let meter =
            provider.meter_with_scope(InstrumentationScope::builder(scope.to_string()).build());

        Ok(MetricPipeline {
            meter,
            provider: self.counted(provider),
        })
    }

    fn trace_pipeline(
        &self,
        _protocol: &str,
        scope: &str,
        resource: &Resource,
    ) -> Result<TracePipeline, StartError> {
        if self.fail_traces {
            return Err(StartError::SpanExporter("collector unreachable".to_string()));
        }

        let provider = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .build();
        let tracer = BoxedTracer::new(Box::new(provider.tracer(scope.to_string())));

        Ok(TracePipeline {
            tracer,
            provider: self.counted(provider),
        })
    }
}

struct QueueMetrics;

impl MetricsProvider for QueueMetrics {
    fn metrics(&self) -> Result<Vec<Metric>, MetricError> {
        Ok(vec![
            Metric::new("queue_size", InstrumentKind::Gauge, || 3.0),
            Metric::new("jobs_done", InstrumentKind::Counter, || 1.0),
        ])
    }
}

fn logging() -> Arc<Logging> {
    Arc::new(
        Logging::new(LoggingConfig::default())
            .unwrap()
            .with_writer(std::io::sink),
    )
}

fn all_enabled() -> OtelConfig {
    OtelConfig {
        enable_log_exporter: true,
        enable_metric_exporter: true,
        enable_span_exporter: true,
        ..Default::default()
    }
}

fn provision(config: OtelConfig, logging: &Arc<Logging>, factory: Arc<LocalFactory>) -> Telemetry {
    let hook: Arc<dyn LogExporterHook> = logging.clone();
    let metrics: Vec<Arc<dyn MetricsProvider>> = vec![Arc::new(QueueMetrics)];

    Telemetry::provision(config, logging.as_ref(), Some(hook), &metrics)
        .unwrap()
        .with_factory(factory)
        .with_hostname("test-host")
}

// =============================================================================
// Disabled Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_disabled_lifecycle_is_inert() {
    let logging = logging();
    let factory = Arc::new(LocalFactory::default());
    let telemetry = provision(OtelConfig::default(), &logging, factory.clone());

    assert_eq!(telemetry.state(), LifecycleState::Disabled);
    assert!(telemetry.metrics().is_empty());

    telemetry.start().await.unwrap();
    assert_eq!(telemetry.active_pollers(), 0);
    assert!(!logging.bridge().is_attached());

    let (_cx, span) = telemetry.trace_start(&Context::new(), "work");
    assert!(!span.is_recording());

    telemetry.stop(CancellationToken::new()).await.unwrap();
    assert_eq!(telemetry.state(), LifecycleState::Disabled);
    assert!(factory.scopes.lock().is_empty());
    assert_eq!(factory.shutdowns(), 0);
}

// =============================================================================
// Start and Stop Tests
// =============================================================================

#[tokio::test]
async fn test_full_start_and_stop() {
    let logging = logging();
    let factory = Arc::new(LocalFactory::default());
    let telemetry = provision(all_enabled(), &logging, factory.clone());

    logging.logger("api").info("before start", &[]);
    assert_eq!(logging.bridge().buffered_len(), 1);

    telemetry.start().await.unwrap();
    assert_eq!(telemetry.state(), LifecycleState::Running);
    assert_eq!(telemetry.active_pollers(), 2);
    assert!(logging.bridge().is_attached());
    assert_eq!(logging.bridge().buffered_len(), 0);
    assert_eq!(*factory.scopes.lock(), vec!["beacon".to_string()]);

    let (cx, mut span) = telemetry.trace_start(&Context::new(), "convert");
    assert!(span.is_recording());

    let mut headers = HashMap::new();
    telemetry.inject(&cx, &mut headers);
    let traceparent = headers.get("traceparent").unwrap();
    let trace_id = span.span_context().trace_id().to_string();
    assert!(traceparent.contains(&trace_id));
    span.end();

    telemetry.stop(CancellationToken::new()).await.unwrap();
    assert_eq!(telemetry.state(), LifecycleState::Stopped);
    assert_eq!(telemetry.active_pollers(), 0);
    assert_eq!(factory.shutdowns(), 3);

    // A second stop has nothing left to do.
    telemetry.stop(CancellationToken::new()).await.unwrap();
    assert_eq!(factory.shutdowns(), 3);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let logging = logging();
    let factory = Arc::new(LocalFactory::default());
    let config = OtelConfig {
        enable_metric_exporter: true,
        ..Default::default()
    };
    let telemetry = provision(config, &logging, factory);

    telemetry.start().await.unwrap();
    assert!(matches!(
        telemetry.start().await,
        Err(StartError::AlreadyStarted)
    ));
    assert_eq!(telemetry.active_pollers(), 2);

    telemetry.stop(CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn test_metrics_skipped_when_metric_export_disabled() {
    let logging = logging();
    let factory = Arc::new(LocalFactory::default());
    let config = OtelConfig {
        enable_span_exporter: true,
        ..Default::default()
    };
    let telemetry = provision(config, &logging, factory.clone());

    assert!(telemetry.metrics().is_empty());

    telemetry.start().await.unwrap();
    assert_eq!(telemetry.active_pollers(), 0);
    assert!(!logging.bridge().is_attached());

    telemetry.stop(CancellationToken::new()).await.unwrap();
    assert_eq!(factory.shutdowns(), 1);
}

// =============================================================================
// Rollback Tests
// =============================================================================

#[tokio::test]
async fn test_failed_start_rolls_back_built_providers() {
    let logging = logging();
    let factory = Arc::new(LocalFactory::failing_traces());
    let telemetry = provision(all_enabled(), &logging, factory.clone());

    let err = telemetry.start().await.unwrap_err();
    assert!(matches!(err, StartError::SpanExporter(_)));
    assert_eq!(
        err.to_string(),
        "create OTLP span exporter: collector unreachable"
    );

    // The log and metric providers were built, then shut down.
    assert_eq!(factory.shutdowns(), 2);
    assert_eq!(telemetry.state(), LifecycleState::Stopped);
    assert_eq!(telemetry.active_pollers(), 0);
    assert!(!logging.bridge().is_attached());

    // Nothing is left running for stop.
    telemetry.stop(CancellationToken::new()).await.unwrap();
    assert_eq!(factory.shutdowns(), 2);
    assert!(matches!(
        telemetry.start().await,
        Err(StartError::AlreadyStarted)
    ));
}

// =============================================================================
// Shutdown Cancellation Tests
// =============================================================================

struct TimesOut;

impl ProviderHandle for TimesOut {
    fn shutdown(&self) -> OTelSdkResult {
        std::thread::sleep(Duration::from_millis(200));
        Err(OTelSdkError::Timeout(Duration::from_millis(200)))
    }
}

struct Failing;

impl ProviderHandle for Failing {
    fn shutdown(&self) -> OTelSdkResult {
        Err(OTelSdkError::InternalFailure("X".to_string()))
    }
}

struct Clean;

impl ProviderHandle for Clean {
    fn shutdown(&self) -> OTelSdkResult {
        Ok(())
    }
}

#[tokio::test]
async fn test_cancelled_shutdown_reports_only_real_failures() {
    let providers = Providers {
        logs: Some(Arc::new(TimesOut)),
        metrics: Some(Arc::new(Failing)),
        traces: Some(Arc::new(Clean)),
    };

    let cancel = CancellationToken::new();
    let deadline = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        deadline.cancel();
    });

    let err = providers.shutdown_all(&cancel).await.unwrap_err();
    assert_eq!(
        err.failures(),
        [(
            Signal::Metrics,
            ShutdownError::Failed("Operation failed: X".to_string())
        )]
    );
    assert_eq!(err.to_string(), "metric provider: Operation failed: X");
}

#[tokio::test]
async fn test_failure_is_reported_with_cancelled_token() {
    let providers = Providers {
        logs: None,
        metrics: Some(Arc::new(Failing)),
        traces: None,
    };

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = providers.shutdown_all(&cancel).await.unwrap_err();
    assert_eq!(
        err.failures(),
        [(
            Signal::Metrics,
            ShutdownError::Failed("Operation failed: X".to_string())
        )]
    );
}

#[tokio::test]
async fn test_timeout_without_cancellation_is_a_failure() {
    let providers = Providers {
        logs: Some(Arc::new(TimesOut)),
        metrics: None,
        traces: Some(Arc::new(Clean)),
    };

    let err = providers
        .shutdown_all(&CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.failures().len(), 1);
    assert_eq!(err.failures()[0].0, Signal::Logs);
}

#[tokio::test]
async fn test_cancelled_timeout_alone_is_success() {
    let providers = Providers {
        logs: Some(Arc::new(TimesOut)),
        metrics: None,
        traces: Some(Arc::new(Clean)),
    };

    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(providers.shutdown_all(&cancel).await.is_ok());
}
