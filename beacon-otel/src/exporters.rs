//! OTLP exporter and provider construction.

use std::sync::Arc;
use std::time::Duration;

use beacon_common::LogCore;
use opentelemetry::InstrumentationScope;
use opentelemetry::global::BoxedTracer;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider};

use crate::config::{GRPC, OtelConfig};
use crate::error::StartError;
use crate::log_core::OtelLogCore;
use crate::shutdown::ProviderHandle;

/// A built log exporter: the core to attach and the provider to shut down.
pub struct LogPipeline {
    pub core: Arc<dyn LogCore>,
    pub provider: Arc<dyn ProviderHandle>,
}

/// A built metric exporter: the meter instruments are created on.
pub struct MetricPipeline {
    pub meter: Meter,
    pub provider: Arc<dyn ProviderHandle>,
}

/// A built span exporter: the tracer spans are started on.
pub struct TracePipeline {
    pub tracer: BoxedTracer,
    pub provider: Arc<dyn ProviderHandle>,
}

/// Builds the exporter pipelines for each signal.
///
/// `scope` names the instrumentation scope of the created logger, meter and
/// tracer.
pub trait ExporterFactory: Send + Sync {
    fn log_pipeline(
        &self,
        protocol: &str,
        scope: &str,
        resource: &Resource,
    ) -> Result<LogPipeline, StartError>;

    fn metric_pipeline(
        &self,
        protocol: &str,
        scope: &str,
        resource: &Resource,
    ) -> Result<MetricPipeline, StartError>;

    fn trace_pipeline(
        &self,
        protocol: &str,
        scope: &str,
        resource: &Resource,
    ) -> Result<TracePipeline, StartError>;
}

/// OTLP exporters over gRPC.
#[derive(Debug, Clone)]
pub struct OtlpExporterFactory {
    endpoint: Option<String>,
    timeout: Duration,
    export_interval: Duration,
}

impl OtlpExporterFactory {
    pub fn new(config: &OtelConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            timeout: config.timeout(),
            export_interval: config.export_interval(),
        }
    }
}

fn unknown_protocol(signal: &str, protocol: &str) -> String {
    format!("unknown OTLP {} exporter protocol: {}", signal, protocol)
}

impl ExporterFactory for OtlpExporterFactory {
    fn log_pipeline(
        &self,
        protocol: &str,
        scope: &str,
        resource: &Resource,
    ) -> Result<LogPipeline, StartError> {
        if protocol != GRPC {
            return Err(StartError::LogExporter(unknown_protocol("log", protocol)));
        }

        let mut builder = LogExporter::builder().with_tonic().with_timeout(self.timeout);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let exporter = builder.build().map_err(|e| {
            StartError::LogExporter(format!("create OTLP gRPC log exporter: {}", e))
        })?;

        let provider = SdkLoggerProvider::builder()
            .with_resource(resource.clone())
            .with_batch_exporter(exporter)
            .build();

        Ok(LogPipeline {
            core: Arc::new(OtelLogCore::new(provider.clone(), scope.to_string())),
            provider: Arc::new(provider),
        })
    }

    fn metric_pipeline(
        &self,
        protocol: &str,
        scope: &str,
        resource: &Resource,
    ) -> Result<MetricPipeline, StartError> {
        if protocol != GRPC {
            return Err(StartError::MetricExporter(unknown_protocol("metric", protocol)));
        }

        let mut builder = MetricExporter::builder().with_tonic().with_timeout(self.timeout);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let exporter = builder.build().map_err(|e| {
            StartError::MetricExporter(format!("create OTLP gRPC metric exporter: {}", e))
        })?;

        let reader = PeriodicReader::builder(exporter)
            .with_interval(self.export_interval)
            .build();

        let provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build();

        let meter = provider.meter_with_scope(InstrumentationScope::builder(scope.to_string()).build());

        Ok(MetricPipeline {
            meter,
            provider: Arc::new(provider),
        })
    }

    fn trace_pipeline(
        &self,
        protocol: &str,
        scope: &str,
        resource: &Resource,
    ) -> Result<TracePipeline, StartError> {
        if protocol != GRPC {
            return Err(StartError::SpanExporter(unknown_protocol("span", protocol)));
        }

        let mut builder = SpanExporter::builder().with_tonic().with_timeout(self.timeout);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let exporter = builder.build().map_err(|e| {
            StartError::SpanExporter(format!("create OTLP gRPC span exporter: {}", e))
        })?;

        let provider = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_span_processor(BatchSpanProcessor::builder(exporter).build())
            .build();

        let tracer = BoxedTracer::new(Box::new(provider.tracer(scope.to_string())));

        Ok(TracePipeline {
            tracer,
            provider: Arc::new(provider),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> Resource {
        crate::resource::build_resource("beacon", "0.0.0", "localhost")
    }

    #[test]
    fn test_unsupported_protocol_is_rejected() {
        let factory = OtlpExporterFactory::new(&OtelConfig::default());

        let err = factory
            .log_pipeline("http", "beacon", &resource())
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "create OTLP log exporter: unknown OTLP log exporter protocol: http"
        );

        assert!(matches!(
            factory.metric_pipeline("http", "beacon", &resource()),
            Err(StartError::MetricExporter(_))
        ));
        assert!(matches!(
            factory.trace_pipeline("http", "beacon", &resource()),
            Err(StartError::SpanExporter(_))
        ));
    }

    #[tokio::test]
    async fn test_grpc_pipelines_build_without_collector() {
        let config = OtelConfig {
            endpoint: Some("http://127.0.0.1:4317".to_string()),
            timeout_secs: 1,
            ..Default::default()
        };
        let factory = OtlpExporterFactory::new(&config);

        let logs = factory.log_pipeline(GRPC, "beacon", &resource()).unwrap();
        let traces = factory.trace_pipeline(GRPC, "beacon", &resource()).unwrap();

        assert!(logs.core.enabled(beacon_common::Level::Info));
        drop(traces.tracer);
    }
}
