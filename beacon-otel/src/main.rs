//! Beacon telemetry process: product logging plus OTLP export.

use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_common::{
    Field, InstrumentKind, LogExporterHook, Metric, MetricError, MetricsProvider,
};
use beacon_logging::Logging;
use beacon_otel::{BeaconConfig, Telemetry};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Beacon telemetry: buffered product logging and OTLP export.
#[derive(Parser, Debug)]
#[command(name = "beacon-otel")]
#[command(about = "Run the Beacon logging and OpenTelemetry lifecycle")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// OTLP endpoint (overrides config).
    #[arg(long)]
    endpoint: Option<String>,

    /// Service name (overrides config).
    #[arg(long)]
    service_name: Option<String>,
}

/// Metrics describing this process.
struct ProcessMetrics {
    started: Instant,
}

impl MetricsProvider for ProcessMetrics {
    fn metrics(&self) -> Result<Vec<Metric>, MetricError> {
        let started = self.started;
        Ok(vec![
            Metric::new("process_uptime_seconds", InstrumentKind::Gauge, move || {
                started.elapsed().as_secs_f64()
            })
            .with_description("Seconds since the process started"),
        ])
    }
}

async fn shutdown_signal() -> anyhow::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("Ctrl+C")
            }
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl+C")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        BeaconConfig::load_from_file(config_path)?
    } else {
        BeaconConfig::default()
    };

    // Override from CLI
    if let Some(endpoint) = args.endpoint {
        config.otel.endpoint = Some(endpoint);
    }
    if let Some(service_name) = args.service_name {
        config.otel.service_name = service_name;
    }
    config.validate()?;

    // Initialize logging
    let logging = Arc::new(Logging::new(config.logging.clone())?);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()))
        .add_directive("opentelemetry=warn".parse()?)
        .add_directive("tonic=warn".parse()?)
        .add_directive("h2=warn".parse()?);
    tracing_subscriber::registry()
        .with(filter)
        .with(logging.layer())
        .init();

    let logger = logging.logger("beacon");
    logger.info(
        "Starting Beacon telemetry",
        &[
            Field::new("service_name", config.otel.service_name.as_str()),
            Field::new("log_exporter", config.otel.enable_log_exporter),
            Field::new("metric_exporter", config.otel.enable_metric_exporter),
            Field::new("span_exporter", config.otel.enable_span_exporter),
        ],
    );

    let hook: Arc<dyn LogExporterHook> = logging.clone();
    let metrics: Vec<Arc<dyn MetricsProvider>> = vec![Arc::new(ProcessMetrics {
        started: Instant::now(),
    })];
    let telemetry = Telemetry::provision(
        config.otel.clone(),
        logging.as_ref(),
        Some(hook),
        &metrics,
    )?;

    telemetry.start().await?;
    logger.info(telemetry.startup_message(), &[]);

    let signal = shutdown_signal().await?;
    logger.info("Shutting down", &[Field::new("signal", signal)]);

    if let Err(e) = logging.sync() {
        logger.warn("Failed to flush logs", &[Field::new("error", e.to_string())]);
    }

    // Exporter timeouts after this deadline are not reported as failures.
    let cancel = CancellationToken::new();
    let deadline = cancel.clone();
    let timeout = Duration::from_secs(config.otel.timeout_secs);
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        deadline.cancel();
    });

    if let Err(e) = telemetry.stop(cancel).await {
        logger.error("Telemetry shutdown failed", &[Field::new("error", e.to_string())]);
    }

    logger.info("Beacon telemetry stopped", &[]);
    Ok(())
}
