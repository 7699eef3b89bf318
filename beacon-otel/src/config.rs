//! Configuration for the telemetry lifecycle.

use std::path::Path;
use std::time::Duration;

use beacon_common::{ConfigError, Issues, load_config, parse_config};
use beacon_logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// The only OTLP transport currently supported.
pub const GRPC: &str = "grpc";

/// Complete process configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Product logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// OpenTelemetry exporter settings.
    #[serde(default)]
    pub otel: OtelConfig,
}

impl BeaconConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: BeaconConfig = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: BeaconConfig = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate both sections, reporting every issue.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Issues::new();
        issues.extend(self.logging.validate());
        issues.extend(self.otel.validate());
        issues.finish()
    }
}

/// OpenTelemetry OTLP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtelConfig {
    /// Service name for the OTEL resource.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Export product logs.
    #[serde(default)]
    pub enable_log_exporter: bool,

    /// Log exporter transport.
    #[serde(default = "default_protocol")]
    pub log_exporter_protocol: String,

    /// Poll and export component metrics.
    #[serde(default)]
    pub enable_metric_exporter: bool,

    /// Metric exporter transport.
    #[serde(default = "default_protocol")]
    pub metric_exporter_protocol: String,

    /// Interval between two reads of a metric, in seconds.
    #[serde(default = "default_collect_interval")]
    pub metrics_collect_interval_secs: u64,

    /// Export trace spans.
    #[serde(default)]
    pub enable_span_exporter: bool,

    /// Span exporter transport.
    #[serde(default = "default_protocol")]
    pub span_exporter_protocol: String,

    /// OTLP endpoint. When unset the exporter's environment defaults apply
    /// (`OTEL_EXPORTER_OTLP_ENDPOINT`, then `http://localhost:4317`).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Export timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Interval between two metric exports, in seconds.
    #[serde(default = "default_export_interval")]
    pub metric_export_interval_secs: u64,
}

fn default_service_name() -> String {
    "beacon".to_string()
}

fn default_protocol() -> String {
    GRPC.to_string()
}

fn default_collect_interval() -> u64 {
    5
}

fn default_timeout() -> u64 {
    10
}

fn default_export_interval() -> u64 {
    60
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            enable_log_exporter: false,
            log_exporter_protocol: default_protocol(),
            enable_metric_exporter: false,
            metric_exporter_protocol: default_protocol(),
            metrics_collect_interval_secs: default_collect_interval(),
            enable_span_exporter: false,
            span_exporter_protocol: default_protocol(),
            endpoint: None,
            timeout_secs: default_timeout(),
            metric_export_interval_secs: default_export_interval(),
        }
    }
}

impl OtelConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: OtelConfig = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: OtelConfig = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether at least one exporter is enabled.
    pub fn any_enabled(&self) -> bool {
        self.enable_log_exporter || self.enable_metric_exporter || self.enable_span_exporter
    }

    /// Validate the configuration.
    ///
    /// Nothing is checked when every exporter is disabled. Otherwise every
    /// issue is collected before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.any_enabled() {
            return Ok(());
        }

        let mut issues = Issues::new();

        issues.check(
            self.service_name.is_empty(),
            "service name must not be empty",
        );

        let exporters = [
            (self.enable_log_exporter, &self.log_exporter_protocol, "log"),
            (self.enable_metric_exporter, &self.metric_exporter_protocol, "metric"),
            (self.enable_span_exporter, &self.span_exporter_protocol, "span"),
        ];
        for (enabled, protocol, signal) in exporters {
            issues.check(
                enabled && protocol != GRPC,
                format!(
                    "currently, only the '{}' protocol is supported for the OTLP {} exporter",
                    GRPC, signal
                ),
            );
        }

        issues.check(
            self.enable_metric_exporter && self.metrics_collect_interval_secs == 0,
            "metrics_collect_interval_secs must be > 0",
        );

        issues.check(
            self.enable_metric_exporter && self.metric_export_interval_secs == 0,
            "metric_export_interval_secs must be > 0",
        );

        issues.check(self.timeout_secs == 0, "timeout_secs must be > 0");

        issues.finish()
    }

    /// Get the metric collection interval as Duration.
    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_collect_interval_secs)
    }

    /// Get the metric export interval as Duration.
    pub fn export_interval(&self) -> Duration {
        Duration::from_secs(self.metric_export_interval_secs)
    }

    /// Get the export timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
