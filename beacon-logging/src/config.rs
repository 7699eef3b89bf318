//! Configuration for the logging module.

use std::path::Path;

use beacon_common::{ConfigError, Issues, Level, load_config, parse_config};
use serde::{Deserialize, Serialize};

const LEVELS: [&str; 4] = ["error", "warn", "info", "debug"];
const FORMATS: [&str; 3] = ["auto", "json", "text"];

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info" or "debug".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "auto", "json" or "text".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Prefix prepended (as `prefix_key`) to every field key.
    #[serde(default)]
    pub fields_prefix: String,

    /// Use Google Cloud Platform field names: time, message, severity.
    #[serde(default)]
    pub enable_gcp_fields: bool,

    /// Lowest level an entry can carry; lower entries are promoted to it.
    #[serde(default = "default_floor")]
    pub floor: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "auto".to_string()
}

fn default_floor() -> String {
    "debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            fields_prefix: String::new(),
            enable_gcp_fields: false,
            floor: default_floor(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON when stderr is not a terminal, text otherwise.
    #[default]
    Auto,
    Json,
    Text,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

impl LoggingConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: LoggingConfig = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: LoggingConfig = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, reporting every invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Issues::new();

        issues.check(
            !LEVELS.contains(&self.level.as_str()),
            format!(
                "log level must be either {}, {}, {} or {}",
                LEVELS[0], LEVELS[1], LEVELS[2], LEVELS[3]
            ),
        );

        issues.check(
            LogFormat::parse(&self.format).is_none(),
            format!(
                "log format must be either {}, {} or {}",
                FORMATS[0], FORMATS[1], FORMATS[2]
            ),
        );

        issues.check(
            Level::parse(&self.floor).is_none(),
            format!("log floor '{}' is not a recognized level", self.floor),
        );

        issues.finish()
    }

    /// Parsed log level, `info` when invalid.
    pub fn log_level(&self) -> Level {
        Level::parse(&self.level).unwrap_or(Level::Info)
    }

    /// Parsed level floor, `debug` when invalid.
    pub fn floor_level(&self) -> Level {
        Level::parse(&self.floor).unwrap_or(Level::Debug)
    }

    /// Parsed output format, `auto` when invalid.
    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.format).unwrap_or_default()
    }
}
