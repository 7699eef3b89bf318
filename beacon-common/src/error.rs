use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),

    /// Every validation issue found, not only the first one.
    #[error("Validation error: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl ConfigError {
    /// Issues reported by a failed validation, empty for I/O and parse errors.
    pub fn issues(&self) -> &[String] {
        match self {
            ConfigError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

/// Errors raised while writing to or flushing a log core.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("A log exporter core is already attached")]
    AlreadyAttached,

    #[error("Log export error: {0}")]
    Export(String),

    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<LogError>),
}

impl LogError {
    /// Collapse a list of errors: `None` when empty, the error itself when
    /// there is exactly one.
    pub fn combine(mut errors: Vec<LogError>) -> Option<LogError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(LogError::Multiple(errors)),
        }
    }
}

/// Error returned by a metric's read function.
#[derive(Debug, Clone, Error)]
#[error("Failed to read metric: {0}")]
pub struct MetricError(pub String);

impl MetricError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Result type alias for logging operations.
pub type Result<T> = std::result::Result<T, LogError>;
