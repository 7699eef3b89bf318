use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T, ConfigError> {
    Ok(json5::from_str(content)?)
}

/// Accumulates validation issues so that every problem is reported at once.
#[derive(Debug, Default)]
pub struct Issues(Vec<String>);

impl Issues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue.
    pub fn push(&mut self, issue: impl Into<String>) {
        self.0.push(issue.into());
    }

    /// Record an issue when `failed` is true.
    pub fn check(&mut self, failed: bool, issue: impl Into<String>) {
        if failed {
            self.push(issue);
        }
    }

    /// Merge the issues of a nested validation.
    pub fn extend(&mut self, result: Result<(), ConfigError>) {
        if let Err(err) = result {
            match err {
                ConfigError::Validation(issues) => self.0.extend(issues),
                other => self.0.push(other.to_string()),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok` when nothing was recorded.
    pub fn finish(self) -> Result<(), ConfigError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(self.0))
        }
    }
}
