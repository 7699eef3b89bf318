//! Beacon Logging
//!
//! Product logging for Beacon components. Every logger handed out shares one
//! root core that fans entries out to:
//!
//! - the local stderr output ([`StdCore`]), text or JSON
//! - a [`BridgeCore`] that buffers entries until an exporter core is
//!   registered, then forwards to it
//!
//! The root applies the configured field prefix and level floor before an
//! entry reaches either backend.

pub mod bridge;
pub mod config;
pub mod layer;
pub mod root;
pub mod std_core;

use std::sync::{Arc, OnceLock};

use tracing_subscriber::fmt::MakeWriter;

use beacon_common::{
    ConfigError, LogCore, LogError, LogExporterHook, Logger, LoggerProvider,
};

pub use bridge::{BUFFER_CAPACITY, BridgeCore};
pub use config::{LogFormat, LoggingConfig};
pub use layer::LogCoreLayer;
pub use root::{RootCore, TeeCore, prefix_fields};
pub use std_core::{Encoding, LineFormat, StdCore};

/// The logging module: hands out loggers and accepts an exporter core.
pub struct Logging {
    config: LoggingConfig,
    local: StdCore,
    bridge: OnceLock<BridgeCore>,
    root: OnceLock<Logger>,
}

impl Logging {
    /// Create the logging module, writing to stderr.
    pub fn new(config: LoggingConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            local: local_core(&config, std::io::stderr),
            config,
            bridge: OnceLock::new(),
            root: OnceLock::new(),
        })
    }

    /// Send local output to `writer` instead of stderr.
    ///
    /// Only effective before the first logger is handed out.
    pub fn with_writer<W>(mut self, make_writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        self.local = local_core(&self.config, make_writer);
        self
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// The bridge to the exporter core, created on first use.
    pub fn bridge(&self) -> &BridgeCore {
        self.bridge
            .get_or_init(|| BridgeCore::new(self.config.log_level()))
    }

    /// The root logger every component logger derives from.
    pub fn root(&self) -> &Logger {
        self.root.get_or_init(|| {
            let prefix = self.config.fields_prefix.as_str();
            let floor = self.config.floor_level();

            let local: Arc<dyn LogCore> = Arc::new(self.local.clone());
            let bridge: Arc<dyn LogCore> = Arc::new(self.bridge().clone());

            let tee = TeeCore::new(vec![
                Arc::new(RootCore::new(local, prefix, floor)),
                Arc::new(RootCore::new(bridge, prefix, floor)),
            ]);

            Logger::new(Arc::new(tee))
        })
    }

    /// Logger named after `component`.
    pub fn logger(&self, component: &str) -> Logger {
        self.root().named(component)
    }

    /// `tracing` layer feeding events into the root logger.
    pub fn layer(&self) -> LogCoreLayer {
        LogCoreLayer::new(self.root().clone())
    }

    /// Attach the exporter core. Entries buffered so far are replayed into it.
    pub fn register_core(&self, core: Arc<dyn LogCore>) -> Result<(), LogError> {
        self.bridge().register_target(core)
    }

    /// Flush local output and the exporter core.
    pub fn sync(&self) -> Result<(), LogError> {
        self.root().sync()
    }
}

fn local_core<W>(config: &LoggingConfig, make_writer: W) -> StdCore
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let format = LineFormat::new(
        Encoding::resolve(config.log_format()),
        config.enable_gcp_fields,
    );
    StdCore::new(config.log_level(), format, make_writer)
}

impl LoggerProvider for Logging {
    fn logger(&self, component: &str) -> Result<Logger, LogError> {
        Ok(Logging::logger(self, component))
    }
}

impl LogExporterHook for Logging {
    fn register_core(&self, core: Arc<dyn LogCore>) -> Result<(), LogError> {
        Logging::register_core(self, core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_common::Level;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };

        assert!(Logging::new(config).is_err());
    }

    #[test]
    fn test_loggers_share_one_bridge() {
        let logging = Logging::new(LoggingConfig::default()).unwrap();

        let api = logging.logger("api");
        let db = logging.logger("db");
        assert_eq!(api.name(), "api");

        api.info("one", &[]);
        db.info("two", &[]);
        db.debug("filtered", &[]);

        assert_eq!(logging.bridge().buffered_len(), 2);
        assert!(!logging.bridge().is_attached());
        assert!(api.enabled(Level::Info));
    }
}
