//! Coordinated provider shutdown.
//!
//! Each provider shutdown blocks on network I/O, so it runs on the blocking
//! pool. The three shutdowns run concurrently and fail independently. The SDK
//! bounds every shutdown with the exporter timeout, so each one is joined;
//! the cancellation token decides whether a timeout counts as a failure.

use std::sync::Arc;

use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tokio_util::sync::CancellationToken;

use crate::error::{ShutdownError, Signal, StopError};

/// A signal provider owned by the lifecycle.
pub trait ProviderHandle: Send + Sync {
    /// Flush pending data and release the exporter. Blocking.
    fn shutdown(&self) -> OTelSdkResult;

    /// Make this provider the process-global one for its signal.
    fn install_global(&self) {}
}

impl ProviderHandle for SdkLoggerProvider {
    fn shutdown(&self) -> OTelSdkResult {
        SdkLoggerProvider::shutdown(self)
    }
}

impl ProviderHandle for SdkMeterProvider {
    fn shutdown(&self) -> OTelSdkResult {
        SdkMeterProvider::shutdown(self)
    }

    fn install_global(&self) {
        opentelemetry::global::set_meter_provider(self.clone());
    }
}

impl ProviderHandle for SdkTracerProvider {
    fn shutdown(&self) -> OTelSdkResult {
        SdkTracerProvider::shutdown(self)
    }

    fn install_global(&self) {
        opentelemetry::global::set_tracer_provider(self.clone());
    }
}

/// Classify one shutdown outcome.
///
/// A timeout observed once `cancel` has fired is the stop running out of
/// time and maps to [`ShutdownError::Cancelled`]. Every other error is kept,
/// cancelled or not.
fn classify(result: OTelSdkResult, cancel: &CancellationToken) -> Result<(), ShutdownError> {
    match result {
        Ok(()) => Ok(()),
        Err(OTelSdkError::Timeout(_)) if cancel.is_cancelled() => Err(ShutdownError::Cancelled),
        Err(e) => Err(ShutdownError::Failed(e.to_string())),
    }
}

/// Shut one provider down and wait for its result.
pub async fn shutdown_one(
    provider: Option<Arc<dyn ProviderHandle>>,
    cancel: &CancellationToken,
) -> Result<(), ShutdownError> {
    let Some(provider) = provider else {
        return Ok(());
    };

    match tokio::task::spawn_blocking(move || provider.shutdown()).await {
        Ok(result) => classify(result, cancel),
        Err(e) => Err(ShutdownError::Panicked(e.to_string())),
    }
}

/// The providers built for one run. Any of them may be absent.
#[derive(Clone, Default)]
pub struct Providers {
    pub logs: Option<Arc<dyn ProviderHandle>>,
    pub metrics: Option<Arc<dyn ProviderHandle>>,
    pub traces: Option<Arc<dyn ProviderHandle>>,
}

impl Providers {
    pub fn is_empty(&self) -> bool {
        self.logs.is_none() && self.metrics.is_none() && self.traces.is_none()
    }

    /// Shut every provider down concurrently.
    ///
    /// Cancellations are dropped from the result; every other failure is
    /// reported.
    pub async fn shutdown_all(self, cancel: &CancellationToken) -> Result<(), StopError> {
        let (logs, metrics, traces) = tokio::join!(
            shutdown_one(self.logs, cancel),
            shutdown_one(self.metrics, cancel),
            shutdown_one(self.traces, cancel),
        );

        match StopError::from_results(vec![
            (Signal::Logs, logs),
            (Signal::Metrics, metrics),
            (Signal::Traces, traces),
        ]) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl ProviderHandle for Counting {
        fn shutdown(&self) -> OTelSdkResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Panicking;

    impl ProviderHandle for Panicking {
        fn shutdown(&self) -> OTelSdkResult {
            panic!("exporter poisoned");
        }
    }

    #[tokio::test]
    async fn test_absent_provider_is_ok() {
        let cancel = CancellationToken::new();
        assert!(shutdown_one(None, &cancel).await.is_ok());
        assert!(Providers::default().shutdown_all(&cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_every_provider_is_shut_down() {
        let provider = Arc::new(Counting::default());
        let providers = Providers {
            logs: Some(provider.clone()),
            metrics: Some(provider.clone()),
            traces: Some(provider.clone()),
        };

        providers
            .shutdown_all(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provider.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let result = shutdown_one(Some(Arc::new(Panicking)), &CancellationToken::new()).await;
        assert!(matches!(result, Err(ShutdownError::Panicked(_))));
    }

    #[test]
    fn test_timeout_is_cancelled_only_after_cancellation() {
        let cancel = CancellationToken::new();
        let timeout = || Err(OTelSdkError::Timeout(Duration::from_secs(5)));

        assert!(matches!(
            classify(timeout(), &cancel),
            Err(ShutdownError::Failed(_))
        ));

        cancel.cancel();
        assert_eq!(classify(timeout(), &cancel), Err(ShutdownError::Cancelled));
        assert_eq!(
            classify(Err(OTelSdkError::InternalFailure("X".into())), &cancel),
            Err(ShutdownError::Failed("Operation failed: X".into()))
        );
    }

    #[tokio::test]
    async fn test_sdk_providers_without_exporters() {
        let providers = Providers {
            logs: Some(Arc::new(SdkLoggerProvider::builder().build())),
            metrics: Some(Arc::new(SdkMeterProvider::builder().build())),
            traces: Some(Arc::new(SdkTracerProvider::builder().build())),
        };

        assert!(providers.shutdown_all(&CancellationToken::new()).await.is_ok());
    }
}
