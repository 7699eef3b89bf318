//! Periodic metric polling into OpenTelemetry instruments.
//!
//! Each [`Metric`] gets its own task that reads the current value on a fixed
//! interval and records it to the instrument matching its kind. Pollers stop
//! when their [`PollerSet`] is shut down.

use std::sync::Arc;
use std::time::Duration;

use beacon_common::{Field, InstrumentKind, Logger, Metric};
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Unit attached to every instrument.
pub const UNIT: &str = "{count}";

/// Something a polled value is recorded to.
pub trait Recorder: Send + Sync {
    fn record(&self, value: f64);
}

/// An OTEL instrument, one variant per [`InstrumentKind`].
///
/// Counters add each read value as a delta. Histograms record it as one
/// observation and gauges as the current value.
pub enum InstrumentRecorder {
    Counter(Counter<f64>),
    UpDownCounter(UpDownCounter<f64>),
    Histogram(Histogram<f64>),
    Gauge(Gauge<f64>),
}

impl InstrumentRecorder {
    /// Create the instrument for `metric` on `meter`.
    pub fn build(meter: &Meter, metric: &Metric) -> Self {
        let name = metric.name.clone();
        let description = metric.description.clone();

        match metric.instrument {
            InstrumentKind::Counter => Self::Counter(
                meter
                    .f64_counter(name)
                    .with_description(description)
                    .with_unit(UNIT)
                    .build(),
            ),
            InstrumentKind::UpDownCounter => Self::UpDownCounter(
                meter
                    .f64_up_down_counter(name)
                    .with_description(description)
                    .with_unit(UNIT)
                    .build(),
            ),
            InstrumentKind::Histogram => Self::Histogram(
                meter
                    .f64_histogram(name)
                    .with_description(description)
                    .with_unit(UNIT)
                    .build(),
            ),
            InstrumentKind::Gauge => Self::Gauge(
                meter
                    .f64_gauge(name)
                    .with_description(description)
                    .with_unit(UNIT)
                    .build(),
            ),
        }
    }
}

impl Recorder for InstrumentRecorder {
    fn record(&self, value: f64) {
        match self {
            Self::Counter(c) => c.add(value, &[]),
            Self::UpDownCounter(c) => c.add(value, &[]),
            Self::Histogram(h) => h.record(value, &[]),
            Self::Gauge(g) => g.record(value, &[]),
        }
    }
}

/// Reads one metric and records it on every tick.
pub struct MetricPoller {
    metric: Metric,
    recorder: Arc<dyn Recorder>,
    interval: Duration,
    logger: Logger,
}

impl MetricPoller {
    /// `interval` must be non-zero.
    pub fn new(metric: Metric, recorder: Arc<dyn Recorder>, interval: Duration, logger: Logger) -> Self {
        Self {
            metric,
            recorder,
            interval,
            logger,
        }
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    /// Read once and record. A failed read is logged and skipped.
    pub fn poll_once(&self) {
        match self.metric.read() {
            Ok(value) => self.recorder.record(value),
            Err(e) => self.logger.warn(
                "skipping metric tick",
                &[
                    Field::new("metric", self.metric.name.as_str()),
                    Field::new("error", e.to_string()),
                ],
            ),
        }
    }

    /// Poll until `cancel` fires. The first read happens immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => self.poll_once(),
            }
        }

        self.logger.debug(
            "metric poller stopped",
            &[Field::new("metric", self.metric.name.as_str())],
        );
    }
}

/// The running pollers of one lifecycle, stopped together.
pub struct PollerSet {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl PollerSet {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn `poller` on the current runtime.
    pub fn spawn(&mut self, poller: MetricPoller) {
        let token = self.token.child_token();
        self.handles.push(tokio::spawn(poller.run(token)));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel every poller and wait for all of them to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for handle in self.handles {
            // A poller only ends on cancellation; a join error means it panicked.
            let _ = handle.await;
        }
    }
}

impl Default for PollerSet {
    fn default() -> Self {
        Self::new()
    }
}
