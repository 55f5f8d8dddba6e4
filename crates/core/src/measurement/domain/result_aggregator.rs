use super::config::{EngineSettings, EstimatorKind, Metric, SessionConfig};
use super::estimators::heart_rate::HeartRateEstimator;
use super::estimators::{default_estimator, EstimatorInput, MetricEstimator};
use super::heartbeat::{Heartbeat, HeartbeatDetector};
use super::results::{MeasurementResults, MomentaryHrValue};
use super::signal_buffer::SignalBuffer;

pub const SHORT_HR_WINDOW_SEC: f64 = 4.0;
pub const LONG_HR_WINDOW_SEC: f64 = 10.0;

/// Heart-rate histories keep at most this much time.
const MAX_HISTORY_SEC: f64 = 3600.0;

/// Realtime, live and summary snapshots, all derived from the signal buffer.
pub struct ResultAggregator {
    config: SessionConfig,
    tick_interval_sec: f64,
    detector: HeartbeatDetector,
    estimators: Vec<Box<dyn MetricEstimator>>,
    hr_estimator: HeartRateEstimator,
    last_tick: Option<f64>,
    current: Option<MeasurementResults>,
    hr_4s: Option<f64>,
    hr_10s: Option<f64>,
    history_4s: Vec<MomentaryHrValue>,
    history_10s: Vec<MomentaryHrValue>,
    summary: Option<MeasurementResults>,
}

impl ResultAggregator {
    pub fn new(config: SessionConfig, settings: &EngineSettings) -> Self {
        let estimators: Vec<Box<dyn MetricEstimator>> = config
            .active_estimators()
            .into_iter()
            .map(default_estimator)
            .collect();

        for estimator in &estimators {
            let min_window = estimator.requirements().min_window_sec;
            if let Some(period) = config.realtime_period(estimator.kind()) {
                if period < min_window {
                    log::warn!(
                        "Realtime period {period}s for {:?} raised to its {min_window}s minimum",
                        estimator.kind()
                    );
                }
            }
        }

        Self {
            config,
            tick_interval_sec: settings.tick_interval_sec,
            detector: HeartbeatDetector::new(settings.beat_min_quality),
            estimators,
            hr_estimator: HeartRateEstimator::default(),
            last_tick: None,
            current: None,
            hr_4s: None,
            hr_10s: None,
            history_4s: Vec::new(),
            history_10s: Vec::new(),
            summary: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Instant metrics over exactly the trailing `period_sec`. `None` until
    /// the buffer holds running data.
    pub fn realtime_metrics(
        &self,
        buffer: &SignalBuffer,
        period_sec: f64,
        good_signal_sec: f64,
    ) -> Option<MeasurementResults> {
        if buffer.is_empty() {
            return None;
        }
        Some(self.snapshot(
            buffer,
            &self.config.instant_metrics,
            good_signal_sec,
            |_| Some(period_sec),
        ))
    }

    /// Recomputes the live snapshot and heart-rate histories when a tick
    /// interval has passed since the last one.
    pub fn on_tick(&mut self, buffer: &SignalBuffer, timestamp_sec: f64, good_signal_sec: f64) {
        if self
            .last_tick
            .is_some_and(|last| timestamp_sec - last < self.tick_interval_sec)
            || buffer.is_empty()
        {
            return;
        }
        self.last_tick = Some(timestamp_sec);

        let config = &self.config;
        let current = self.snapshot(buffer, &config.instant_metrics, good_signal_sec, |est| {
            config
                .realtime_period(est.kind())
                .map(|p| p.max(est.requirements().min_window_sec))
        });
        log::debug!("Live metrics at {timestamp_sec:.2}s: {current:?}");
        self.current = Some(current);

        self.hr_4s = self.short_heart_rate(buffer, SHORT_HR_WINDOW_SEC);
        self.hr_10s = self.short_heart_rate(buffer, LONG_HR_WINDOW_SEC);
        push_history(&mut self.history_4s, timestamp_sec, self.hr_4s);
        push_history(&mut self.history_10s, timestamp_sec, self.hr_10s);
    }

    /// Whole-session summary. Computed on the first call only.
    pub fn finalize(&mut self, buffer: &SignalBuffer, good_signal_sec: f64) -> &MeasurementResults {
        if self.summary.is_none() {
            let metrics = &self.config.summary_metrics;
            let summary = self.snapshot(buffer, metrics, good_signal_sec, |_| None);
            log::info!(
                "Summary over {:.1}s: {} heartbeats, quality {:.2}",
                buffer.full_window().span_sec(),
                summary.heartbeats.len(),
                summary.average_signal_quality
            );
            self.summary = Some(summary);
        }
        self.summary.get_or_insert_with(MeasurementResults::default)
    }

    pub fn current_metrics(&self) -> Option<&MeasurementResults> {
        self.current.as_ref()
    }

    pub fn summary(&self) -> Option<&MeasurementResults> {
        self.summary.as_ref()
    }

    pub fn heart_rate_4s(&self) -> Option<f64> {
        self.hr_4s
    }

    pub fn heart_rate_10s(&self) -> Option<f64> {
        self.hr_10s
    }

    pub fn heart_rate_history_4s(&self, max_time_sec: Option<f64>) -> Vec<MomentaryHrValue> {
        trailing_history(&self.history_4s, max_time_sec)
    }

    pub fn heart_rate_history_10s(&self, max_time_sec: Option<f64>) -> Vec<MomentaryHrValue> {
        trailing_history(&self.history_10s, max_time_sec)
    }

    /// Beats over the trailing `max_time_sec`, or the whole retained span.
    pub fn realtime_heartbeats(
        &self,
        buffer: &SignalBuffer,
        max_time_sec: Option<f64>,
    ) -> Vec<Heartbeat> {
        self.detector.detect(buffer, max_time_sec)
    }

    /// Runs every estimator serving `metrics`, each over the window chosen by
    /// `period_for` (`None` = whole retained span). Heartbeats and signal
    /// quality cover the widest window used.
    fn snapshot(
        &self,
        buffer: &SignalBuffer,
        metrics: &[Metric],
        good_signal_sec: f64,
        period_for: impl Fn(&dyn MetricEstimator) -> Option<f64>,
    ) -> MeasurementResults {
        let wanted: Vec<EstimatorKind> = SessionConfig::estimators_for(metrics);
        let mut results = MeasurementResults::default();
        let mut beats_by_period: Vec<(Option<f64>, Vec<Heartbeat>)> = Vec::new();
        let mut widest: Option<Option<f64>> = None;

        for estimator in self.estimators.iter().filter(|e| wanted.contains(&e.kind())) {
            let period = period_for(estimator.as_ref());
            widest = Some(match widest {
                None => period,
                Some(None) => None,
                Some(Some(w)) => period.map(|p| p.max(w)),
            });

            let window = match period {
                Some(p) => buffer.window(p),
                None => buffer.full_window(),
            };
            let idx = match beats_by_period.iter().position(|(p, _)| *p == period) {
                Some(idx) => idx,
                None => {
                    beats_by_period.push((period, self.detector.detect(buffer, period)));
                    beats_by_period.len() - 1
                }
            };
            let input = EstimatorInput {
                window: &window,
                heartbeats: &beats_by_period[idx].1,
                good_signal_sec,
            };
            if let Some(output) = estimator.evaluate(&input) {
                output.apply(&mut results, metrics);
            }
        }

        let widest = widest.unwrap_or(None);
        results.heartbeats = match beats_by_period.into_iter().find(|(p, _)| *p == widest) {
            Some((_, beats)) => beats,
            None => self.detector.detect(buffer, widest),
        };
        results.average_signal_quality = buffer
            .admitted_ratio(widest.unwrap_or(f64::INFINITY))
            .unwrap_or(0.0);
        results
    }

    fn short_heart_rate(&self, buffer: &SignalBuffer, period_sec: f64) -> Option<f64> {
        let window = buffer.window(period_sec);
        let input = EstimatorInput {
            window: &window,
            heartbeats: &[],
            good_signal_sec: 0.0,
        };
        if !self.hr_estimator.requirements().is_met(&input) {
            return None;
        }
        self.hr_estimator.heart_rate_bpm(&input)
    }
}

fn push_history(history: &mut Vec<MomentaryHrValue>, timestamp_sec: f64, hr_bpm: Option<f64>) {
    if let Some(hr_bpm) = hr_bpm {
        history.push(MomentaryHrValue {
            timestamp_sec,
            hr_bpm,
        });
    }
    let cutoff = timestamp_sec - MAX_HISTORY_SEC;
    let stale = history.partition_point(|v| v.timestamp_sec < cutoff);
    history.drain(..stale);
}

fn trailing_history(
    history: &[MomentaryHrValue],
    max_time_sec: Option<f64>,
) -> Vec<MomentaryHrValue> {
    match (max_time_sec, history.last()) {
        (Some(max), Some(last)) => {
            let cutoff = last.timestamp_sec - max;
            history
                .iter()
                .filter(|v| v.timestamp_sec >= cutoff)
                .copied()
                .collect()
        }
        _ => history.to_vec(),
    }
}
