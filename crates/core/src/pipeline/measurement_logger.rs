use std::collections::HashMap;
use std::time::Instant;

use crate::measurement::domain::measurement_state::MeasurementState;

/// Observer for a measurement run: stage timings, point metrics, progress
/// and state changes.
///
/// Keeps the executor free of any particular output mechanism so the CLI
/// and embedding hosts can each watch a run their own way.
pub trait MeasurementLogger: Send {
    /// Frames fed so far and session progress in percent.
    fn progress(&mut self, frames: usize, percent: f64);

    /// How long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A point-in-time value such as queue depth or signal quality.
    fn metric(&mut self, name: &str, value: f64);

    fn state_changed(&mut self, from: MeasurementState, to: MeasurementState);

    fn info(&mut self, message: &str);

    /// End-of-run report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. For tests and hosts with their own progress UI.
pub struct NullMeasurementLogger;

impl MeasurementLogger for NullMeasurementLogger {
    fn progress(&mut self, _frames: usize, _percent: f64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn state_changed(&mut self, _from: MeasurementState, _to: MeasurementState) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI logger: records per-stage timings and metrics, reports progress
/// every `throttle_frames` frames through `log::info!`, and prints a
/// summary at the end.
pub struct StdoutMeasurementLogger {
    throttle_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    transitions: Vec<(MeasurementState, MeasurementState)>,
    start_time: Instant,
    frames: usize,
    last_percent: f64,
    messages: Vec<String>,
}

impl StdoutMeasurementLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            transitions: Vec::new(),
            start_time: Instant::now(),
            frames: 0,
            last_percent: 0.0,
            messages: Vec::new(),
        }
    }

    /// The formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Measurement summary ({} frames, {:.1}s wall, {:.0}% progress):",
            self.frames,
            elapsed_ms / 1000.0,
            self.last_percent
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = mean(durations);
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!("  {name}: avg {:.2}", mean(&self.metrics[name])));
        }

        if let Some((_, last)) = self.transitions.last() {
            lines.push(format!(
                "  States: {} transitions, final {last:?}",
                self.transitions.len()
            ));
        }

        if self.frames > 0 && elapsed_ms > 0.0 {
            let fps = self.frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn transitions(&self) -> &[(MeasurementState, MeasurementState)] {
        &self.transitions
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Default for StdoutMeasurementLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl MeasurementLogger for StdoutMeasurementLogger {
    fn progress(&mut self, frames: usize, percent: f64) {
        self.frames = frames;
        self.last_percent = percent;
        if frames % self.throttle_frames == 0 {
            log::info!("Measuring: {frames} frames, {percent:.0}%");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn state_changed(&mut self, from: MeasurementState, to: MeasurementState) {
        self.transitions.push((from, to));
        log::info!("State: {from:?} -> {to:?}");
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
