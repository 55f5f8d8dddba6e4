use crate::measurement::domain::config::EstimatorKind;
use crate::measurement::domain::dsp;
use crate::measurement::domain::heartbeat::{intervals_ms, CARDIAC_BAND_HZ};

use super::{EstimatorInput, EstimatorOutput, MetricEstimator, WindowRequirement};

pub const MIN_WINDOW_SEC: f64 = 40.0;
pub const MIN_GOOD_SIGNAL_SEC: f64 = 30.0;
pub const MIN_HEARTBEATS: usize = 10;

/// Minimum systolic-diastolic gap.
const MIN_PULSE_PRESSURE: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PulseFeatures {
    pub heart_rate_bpm: f64,
    pub rise_ratio: f64,
}

/// `value = base + hr_coef * (hr - 70) + rise_coef * (rise - 0.3)`,
/// clamped to `range`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearPressure {
    pub base: f64,
    pub hr_coef: f64,
    pub rise_coef: f64,
    pub range: (f64, f64),
}

impl LinearPressure {
    fn apply(&self, f: &PulseFeatures) -> f64 {
        let value = self.base
            + self.hr_coef * (f.heart_rate_bpm - 70.0)
            + self.rise_coef * (f.rise_ratio - 0.3);
        value.clamp(self.range.0, self.range.1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BpModel {
    pub systolic: LinearPressure,
    pub diastolic: LinearPressure,
}

impl Default for BpModel {
    fn default() -> Self {
        Self {
            systolic: LinearPressure {
                base: 118.0,
                hr_coef: 0.45,
                rise_coef: -40.0,
                range: (90.0, 180.0),
            },
            diastolic: LinearPressure {
                base: 76.0,
                hr_coef: 0.25,
                rise_coef: -20.0,
                range: (50.0, 110.0),
            },
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BloodPressureEstimator {
    model: BpModel,
}

impl BloodPressureEstimator {
    pub fn new(model: BpModel) -> Self {
        Self { model }
    }

    /// `(systolic, diastolic)` in mmHg, diastolic kept below systolic.
    pub fn pressures(&self, input: &EstimatorInput) -> Option<(f64, f64)> {
        let features = pulse_features(input)?;
        let systolic = self.model.systolic.apply(&features);
        let diastolic = self
            .model
            .diastolic
            .apply(&features)
            .min(systolic - MIN_PULSE_PRESSURE);
        Some((systolic, diastolic))
    }
}

impl MetricEstimator for BloodPressureEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::BloodPressure
    }

    fn requirements(&self) -> WindowRequirement {
        bp_requirements()
    }

    fn estimate(&self, input: &EstimatorInput) -> Option<EstimatorOutput> {
        let (systolic, diastolic) = self.pressures(input)?;
        Some(EstimatorOutput::BloodPressure {
            systolic,
            diastolic,
        })
    }
}

/// Shared with cardiac workload, which depends on the same pressures.
pub(crate) fn bp_requirements() -> WindowRequirement {
    WindowRequirement {
        min_window_sec: MIN_WINDOW_SEC,
        min_sample_rate_hz: super::heart_rate::MIN_SAMPLE_RATE_HZ,
        min_heartbeats: MIN_HEARTBEATS,
        min_good_signal_sec: MIN_GOOD_SIGNAL_SEC,
    }
}

/// Mean heart rate from beat intervals and the mean rise-time ratio of
/// the beats inside the window.
pub fn pulse_features(input: &EstimatorInput) -> Option<PulseFeatures> {
    let ibis = intervals_ms(input.heartbeats);
    let heart_rate_bpm = 60_000.0 / dsp::mean(&ibis)?;

    let window = input.window;
    let t0 = *window.timestamps.first()?;
    let rate = dsp::RESAMPLE_RATE_HZ;
    let uniform = dsp::resample_uniform(&window.timestamps, &window.values, rate);
    let filtered = dsp::bandpass(
        &dsp::detrend(&uniform),
        rate,
        CARDIAC_BAND_HZ.0,
        CARDIAC_BAND_HZ.1,
    );

    let ratios: Vec<f64> = input
        .heartbeats
        .iter()
        .filter_map(|beat| {
            let start = ((beat.start_location_sec - t0) * rate).round();
            let end = ((beat.end_location_sec - t0) * rate).round();
            if start < 0.0 || end as usize >= filtered.len() || end - start < 2.0 {
                return None;
            }
            let (start, end) = (start as usize, end as usize);
            let trough = (start..=end).min_by(|&a, &b| filtered[a].total_cmp(&filtered[b]))?;
            Some((end - trough) as f64 / (end - start) as f64)
        })
        .collect();

    Some(PulseFeatures {
        heart_rate_bpm,
        rise_ratio: dsp::mean(&ratios)?,
    })
}
