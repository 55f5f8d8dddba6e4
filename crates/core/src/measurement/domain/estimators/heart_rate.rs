use crate::measurement::domain::config::EstimatorKind;
use crate::measurement::domain::dsp;
use crate::measurement::domain::heartbeat::CARDIAC_BAND_HZ;

use super::{EstimatorInput, EstimatorOutput, MetricEstimator, WindowRequirement};

pub const MIN_WINDOW_SEC: f64 = 4.0;
pub const MIN_SAMPLE_RATE_HZ: f64 = 10.0;

/// Spectral heart rate: dominant frequency of the detrended signal within
/// the cardiac band.
#[derive(Clone, Debug)]
pub struct HeartRateEstimator {
    band_hz: (f64, f64),
}

impl Default for HeartRateEstimator {
    fn default() -> Self {
        Self {
            band_hz: CARDIAC_BAND_HZ,
        }
    }
}

impl HeartRateEstimator {
    pub fn heart_rate_bpm(&self, input: &EstimatorInput) -> Option<f64> {
        let rate = dsp::RESAMPLE_RATE_HZ;
        let uniform = dsp::resample_uniform(&input.window.timestamps, &input.window.values, rate);
        let (low, high) = self.band_hz;
        let peak = dsp::dominant_frequency(&dsp::detrend(&uniform), rate, low, high)?;
        Some(peak.frequency_hz * 60.0)
    }
}

impl MetricEstimator for HeartRateEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::HeartRate
    }

    fn requirements(&self) -> WindowRequirement {
        WindowRequirement {
            min_window_sec: MIN_WINDOW_SEC,
            min_sample_rate_hz: MIN_SAMPLE_RATE_HZ,
            min_heartbeats: 0,
            min_good_signal_sec: 0.0,
        }
    }

    fn estimate(&self, input: &EstimatorInput) -> Option<EstimatorOutput> {
        self.heart_rate_bpm(input).map(EstimatorOutput::HeartRate)
    }
}
