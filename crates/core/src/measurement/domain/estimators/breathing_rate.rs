use crate::measurement::domain::config::EstimatorKind;
use crate::measurement::domain::dsp;

use super::{EstimatorInput, EstimatorOutput, MetricEstimator, WindowRequirement};

pub const MIN_WINDOW_SEC: f64 = 40.0;

/// 6 to 30 breaths per minute.
pub const RESPIRATORY_BAND_HZ: (f64, f64) = (0.1, 0.5);

/// Breathing rate from the low-frequency baseline modulation of the pulse
/// signal.
#[derive(Clone, Debug, Default)]
pub struct BreathingRateEstimator;

impl MetricEstimator for BreathingRateEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::BreathingRate
    }

    fn requirements(&self) -> WindowRequirement {
        WindowRequirement {
            min_window_sec: MIN_WINDOW_SEC,
            min_sample_rate_hz: super::heart_rate::MIN_SAMPLE_RATE_HZ,
            min_heartbeats: 0,
            min_good_signal_sec: 0.0,
        }
    }

    fn estimate(&self, input: &EstimatorInput) -> Option<EstimatorOutput> {
        let rate = dsp::RESAMPLE_RATE_HZ;
        let uniform = dsp::resample_uniform(&input.window.timestamps, &input.window.values, rate);
        let peak = dsp::dominant_frequency(
            &dsp::detrend(&uniform),
            rate,
            RESPIRATORY_BAND_HZ.0,
            RESPIRATORY_BAND_HZ.1,
        )?;
        Some(EstimatorOutput::BreathingRate(peak.frequency_hz * 60.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::domain::estimators::test_support::pulse_window;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(12.0)]
    #[case(15.0)]
    #[case(20.0)]
    fn test_breathing_rate(#[case] br: f64) {
        let window = pulse_window(72.0, br, 1501);
        let out = BreathingRateEstimator.evaluate(&EstimatorInput {
            window: &window,
            heartbeats: &[],
            good_signal_sec: 0.0,
        });
        let Some(EstimatorOutput::BreathingRate(bpm)) = out else {
            panic!("expected breathing rate, got {out:?}");
        };
        assert_relative_eq!(bpm, br, epsilon = 1.0);
    }

    #[test]
    fn test_short_window_is_none() {
        let window = pulse_window(72.0, 15.0, 900);
        let input = EstimatorInput {
            window: &window,
            heartbeats: &[],
            good_signal_sec: 0.0,
        };
        assert!(BreathingRateEstimator.evaluate(&input).is_none());
    }
}
