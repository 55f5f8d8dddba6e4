use crate::measurement::domain::config::EstimatorKind;

use super::blood_pressure::{bp_requirements, pulse_features, BloodPressureEstimator};
use super::{EstimatorInput, EstimatorOutput, MetricEstimator, WindowRequirement};

/// Rate-pressure product per second: `SBP * HR / 60`, in mmHg/s.
#[derive(Clone, Debug, Default)]
pub struct CardiacWorkloadEstimator {
    pressure: BloodPressureEstimator,
}

impl MetricEstimator for CardiacWorkloadEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::CardiacWorkload
    }

    fn requirements(&self) -> WindowRequirement {
        bp_requirements()
    }

    fn estimate(&self, input: &EstimatorInput) -> Option<EstimatorOutput> {
        let (systolic, _) = self.pressure.pressures(input)?;
        let heart_rate = pulse_features(input)?.heart_rate_bpm;
        Some(EstimatorOutput::CardiacWorkload(systolic * heart_rate / 60.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::domain::estimators::test_support::{pulse_window, regular_beats};
    use approx::assert_relative_eq;

    #[test]
    fn test_workload_is_rate_pressure_product() {
        let window = pulse_window(75.0, 15.0, 1201);
        let beats = regular_beats(800.0, 45);
        let input = EstimatorInput {
            window: &window,
            heartbeats: &beats,
            good_signal_sec: 40.0,
        };
        let (sbp, _) = BloodPressureEstimator::default().pressures(&input).unwrap();
        let Some(EstimatorOutput::CardiacWorkload(value)) =
            CardiacWorkloadEstimator::default().evaluate(&input)
        else {
            panic!("expected workload");
        };
        assert_relative_eq!(value, sbp * 75.0 / 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_gated_like_blood_pressure() {
        let window = pulse_window(75.0, 15.0, 1201);
        let beats = regular_beats(800.0, 45);
        let input = EstimatorInput {
            window: &window,
            heartbeats: &beats,
            good_signal_sec: 10.0,
        };
        assert!(CardiacWorkloadEstimator::default().evaluate(&input).is_none());
    }
}
