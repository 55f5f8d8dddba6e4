pub mod blood_pressure;
pub mod breathing_rate;
pub mod cardiac_stress;
pub mod cardiac_workload;
pub mod heart_rate;
pub mod hrv;

use super::config::{EstimatorKind, Metric};
use super::heartbeat::Heartbeat;
use super::results::MeasurementResults;
use super::signal_buffer::SignalWindow;

/// Slack for comparing window spans built from float timestamps.
const SPAN_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowRequirement {
    pub min_window_sec: f64,
    /// Admitted samples per second of window.
    pub min_sample_rate_hz: f64,
    pub min_heartbeats: usize,
    /// Accumulated seconds of `RunningSignalGood` in the session.
    pub min_good_signal_sec: f64,
}

impl WindowRequirement {
    pub fn is_met(&self, input: &EstimatorInput) -> bool {
        let span = input.window.span_sec();
        if span + SPAN_EPSILON < self.min_window_sec || span <= 0.0 {
            return false;
        }
        let rate = input.window.len() as f64 / span;
        rate >= self.min_sample_rate_hz
            && input.heartbeats.len() >= self.min_heartbeats
            && input.good_signal_sec + SPAN_EPSILON >= self.min_good_signal_sec
    }
}

pub struct EstimatorInput<'a> {
    pub window: &'a SignalWindow,
    pub heartbeats: &'a [Heartbeat],
    pub good_signal_sec: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EstimatorOutput {
    HeartRate(f64),
    Hrv {
        sdnn_ms: f64,
        ln_rmssd: Option<f64>,
    },
    BreathingRate(f64),
    BloodPressure {
        systolic: f64,
        diastolic: f64,
    },
    CardiacWorkload(f64),
    CardiacStress {
        stress_index: Option<f64>,
        pns_activity: f64,
    },
}

impl EstimatorOutput {
    /// Writes the fields of the metrics in `metrics` into `results`.
    pub fn apply(&self, results: &mut MeasurementResults, metrics: &[Metric]) {
        let wants = |m: Metric| metrics.contains(&m);
        match *self {
            EstimatorOutput::HeartRate(bpm) if wants(Metric::HeartRate) => {
                results.heart_rate_bpm = Some(bpm);
            }
            EstimatorOutput::Hrv { sdnn_ms, ln_rmssd } if wants(Metric::HrvSdnn) => {
                results.hrv_sdnn_ms = Some(sdnn_ms);
                results.hrv_lnrmssd_ms = ln_rmssd;
            }
            EstimatorOutput::BreathingRate(bpm) if wants(Metric::BreathingRate) => {
                results.breathing_rate_bpm = Some(bpm);
            }
            EstimatorOutput::BloodPressure {
                systolic,
                diastolic,
            } => {
                if wants(Metric::SystolicBp) {
                    results.systolic_blood_pressure_mmhg = Some(systolic);
                }
                if wants(Metric::DiastolicBp) {
                    results.diastolic_blood_pressure_mmhg = Some(diastolic);
                }
            }
            EstimatorOutput::CardiacWorkload(value) if wants(Metric::CardiacWorkload) => {
                results.cardiac_workload_mmhg_per_sec = Some(value);
            }
            EstimatorOutput::CardiacStress {
                stress_index,
                pns_activity,
            } => {
                if wants(Metric::CardiacStress) {
                    results.stress_index = stress_index;
                }
                if wants(Metric::PnsActivity) {
                    results.parasympathetic_activity = Some(pns_activity);
                }
            }
            _ => {}
        }
    }
}

/// Domain interface for one metric family. An estimator only runs once its
/// [`WindowRequirement`] is met; below it the metric stays `None`.
pub trait MetricEstimator: Send {
    fn kind(&self) -> EstimatorKind;

    fn requirements(&self) -> WindowRequirement;

    /// Computes the metric assuming requirements are met. May still return
    /// `None` when the data turns out unusable.
    fn estimate(&self, input: &EstimatorInput) -> Option<EstimatorOutput>;

    /// Requirement-gated [`estimate`](Self::estimate).
    fn evaluate(&self, input: &EstimatorInput) -> Option<EstimatorOutput> {
        if !self.requirements().is_met(input) {
            return None;
        }
        self.estimate(input)
    }
}

/// Default estimator for each kind.
pub fn default_estimator(kind: EstimatorKind) -> Box<dyn MetricEstimator> {
    match kind {
        EstimatorKind::HeartRate => Box::new(heart_rate::HeartRateEstimator::default()),
        EstimatorKind::Hrv => Box::new(hrv::HrvEstimator::default()),
        EstimatorKind::BreathingRate => Box::new(breathing_rate::BreathingRateEstimator::default()),
        EstimatorKind::BloodPressure => Box::new(blood_pressure::BloodPressureEstimator::default()),
        EstimatorKind::CardiacWorkload => {
            Box::new(cardiac_workload::CardiacWorkloadEstimator::default())
        }
        EstimatorKind::CardiacStress => Box::new(cardiac_stress::CardiacStressEstimator::default()),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::pulse_window;
    use super::*;

    fn requirement() -> WindowRequirement {
        WindowRequirement {
            min_window_sec: 4.0,
            min_sample_rate_hz: 10.0,
            min_heartbeats: 0,
            min_good_signal_sec: 0.0,
        }
    }

    #[test]
    fn test_requirement_boundary_is_inclusive() {
        // 121 samples at 30 Hz span exactly 4 s
        let exact = pulse_window(72.0, 15.0, 121);
        let short = pulse_window(72.0, 15.0, 120);
        fn input(w: &SignalWindow) -> EstimatorInput<'_> {
            EstimatorInput {
                window: w,
                heartbeats: &[],
                good_signal_sec: 0.0,
            }
        }
        assert!(requirement().is_met(&input(&exact)));
        assert!(!requirement().is_met(&input(&short)));
    }

    #[test]
    fn test_requirement_checks_density_and_beats() {
        let mut sparse = SignalWindow::default();
        for i in 0..6 {
            sparse.timestamps.push(i as f64);
            sparse.values.push(0.0);
        }
        let input = EstimatorInput {
            window: &sparse,
            heartbeats: &[],
            good_signal_sec: 0.0,
        };
        assert!(!requirement().is_met(&input));

        let dense = pulse_window(72.0, 15.0, 300);
        let needs_beats = WindowRequirement {
            min_heartbeats: 5,
            ..requirement()
        };
        let input = EstimatorInput {
            window: &dense,
            heartbeats: &[],
            good_signal_sec: 0.0,
        };
        assert!(!needs_beats.is_met(&input));
    }

    #[test]
    fn test_apply_respects_metric_selection() {
        let mut results = MeasurementResults::default();
        let bp = EstimatorOutput::BloodPressure {
            systolic: 120.0,
            diastolic: 80.0,
        };
        bp.apply(&mut results, &[Metric::SystolicBp]);
        EstimatorOutput::HeartRate(70.0).apply(&mut results, &[Metric::SystolicBp]);

        assert_eq!(results.systolic_blood_pressure_mmhg, Some(120.0));
        assert_eq!(results.diastolic_blood_pressure_mmhg, None);
        assert_eq!(results.heart_rate_bpm, None);
    }

    #[test]
    fn test_default_estimators_report_their_kind() {
        for kind in [
            EstimatorKind::HeartRate,
            EstimatorKind::Hrv,
            EstimatorKind::BreathingRate,
            EstimatorKind::BloodPressure,
            EstimatorKind::CardiacWorkload,
            EstimatorKind::CardiacStress,
        ] {
            assert_eq!(default_estimator(kind).kind(), kind);
        }
    }
}
