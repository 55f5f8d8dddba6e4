use crate::measurement::domain::config::EstimatorKind;
use crate::measurement::domain::dsp;
use crate::measurement::domain::heartbeat::intervals_ms;

use super::{EstimatorInput, EstimatorOutput, MetricEstimator, WindowRequirement};

pub const MIN_WINDOW_SEC: f64 = 40.0;
pub const MIN_HEARTBEATS: usize = 20;

/// Interval differences below this are timestamp rounding, not variability.
pub const MIN_RESOLVABLE_MS: f64 = 1e-6;

/// Intervals further than this fraction from the median are ectopic or
/// missed beats.
const OUTLIER_TOLERANCE: f64 = 0.3;

/// Normal-to-normal intervals: IBIs within tolerance of their median.
pub fn normal_intervals_ms(ibis: &[f64]) -> Vec<f64> {
    let Some(median) = dsp::median(ibis) else {
        return Vec::new();
    };
    ibis.iter()
        .copied()
        .filter(|ibi| (ibi - median).abs() <= OUTLIER_TOLERANCE * median)
        .collect()
}

/// Sample standard deviation of NN intervals.
pub fn sdnn_ms(nn: &[f64]) -> Option<f64> {
    if nn.len() < 2 {
        return None;
    }
    let mean = dsp::mean(nn)?;
    let var = nn.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (nn.len() - 1) as f64;
    Some(var.sqrt())
}

/// Root mean square of successive NN differences.
pub fn rmssd_ms(nn: &[f64]) -> Option<f64> {
    if nn.len() < 2 {
        return None;
    }
    let sum_sq: f64 = nn.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    Some((sum_sq / (nn.len() - 1) as f64).sqrt())
}

#[derive(Clone, Debug, Default)]
pub struct HrvEstimator;

impl MetricEstimator for HrvEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Hrv
    }

    fn requirements(&self) -> WindowRequirement {
        WindowRequirement {
            min_window_sec: MIN_WINDOW_SEC,
            min_sample_rate_hz: super::heart_rate::MIN_SAMPLE_RATE_HZ,
            min_heartbeats: MIN_HEARTBEATS,
            min_good_signal_sec: 0.0,
        }
    }

    fn estimate(&self, input: &EstimatorInput) -> Option<EstimatorOutput> {
        let nn = normal_intervals_ms(&intervals_ms(input.heartbeats));
        if nn.len() < MIN_HEARTBEATS {
            return None;
        }
        let sdnn = sdnn_ms(&nn)?;
        // ln of a zero RMSSD is undefined
        let ln_rmssd = rmssd_ms(&nn).filter(|r| *r >= MIN_RESOLVABLE_MS).map(f64::ln);
        Some(EstimatorOutput::Hrv {
            sdnn_ms: sdnn,
            ln_rmssd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::domain::estimators::test_support::{
        alternating_beats, pulse_window, regular_beats,
    };
    use crate::measurement::domain::heartbeat::Heartbeat;
    use crate::measurement::domain::signal_buffer::SignalWindow;
    use approx::assert_relative_eq;

    fn evaluate(window: &SignalWindow, beats: &[Heartbeat]) -> Option<EstimatorOutput> {
        HrvEstimator.evaluate(&EstimatorInput {
            window,
            heartbeats: beats,
            good_signal_sec: 0.0,
        })
    }

    #[test]
    fn test_alternating_intervals() {
        let window = pulse_window(70.0, 15.0, 1201);
        let beats = alternating_beats(800.0, 900.0, 40);
        let Some(EstimatorOutput::Hrv { sdnn_ms, ln_rmssd }) = evaluate(&window, &beats) else {
            panic!("expected HRV output");
        };
        let expected_sdnn = 50.0 * (40.0f64 / 39.0).sqrt();
        assert_relative_eq!(sdnn_ms, expected_sdnn, epsilon = 1e-6);
        assert_relative_eq!(ln_rmssd.unwrap(), 100.0f64.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_perfectly_regular_rhythm_has_no_ln_rmssd() {
        let window = pulse_window(75.0, 15.0, 1201);
        let beats = regular_beats(800.0, 30);
        let Some(EstimatorOutput::Hrv { sdnn_ms, ln_rmssd }) = evaluate(&window, &beats) else {
            panic!("expected HRV output");
        };
        assert_relative_eq!(sdnn_ms, 0.0, epsilon = 1e-6);
        assert!(ln_rmssd.is_none());
    }

    #[test]
    fn test_needs_forty_seconds() {
        let window = pulse_window(75.0, 15.0, 1199);
        assert!(evaluate(&window, &regular_beats(800.0, 30)).is_none());
    }

    #[test]
    fn test_needs_twenty_beats() {
        let window = pulse_window(75.0, 15.0, 1201);
        assert!(evaluate(&window, &regular_beats(800.0, 19)).is_none());
    }

    #[test]
    fn test_outliers_removed() {
        let mut ibis = vec![800.0; 20];
        ibis.push(1600.0);
        ibis.push(350.0);
        assert_eq!(normal_intervals_ms(&ibis).len(), 20);
    }
}
