use crate::measurement::domain::config::EstimatorKind;
use crate::measurement::domain::dsp;
use crate::measurement::domain::heartbeat::intervals_ms;

use super::hrv::{normal_intervals_ms, rmssd_ms, MIN_HEARTBEATS, MIN_RESOLVABLE_MS, MIN_WINDOW_SEC};
use super::{EstimatorInput, EstimatorOutput, MetricEstimator, WindowRequirement};

/// Histogram bin width for the mode of NN intervals.
const BIN_MS: f64 = 50.0;

/// Resting population norms `(mean, std)` for the PNS z-scores.
const NORM_MEAN_RR_MS: (f64, f64) = (926.0, 90.0);
const NORM_RMSSD_MS: (f64, f64) = (42.0, 15.0);
const NORM_SD1_PERCENT: (f64, f64) = (3.12, 1.17);

/// Square root of Baevsky's `AMo / (2 * Mo * MxDMn)`, with AMo in percent
/// and Mo, MxDMn in seconds. `None` when all intervals are equal.
pub fn stress_index(nn: &[f64]) -> Option<f64> {
    let min = nn.iter().copied().reduce(f64::min)?;
    let max = nn.iter().copied().reduce(f64::max)?;
    if max - min < MIN_RESOLVABLE_MS {
        return None;
    }
    let spread_sec = (max - min) / 1000.0;

    let bin_of = |ibi: f64| (ibi / BIN_MS + 1e-6).floor() as i64;
    let mut counts: Vec<(i64, usize)> = Vec::new();
    for &ibi in nn {
        let bin = bin_of(ibi);
        match counts.iter_mut().find(|(b, _)| *b == bin) {
            Some((_, count)) => *count += 1,
            None => counts.push((bin, 1)),
        }
    }
    counts.sort_by_key(|&(bin, _)| bin);
    let &(mode_bin, mode_count) = counts
        .iter()
        .reduce(|best, cur| if cur.1 > best.1 { cur } else { best })?;

    let mode_sec = (mode_bin as f64 + 0.5) * BIN_MS / 1000.0;
    let amplitude_percent = mode_count as f64 / nn.len() as f64 * 100.0;
    Some((amplitude_percent / (2.0 * mode_sec * spread_sec)).sqrt())
}

/// Mean z-score of mean RR, RMSSD and SD1 (percent of mean RR) against
/// resting norms. Around zero at rest, positive with vagal dominance.
pub fn pns_index(nn: &[f64]) -> Option<f64> {
    let mean_rr = dsp::mean(nn)?;
    let rmssd = rmssd_ms(nn)?;
    let sd1_percent = rmssd / std::f64::consts::SQRT_2 / mean_rr * 100.0;
    let z = |value: f64, (mean, std): (f64, f64)| (value - mean) / std;
    Some(
        (z(mean_rr, NORM_MEAN_RR_MS) + z(rmssd, NORM_RMSSD_MS) + z(sd1_percent, NORM_SD1_PERCENT))
            / 3.0,
    )
}

#[derive(Clone, Debug, Default)]
pub struct CardiacStressEstimator;

impl MetricEstimator for CardiacStressEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::CardiacStress
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
        Some(EstimatorOutput::CardiacStress {
            stress_index: stress_index(&nn),
            pns_activity: pns_index(&nn)?,
        })
    }
}
