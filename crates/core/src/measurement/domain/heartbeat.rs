use serde::{Deserialize, Serialize};

use super::dsp;
use super::signal_buffer::SignalBuffer;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub start_location_sec: f64,
    pub end_location_sec: f64,
    pub duration_ms: f64,
}

impl Heartbeat {
    pub fn new(start_location_sec: f64, end_location_sec: f64) -> Self {
        Self {
            start_location_sec,
            end_location_sec,
            duration_ms: (end_location_sec - start_location_sec) * 1000.0,
        }
    }
}

/// Inter-beat intervals in milliseconds.
pub fn intervals_ms(beats: &[Heartbeat]) -> Vec<f64> {
    beats.iter().map(|b| b.duration_ms).collect()
}

pub const CARDIAC_BAND_HZ: (f64, f64) = (0.7, 3.5);
pub const MIN_BEAT_MS: f64 = 300.0;
pub const MAX_BEAT_MS: f64 = 2000.0;

/// Peaks must rise above `mean + PEAK_THRESHOLD_STD * std` of the
/// filtered signal.
const PEAK_THRESHOLD_STD: f64 = 0.3;

/// Below this much admitted signal no beats are reported.
const MIN_SIGNAL_SEC: f64 = 2.0;

/// Picks systolic peaks from the band-passed signal with a refractory
/// period; each beat runs from one peak to the next.
#[derive(Clone, Debug)]
pub struct HeartbeatDetector {
    min_quality: f64,
}

impl HeartbeatDetector {
    /// `min_quality` is the admitted fraction a beat's span must reach.
    pub fn new(min_quality: f64) -> Self {
        Self { min_quality }
    }

    /// Beats over the trailing `period_sec`, or the whole retained buffer
    /// when `None`. Ordered by start and non-overlapping.
    pub fn detect(&self, buffer: &SignalBuffer, period_sec: Option<f64>) -> Vec<Heartbeat> {
        let window = match period_sec {
            Some(period) => buffer.window(period),
            None => buffer.full_window(),
        };
        if window.span_sec() < MIN_SIGNAL_SEC {
            return Vec::new();
        }

        let rate = dsp::RESAMPLE_RATE_HZ;
        let uniform = dsp::resample_uniform(&window.timestamps, &window.values, rate);
        let filtered = dsp::bandpass(
            &dsp::detrend(&uniform),
            rate,
            CARDIAC_BAND_HZ.0,
            CARDIAC_BAND_HZ.1,
        );

        let t0 = window.timestamps[0];
        let peaks: Vec<f64> = find_peaks(&filtered, rate)
            .into_iter()
            .map(|idx| t0 + idx / rate)
            .collect();
        self.beats_from_peaks(&peaks, buffer)
    }

    /// Pairs consecutive peak times into beats, dropping implausible
    /// durations and poorly admitted spans.
    pub fn beats_from_peaks(&self, peaks: &[f64], buffer: &SignalBuffer) -> Vec<Heartbeat> {
        peaks
            .windows(2)
            .map(|pair| Heartbeat::new(pair[0], pair[1]))
            .filter(|beat| (MIN_BEAT_MS..=MAX_BEAT_MS).contains(&beat.duration_ms))
            .filter(|beat| {
                buffer
                    .admitted_ratio_between(beat.start_location_sec, beat.end_location_sec)
                    .is_some_and(|q| q >= self.min_quality)
            })
            .collect()
    }
}

/// Fractional sample indices of systolic peaks.
fn find_peaks(signal: &[f64], rate_hz: f64) -> Vec<f64> {
    let (Some(mean), Some(std)) = (dsp::mean(signal), dsp::std_dev(signal)) else {
        return Vec::new();
    };
    if std <= f64::EPSILON {
        return Vec::new();
    }
    let threshold = mean + PEAK_THRESHOLD_STD * std;
    let refractory = MIN_BEAT_MS / 1000.0 * rate_hz;

    let mut peaks: Vec<(f64, f64)> = Vec::new();
    for i in 1..signal.len().saturating_sub(1) {
        let (prev, cur, next) = (signal[i - 1], signal[i], signal[i + 1]);
        if !(cur > prev && cur >= next && cur > threshold) {
            continue;
        }
        let denom = prev - 2.0 * cur + next;
        let offset = if denom.abs() > f64::EPSILON {
            (0.5 * (prev - next) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let candidate = (i as f64 + offset, cur);

        match peaks.last_mut() {
            Some(last) if candidate.0 - last.0 < refractory => {
                if candidate.1 > last.1 {
                    *last = candidate;
                }
            }
            _ => peaks.push(candidate),
        }
    }
    peaks.into_iter().map(|(idx, _)| idx).collect()
}
