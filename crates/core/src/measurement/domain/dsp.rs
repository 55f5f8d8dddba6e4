use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Rate the irregular camera samples are resampled to.
pub const RESAMPLE_RATE_HZ: f64 = 30.0;

/// Minimum FFT length for peak search; shorter signals are zero-padded so
/// that a few-second window still resolves about 0.5 bpm.
const MIN_PEAK_FFT_LEN: usize = 4096;

/// Linear interpolation of `(timestamps, values)` onto a uniform grid
/// starting at the first timestamp.
pub fn resample_uniform(timestamps: &[f64], values: &[f64], rate_hz: f64) -> Vec<f64> {
    let n = timestamps.len().min(values.len());
    if n < 2 || rate_hz <= 0.0 {
        return values[..n].to_vec();
    }
    let t0 = timestamps[0];
    let span = timestamps[n - 1] - t0;
    let count = (span * rate_hz).floor() as usize + 1;

    let mut out = Vec::with_capacity(count);
    let mut j = 0;
    for i in 0..count {
        let t = t0 + i as f64 / rate_hz;
        while j + 2 < n && timestamps[j + 1] < t {
            j += 1;
        }
        let (ta, tb) = (timestamps[j], timestamps[j + 1]);
        let (va, vb) = (values[j], values[j + 1]);
        let frac = if tb > ta {
            ((t - ta) / (tb - ta)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out.push(va + frac * (vb - va));
    }
    out
}

/// Removes the least-squares line.
pub fn detrend(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    values
        .iter()
        .enumerate()
        .map(|(i, &y)| y - mean_y - slope * (i as f64 - mean_x))
        .collect()
}

/// Zero-phase band-pass: zeroes FFT bins outside `[low_hz, high_hz]`.
pub fn bandpass(values: &[f64], rate_hz: f64, low_hz: f64, high_hz: f64) -> Vec<f64> {
    let n = values.len();
    if n < 4 {
        return vec![0.0; n];
    }
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut buf: Vec<Complex<f64>> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
    forward.process(&mut buf);

    for (k, bin) in buf.iter_mut().enumerate() {
        // Bin k and n - k hold the same absolute frequency.
        let freq = k.min(n - k) as f64 * rate_hz / n as f64;
        if freq < low_hz || freq > high_hz {
            *bin = Complex::new(0.0, 0.0);
        }
    }

    inverse.process(&mut buf);
    let norm = 1.0 / n as f64;
    buf.iter().map(|c| c.re * norm).collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectralPeak {
    pub frequency_hz: f64,
    /// Peak power over total in-band power, in `(0, 1]`.
    pub power_ratio: f64,
}

/// Strongest frequency within `[low_hz, high_hz]` of a Hann-windowed,
/// zero-padded spectrum, refined by parabolic interpolation.
pub fn dominant_frequency(
    values: &[f64],
    rate_hz: f64,
    low_hz: f64,
    high_hz: f64,
) -> Option<SpectralPeak> {
    let n = values.len();
    if n < 8 || rate_hz <= 0.0 {
        return None;
    }
    let fft_len = n.next_power_of_two().max(MIN_PEAK_FFT_LEN);

    let mean = values.iter().sum::<f64>() / n as f64;
    let mut buf: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); fft_len];
    for (i, &v) in values.iter().enumerate() {
        let hann = 0.5 * (1.0 - (2.0 * PI * i as f64 / (n - 1) as f64).cos());
        buf[i] = Complex::new((v - mean) * hann, 0.0);
    }

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(fft_len).process(&mut buf);

    let bin_hz = rate_hz / fft_len as f64;
    let lo = (low_hz / bin_hz).ceil().max(1.0) as usize;
    let hi = ((high_hz / bin_hz).floor() as usize).min(fft_len / 2 - 1);
    if lo >= hi {
        return None;
    }

    let power: Vec<f64> = buf[..=hi + 1].iter().map(|c| c.norm_sqr()).collect();
    let total: f64 = power[lo..=hi].iter().sum();
    if !(total > 0.0) {
        return None;
    }

    let peak = (lo..=hi).max_by(|&a, &b| power[a].total_cmp(&power[b]))?;

    // Parabolic interpolation on magnitudes around the peak bin.
    let offset = if peak > 0 {
        let (a, b, c) = (
            power[peak - 1].sqrt(),
            power[peak].sqrt(),
            power[peak + 1].sqrt(),
        );
        let denom = a - 2.0 * b + c;
        if denom.abs() > f64::EPSILON {
            (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    } else {
        0.0
    };

    Some(SpectralPeak {
        frequency_hz: (peak as f64 + offset) * bin_hz,
        power_ratio: power[peak] / total,
    })
}

pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
