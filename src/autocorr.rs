//! Autocorrelation periodicity detection.
//!
//! The autocorrelation is computed by the transform route (forward FFT,
//! squared magnitudes, inverse FFT) with zero-padding past `2n - 1` so the
//! circular product never wraps; that keeps long presence signals out of
//! the quadratic direct formula. Only non-negative lags are kept and the
//! curve is normalized by its peak, which for an autocorrelation is lag
//! zero.
//!
//! A repeating pattern shows up as local maxima at multiples of its
//! period. The smallest qualifying peak lag wins so the fundamental is
//! preferred over its harmonics.

use rustfft::{num_complex::Complex, FftPlanner};

/// A qualifying autocorrelation peak.
#[derive(Debug, Clone, Copy)]
pub struct AutocorrPeak {
    /// Lag in samples.
    pub lag: usize,
    /// Lag scaled by the sampling step.
    pub period_secs: f64,
    /// Normalized autocorrelation at the lag, in [0, 1].
    pub value: f64,
}

/// Normalized autocorrelation over non-negative lags.
///
/// Output length equals the input length; index 0 holds the (unit) zero
/// lag. An all-zero input yields an all-zero curve.
pub fn autocorrelation(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }

    let m = (2 * n - 1).next_power_of_two();
    let mut buffer: Vec<Complex<f64>> = values
        .iter()
        .map(|&v| Complex::new(v, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)).take(m - n))
        .collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(m).process(&mut buffer);
    for value in buffer.iter_mut() {
        *value = Complex::new(value.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(m).process(&mut buffer);

    // inverse pass is unnormalized, so scale by the padded length
    let mut acf: Vec<f64> = buffer[..n].iter().map(|c| c.re / m as f64).collect();

    let peak = acf.iter().cloned().fold(0.0f64, f64::max);
    if peak > 0.0 {
        for v in acf.iter_mut() {
            *v /= peak;
        }
    }
    acf
}

/// Searches lags `1..n-1` for the smallest local maximum at or above
/// `threshold` and scales it into a period.
pub fn detect_period(values: &[f64], step_secs: f64, threshold: f64) -> Option<AutocorrPeak> {
    let acf = autocorrelation(values);
    if acf.len() < 2 {
        return None;
    }
    let idx = first_peak_above(&acf[1..], threshold)?;
    let lag = idx + 1;
    Some(AutocorrPeak {
        lag,
        period_secs: lag as f64 * step_secs,
        value: acf[lag],
    })
}

/// First local maximum of `s` with value at or above `height`.
///
/// A maximum must rise strictly above both neighbors; a flat run counts
/// once, at its middle sample. End samples are never maxima.
fn first_peak_above(s: &[f64], height: f64) -> Option<usize> {
    let mut i = 1;
    while i + 1 < s.len() {
        if s[i] > s[i - 1] {
            let mut j = i;
            while j + 1 < s.len() && s[j + 1] == s[j] {
                j += 1;
            }
            if j + 1 < s.len() && s[j + 1] < s[i] {
                let mid = (i + j) / 2;
                if s[mid] >= height {
                    return Some(mid);
                }
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    None
}
