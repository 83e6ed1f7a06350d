//! Sample-rate conversion
//!
//! - [`resample`]: band-limited conversion between arbitrary rates (FFT method)
//! - [`decimate`]: keep every `factor`-th sample of an already band-limited signal

use rustfft::{num_complex::Complex, FftPlanner};

use aad_core::types::SampleMatrix;

/// Output length of converting `n` samples from `from_hz` to `to_hz`.
///
/// Rounds down, so a partial trailing sample is never invented.
#[must_use]
pub fn resampled_len(n: usize, from_hz: f64, to_hz: f64) -> usize {
    if from_hz <= 0.0 || to_hz <= 0.0 {
        return 0;
    }
    (n as f64 * to_hz / from_hz + 1e-9).floor() as usize
}

/// Band-limited resampling by zero-padding or truncating the spectrum.
///
/// Energy above the lower of the two Nyquist frequencies is discarded, which
/// makes the conversion its own anti-aliasing filter.
#[must_use]
pub fn resample(signal: &[f64], from_hz: f64, to_hz: f64) -> Vec<f64> {
    let n_in = signal.len();
    let n_out = resampled_len(n_in, from_hz, to_hz);
    if n_out == 0 || n_in == 0 {
        return Vec::new();
    }
    if n_out == n_in {
        return signal.to_vec();
    }

    let mut planner = FftPlanner::<f64>::new();
    let mut spectrum: Vec<Complex<f64>> = signal.iter().map(|&s| Complex::new(s, 0.0)).collect();
    planner.plan_fft_forward(n_in).process(&mut spectrum);

    let mut out = vec![Complex::new(0.0, 0.0); n_out];
    let n_min = n_in.min(n_out);
    let half = n_min / 2;
    let upper = if n_min % 2 == 0 { half } else { half + 1 };

    out[0] = spectrum[0];
    for k in 1..upper {
        out[k] = spectrum[k];
        out[n_out - k] = spectrum[n_in - k];
    }
    if n_min % 2 == 0 && half > 0 {
        // Nyquist bin of the shorter spectrum
        if n_out < n_in {
            out[half] = spectrum[half] + spectrum[n_in - half];
        } else {
            out[half] = spectrum[half] * 0.5;
            out[n_out - half] = spectrum[half] * 0.5;
        }
    }

    planner.plan_fft_inverse(n_out).process(&mut out);
    let scale = 1.0 / n_in as f64;
    out.iter().map(|c| c.re * scale).collect()
}

/// Keep every `factor`-th sample; the output holds `len / factor` samples.
#[must_use]
pub fn decimate(signal: &[f64], factor: usize) -> Vec<f64> {
    let factor = factor.max(1);
    signal.iter().step_by(factor).take(signal.len() / factor).copied().collect()
}

/// [`decimate`] applied to every channel.
#[must_use]
pub fn decimate_matrix(matrix: &SampleMatrix, factor: usize) -> SampleMatrix {
    let factor = factor.max(1);
    let n_out = matrix.n_samples() / factor;
    let mut out = SampleMatrix::zeros(n_out, matrix.n_channels());
    for c in 0..matrix.n_channels() {
        out.channel_mut(c).copy_from_slice(&decimate(matrix.channel(c), factor));
    }
    out
}
