//! FFT-based fast convolution
//!
//! The gammatone bank convolves one audio signal with many long FIR kernels,
//! so the signal spectrum is computed once and reused for every kernel.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Convolves a fixed signal with arbitrary kernels in the frequency domain.
pub struct FftConvolver {
    signal_len: usize,
    fft_size: usize,
    spectrum: Vec<Complex<f64>>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl FftConvolver {
    /// Prepare a signal for convolution with kernels of up to `max_kernel_len` taps
    #[must_use]
    pub fn new(signal: &[f64], max_kernel_len: usize) -> Self {
        let fft_size = (signal.len() + max_kernel_len.max(1) - 1).max(1).next_power_of_two();
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let mut spectrum = zero_padded(signal, fft_size);
        forward.process(&mut spectrum);

        Self { signal_len: signal.len(), fft_size, spectrum, forward, inverse }
    }

    /// Causal convolution with `kernel`, truncated to the signal length.
    ///
    /// Taps beyond the length given at construction are ignored.
    pub fn convolve(&self, kernel: &[f64]) -> Vec<f64> {
        let max_taps = self.fft_size + 1 - self.signal_len.max(1);
        let kernel = &kernel[..kernel.len().min(max_taps)];

        let mut buffer = zero_padded(kernel, self.fft_size);
        self.forward.process(&mut buffer);
        for (b, s) in buffer.iter_mut().zip(&self.spectrum) {
            *b *= *s;
        }
        self.inverse.process(&mut buffer);

        let scale = 1.0 / self.fft_size as f64;
        buffer[..self.signal_len].iter().map(|c| c.re * scale).collect()
    }
}

fn zero_padded(samples: &[f64], size: usize) -> Vec<Complex<f64>> {
    let mut buffer = vec![Complex::new(0.0, 0.0); size];
    for (dst, &s) in buffer.iter_mut().zip(samples) {
        *dst = Complex::new(s, 0.0);
    }
    buffer
}
