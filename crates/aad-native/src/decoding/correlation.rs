//! Windowed maximum cross-correlation decoder
//!
//! Untrained baseline. Each trial is cut into sliding windows; in every
//! window the band-summed attended and unattended envelopes are scored by
//! the largest absolute Pearson correlation with any EEG channel at any lag
//! in `[-max_lag, +max_lag]`. Each window is one prediction.

use rayon::prelude::*;

use aad_core::config::{ms_to_samples, CorrelationConfig};
use aad_core::error::DataError;
use aad_core::math::pearson;
use aad_core::types::{PredictionResult, SampleMatrix, Trial};

/// Window geometry in samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WindowLayout {
    /// Window length
    pub window: usize,
    /// Step between window starts
    pub step: usize,
    /// Largest absolute lag searched
    pub max_lag: usize,
}

impl WindowLayout {
    /// Start indices of every complete window in a trial of `n` samples
    pub fn starts(&self, n: usize) -> impl Iterator<Item = usize> {
        let last = n.checked_sub(self.window);
        let step = self.step;
        (0..).map(move |i| i * step).take_while(move |&s| last.is_some_and(|last| s <= last))
    }

    /// Number of complete windows in a trial of `n` samples
    pub fn count(&self, n: usize) -> usize {
        if n < self.window {
            0
        } else {
            (n - self.window) / self.step + 1
        }
    }
}

/// Windowed cross-correlation decoder.
#[derive(Clone, Debug, Default)]
pub struct CorrelationDecoder {
    config: CorrelationConfig,
}

impl CorrelationDecoder {
    /// Create a decoder
    pub fn new(config: CorrelationConfig) -> Self {
        Self { config }
    }

    /// Window geometry at `rate_hz`.
    ///
    /// The lag is capped so every correlation spans at least two samples.
    pub fn layout(&self, rate_hz: f64) -> WindowLayout {
        let window = ((self.config.window_s * rate_hz).round() as usize).max(2);
        let step = ((self.config.step_s * rate_hz).round() as usize).max(1);
        let max_lag = (ms_to_samples(self.config.max_lag_ms, rate_hz).max(0) as usize).min(window - 2);
        WindowLayout { window, step, max_lag }
    }

    /// One prediction per complete window of `trial`.
    ///
    /// A trial shorter than one window yields [`DataError::NoAnalysisWindows`].
    pub fn decode_trial(&self, trial: &Trial) -> Result<Vec<PredictionResult>, DataError> {
        let layout = self.layout(trial.rate_hz());
        if layout.count(trial.len()) == 0 {
            return Err(DataError::NoAnalysisWindows { samples: trial.len(), window: layout.window });
        }
        let attended = trial.attended().summed_channels();
        let unattended = trial.unattended().summed_channels();
        let starts: Vec<usize> = layout.starts(trial.len()).collect();

        Ok(starts
            .into_par_iter()
            .map(|start| {
                let end = start + layout.window;
                let a = max_abs_xcorr(trial.eeg(), &attended, start, end, layout.max_lag);
                let u = max_abs_xcorr(trial.eeg(), &unattended, start, end, layout.max_lag);
                PredictionResult::from_scores(a, u)
            })
            .collect())
    }
}

/// Largest |r| between `envelope[t]` and any EEG channel at `t + lag`,
/// with both indices inside `[start, end)`.
pub fn max_abs_xcorr(eeg: &SampleMatrix, envelope: &[f64], start: usize, end: usize, max_lag: usize) -> f64 {
    let mut best = 0.0_f64;
    for channel in eeg.channels() {
        for lag in -(max_lag as isize)..=(max_lag as isize) {
            let shift = lag.unsigned_abs();
            let (eeg_seg, env_seg) = if lag >= 0 {
                (&channel[start + shift..end], &envelope[start..end - shift])
            } else {
                (&channel[start..end - shift], &envelope[start + shift..end])
            };
            best = best.max(pearson(eeg_seg, env_seg).abs());
        }
    }
    best
}
