//! EEG preprocessing and trial alignment
//!
//! Brings one raw EEG recording and the envelopes of its two stimuli onto a
//! common rate and length:
//! - Rereference (none / designated channel / common average)
//! - Zero-phase band-pass at the native rate
//! - Integer decimation to the target rate
//! - Attended/unattended assignment from the label, then length reconciliation

use rayon::prelude::*;
use tracing::debug;

use aad_core::config::{decimation_factor, validate_band, AnalysisConfig};
use aad_core::error::{AadError, ConfigurationError, DataError};
use aad_core::types::{Envelope, Rereference, SampleMatrix, Trial};

use super::filters::SosFilter;
use super::resample::decimate;
use crate::loader::RawTrial;

/// Rate comparison tolerance (Hz)
const RATE_TOLERANCE_HZ: f64 = 1e-6;

/// Apply a rereferencing scheme.
///
/// With [`Rereference::Channel`] the reference channel itself is removed,
/// since it would be identically zero.
pub fn rereference(eeg: &SampleMatrix, scheme: Rereference) -> Result<SampleMatrix, DataError> {
    match scheme {
        Rereference::None => Ok(eeg.clone()),
        Rereference::Channel(reference) => {
            if reference >= eeg.n_channels() {
                return Err(DataError::ChannelOutOfRange { channel: reference, channels: eeg.n_channels() });
            }
            let kept: Vec<usize> = (0..eeg.n_channels()).filter(|&c| c != reference).collect();
            let mut out = eeg.select_channels(&kept)?;
            let reference = eeg.channel(reference);
            for c in 0..out.n_channels() {
                for (v, r) in out.channel_mut(c).iter_mut().zip(reference) {
                    *v -= r;
                }
            }
            Ok(out)
        }
        Rereference::CommonAverage => {
            let n_channels = eeg.n_channels();
            if n_channels == 0 {
                return Ok(eeg.clone());
            }
            let mut average = eeg.summed_channels();
            for v in &mut average {
                *v /= n_channels as f64;
            }
            let mut out = eeg.clone();
            for c in 0..n_channels {
                for (v, a) in out.channel_mut(c).iter_mut().zip(&average) {
                    *v -= a;
                }
            }
            Ok(out)
        }
    }
}

/// Aligns raw EEG with stimulus envelopes into a [`Trial`].
#[derive(Clone, Debug)]
pub struct TrialAligner {
    target_rate_hz: f64,
    band_low_hz: f64,
    band_high_hz: f64,
    filter_order: usize,
    length_tolerance: usize,
}

impl TrialAligner {
    /// Largest envelope shortfall (samples) absorbed by truncating the EEG
    pub const DEFAULT_LENGTH_TOLERANCE: usize = 1;

    /// Create an aligner from the analysis configuration
    pub fn new(config: &AnalysisConfig) -> Result<Self, ConfigurationError> {
        validate_band(config.band_low_hz, config.band_high_hz, config.target_rate_hz)?;
        Ok(Self {
            target_rate_hz: config.target_rate_hz,
            band_low_hz: config.band_low_hz,
            band_high_hz: config.band_high_hz,
            filter_order: config.filter_order,
            length_tolerance: Self::DEFAULT_LENGTH_TOLERANCE,
        })
    }

    /// Override the envelope shortfall tolerance
    #[must_use]
    pub fn with_length_tolerance(mut self, samples: usize) -> Self {
        self.length_tolerance = samples;
        self
    }

    /// Common output rate
    pub fn target_rate_hz(&self) -> f64 {
        self.target_rate_hz
    }

    /// Rereference, band-pass and decimate raw EEG to the target rate
    pub fn preprocess_eeg(
        &self,
        eeg: &SampleMatrix,
        native_rate_hz: f64,
        scheme: Rereference,
    ) -> Result<SampleMatrix, AadError> {
        let factor = decimation_factor(native_rate_hz, self.target_rate_hz)?;
        if eeg.n_samples() == 0 || eeg.n_channels() == 0 {
            return Err(DataError::EmptySignal { series: "eeg" }.into());
        }
        if !eeg.is_finite() {
            return Err(DataError::NonFinite { series: "eeg" }.into());
        }
        let filter =
            SosFilter::butterworth_bandpass(native_rate_hz, self.band_low_hz, self.band_high_hz, self.filter_order)?;
        let referenced = rereference(eeg, scheme)?;

        let channels: Vec<Vec<f64>> = (0..referenced.n_channels())
            .into_par_iter()
            .map(|c| decimate(&filter.filtfilt(referenced.channel(c)), factor))
            .collect();
        Ok(SampleMatrix::from_channels(channels)?)
    }

    /// Build an aligned trial from raw EEG and the envelopes of the left and
    /// right stimuli.
    ///
    /// Envelopes longer than the EEG are truncated. An envelope shorter than
    /// the EEG by at most the length tolerance truncates the EEG instead; any
    /// larger shortfall is a [`DataError::LengthMismatch`].
    pub fn align(&self, raw: &RawTrial, left: &Envelope, right: &Envelope) -> Result<Trial, AadError> {
        let eeg = self.preprocess_eeg(&raw.eeg, raw.native_rate_hz, raw.rereference)?;

        for envelope in [left, right] {
            if (envelope.rate_hz() - self.target_rate_hz).abs() > RATE_TOLERANCE_HZ {
                return Err(DataError::RateMismatch {
                    expected_hz: self.target_rate_hz,
                    got_hz: envelope.rate_hz(),
                }
                .into());
            }
        }
        let (attended, unattended) = raw.label.attended_first(left, right);

        let eeg_len = eeg.n_samples();
        let env_len = attended.len().min(unattended.len());
        let len = if env_len >= eeg_len {
            eeg_len
        } else if eeg_len - env_len <= self.length_tolerance {
            env_len
        } else {
            return Err(DataError::LengthMismatch { series: "envelope", expected: eeg_len, got: env_len }.into());
        };
        debug!(trial = %raw.trial_id, eeg_len, env_len, len, "Trial aligned");

        Ok(Trial::new(
            raw.trial_id,
            eeg.truncated(len),
            attended.bands().truncated(len),
            unattended.bands().truncated(len),
            raw.label,
            self.target_rate_hz,
        )?)
    }
}
