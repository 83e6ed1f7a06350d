//! Deterministic synthetic data
//!
//! Seeded generators for envelopes, speech-like audio, aligned trials and
//! raw recordings. Used by the tests, the benchmarks and the demo binary.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use aad_core::error::DataError;
use aad_core::types::{
    AttentionLabel, Envelope, Rereference, SampleMatrix, StimulusPair, Subject, SubjectId, Trial, TrialId,
};

use crate::loader::RawTrial;
use crate::processing::filters::SosFilter;
use crate::processing::resample::resample;

/// How the synthetic EEG is derived from the two envelopes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EegMix {
    /// Each channel is a scaled copy of the attended envelope
    AttendedOnly,
    /// Each channel is a scaled copy of attended + unattended
    Both,
}

/// Shape of the trials produced by [`SyntheticGenerator::trial`].
#[derive(Clone, Debug)]
pub struct TrialSpec {
    /// Samples per trial
    pub n_samples: usize,
    /// Envelope sub-bands
    pub bands: usize,
    /// EEG channels
    pub channels: usize,
    /// Shared sample rate (Hz)
    pub rate_hz: f64,
    /// EEG composition
    pub mix: EegMix,
    /// Standard deviation of additive EEG noise
    pub noise_std: f64,
    /// Neural response delay (samples)
    pub response_lag: usize,
    /// Use one envelope for both streams
    pub identical_streams: bool,
}

impl Default for TrialSpec {
    fn default() -> Self {
        Self {
            n_samples: 1280,
            bands: 2,
            channels: 4,
            rate_hz: 64.0,
            mix: EegMix::AttendedOnly,
            noise_std: 0.0,
            response_lag: 0,
            identical_streams: false,
        }
    }
}

/// Seeded source of synthetic signals.
pub struct SyntheticGenerator {
    rng: StdRng,
}

impl SyntheticGenerator {
    /// Create a generator; equal seeds give equal output
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Standard normal samples
    pub fn white_noise(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.rng.sample(StandardNormal)).collect()
    }

    /// Slowly varying nonnegative signal, low-passed below `cutoff_hz`
    pub fn slow_envelope(&mut self, n: usize, rate_hz: f64, cutoff_hz: f64) -> Vec<f64> {
        let noise = self.white_noise(n);
        match SosFilter::butterworth_lowpass(rate_hz, cutoff_hz.min(0.4 * rate_hz), 4) {
            Ok(filter) => filter.filtfilt(&noise).into_iter().map(f64::abs).collect(),
            Err(_) => noise.into_iter().map(f64::abs).collect(),
        }
    }

    /// `[n × bands]` envelope matrix
    pub fn envelope_bands(&mut self, n: usize, bands: usize, rate_hz: f64) -> SampleMatrix {
        let channels = (0..bands).map(|_| self.slow_envelope(n, rate_hz, 8.0)).collect();
        SampleMatrix::from_channels(channels).unwrap_or_else(|_| SampleMatrix::zeros(n, bands))
    }

    /// Noise carrier modulated by a slow envelope, roughly like speech
    pub fn speech_like_audio(&mut self, duration_s: f64, rate_hz: f64) -> Vec<f64> {
        const MODULATOR_RATE_HZ: f64 = 100.0;
        let n_mod = (duration_s * MODULATOR_RATE_HZ).round() as usize;
        let modulator = self.slow_envelope(n_mod, MODULATOR_RATE_HZ, 6.0);
        let modulator = resample(&modulator, MODULATOR_RATE_HZ, rate_hz);
        let carrier = self.white_noise(modulator.len());
        modulator.iter().zip(&carrier).map(|(m, c)| m.abs() * c).collect()
    }

    fn channel_gains(&mut self, channels: usize) -> Vec<f64> {
        (0..channels).map(|_| self.rng.gen_range(0.5..1.5)).collect()
    }

    fn mix_eeg(&mut self, source: &[f64], channels: usize, lag: usize, noise_std: f64) -> SampleMatrix {
        let gains = self.channel_gains(channels);
        let n = source.len();
        let eeg = gains
            .iter()
            .map(|g| {
                let noise = self.white_noise(n);
                (0..n)
                    .map(|t| {
                        let signal = if t >= lag { source[t - lag] } else { 0.0 };
                        g * signal + noise_std * noise[t]
                    })
                    .collect()
            })
            .collect();
        SampleMatrix::from_channels(eeg).unwrap_or_else(|_| SampleMatrix::zeros(n, channels))
    }

    /// One aligned trial
    pub fn trial(&mut self, id: TrialId, label: AttentionLabel, spec: &TrialSpec) -> Result<Trial, DataError> {
        let attended = self.envelope_bands(spec.n_samples, spec.bands, spec.rate_hz);
        let unattended = if spec.identical_streams {
            attended.clone()
        } else {
            self.envelope_bands(spec.n_samples, spec.bands, spec.rate_hz)
        };

        let mut source = attended.summed_channels();
        if spec.mix == EegMix::Both {
            for (s, u) in source.iter_mut().zip(unattended.summed_channels()) {
                *s += u;
            }
        }
        let eeg = self.mix_eeg(&source, spec.channels, spec.response_lag, spec.noise_std);
        Trial::new(id, eeg, attended, unattended, label, spec.rate_hz)
    }

    /// A subject with `n_trials` trials of alternating labels
    pub fn subject(&mut self, id: SubjectId, n_trials: usize, spec: &TrialSpec) -> Result<Subject, DataError> {
        let trials = (0..n_trials)
            .map(|i| {
                let label =
                    if i % 2 == 0 { AttentionLabel::AttendedLeft } else { AttentionLabel::AttendedRight };
                self.trial(TrialId(u32::try_from(i).unwrap_or(u32::MAX)), label, spec)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Subject::new(id, trials))
    }

    /// Raw recording at `native_rate_hz` whose channels follow the attended
    /// envelope of the given pair.
    #[allow(clippy::too_many_arguments)]
    pub fn raw_trial(
        &mut self,
        trial_id: TrialId,
        stimuli: StimulusPair,
        label: AttentionLabel,
        left: &Envelope,
        right: &Envelope,
        native_rate_hz: f64,
        channels: usize,
        noise_std: f64,
    ) -> RawTrial {
        let (attended, _) = label.attended_first(left, right);
        let source = resample(&attended.bands().summed_channels(), attended.rate_hz(), native_rate_hz);
        let eeg = self.mix_eeg(&source, channels, 0, noise_std);
        RawTrial { trial_id, eeg, native_rate_hz, rereference: Rereference::None, stimuli, label }
    }
}
