//! Multi-band speech envelope extraction
//!
//! Raw audio → resample to the filter-bank rate → auditory sub-bands →
//! power-law compressed magnitude → resample to the intermediate envelope
//! rate → zero-phase band-pass → integer decimation to the target rate.
//!
//! The band-pass removes the envelope mean; it is restored afterwards and
//! the result half-wave rectified, so every sample is nonnegative.

use rayon::prelude::*;
use tracing::debug;

use aad_core::config::{decimation_factor, AnalysisConfig};
use aad_core::error::{ConfigurationError, DataError};
use aad_core::math::mean;
use aad_core::types::{Envelope, SampleMatrix};

use super::filters::{select_filter_bank, FilterBankProvider, SosFilter};
use super::resample::{decimate, resample, resampled_len};

/// Converts raw audio into a `[T × B]` envelope at the target rate.
///
/// Stateless after construction: the same audio always gives the same
/// envelope, and one extractor may serve many threads.
#[derive(Debug)]
pub struct EnvelopeExtractor {
    bank: Box<dyn FilterBankProvider>,
    exponent: f64,
    envelope_rate_hz: f64,
    target_rate_hz: f64,
    decimation: usize,
    bandpass: SosFilter,
}

impl EnvelopeExtractor {
    /// Create an extractor around an explicit filter bank
    pub fn new(config: &AnalysisConfig, bank: Box<dyn FilterBankProvider>) -> Result<Self, ConfigurationError> {
        let envelope_rate_hz = config.envelope.envelope_rate_hz;
        let decimation = decimation_factor(envelope_rate_hz, config.target_rate_hz)?;
        let bandpass = SosFilter::butterworth_bandpass(
            envelope_rate_hz,
            config.band_low_hz,
            config.band_high_hz,
            config.filter_order,
        )?;
        Ok(Self {
            bank,
            exponent: config.envelope.power_law_exponent,
            envelope_rate_hz,
            target_rate_hz: config.target_rate_hz,
            decimation,
            bandpass,
        })
    }

    /// Create an extractor with the best available filter bank
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, ConfigurationError> {
        Self::new(config, select_filter_bank(&config.envelope))
    }

    /// Output sample rate
    pub fn target_rate_hz(&self) -> f64 {
        self.target_rate_hz
    }

    /// Number of sub-bands in every extracted envelope
    pub fn band_count(&self) -> usize {
        self.bank.band_count()
    }

    /// Expected output length for `n_audio` samples at `source_rate_hz`
    pub fn output_len(&self, n_audio: usize, source_rate_hz: f64) -> usize {
        let n_bank = resampled_len(n_audio, source_rate_hz, self.bank.sample_rate_hz());
        let n_env = resampled_len(n_bank, self.bank.sample_rate_hz(), self.envelope_rate_hz);
        n_env / self.decimation
    }

    /// Extract the envelope of `audio` sampled at `source_rate_hz`
    pub fn extract(&self, audio: &[f64], source_rate_hz: f64) -> Result<Envelope, DataError> {
        if audio.is_empty() {
            return Err(DataError::EmptySignal { series: "audio" });
        }
        if audio.iter().any(|s| !s.is_finite()) {
            return Err(DataError::NonFinite { series: "audio" });
        }

        let bank_rate = self.bank.sample_rate_hz();
        let audio = resample(audio, source_rate_hz, bank_rate);
        let subbands = self.bank.split(&audio);
        debug!(
            samples = audio.len(),
            bands = subbands.len(),
            quality = ?self.bank.quality(),
            "Audio split into sub-bands"
        );

        let bands: Vec<Vec<f64>> = subbands
            .into_par_iter()
            .map(|band| self.band_envelope(&band, bank_rate))
            .collect();

        let bands = SampleMatrix::from_channels(bands)?;
        if bands.n_samples() == 0 {
            return Err(DataError::EmptySignal { series: "envelope" });
        }
        Envelope::new(bands, self.target_rate_hz, self.bank.quality())
    }

    fn band_envelope(&self, band: &[f64], bank_rate: f64) -> Vec<f64> {
        let compressed: Vec<f64> = band.iter().map(|s| s.abs().powf(self.exponent)).collect();
        let slow = resample(&compressed, bank_rate, self.envelope_rate_hz);
        let offset = mean(&slow);
        let filtered: Vec<f64> = self
            .bandpass
            .filtfilt(&slow)
            .into_iter()
            .map(|v| (v + offset).max(0.0))
            .collect();
        decimate(&filtered, self.decimation)
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::processing::filters::BroadbandBank;
    use crate::sim::SyntheticGenerator;
    use aad_core::config::EnvelopeConfig;
    use aad_core::types::BankQuality;

    fn small_config() -> AnalysisConfig {
        AnalysisConfig {
            envelope: EnvelopeConfig { subband_count: 4, ..EnvelopeConfig::default() },
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_length_matches_duration() {
        let extractor = EnvelopeExtractor::from_config(&small_config()).unwrap();
        let mut sim = SyntheticGenerator::new(7);
        let audio = sim.speech_like_audio(3.0, 16_000.0);

        let env = extractor.extract(&audio, 16_000.0).unwrap();
        assert_eq!(env.len(), 192);
        assert_eq!(env.len(), extractor.output_len(audio.len(), 16_000.0));
        assert_eq!(env.band_count(), 4);
        assert_eq!(env.rate_hz(), 64.0);
        assert_eq!(env.quality(), BankQuality::Preferred);
    }

    #[test]
    fn test_length_across_audio_rates() {
        let extractor = EnvelopeExtractor::from_config(&small_config()).unwrap();
        for fs in [8_000.0, 16_000.0, 44_100.0, 48_000.0] {
            for (duration, expected) in [(3.0, 192), (2.5037, 160)] {
                let n = (duration * fs) as usize;
                let audio: Vec<f64> = (0..n)
                    .map(|i| {
                        let t = i as f64 / fs;
                        (1.0 + (2.0 * PI * 3.0 * t).sin()) * (2.0 * PI * 440.0 * t).sin()
                    })
                    .collect();

                let env = extractor.extract(&audio, fs).unwrap();
                assert_eq!(env.len(), expected, "{fs} Hz, {duration} s");
                assert_eq!(env.len(), (duration * 64.0) as usize);
                assert_eq!(env.len(), extractor.output_len(n, fs));
            }
        }
    }

    #[test]
    fn test_envelope_is_nonnegative_and_finite() {
        let extractor = EnvelopeExtractor::from_config(&small_config()).unwrap();
        let mut sim = SyntheticGenerator::new(11);
        let audio = sim.speech_like_audio(2.0, 8_000.0);

        let env = extractor.extract(&audio, 8_000.0).unwrap();
        assert!(env.bands().is_finite());
        assert!(env.bands().min_value().unwrap() >= 0.0);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = EnvelopeExtractor::from_config(&small_config()).unwrap();
        let mut sim = SyntheticGenerator::new(3);
        let audio = sim.speech_like_audio(2.0, 22_050.0);

        let a = extractor.extract(&audio, 22_050.0).unwrap();
        let b = extractor.extract(&audio, 22_050.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_envelope_tracks_modulation() {
        // 3 Hz amplitude modulation survives the 1-9 Hz band-pass
        let config = small_config();
        let extractor = EnvelopeExtractor::new(&config, Box::new(BroadbandBank::new(8_000.0))).unwrap();
        let fs = 8_000.0;
        let audio: Vec<f64> = (0..(4.0 * fs) as usize)
            .map(|i| {
                let t = i as f64 / fs;
                let carrier = (2.0 * std::f64::consts::PI * 500.0 * t).sin();
                (1.0 + 0.9 * (2.0 * std::f64::consts::PI * 3.0 * t).sin()) * carrier
            })
            .collect();
        let env = extractor.extract(&audio, fs).unwrap();
        assert_eq!(env.quality(), BankQuality::Broadband);

        let reference: Vec<f64> =
            (0..env.len()).map(|i| (2.0 * std::f64::consts::PI * 3.0 * i as f64 / 64.0).sin()).collect();
        let r = aad_core::math::pearson(&env.bands().channel(0)[32..224], &reference[32..224]);
        assert!(r > 0.9, "r = {r}");
    }

    #[test]
    fn test_rejects_empty_and_non_finite_audio() {
        let extractor = EnvelopeExtractor::from_config(&small_config()).unwrap();
        assert_eq!(extractor.extract(&[], 8_000.0), Err(DataError::EmptySignal { series: "audio" }));
        assert_eq!(
            extractor.extract(&[0.0, f64::NAN], 8_000.0),
            Err(DataError::NonFinite { series: "audio" })
        );
    }
}
