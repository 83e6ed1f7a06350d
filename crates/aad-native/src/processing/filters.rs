//! Digital filters for EEG and audio processing
//!
//! Provides:
//! - Butterworth IIR filters as cascades of second-order sections
//! - Zero-phase (forward-backward) filtering with edge padding
//! - Auditory filter banks behind [`FilterBankProvider`], with an automatic
//!   gammatone → Butterworth → broadband fallback chain

use std::f64::consts::PI;
use std::fmt;

use tracing::{info, warn};

use aad_core::config::{validate_band, EnvelopeConfig, FilterBankKind};
use aad_core::error::ConfigurationError;
use aad_core::types::BankQuality;

use super::fft::FftConvolver;

// ============================================================================
// Biquad sections
// ============================================================================

/// Second-order section coefficients, normalized so `a[0] == 1`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    /// Numerator coefficients [b0, b1, b2]
    pub b: [f64; 3],
    /// Denominator coefficients [a0=1, a1, a2]
    pub a: [f64; 3],
}

impl BiquadCoeffs {
    /// Second-order lowpass (bilinear transform, prewarped)
    #[must_use]
    pub fn lowpass(sample_rate: f64, cutoff: f64, q: f64) -> Self {
        let k = (PI * cutoff / sample_rate).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k / q + k2);
        Self {
            b: [k2 * norm, 2.0 * k2 * norm, k2 * norm],
            a: [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm],
        }
    }

    /// Second-order highpass (bilinear transform, prewarped)
    #[must_use]
    pub fn highpass(sample_rate: f64, cutoff: f64, q: f64) -> Self {
        let k = (PI * cutoff / sample_rate).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k / q + k2);
        Self {
            b: [norm, -2.0 * norm, norm],
            a: [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm],
        }
    }
}

/// Second-order biquad filter section (transposed direct form II)
#[derive(Clone, Debug)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    /// State: [z1, z2]
    state: [f64; 2],
}

impl Biquad {
    /// Create a new biquad section with given coefficients
    #[must_use]
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self { coeffs, state: [0.0, 0.0] }
    }

    /// Process a single sample
    pub fn filter(&mut self, input: f64) -> f64 {
        let BiquadCoeffs { b, a } = self.coeffs;
        let output = b[0] * input + self.state[0];
        self.state[0] = b[1] * input - a[1] * output + self.state[1];
        self.state[1] = b[2] * input - a[2] * output;
        output
    }
}

/// Q factors of the biquads making up an even-order Butterworth filter.
fn butterworth_qs(order: usize) -> Vec<f64> {
    let pairs = (order / 2).max(1);
    let order = (pairs * 2) as f64;
    (0..pairs)
        .map(|i| 1.0 / (2.0 * (PI * (2 * i + 1) as f64 / (2.0 * order)).cos()))
        .collect()
}

// ============================================================================
// Cascades
// ============================================================================

/// Immutable cascade of second-order sections.
///
/// Each call starts from zero state, so one cascade can be shared across
/// threads and reused for every channel.
#[derive(Clone, Debug)]
pub struct SosFilter {
    sections: Vec<BiquadCoeffs>,
    /// Edge padding used by [`SosFilter::filtfilt`]
    settle_samples: usize,
}

impl SosFilter {
    /// Butterworth band-pass: order-`order` highpass at `low_hz` followed by
    /// order-`order` lowpass at `high_hz`.
    pub fn butterworth_bandpass(
        sample_rate: f64,
        low_hz: f64,
        high_hz: f64,
        order: usize,
    ) -> Result<Self, ConfigurationError> {
        validate_band(low_hz, high_hz, sample_rate)?;
        let qs = butterworth_qs(order);
        let mut sections: Vec<_> = qs.iter().map(|&q| BiquadCoeffs::highpass(sample_rate, low_hz, q)).collect();
        sections.extend(qs.iter().map(|&q| BiquadCoeffs::lowpass(sample_rate, high_hz, q)));
        Ok(Self { sections, settle_samples: (3.0 * sample_rate / low_hz).ceil() as usize })
    }

    /// Butterworth lowpass of the given even order.
    pub fn butterworth_lowpass(sample_rate: f64, cutoff_hz: f64, order: usize) -> Result<Self, ConfigurationError> {
        if !(cutoff_hz > 0.0 && cutoff_hz < sample_rate / 2.0) {
            return Err(ConfigurationError::InvalidBand {
                low_hz: 0.0,
                high_hz: cutoff_hz,
                sample_rate_hz: sample_rate,
            });
        }
        let sections = butterworth_qs(order)
            .into_iter()
            .map(|q| BiquadCoeffs::lowpass(sample_rate, cutoff_hz, q))
            .collect();
        Ok(Self { sections, settle_samples: (3.0 * sample_rate / cutoff_hz).ceil() as usize })
    }

    /// Causal filtering from zero initial state
    #[must_use]
    pub fn filter(&self, input: &[f64]) -> Vec<f64> {
        let mut stages: Vec<Biquad> = self.sections.iter().copied().map(Biquad::new).collect();
        input
            .iter()
            .map(|&x| stages.iter_mut().fold(x, |acc, stage| stage.filter(acc)))
            .collect()
    }

    /// Zero-phase filtering: forward pass, then backward pass.
    ///
    /// Edges are extended by odd reflection (up to `len - 1` samples), then
    /// by holding the outermost reflected value, so signals shorter than the
    /// settling time are padded rather than rejected.
    #[must_use]
    pub fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = self.settle_samples;
        let reflect = pad.min(n - 1);

        let mut extended = Vec::with_capacity(n + 2 * pad);
        let first = input[0];
        let last = input[n - 1];
        let left_edge = 2.0 * first - input[reflect];
        extended.extend(std::iter::repeat(left_edge).take(pad - reflect));
        extended.extend((1..=reflect).rev().map(|i| 2.0 * first - input[i]));
        extended.extend_from_slice(input);
        extended.extend((1..=reflect).map(|i| 2.0 * last - input[n - 1 - i]));
        let right_edge = 2.0 * last - input[n - 1 - reflect];
        extended.extend(std::iter::repeat(right_edge).take(pad - reflect));

        let mut forward = self.filter(&extended);
        forward.reverse();
        let mut backward = self.filter(&forward);
        backward.reverse();
        backward[pad..pad + n].to_vec()
    }
}

// ============================================================================
// Auditory filter banks
// ============================================================================

/// Splits audio into auditory sub-bands.
///
/// Implementations are immutable after construction and shared across
/// worker threads.
pub trait FilterBankProvider: Send + Sync + fmt::Debug {
    /// Design quality reported on every envelope this bank produces
    fn quality(&self) -> BankQuality;

    /// Number of sub-bands produced by [`FilterBankProvider::split`]
    fn band_count(&self) -> usize;

    /// Rate the input audio must be sampled at
    fn sample_rate_hz(&self) -> f64;

    /// Filter `audio` into `band_count()` sub-band signals of equal length
    fn split(&self, audio: &[f64]) -> Vec<Vec<f64>>;
}

/// Equivalent rectangular bandwidth (Glasberg & Moore) at `freq_hz`.
#[must_use]
pub fn erb_bandwidth(freq_hz: f64) -> f64 {
    24.7 * (4.37 * freq_hz / 1000.0 + 1.0)
}

fn erb_rate(freq_hz: f64) -> f64 {
    21.4 * (1.0 + 0.00437 * freq_hz).log10()
}

fn erb_rate_to_hz(rate: f64) -> f64 {
    (10f64.powf(rate / 21.4) - 1.0) / 0.00437
}

/// `count + 1` band edges uniformly spaced on the ERB-rate scale.
#[must_use]
pub fn erb_space_edges(low_hz: f64, high_hz: f64, count: usize) -> Vec<f64> {
    let lo = erb_rate(low_hz);
    let hi = erb_rate(high_hz);
    (0..=count).map(|i| erb_rate_to_hz(lo + (hi - lo) * i as f64 / count as f64)).collect()
}

/// Centre frequencies at the ERB-rate midpoints of [`erb_space_edges`].
#[must_use]
pub fn erb_space_centers(low_hz: f64, high_hz: f64, count: usize) -> Vec<f64> {
    let lo = erb_rate(low_hz);
    let hi = erb_rate(high_hz);
    (0..count)
        .map(|i| erb_rate_to_hz(lo + (hi - lo) * (i as f64 + 0.5) / count as f64))
        .collect()
}

/// Fourth-order gammatone filter bank, implemented as FIR kernels.
#[derive(Debug)]
pub struct GammatoneBank {
    sample_rate: f64,
    centers_hz: Vec<f64>,
    kernels: Vec<Vec<f64>>,
}

impl GammatoneBank {
    /// Kernel duration in units of 1/bandwidth; the envelope has decayed by ~10⁻⁷
    const KERNEL_SPAN: f64 = 4.0;

    /// Design the bank from the envelope configuration
    pub fn new(config: &EnvelopeConfig) -> Result<Self, ConfigurationError> {
        let fs = config.audio_rate_hz;
        let centers_hz = erb_space_centers(config.subband_low_hz, config.subband_high_hz, config.subband_count);
        for &fc in &centers_hz {
            // upper half of the passband must fit below Nyquist
            if !(fc > 0.0 && fc + 0.5 * erb_bandwidth(fc) < fs / 2.0) {
                return Err(ConfigurationError::InvalidBand {
                    low_hz: config.subband_low_hz,
                    high_hz: config.subband_high_hz,
                    sample_rate_hz: fs,
                });
            }
        }
        let kernels = centers_hz.iter().map(|&fc| gammatone_kernel(fc, fs)).collect();
        Ok(Self { sample_rate: fs, centers_hz, kernels })
    }

    /// Centre frequency of every band
    #[must_use]
    pub fn centers_hz(&self) -> &[f64] {
        &self.centers_hz
    }
}

/// Impulse response t³·exp(−2πbt)·cos(2πf_c t) with unit gain at f_c.
fn gammatone_kernel(fc: f64, fs: f64) -> Vec<f64> {
    let b = 1.019 * erb_bandwidth(fc);
    let len = ((GammatoneBank::KERNEL_SPAN * fs / b).ceil() as usize).max(1);
    let mut kernel: Vec<f64> = (0..len)
        .map(|k| {
            let t = k as f64 / fs;
            t.powi(3) * (-2.0 * PI * b * t).exp() * (2.0 * PI * fc * t).cos()
        })
        .collect();

    let (re, im) = kernel.iter().enumerate().fold((0.0, 0.0), |(re, im), (k, &h)| {
        let phase = 2.0 * PI * fc * k as f64 / fs;
        (re + h * phase.cos(), im - h * phase.sin())
    });
    let gain = re.hypot(im);
    if gain > 0.0 {
        for h in &mut kernel {
            *h /= gain;
        }
    }
    kernel
}

impl FilterBankProvider for GammatoneBank {
    fn quality(&self) -> BankQuality {
        BankQuality::Preferred
    }

    fn band_count(&self) -> usize {
        self.kernels.len()
    }

    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate
    }

    fn split(&self, audio: &[f64]) -> Vec<Vec<f64>> {
        let longest = self.kernels.iter().map(Vec::len).max().unwrap_or(1);
        let convolver = FftConvolver::new(audio, longest);
        self.kernels.iter().map(|kernel| convolver.convolve(kernel)).collect()
    }
}

/// Butterworth band-pass bank over the same ERB-spaced edges.
#[derive(Debug)]
pub struct ButterworthBank {
    sample_rate: f64,
    bands: Vec<SosFilter>,
}

impl ButterworthBank {
    const ORDER: usize = 4;
    /// Upper edges are clamped to this fraction of the sample rate
    const MAX_EDGE_FRACTION: f64 = 0.45;

    /// Design the bank from the envelope configuration
    pub fn new(config: &EnvelopeConfig) -> Result<Self, ConfigurationError> {
        let fs = config.audio_rate_hz;
        let ceiling = Self::MAX_EDGE_FRACTION * fs;
        let edges = erb_space_edges(config.subband_low_hz, config.subband_high_hz, config.subband_count);
        let bands = edges
            .windows(2)
            .map(|pair| SosFilter::butterworth_bandpass(fs, pair[0], pair[1].min(ceiling), Self::ORDER))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sample_rate: fs, bands })
    }
}

impl FilterBankProvider for ButterworthBank {
    fn quality(&self) -> BankQuality {
        BankQuality::Approximate
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate
    }

    fn split(&self, audio: &[f64]) -> Vec<Vec<f64>> {
        self.bands.iter().map(|band| band.filtfilt(audio)).collect()
    }
}

/// Single broadband channel: the audio itself.
#[derive(Debug)]
pub struct BroadbandBank {
    sample_rate: f64,
}

impl BroadbandBank {
    /// Create a broadband pass-through at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        Self { sample_rate }
    }
}

impl FilterBankProvider for BroadbandBank {
    fn quality(&self) -> BankQuality {
        BankQuality::Broadband
    }

    fn band_count(&self) -> usize {
        1
    }

    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate
    }

    fn split(&self, audio: &[f64]) -> Vec<Vec<f64>> {
        vec![audio.to_vec()]
    }
}

fn build_bank(kind: FilterBankKind, config: &EnvelopeConfig) -> Result<Box<dyn FilterBankProvider>, ConfigurationError> {
    Ok(match kind {
        FilterBankKind::Gammatone => Box::new(GammatoneBank::new(config)?),
        FilterBankKind::Butterworth => Box::new(ButterworthBank::new(config)?),
        FilterBankKind::Broadband => Box::new(BroadbandBank::new(config.audio_rate_hz)),
    })
}

/// Build the preferred filter bank, degrading when a design is unavailable.
///
/// The chain is gammatone → Butterworth → broadband, starting at the kind
/// named in the configuration. Every degradation is logged as a warning and
/// reported through [`FilterBankProvider::quality`].
pub fn select_filter_bank(config: &EnvelopeConfig) -> Box<dyn FilterBankProvider> {
    const CHAIN: [FilterBankKind; 3] =
        [FilterBankKind::Gammatone, FilterBankKind::Butterworth, FilterBankKind::Broadband];
    let start = CHAIN.iter().position(|&k| k == config.filter_bank).unwrap_or(0);

    for &kind in &CHAIN[start..] {
        match build_bank(kind, config) {
            Ok(bank) => {
                if kind == config.filter_bank {
                    info!(?kind, bands = bank.band_count(), "Filter bank ready");
                } else {
                    warn!(
                        requested = ?config.filter_bank,
                        using = ?kind,
                        quality = ?bank.quality(),
                        "Filter bank degraded"
                    );
                }
                return bank;
            }
            Err(e) => warn!(?kind, error = %e, "Filter bank design unavailable"),
        }
    }
    Box::new(BroadbandBank::new(config.audio_rate_hz))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / rate).sin()).collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_butterworth_qs() {
        let q2 = butterworth_qs(2);
        assert!((q2[0] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        let q4 = butterworth_qs(4);
        assert!((q4[0] - 0.541_196_1).abs() < 1e-6);
        assert!((q4[1] - 1.306_563).abs() < 1e-6);
    }

    #[test]
    fn test_bandpass_attenuates_out_of_band() {
        let fs = 128.0;
        let filter = SosFilter::butterworth_bandpass(fs, 1.0, 9.0, 4).unwrap();
        let pass = filter.filtfilt(&sine(4.0, fs, 2048));
        let stop = filter.filtfilt(&sine(30.0, fs, 2048));
        // Skip edges
        assert!(rms(&pass[512..1536]) > 0.6);
        assert!(rms(&stop[512..1536]) < 0.01);
    }

    #[test]
    fn test_filtfilt_is_zero_phase() {
        let fs = 128.0;
        let filter = SosFilter::butterworth_bandpass(fs, 1.0, 9.0, 4).unwrap();
        let x = sine(4.0, fs, 4096);
        let y = filter.filtfilt(&x);
        // Peak alignment: correlation at zero lag beats ±1 sample
        let dot = |lag: usize| -> f64 { (1000..3000).map(|i| x[i] * y[i + lag]).sum() };
        let back: f64 = (1000..3000).map(|i| x[i + 1] * y[i]).sum();
        assert!(dot(0) > dot(1));
        assert!(dot(0) > back);
    }

    #[test]
    fn test_filtfilt_short_signal_is_padded() {
        let filter = SosFilter::butterworth_bandpass(64.0, 1.0, 9.0, 4).unwrap();
        let y = filter.filtfilt(&[1.0, 2.0, 0.5]);
        assert_eq!(y.len(), 3);
        assert!(y.iter().all(|v| v.is_finite()));
        assert!(filter.filtfilt(&[]).is_empty());
    }

    #[test]
    fn test_invalid_band_is_rejected() {
        assert!(SosFilter::butterworth_bandpass(16.0, 1.0, 9.0, 4).is_err());
        assert!(SosFilter::butterworth_bandpass(64.0, 5.0, 2.0, 4).is_err());
    }

    #[test]
    fn test_erb_spacing_is_monotonic() {
        let edges = erb_space_edges(150.0, 4000.0, 15);
        assert_eq!(edges.len(), 16);
        assert!((edges[0] - 150.0).abs() < 1e-6);
        assert!((edges[15] - 4000.0).abs() < 1e-6);
        assert!(edges.windows(2).all(|w| w[1] > w[0]));
        let centers = erb_space_centers(150.0, 4000.0, 15);
        assert!(centers.iter().zip(edges.windows(2)).all(|(c, w)| *c > w[0] && *c < w[1]));
    }

    #[test]
    fn test_gammatone_unit_gain_at_center() {
        let config = EnvelopeConfig { subband_count: 4, ..EnvelopeConfig::default() };
        let bank = GammatoneBank::new(&config).unwrap();
        let fs = bank.sample_rate_hz();
        let fc = bank.centers_hz()[1];
        let x = sine(fc, fs, 8000);
        let bands = bank.split(&x);
        assert_eq!(bands.len(), 4);
        let steady = &bands[1][2000..];
        assert!((rms(steady) - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02);
        // Neighbouring band passes less of this tone
        assert!(rms(&bands[3][2000..]) < rms(steady));
    }

    #[test]
    fn test_fallback_chain_degrades() {
        // Single ~1 kHz gammatone band does not fit below a 1 kHz Nyquist,
        // but a Butterworth band clamped to 900 Hz does
        let config = EnvelopeConfig { audio_rate_hz: 2000.0, subband_count: 1, ..EnvelopeConfig::default() };
        let bank = select_filter_bank(&config);
        assert_eq!(bank.quality(), BankQuality::Approximate);
        assert_eq!(bank.band_count(), 1);

        // Nothing but broadband is possible when the bands collapse
        let config = EnvelopeConfig { audio_rate_hz: 200.0, ..EnvelopeConfig::default() };
        let bank = select_filter_bank(&config);
        assert_eq!(bank.quality(), BankQuality::Broadband);
        assert_eq!(bank.band_count(), 1);
    }

    #[test]
    fn test_preferred_bank_is_gammatone() {
        let bank = select_filter_bank(&EnvelopeConfig::default());
        assert_eq!(bank.quality(), BankQuality::Preferred);
        assert_eq!(bank.band_count(), 15);
    }
}
