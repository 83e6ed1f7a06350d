//! Analysis configuration
//!
//! [`AnalysisConfig`] holds every tunable parameter of the pipeline. All
//! fields have defaults matching common AAD practice, and the whole tree is
//! `serde`-deserializable with `#[serde(default)]`, so a configuration file
//! only needs to name the values it changes.
//!
//! [`AnalysisConfig::validate`] must pass before any trial is processed; it
//! is the single place configuration errors are raised.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Relative tolerance for accepting a rate ratio as an integer.
const INTEGER_RATIO_TOLERANCE: f64 = 1e-9;

/// Exact integer decimation factor from `from_hz` to `to_hz`.
///
/// Errors rather than rounding when the ratio is not an integer.
///
/// ```
/// use aad_core::config::decimation_factor;
///
/// assert_eq!(decimation_factor(128.0, 64.0).unwrap(), 2);
/// assert!(decimation_factor(100.0, 33.0).is_err());
/// ```
pub fn decimation_factor(from_hz: f64, to_hz: f64) -> Result<usize, ConfigurationError> {
    let invalid = || ConfigurationError::NonIntegerDecimation { from_hz, to_hz };
    if !(from_hz.is_finite() && to_hz.is_finite()) || from_hz <= 0.0 || to_hz <= 0.0 {
        return Err(invalid());
    }
    let ratio = from_hz / to_hz;
    let rounded = ratio.round();
    if rounded < 1.0 || (ratio - rounded).abs() > INTEGER_RATIO_TOLERANCE * ratio {
        return Err(invalid());
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(rounded as usize)
}

/// Convert a lag in milliseconds to the nearest whole number of samples.
#[allow(clippy::cast_possible_truncation)]
pub fn ms_to_samples(ms: f64, rate_hz: f64) -> isize {
    (ms * rate_hz / 1000.0).round() as isize
}

/// Preferred filter-bank design for envelope extraction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterBankKind {
    /// ERB-spaced gammatone bank
    #[default]
    Gammatone,
    /// Butterworth band-pass bank over the same ERB-spaced edges
    Butterworth,
    /// Single broadband channel
    Broadband,
}

/// Envelope extraction settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Intermediate audio rate for the filter bank (Hz)
    pub audio_rate_hz: f64,
    /// Intermediate envelope rate before final decimation (Hz)
    pub envelope_rate_hz: f64,
    /// Number of auditory sub-bands (B)
    pub subband_count: usize,
    /// Lowest sub-band edge (Hz)
    pub subband_low_hz: f64,
    /// Highest sub-band edge (Hz)
    pub subband_high_hz: f64,
    /// Power-law compression exponent
    pub power_law_exponent: f64,
    /// Preferred filter-bank design; fallbacks follow automatically
    pub filter_bank: FilterBankKind,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            audio_rate_hz: 8000.0,
            envelope_rate_hz: 128.0,
            subband_count: 15,
            subband_low_hz: 150.0,
            subband_high_hz: 4000.0,
            power_law_exponent: 0.6,
            filter_bank: FilterBankKind::Gammatone,
        }
    }
}

/// Windowed cross-correlation decoder settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Analysis window length (s)
    pub window_s: f64,
    /// Window step (s)
    pub step_s: f64,
    /// Maximum absolute lag searched (ms)
    pub max_lag_ms: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self { window_s: 10.0, step_s: 1.0, max_lag_ms: 500.0 }
    }
}

/// Temporal response function decoder settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrfConfig {
    /// First lag (ms), negative means EEG leads the envelope
    pub lag_min_ms: f64,
    /// Last lag (ms)
    pub lag_max_ms: f64,
    /// Ridge parameter λ, strictly positive
    pub lambda: f64,
}

impl Default for TrfConfig {
    fn default() -> Self {
        Self { lag_min_ms: -100.0, lag_max_ms: 400.0, lambda: 1e-3 }
    }
}

/// How retained canonical components are combined into one test score.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CcaScorePolicy {
    /// Correlation of the first canonical pair only
    #[default]
    FirstComponent,
    /// Training-correlation-weighted mean over retained components
    CorrelationWeighted,
}

/// Canonical correlation analysis decoder settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CcaConfig {
    /// Envelope lags 0..=max_lag (ms)
    pub max_lag_ms: f64,
    /// Upper bound on retained components
    pub max_components: usize,
    /// Base covariance regularization (relative to mean variance)
    pub regularization: f64,
    /// Retained components ≤ fraction × min(samples, features)
    pub component_fraction: f64,
    /// Retained components ≤ samples / this ratio
    pub min_samples_per_component: usize,
    /// Test score policy
    pub score_policy: CcaScorePolicy,
}

impl Default for CcaConfig {
    fn default() -> Self {
        Self {
            max_lag_ms: 250.0,
            max_components: 3,
            regularization: 1e-4,
            component_fraction: 0.5,
            min_samples_per_component: 10,
            score_policy: CcaScorePolicy::FirstComponent,
        }
    }
}

/// Cross-validation scheme for the trained decoders.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossValidation {
    /// One fold per trial
    #[default]
    LeaveOneTrialOut,
    /// Trials partitioned into `folds` contiguous groups
    KFold {
        /// Number of folds (≥ 2)
        folds: usize,
    },
}

/// Paired significance test for configuration comparisons.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairedTest {
    /// Two-sided paired Student t-test
    #[default]
    StudentT,
    /// Wilcoxon signed-rank test (normal approximation)
    Wilcoxon,
}

/// Complete analysis configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Final sample rate shared by EEG and envelopes (Hz)
    pub target_rate_hz: f64,
    /// Band-pass lower cutoff for EEG and envelopes (Hz)
    pub band_low_hz: f64,
    /// Band-pass upper cutoff for EEG and envelopes (Hz)
    pub band_high_hz: f64,
    /// Butterworth order of each band-pass edge (even)
    pub filter_order: usize,
    /// Envelope extraction
    pub envelope: EnvelopeConfig,
    /// Correlation decoder
    pub correlation: CorrelationConfig,
    /// TRF decoder
    pub trf: TrfConfig,
    /// CCA decoder
    pub cca: CcaConfig,
    /// Cross-validation scheme
    pub cross_validation: CrossValidation,
    /// Paired test used by configuration comparisons
    pub paired_test: PairedTest,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            target_rate_hz: 64.0,
            band_low_hz: 1.0,
            band_high_hz: 9.0,
            filter_order: 4,
            envelope: EnvelopeConfig::default(),
            correlation: CorrelationConfig::default(),
            trf: TrfConfig::default(),
            cca: CcaConfig::default(),
            cross_validation: CrossValidation::default(),
            paired_test: PairedTest::default(),
        }
    }
}

fn positive(parameter: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidParameter {
            parameter,
            reason: format!("must be finite and > 0, got {value}"),
        })
    }
}

/// Check `0 < low < high < rate / 2`.
pub fn validate_band(low_hz: f64, high_hz: f64, sample_rate_hz: f64) -> Result<(), ConfigurationError> {
    let nyquist = sample_rate_hz / 2.0;
    if low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist && high_hz.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidBand { low_hz, high_hz, sample_rate_hz })
    }
}

impl AnalysisConfig {
    /// Validate every parameter; any error is fatal for the run
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("target_rate_hz", self.target_rate_hz)?;
        positive("envelope.audio_rate_hz", self.envelope.audio_rate_hz)?;
        positive("envelope.envelope_rate_hz", self.envelope.envelope_rate_hz)?;
        decimation_factor(self.envelope.envelope_rate_hz, self.target_rate_hz)?;

        // Band-pass runs at the intermediate rate and must survive decimation
        validate_band(self.band_low_hz, self.band_high_hz, self.target_rate_hz)?;
        if self.filter_order == 0 || self.filter_order % 2 != 0 {
            return Err(ConfigurationError::InvalidParameter {
                parameter: "filter_order",
                reason: format!("must be a positive even number, got {}", self.filter_order),
            });
        }

        let env = &self.envelope;
        if env.subband_count == 0 {
            return Err(ConfigurationError::InvalidParameter {
                parameter: "envelope.subband_count",
                reason: "must be at least 1".into(),
            });
        }
        if !(env.subband_low_hz > 0.0
            && env.subband_low_hz < env.subband_high_hz
            && env.subband_high_hz <= env.audio_rate_hz / 2.0)
        {
            return Err(ConfigurationError::InvalidBand {
                low_hz: env.subband_low_hz,
                high_hz: env.subband_high_hz,
                sample_rate_hz: env.audio_rate_hz,
            });
        }
        positive("envelope.power_law_exponent", env.power_law_exponent)?;

        positive("correlation.window_s", self.correlation.window_s)?;
        positive("correlation.step_s", self.correlation.step_s)?;
        if !(self.correlation.max_lag_ms >= 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                parameter: "correlation.max_lag_ms",
                reason: "must be >= 0".into(),
            });
        }

        if !(self.trf.lag_min_ms <= self.trf.lag_max_ms) {
            return Err(ConfigurationError::InvalidParameter {
                parameter: "trf.lag_min_ms",
                reason: format!(
                    "lag window [{}, {}] ms is inverted",
                    self.trf.lag_min_ms, self.trf.lag_max_ms
                ),
            });
        }
        positive("trf.lambda", self.trf.lambda)?;

        let cca = &self.cca;
        if !(cca.max_lag_ms >= 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                parameter: "cca.max_lag_ms",
                reason: "must be >= 0".into(),
            });
        }
        if cca.max_components == 0 || cca.min_samples_per_component == 0 {
            return Err(ConfigurationError::InvalidParameter {
                parameter: "cca.max_components",
                reason: "component bounds must be at least 1".into(),
            });
        }
        positive("cca.regularization", cca.regularization)?;
        if !(cca.component_fraction > 0.0 && cca.component_fraction <= 1.0) {
            return Err(ConfigurationError::InvalidParameter {
                parameter: "cca.component_fraction",
                reason: format!("must be in (0, 1], got {}", cca.component_fraction),
            });
        }

        if let CrossValidation::KFold { folds } = self.cross_validation {
            if folds < 2 {
                return Err(ConfigurationError::InvalidParameter {
                    parameter: "cross_validation.folds",
                    reason: format!("k-fold needs at least 2 folds, got {folds}"),
                });
            }
        }
        Ok(())
    }

    /// Integer factor from the intermediate envelope rate to the target rate
    pub fn envelope_decimation(&self) -> Result<usize, ConfigurationError> {
        decimation_factor(self.envelope.envelope_rate_hz, self.target_rate_hz)
    }
}
