//! Error types for auditory attention decoding
//!
//! Errors are split by how the pipeline reacts to them:
//! - [`ConfigurationError`]: fatal, aborts the run before any model fitting
//! - [`DataError`]: the affected trial or subject is excluded and logged
//! - [`StatisticalInputError`]: reported as insufficient data, never a p-value
//! - [`NumericalDegeneracy`]: not an error; a locally recovered condition

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::StimulusId;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Invalid analysis configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Rate conversion that must be an exact integer decimation is not
    #[error("decimation from {from_hz} Hz to {to_hz} Hz is not an exact integer factor")]
    NonIntegerDecimation {
        /// Source rate in Hz
        from_hz: f64,
        /// Target rate in Hz
        to_hz: f64,
    },

    /// Frequency band outside (0, Nyquist) or inverted
    #[error("invalid frequency band [{low_hz}, {high_hz}] Hz at {sample_rate_hz} Hz sampling")]
    InvalidBand {
        /// Lower edge in Hz
        low_hz: f64,
        /// Upper edge in Hz
        high_hz: f64,
        /// Sample rate the band is applied at
        sample_rate_hz: f64,
    },

    /// Any other out-of-range parameter
    #[error("invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        /// Parameter name
        parameter: &'static str,
        /// Reason
        reason: String,
    },
}

// ============================================================================
// Data Errors
// ============================================================================

/// Problem with one trial's data; the trial is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Envelope for a stimulus could not be loaded
    #[error("envelope for stimulus {stimulus} not found")]
    MissingEnvelope {
        /// Stimulus whose envelope is missing
        stimulus: StimulusId,
    },

    /// Two series that must share a length do not
    #[error("{series} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        /// Which series
        series: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        got: usize,
    },

    /// NaN or infinity in a series
    #[error("non-finite values in {series}")]
    NonFinite {
        /// Which series
        series: &'static str,
    },

    /// Series with no samples or channels
    #[error("{series} is empty")]
    EmptySignal {
        /// Which series
        series: &'static str,
    },

    /// Envelope rate differs from the EEG rate after alignment
    #[error("sample rate mismatch: expected {expected_hz} Hz, got {got_hz} Hz")]
    RateMismatch {
        /// Expected rate
        expected_hz: f64,
        /// Actual rate
        got_hz: f64,
    },

    /// Attended and unattended envelopes have different sub-band counts
    #[error("sub-band count mismatch: attended {attended}, unattended {unattended}")]
    BandMismatch {
        /// Attended band count
        attended: usize,
        /// Unattended band count
        unattended: usize,
    },

    /// Requested channel does not exist
    #[error("channel {channel} out of range ({channels} channels)")]
    ChannelOutOfRange {
        /// Requested channel
        channel: usize,
        /// Available channels
        channels: usize,
    },

    /// Envelope sample below zero
    #[error("envelope contains negative samples")]
    NegativeEnvelope,

    /// Trial shorter than one analysis window
    #[error("trial of {samples} samples is shorter than one {window}-sample window")]
    NoAnalysisWindows {
        /// Trial length
        samples: usize,
        /// Window length
        window: usize,
    },

    /// Not enough trials for cross-validation
    #[error("insufficient trials: got {got}, need {need}")]
    InsufficientTrials {
        /// Usable trials
        got: usize,
        /// Required trials
        need: usize,
    },

    /// The I/O layer failed to deliver a trial
    #[error("trial source failed: {reason}")]
    Source {
        /// Reason reported by the source
        reason: String,
    },
}

// ============================================================================
// Statistical Errors
// ============================================================================

/// Not enough paired observations for a comparison.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatisticalInputError {
    /// Fewer paired subjects than the test requires
    #[error("insufficient data: {got} paired subjects, need at least {need}")]
    InsufficientPairs {
        /// Paired subjects available
        got: usize,
        /// Minimum required
        need: usize,
    },
}

// ============================================================================
// Numerical Degeneracy
// ============================================================================

/// Numerically degenerate condition that was recovered locally.
///
/// Never returned as an error; logged and attached to fold diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NumericalDegeneracy {
    /// Fewer samples than features, or collinear columns
    RankDeficient {
        /// Samples available
        samples: usize,
        /// Feature columns
        features: usize,
    },
    /// Ridge parameter increased until the normal equations factored
    RidgeEscalated {
        /// Effective ridge parameter
        lambda: f64,
    },
    /// Diagonal perturbation added to a covariance matrix
    CovariancePerturbed {
        /// Added diagonal value
        epsilon: f64,
    },
    /// Columns with non-finite or constant values were dropped
    ColumnsDropped {
        /// Number of dropped columns
        count: usize,
    },
    /// Decomposition failed; a zero-correlation model was used
    DegenerateFallback,
}

impl fmt::Display for NumericalDegeneracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RankDeficient { samples, features } => {
                write!(f, "rank deficient: {samples} samples for {features} features")
            }
            Self::RidgeEscalated { lambda } => write!(f, "ridge escalated to {lambda:e}"),
            Self::CovariancePerturbed { epsilon } => {
                write!(f, "covariance perturbed by {epsilon:e}")
            }
            Self::ColumnsDropped { count } => write!(f, "{count} degenerate columns dropped"),
            Self::DegenerateFallback => write!(f, "degenerate zero-correlation fallback"),
        }
    }
}

// ============================================================================
// Umbrella
// ============================================================================

/// Any error surfaced by the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AadError {
    /// Fatal configuration problem
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Data problem
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// Statistical input problem
    #[error("statistics error: {0}")]
    Statistics(#[from] StatisticalInputError),
}

/// Result type for pipeline operations
pub type AadResult<T> = Result<T, AadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ConfigurationError::NonIntegerDecimation { from_hz: 100.0, to_hz: 33.0 };
        assert_eq!(
            err.to_string(),
            "decimation from 100 Hz to 33 Hz is not an exact integer factor"
        );

        let err = DataError::MissingEnvelope { stimulus: StimulusId::new("story_3") };
        assert_eq!(err.to_string(), "envelope for stimulus story_3 not found");

        let err = StatisticalInputError::InsufficientPairs { got: 1, need: 2 };
        assert!(err.to_string().starts_with("insufficient data"));
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: AadError = DataError::NegativeEnvelope.into();
        assert!(matches!(err, AadError::Data(DataError::NegativeEnvelope)));
    }
}
