//! AAD Core - data model, configuration and statistics
//!
//! This crate provides the foundational types shared by every stage of the
//! auditory attention decoding (AAD) evaluation: envelopes, aligned trials,
//! subjects, per-unit predictions and accuracy records, together with the
//! error taxonomy, the analysis configuration and the scalar statistics used
//! by the evaluation harness.
//!
//! # Modules
//!
//! - [`types`]: Core data types (sample matrices, envelopes, trials, records)
//! - [`error`]: Configuration, data and statistical error types
//! - [`config`]: Analysis configuration with defaults and validation
//! - [`math`]: Descriptive statistics, correlation and distribution functions
//!
//! # Example
//!
//! ```rust
//! use aad_core::types::{AttentionLabel, SampleMatrix, Trial, TrialId};
//!
//! let eeg = SampleMatrix::from_channels(vec![vec![0.0, 1.0, 0.5], vec![1.0, 0.0, 0.5]]).unwrap();
//! let attended = SampleMatrix::from_channels(vec![vec![0.2, 0.4, 0.1]]).unwrap();
//! let unattended = SampleMatrix::from_channels(vec![vec![0.3, 0.1, 0.2]]).unwrap();
//!
//! let trial = Trial::new(TrialId(0), eeg, attended, unattended, AttentionLabel::AttendedLeft, 64.0)
//!     .unwrap();
//! assert_eq!(trial.len(), 3);
//! assert_eq!(trial.eeg().n_channels(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod math;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{
    AnalysisConfig, CcaConfig, CcaScorePolicy, CorrelationConfig, CrossValidation,
    EnvelopeConfig, FilterBankKind, PairedTest, TrfConfig,
};
pub use error::{
    AadError, AadResult, ConfigurationError, DataError, NumericalDegeneracy,
    StatisticalInputError,
};
pub use types::{
    AccuracyRecord, Algorithm, AttentionLabel, BankQuality, ConfigurationId, Envelope,
    ExcludedTrial, Prediction, PredictionResult, RecordKey, RecordStatus, Rereference,
    SampleMatrix, StimulusId, StimulusPair, Subject, SubjectId, Trial, TrialId, UnitOutcome,
};
