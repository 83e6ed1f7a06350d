//! Attention decoders
//!
//! This module provides the three decoders compared by the evaluation:
//! - [`correlation`]: untrained windowed maximum cross-correlation
//! - [`trf`]: forward temporal response function with adjoint reconstruction
//! - [`cca`]: canonical correlation between EEG and lagged envelopes
//! - [`lagged`]: lagged design matrices shared by TRF and CCA
//!
//! Trained decoders implement [`TrialDecoder`]: a fold trains on the given
//! trials and scores one held-out trial. Models never outlive the fold.

pub mod cca;
pub mod correlation;
pub mod lagged;
pub mod trf;

use aad_core::error::NumericalDegeneracy;
use aad_core::types::{Algorithm, PredictionResult, SampleMatrix, Trial};

pub use cca::{CcaDecoder, CcaModel};
pub use correlation::CorrelationDecoder;
pub use lagged::LagWindow;
pub use trf::{TrfDecoder, TrfModel};

/// Which envelope of a trial a model is fitted to or scored against
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EnvelopeSide {
    /// Attended stream
    Attended,
    /// Unattended stream
    Unattended,
}

impl EnvelopeSide {
    /// The envelope of `trial` on this side
    pub fn of(self, trial: &Trial) -> &SampleMatrix {
        match self {
            Self::Attended => trial.attended(),
            Self::Unattended => trial.unattended(),
        }
    }
}

/// Result of decoding one held-out trial.
#[derive(Clone, Debug, PartialEq)]
pub struct FoldOutcome {
    /// Score of the attended-side model on the test trial
    pub attended_score: f64,
    /// Score of the unattended-side model on the test trial
    pub unattended_score: f64,
    /// Decision derived from the two scores
    pub result: PredictionResult,
    /// Numerical recoveries applied while fitting
    pub diagnostics: Vec<NumericalDegeneracy>,
}

impl FoldOutcome {
    /// Build an outcome from the two side scores
    pub fn from_scores(attended_score: f64, unattended_score: f64, diagnostics: Vec<NumericalDegeneracy>) -> Self {
        Self {
            attended_score,
            unattended_score,
            result: PredictionResult::from_scores(attended_score, unattended_score),
            diagnostics,
        }
    }
}

/// A decoder trained per cross-validation fold.
pub trait TrialDecoder: Send + Sync {
    /// Algorithm identifier for result records
    fn algorithm(&self) -> Algorithm;

    /// Train on `train` and decode the held-out `test` trial.
    ///
    /// Must not fail: numerical problems are recovered locally and reported
    /// in [`FoldOutcome::diagnostics`].
    fn decode_fold(&self, train: &[&Trial], test: &Trial) -> FoldOutcome;
}
