//! Temporal response function decoder
//!
//! A forward model maps the lagged envelope to every EEG channel:
//!
//! ```text
//! eeg_c(t) ≈ Σ_l Σ_b w[l·B + b, c] · env_b(t − lag_l)
//! ```
//!
//! fitted by ridge regression on the training trials. A test envelope is
//! reconstructed with the adjoint mapping `Σ w · eeg_c(t + lag_l)`, summed
//! over bands and averaged over channels, and scored by Pearson correlation
//! with the actual (band-summed) envelope.

use nalgebra::DMatrix;
use tracing::debug;

use aad_core::config::TrfConfig;
use aad_core::error::{DataError, NumericalDegeneracy};
use aad_core::math::pearson;
use aad_core::types::{Algorithm, SampleMatrix, Trial};

use super::lagged::{lagged_design, to_dmatrix, LagWindow};
use super::{EnvelopeSide, FoldOutcome, TrialDecoder};

/// Ridge escalations (×10 each) before falling back to a zero model
const MAX_RIDGE_ESCALATIONS: usize = 8;

/// Fitted forward TRF for one envelope side.
#[derive(Clone, Debug)]
pub struct TrfModel {
    lags: LagWindow,
    bands: usize,
    channels: usize,
    /// `(L·B) × C` weights
    weights: DMatrix<f64>,
}

impl TrfModel {
    /// Fit on `trials`, regressing the EEG on the `side` envelope.
    ///
    /// Trials whose shape differs from the first are skipped. If the normal
    /// equations cannot be factored even after escalating λ, the model has
    /// zero weights and every reconstruction scores 0. With no training
    /// trials the model has no channels and cannot score anything.
    pub fn fit(trials: &[&Trial], side: EnvelopeSide, config: &TrfConfig) -> (Self, Vec<NumericalDegeneracy>) {
        let mut diagnostics = Vec::new();
        let Some(first) = trials.first() else {
            let lags = LagWindow::new(0, 0);
            diagnostics.push(NumericalDegeneracy::DegenerateFallback);
            return (Self::zero(lags, 0, 0), diagnostics);
        };

        let lags = LagWindow::from_ms(config.lag_min_ms, config.lag_max_ms, first.rate_hz());
        let bands = side.of(first).n_channels();
        let channels = first.eeg().n_channels();
        let features = lags.len() * bands;

        let mut xtx = DMatrix::<f64>::zeros(features, features);
        let mut xty = DMatrix::<f64>::zeros(features, channels);
        let mut samples = 0;
        for trial in trials {
            if side.of(trial).n_channels() != bands || trial.eeg().n_channels() != channels {
                debug!(trial = %trial.id(), "Skipping trial with mismatched shape");
                continue;
            }
            let x = lagged_design(side.of(trial), lags);
            let y = to_dmatrix(trial.eeg());
            xtx += x.tr_mul(&x);
            xty += x.tr_mul(&y);
            samples += trial.len();
        }
        if samples < features {
            diagnostics.push(NumericalDegeneracy::RankDeficient { samples, features });
        }

        let mut lambda = config.lambda;
        for escalation in 0..=MAX_RIDGE_ESCALATIONS {
            let mut normal = xtx.clone();
            for i in 0..features {
                normal[(i, i)] += lambda;
            }
            if let Some(cholesky) = normal.cholesky() {
                let weights = cholesky.solve(&xty);
                if weights.iter().all(|w| w.is_finite()) {
                    if escalation > 0 {
                        diagnostics.push(NumericalDegeneracy::RidgeEscalated { lambda });
                    }
                    return (Self { lags, bands, channels, weights }, diagnostics);
                }
            }
            lambda *= 10.0;
        }

        diagnostics.push(NumericalDegeneracy::DegenerateFallback);
        (Self::zero(lags, bands, channels), diagnostics)
    }

    fn zero(lags: LagWindow, bands: usize, channels: usize) -> Self {
        Self { lags, bands, channels, weights: DMatrix::zeros(lags.len() * bands, channels) }
    }

    /// Band-summed envelope reconstructed from `eeg`, averaged over channels.
    ///
    /// `eeg` must have exactly the channel count the model was fitted on.
    pub fn reconstruct(&self, eeg: &SampleMatrix) -> Result<Vec<f64>, DataError> {
        if eeg.n_channels() != self.channels || self.channels == 0 {
            return Err(DataError::LengthMismatch {
                series: "eeg channels",
                expected: self.channels,
                got: eeg.n_channels(),
            });
        }

        let n = eeg.n_samples();
        let channels = self.channels;
        let mut out = vec![0.0; n];
        for c in 0..channels {
            let x = eeg.channel(c);
            for (l, lag) in self.lags.iter().enumerate() {
                let w: f64 = (0..self.bands).map(|b| self.weights[(l * self.bands + b, c)]).sum();
                if w == 0.0 {
                    continue;
                }
                for (t, o) in out.iter_mut().enumerate() {
                    let s = t as isize + lag;
                    if s >= 0 && (s as usize) < n {
                        *o += w * x[s as usize];
                    }
                }
            }
        }
        let scale = 1.0 / channels as f64;
        for o in &mut out {
            *o *= scale;
        }
        Ok(out)
    }

    /// Pearson correlation between the reconstruction and the `side` envelope
    pub fn score(&self, trial: &Trial, side: EnvelopeSide) -> Result<f64, DataError> {
        Ok(pearson(&self.reconstruct(trial.eeg())?, &side.of(trial).summed_channels()))
    }
}

/// Ridge-regression TRF decoder.
#[derive(Clone, Debug, Default)]
pub struct TrfDecoder {
    config: TrfConfig,
}

impl TrfDecoder {
    /// Create a decoder
    pub fn new(config: TrfConfig) -> Self {
        Self { config }
    }
}

impl TrialDecoder for TrfDecoder {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Trf
    }

    fn decode_fold(&self, train: &[&Trial], test: &Trial) -> FoldOutcome {
        let (attended, mut diagnostics) = TrfModel::fit(train, EnvelopeSide::Attended, &self.config);
        let (unattended, more) = TrfModel::fit(train, EnvelopeSide::Unattended, &self.config);
        diagnostics.extend(more);
        for diagnostic in &diagnostics {
            debug!(trial = %test.id(), %diagnostic, "TRF numerical recovery");
        }

        let score = |model: &TrfModel, side: EnvelopeSide| {
            model.score(test, side).unwrap_or_else(|e| {
                debug!(trial = %test.id(), error = %e, "TRF model cannot score trial");
                0.0
            })
        };
        FoldOutcome::from_scores(
            score(&attended, EnvelopeSide::Attended),
            score(&unattended, EnvelopeSide::Unattended),
            diagnostics,
        )
    }
}
