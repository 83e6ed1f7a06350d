//! Canonical correlation analysis decoder
//!
//! Finds paired projections of the EEG (`[T × C]`) and of the lagged envelope
//! (`[T × (L·B)]`, lags `0..=max_lag`) with maximal correlation on the
//! training trials. The test score is the correlation of the projected test
//! data.
//!
//! Fitting:
//! 1. Drop non-finite or constant columns; z-score with training statistics
//! 2. Covariances `Cxx`, `Cyy`, `Cxy` with a diagonal regularizer, increased
//!    when the data is rank deficient or a factorization fails
//! 3. Whiten with Cholesky factors and take the SVD of
//!    `K = Lx⁻¹ · Cxy · Ly⁻ᵀ`; singular values are the canonical correlations
//! 4. Retain at most `min(max_components, fraction·min(n, p, q), n / ratio)`
//!    components
//!
//! Any unrecoverable failure yields a degenerate model that scores 0.

use nalgebra::DMatrix;
use tracing::debug;

use aad_core::config::{ms_to_samples, CcaConfig, CcaScorePolicy};
use aad_core::error::NumericalDegeneracy;
use aad_core::math::pearson;
use aad_core::types::{Algorithm, SampleMatrix, Trial};

use super::lagged::{lagged_design, to_dmatrix, LagWindow};
use super::{EnvelopeSide, FoldOutcome, TrialDecoder};

/// Regularizer floor when samples do not exceed features
const RANK_DEFICIENT_EPSILON: f64 = 1e-3;
/// Factorization retries (×10 regularizer each)
const MAX_PERTURBATIONS: usize = 8;

// ============================================================================
// Column standardization
// ============================================================================

/// Keeps usable columns and z-scores them with training statistics.
#[derive(Clone, Debug)]
struct ColumnScaler {
    total: usize,
    keep: Vec<usize>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl ColumnScaler {
    fn fit(data: &DMatrix<f64>) -> Self {
        let n = data.nrows();
        let mut keep = Vec::new();
        let mut mean = Vec::new();
        let mut scale = Vec::new();
        for (j, column) in data.column_iter().enumerate() {
            if n < 2 || column.iter().any(|v| !v.is_finite()) {
                continue;
            }
            let m = column.sum() / n as f64;
            let var = column.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64;
            let sd = var.sqrt();
            if sd > 1e-12 * m.abs().max(1.0) {
                keep.push(j);
                mean.push(m);
                scale.push(1.0 / sd);
            }
        }
        Self { total: data.ncols(), keep, mean, scale }
    }

    fn dropped(&self) -> usize {
        self.total - self.keep.len()
    }

    fn width(&self) -> usize {
        self.keep.len()
    }

    /// Standardized copy of the kept columns; non-finite values become 0
    fn apply(&self, data: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(data.nrows(), self.keep.len());
        for (k, &j) in self.keep.iter().enumerate() {
            for (dst, &v) in out.column_mut(k).iter_mut().zip(data.column(j).iter()) {
                let z = (v - self.mean[k]) * self.scale[k];
                *dst = if z.is_finite() { z } else { 0.0 };
            }
        }
        out
    }
}

/// Stack per-trial blocks vertically.
fn stack(blocks: &[DMatrix<f64>]) -> DMatrix<f64> {
    let cols = blocks.first().map_or(0, DMatrix::ncols);
    let rows = blocks.iter().map(DMatrix::nrows).sum();
    let mut out = DMatrix::zeros(rows, cols);
    let mut row = 0;
    for block in blocks {
        out.view_mut((row, 0), (block.nrows(), cols)).copy_from(block);
        row += block.nrows();
    }
    out
}

fn column_vec(matrix: &DMatrix<f64>, j: usize) -> Vec<f64> {
    matrix.column(j).iter().copied().collect()
}

// ============================================================================
// Model
// ============================================================================

#[derive(Clone, Debug)]
struct FittedCca {
    eeg_scaler: ColumnScaler,
    env_scaler: ColumnScaler,
    /// `p × k` EEG projection
    eeg_weights: DMatrix<f64>,
    /// `q × k` envelope projection
    env_weights: DMatrix<f64>,
    correlations: Vec<f64>,
}

/// CCA model for one envelope side; possibly degenerate.
#[derive(Clone, Debug)]
pub struct CcaModel {
    lags: LagWindow,
    fitted: Option<FittedCca>,
}

impl CcaModel {
    /// Fit on `trials`, pairing the EEG with the `side` envelope
    pub fn fit(trials: &[&Trial], side: EnvelopeSide, config: &CcaConfig) -> (Self, Vec<NumericalDegeneracy>) {
        let mut diagnostics = Vec::new();
        let rate = trials.first().map_or(1.0, |t| t.rate_hz());
        let lags = LagWindow::new(0, ms_to_samples(config.max_lag_ms, rate).max(0));

        let fitted = Self::fit_inner(trials, side, config, lags, &mut diagnostics);
        if fitted.is_none() {
            diagnostics.push(NumericalDegeneracy::DegenerateFallback);
        }
        (Self { lags, fitted }, diagnostics)
    }

    fn fit_inner(
        trials: &[&Trial],
        side: EnvelopeSide,
        config: &CcaConfig,
        lags: LagWindow,
        diagnostics: &mut Vec<NumericalDegeneracy>,
    ) -> Option<FittedCca> {
        let first = trials.first()?;
        let channels = first.eeg().n_channels();
        let bands = side.of(first).n_channels();
        let usable: Vec<&&Trial> = trials
            .iter()
            .filter(|t| t.eeg().n_channels() == channels && side.of(t).n_channels() == bands)
            .collect();

        let x_raw = stack(&usable.iter().map(|t| to_dmatrix(t.eeg())).collect::<Vec<_>>());
        let y_raw = stack(&usable.iter().map(|t| lagged_design(side.of(t), lags)).collect::<Vec<_>>());
        let n = x_raw.nrows();

        let eeg_scaler = ColumnScaler::fit(&x_raw);
        let env_scaler = ColumnScaler::fit(&y_raw);
        let dropped = eeg_scaler.dropped() + env_scaler.dropped();
        if dropped > 0 {
            diagnostics.push(NumericalDegeneracy::ColumnsDropped { count: dropped });
        }
        let (p, q) = (eeg_scaler.width(), env_scaler.width());
        if n < 2 || p == 0 || q == 0 {
            return None;
        }
        let x = eeg_scaler.apply(&x_raw);
        let y = env_scaler.apply(&y_raw);

        let denom = (n - 1) as f64;
        let cxx = x.tr_mul(&x) / denom;
        let cyy = y.tr_mul(&y) / denom;
        let cxy = x.tr_mul(&y) / denom;

        let mut epsilon = config.regularization;
        if n <= p.max(q) {
            diagnostics.push(NumericalDegeneracy::RankDeficient { samples: n, features: p + q });
            epsilon = epsilon.max(RANK_DEFICIENT_EPSILON);
        }

        let regularized = |c: &DMatrix<f64>, eps: f64| {
            let mut c = c.clone();
            for i in 0..c.nrows() {
                c[(i, i)] += eps;
            }
            c
        };
        let mut factors = None;
        for _ in 0..=MAX_PERTURBATIONS {
            if let (Some(cx), Some(cy)) =
                (regularized(&cxx, epsilon).cholesky(), regularized(&cyy, epsilon).cholesky())
            {
                factors = Some((cx.l(), cy.l()));
                break;
            }
            epsilon *= 10.0;
        }
        let (lx, ly) = factors?;
        if epsilon > config.regularization {
            diagnostics.push(NumericalDegeneracy::CovariancePerturbed { epsilon });
        }

        // K = Lx⁻¹ · Cxy · Ly⁻ᵀ
        let m = lx.solve_lower_triangular(&cxy)?;
        let k = ly.solve_lower_triangular(&m.transpose())?.transpose();

        let svd = k.svd(true, true);
        let u = svd.u?;
        let v = svd.v_t?.transpose();
        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

        let by_fraction = ((config.component_fraction * n.min(p).min(q) as f64).floor() as usize).max(1);
        let by_samples = n / config.min_samples_per_component;
        let retained = config.max_components.min(by_fraction).min(by_samples).min(order.len());
        if retained == 0 {
            return None;
        }

        let u_k = DMatrix::from_fn(p, retained, |i, j| u[(i, order[j])]);
        let v_k = DMatrix::from_fn(q, retained, |i, j| v[(i, order[j])]);
        let eeg_weights = lx.transpose().solve_upper_triangular(&u_k)?;
        let env_weights = ly.transpose().solve_upper_triangular(&v_k)?;
        let correlations: Vec<f64> =
            order[..retained].iter().map(|&i| svd.singular_values[i].clamp(0.0, 1.0)).collect();

        let finite = eeg_weights.iter().chain(env_weights.iter()).chain(&correlations).all(|v| v.is_finite());
        finite.then_some(FittedCca { eeg_scaler, env_scaler, eeg_weights, env_weights, correlations })
    }

    /// Whether fitting failed and the model scores 0
    pub fn is_degenerate(&self) -> bool {
        self.fitted.is_none()
    }

    /// Training canonical correlations of the retained components
    pub fn correlations(&self) -> &[f64] {
        self.fitted.as_ref().map_or(&[] as &[f64], |f| f.correlations.as_slice())
    }

    /// Number of retained components
    pub fn components(&self) -> usize {
        self.correlations().len()
    }

    /// Test-set canonical correlation of each retained component
    pub fn component_scores(&self, eeg: &SampleMatrix, envelope: &SampleMatrix) -> Vec<f64> {
        let Some(fitted) = &self.fitted else {
            return Vec::new();
        };
        let x_raw = to_dmatrix(eeg);
        let y_raw = lagged_design(envelope, self.lags);
        if x_raw.ncols() != fitted.eeg_scaler.total || y_raw.ncols() != fitted.env_scaler.total {
            return vec![0.0; fitted.correlations.len()];
        }
        let u = fitted.eeg_scaler.apply(&x_raw) * &fitted.eeg_weights;
        let v = fitted.env_scaler.apply(&y_raw) * &fitted.env_weights;
        (0..fitted.correlations.len()).map(|j| pearson(&column_vec(&u, j), &column_vec(&v, j))).collect()
    }

    /// Combined test score under `policy`
    pub fn score(&self, trial: &Trial, side: EnvelopeSide, policy: CcaScorePolicy) -> f64 {
        let scores = self.component_scores(trial.eeg(), side.of(trial));
        match policy {
            CcaScorePolicy::FirstComponent => scores.first().copied().unwrap_or(0.0),
            CcaScorePolicy::CorrelationWeighted => {
                let weights = self.correlations();
                let total: f64 = weights.iter().sum();
                if total <= 0.0 {
                    return 0.0;
                }
                scores.iter().zip(weights).map(|(s, w)| s * w).sum::<f64>() / total
            }
        }
    }
}

/// CCA decoder.
#[derive(Clone, Debug, Default)]
pub struct CcaDecoder {
    config: CcaConfig,
}

impl CcaDecoder {
    /// Create a decoder
    pub fn new(config: CcaConfig) -> Self {
        Self { config }
    }
}

impl TrialDecoder for CcaDecoder {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Cca
    }

    fn decode_fold(&self, train: &[&Trial], test: &Trial) -> FoldOutcome {
        let (attended, mut diagnostics) = CcaModel::fit(train, EnvelopeSide::Attended, &self.config);
        let (unattended, more) = CcaModel::fit(train, EnvelopeSide::Unattended, &self.config);
        diagnostics.extend(more);
        for diagnostic in &diagnostics {
            debug!(trial = %test.id(), %diagnostic, "CCA numerical recovery");
        }

        let policy = self.config.score_policy;
        FoldOutcome::from_scores(
            attended.score(test, EnvelopeSide::Attended, policy),
            unattended.score(test, EnvelopeSide::Unattended, policy),
            diagnostics,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{EegMix, SyntheticGenerator, TrialSpec};
    use aad_core::types::{AttentionLabel, Prediction, SubjectId, TrialId};

    fn holdout(trials: &[Trial], test: usize) -> Vec<&Trial> {
        trials.iter().enumerate().filter(|(i, _)| *i != test).map(|(_, t)| t).collect()
    }

    #[test]
    fn test_attended_eeg_is_decoded() {
        let spec = TrialSpec { mix: EegMix::AttendedOnly, noise_std: 0.1, ..TrialSpec::default() };
        let subject = SyntheticGenerator::new(31).subject(SubjectId::new("s"), 4, &spec).unwrap();
        let trials = subject.trials();
        let decoder = CcaDecoder::default();

        for test in 0..trials.len() {
            let outcome = decoder.decode_fold(&holdout(trials, test), &trials[test]);
            assert_eq!(outcome.result.prediction, Prediction::Attended);
        }
    }

    #[test]
    fn test_fewer_samples_than_features_stays_finite() {
        // 32 channels and 17 lags against 2 × 12 training samples
        let spec = TrialSpec { n_samples: 12, bands: 1, channels: 32, noise_std: 0.5, ..TrialSpec::default() };
        let subject = SyntheticGenerator::new(9).subject(SubjectId::new("s"), 3, &spec).unwrap();
        let trials = subject.trials();

        let (model, diagnostics) = CcaModel::fit(&holdout(trials, 2), EnvelopeSide::Attended, &CcaConfig::default());
        assert!(diagnostics.iter().any(|d| matches!(d, NumericalDegeneracy::RankDeficient { .. })));
        assert!(model.components() <= 2);
        let score = model.score(&trials[2], EnvelopeSide::Attended, CcaScorePolicy::FirstComponent);
        assert!(score.is_finite());

        let outcome = CcaDecoder::default().decode_fold(&holdout(trials, 2), &trials[2]);
        assert!(outcome.attended_score.is_finite());
        assert!(outcome.unattended_score.is_finite());
    }

    #[test]
    fn test_constant_columns_are_dropped() {
        let spec = TrialSpec { channels: 3, ..TrialSpec::default() };
        let mut trial = SyntheticGenerator::new(12)
            .trial(TrialId(0), AttentionLabel::AttendedLeft, &spec)
            .unwrap();
        let mut eeg = trial.eeg().clone();
        eeg.channel_mut(1).fill(3.0);
        trial = Trial::new(
            trial.id(),
            eeg,
            trial.attended().clone(),
            trial.unattended().clone(),
            trial.label(),
            trial.rate_hz(),
        )
        .unwrap();

        let (model, diagnostics) = CcaModel::fit(&[&trial], EnvelopeSide::Attended, &CcaConfig::default());
        assert!(diagnostics.contains(&NumericalDegeneracy::ColumnsDropped { count: 1 }));
        assert!(!model.is_degenerate());
    }

    #[test]
    fn test_no_training_data_is_degenerate() {
        let (model, diagnostics) = CcaModel::fit(&[], EnvelopeSide::Attended, &CcaConfig::default());
        assert!(model.is_degenerate());
        assert_eq!(diagnostics, vec![NumericalDegeneracy::DegenerateFallback]);
    }

    #[test]
    fn test_correlation_weighted_policy() {
        let spec = TrialSpec { noise_std: 0.2, ..TrialSpec::default() };
        let subject = SyntheticGenerator::new(14).subject(SubjectId::new("s"), 3, &spec).unwrap();
        let trials = subject.trials();
        let config = CcaConfig { score_policy: CcaScorePolicy::CorrelationWeighted, ..CcaConfig::default() };
        let (model, _) = CcaModel::fit(&holdout(trials, 0), EnvelopeSide::Attended, &config);
        assert!(model.components() >= 1);
        assert!(model.correlations().windows(2).all(|w| w[0] >= w[1]));
        let score = model.score(&trials[0], EnvelopeSide::Attended, config.score_policy);
        assert!(score > 0.5, "score {score}");
    }
}
