//! Cross-validated decoding of subjects
//!
//! [`run_decoder`] produces one [`AccuracyRecord`] for a subject and an
//! algorithm. Trained decoders (TRF, CCA) are cross-validated over trials;
//! every held-out trial yields exactly one prediction. The correlation
//! decoder needs no training and yields one prediction per analysis window.
//!
//! [`Evaluation`] runs every subject × configuration × algorithm task on the
//! rayon pool and reduces the records into a [`ResultStore`].

use std::borrow::Cow;
use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{info, warn};

use aad_core::config::{AnalysisConfig, CrossValidation};
use aad_core::error::{ConfigurationError, DataError, StatisticalInputError};
use aad_core::types::{
    AccuracyRecord, Algorithm, ConfigurationId, ExcludedTrial, RecordKey, Subject, Trial, UnitOutcome,
};

use super::results::ResultStore;
use super::stats::{compare_in_store, Comparison};
use crate::decoding::{CcaDecoder, CorrelationDecoder, TrfDecoder, TrialDecoder};

/// Minimum usable trials for a trained decoder
pub const MIN_TRAINING_TRIALS: usize = 2;

// ============================================================================
// Channel Configurations
// ============================================================================

/// Named EEG channel selection applied to every trial before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfiguration {
    /// Configuration name used in record keys
    pub id: ConfigurationId,
    /// Channel indices to keep, in order; `None` keeps every channel
    pub channels: Option<Vec<usize>>,
}

impl ChannelConfiguration {
    /// Keep every channel
    pub fn full(id: impl Into<String>) -> Self {
        Self { id: ConfigurationId::new(id), channels: None }
    }

    /// Keep only `channels`
    pub fn subset(id: impl Into<String>, channels: Vec<usize>) -> Self {
        Self { id: ConfigurationId::new(id), channels: Some(channels) }
    }

    /// The subject as seen through this configuration
    pub fn apply<'a>(&self, subject: &'a Subject) -> Result<Cow<'a, Subject>, DataError> {
        match &self.channels {
            None => Ok(Cow::Borrowed(subject)),
            Some(channels) => subject.with_channels(channels).map(Cow::Owned),
        }
    }
}

// ============================================================================
// Folds
// ============================================================================

/// Held-out trial indices of every fold.
///
/// Leave-one-trial-out gives `n_trials` single-trial folds. K-fold splits the
/// trials into `min(k, n_trials)` contiguous groups whose sizes differ by at
/// most one.
pub fn folds(n_trials: usize, scheme: CrossValidation) -> Vec<Vec<usize>> {
    match scheme {
        CrossValidation::LeaveOneTrialOut => (0..n_trials).map(|i| vec![i]).collect(),
        CrossValidation::KFold { folds } => {
            let k = folds.clamp(1, n_trials.max(1));
            (0..k)
                .map(|f| (f * n_trials / k..(f + 1) * n_trials / k).collect())
                .filter(|fold: &Vec<usize>| !fold.is_empty())
                .collect()
        }
    }
}

/// Decode the held-out trials of one fold.
///
/// The decoder trains only on trials outside `held_out`; the result depends
/// on nothing but `trials` and `held_out`.
pub fn evaluate_fold(decoder: &dyn TrialDecoder, trials: &[Trial], held_out: &[usize]) -> Vec<UnitOutcome> {
    let train: Vec<&Trial> =
        trials.iter().enumerate().filter(|(i, _)| !held_out.contains(i)).map(|(_, t)| t).collect();
    held_out
        .iter()
        .filter_map(|&i| trials.get(i))
        .map(|test| UnitOutcome {
            trial_id: test.id(),
            unit: 0,
            result: decoder.decode_fold(&train, test).result,
        })
        .collect()
}

/// Run every fold of `scheme` in parallel, one prediction per trial.
///
/// `make_decoder` is called once per fold, so no decoder state is shared
/// between folds. Units come back in fold order.
pub fn cross_validate<D, F>(trials: &[Trial], scheme: CrossValidation, make_decoder: F) -> Vec<UnitOutcome>
where
    D: TrialDecoder,
    F: Fn() -> D + Sync,
{
    folds(trials.len(), scheme)
        .par_iter()
        .flat_map_iter(|held_out| evaluate_fold(&make_decoder(), trials, held_out))
        .collect()
}

// ============================================================================
// Single Record
// ============================================================================

/// Decode one subject with one algorithm.
///
/// Returns an excluded record (never a zero accuracy) when nothing can be
/// scored. Only configuration problems are errors.
pub fn run_decoder(
    subject: &Subject,
    algorithm: Algorithm,
    config: &AnalysisConfig,
    configuration: &ConfigurationId,
) -> Result<AccuracyRecord, ConfigurationError> {
    config.validate()?;
    let key = RecordKey::new(subject.id().clone(), algorithm, configuration.clone());

    let record = match algorithm {
        Algorithm::Correlation => windowed(subject, config, key),
        Algorithm::Trf => cross_validated(subject, config, key, || TrfDecoder::new(config.trf.clone())),
        Algorithm::Cca => cross_validated(subject, config, key, || CcaDecoder::new(config.cca.clone())),
    };

    match record.accuracy() {
        Some(accuracy) => info!(
            subject = %record.key.subject,
            %algorithm,
            %configuration,
            accuracy,
            units = record.units.len(),
            folds = record.folds,
            "Record complete"
        ),
        None => warn!(
            subject = %record.key.subject,
            %algorithm,
            %configuration,
            status = ?record.status,
            "Record excluded"
        ),
    }
    Ok(record)
}

fn cross_validated<D, F>(subject: &Subject, config: &AnalysisConfig, key: RecordKey, make_decoder: F) -> AccuracyRecord
where
    D: TrialDecoder,
    F: Fn() -> D + Sync,
{
    let trials = subject.trials();
    if trials.len() < MIN_TRAINING_TRIALS {
        let reason = DataError::InsufficientTrials { got: trials.len(), need: MIN_TRAINING_TRIALS };
        return AccuracyRecord::excluded(key, reason.to_string(), subject.excluded().to_vec());
    }

    let n_folds = folds(trials.len(), config.cross_validation).len();
    let units = cross_validate(trials, config.cross_validation, make_decoder);
    AccuracyRecord::scored(key, units, n_folds, subject.excluded().to_vec())
}

/// Correlation decoding of every trial.
///
/// Accuracy pools all windows of all scored trials: a trial with more
/// windows weighs more. It is not a mean of per-trial accuracies. `folds`
/// counts the scored trials.
fn windowed(subject: &Subject, config: &AnalysisConfig, key: RecordKey) -> AccuracyRecord {
    let decoder = CorrelationDecoder::new(config.correlation.clone());
    let decoded: Vec<_> = subject
        .trials()
        .par_iter()
        .map(|trial| (trial.id(), decoder.decode_trial(trial)))
        .collect();

    let mut units = Vec::new();
    let mut excluded = subject.excluded().to_vec();
    let mut scored_trials = 0;
    for (trial_id, outcome) in decoded {
        match outcome {
            Ok(results) => {
                scored_trials += 1;
                units.extend(
                    results.into_iter().enumerate().map(|(unit, result)| UnitOutcome { trial_id, unit, result }),
                );
            }
            Err(e) => {
                warn!(subject = %key.subject, %trial_id, error = %e, "Trial excluded");
                excluded.push(ExcludedTrial { trial_id, reason: e.to_string() });
            }
        }
    }

    if units.is_empty() {
        return AccuracyRecord::excluded(key, "no trial produced an analysis window", excluded);
    }
    AccuracyRecord::scored(key, units, scored_trials, excluded)
}

// ============================================================================
// Evaluation Plan
// ============================================================================

/// Every algorithm under every channel configuration, for a set of subjects.
#[derive(Clone, Debug)]
pub struct Evaluation {
    config: AnalysisConfig,
    algorithms: Vec<Algorithm>,
    configurations: Vec<ChannelConfiguration>,
}

impl Evaluation {
    /// All algorithms under a single full-channel configuration
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            algorithms: Algorithm::ALL.to_vec(),
            configurations: vec![ChannelConfiguration::full("full")],
        }
    }

    /// Restrict the algorithms
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Replace the channel configurations
    #[must_use]
    pub fn with_configurations(mut self, configurations: Vec<ChannelConfiguration>) -> Self {
        self.configurations = configurations;
        self
    }

    /// Analysis configuration
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Channel configurations
    pub fn configurations(&self) -> &[ChannelConfiguration] {
        &self.configurations
    }

    /// Run every task in parallel and merge the records.
    ///
    /// The configuration is validated before any model is fitted.
    pub fn run(&self, subjects: &[Subject]) -> Result<ResultStore, ConfigurationError> {
        self.config.validate()?;

        let tasks: Vec<(&Subject, &ChannelConfiguration, Algorithm)> = subjects
            .iter()
            .flat_map(|s| self.configurations.iter().map(move |c| (s, c)))
            .flat_map(|(s, c)| self.algorithms.iter().map(move |&a| (s, c, a)))
            .collect();

        tasks
            .into_par_iter()
            .map(|(subject, configuration, algorithm)| {
                self.run_task(subject, configuration, algorithm)
                    .map(|record| std::iter::once(record).collect::<ResultStore>())
            })
            .try_reduce(ResultStore::new, |a, b| Ok(a.merged(b)))
    }

    fn run_task(
        &self,
        subject: &Subject,
        configuration: &ChannelConfiguration,
        algorithm: Algorithm,
    ) -> Result<AccuracyRecord, ConfigurationError> {
        match configuration.apply(subject) {
            Ok(selected) => run_decoder(&selected, algorithm, &self.config, &configuration.id),
            Err(e) => {
                warn!(subject = %subject.id(), configuration = %configuration.id, error = %e, "Subject excluded");
                let key = RecordKey::new(subject.id().clone(), algorithm, configuration.id.clone());
                Ok(AccuracyRecord::excluded(key, e.to_string(), subject.excluded().to_vec()))
            }
        }
    }

    /// Paired comparison of two configurations with the configured test
    pub fn compare(
        &self,
        store: &ResultStore,
        first: &ConfigurationId,
        second: &ConfigurationId,
    ) -> BTreeMap<Algorithm, Result<Comparison, StatisticalInputError>> {
        compare_in_store(store, first, second, self.config.paired_test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{EegMix, SyntheticGenerator, TrialSpec};
    use crate::decoding::FoldOutcome;
    use aad_core::types::{SubjectId, TrialId};

    fn subject(seed: u64, n_trials: usize, spec: &TrialSpec) -> Subject {
        SyntheticGenerator::new(seed).subject(SubjectId::new(format!("s{seed}")), n_trials, spec).unwrap()
    }

    fn full() -> ConfigurationId {
        ConfigurationId::new("full")
    }

    #[test]
    fn test_leave_one_out_folds() {
        let f = folds(4, CrossValidation::LeaveOneTrialOut);
        assert_eq!(f, vec![vec![0], vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_k_fold_groups_are_contiguous() {
        let f = folds(7, CrossValidation::KFold { folds: 3 });
        assert_eq!(f, vec![vec![0, 1], vec![2, 3], vec![4, 5, 6]]);
        assert_eq!(folds(3, CrossValidation::KFold { folds: 10 }).len(), 3);
        assert!(folds(0, CrossValidation::KFold { folds: 2 }).is_empty());
    }

    #[test]
    fn test_four_trials_give_four_fold_results() {
        let spec = TrialSpec { mix: EegMix::AttendedOnly, ..TrialSpec::default() };
        let s = subject(21, 4, &spec);
        let record = run_decoder(&s, Algorithm::Trf, &AnalysisConfig::default(), &full()).unwrap();
        assert_eq!(record.folds, 4);
        assert_eq!(record.units.len(), 4);
        assert_eq!(record.accuracy(), Some(1.0));
    }

    /// Swaps the two scores on one held-out trial
    struct SwapOn {
        inner: TrfDecoder,
        target: TrialId,
    }

    impl TrialDecoder for SwapOn {
        fn algorithm(&self) -> Algorithm {
            Algorithm::Trf
        }

        fn decode_fold(&self, train: &[&Trial], test: &Trial) -> FoldOutcome {
            let outcome = self.inner.decode_fold(train, test);
            if test.id() == self.target {
                FoldOutcome::from_scores(outcome.unattended_score, outcome.attended_score, outcome.diagnostics)
            } else {
                outcome
            }
        }
    }

    #[test]
    fn test_changing_one_fold_leaves_others_bit_identical() {
        let spec = TrialSpec { mix: EegMix::Both, noise_std: 0.3, ..TrialSpec::default() };
        let s = subject(17, 5, &spec);
        let scheme = CrossValidation::LeaveOneTrialOut;
        let baseline = cross_validate(s.trials(), scheme, TrfDecoder::default);

        let target = s.trials()[2].id();
        let changed = cross_validate(s.trials(), scheme, || SwapOn { inner: TrfDecoder::default(), target });

        assert_eq!(baseline.len(), changed.len());
        for (before, after) in baseline.iter().zip(&changed) {
            assert_eq!(before.trial_id, after.trial_id);
            if before.trial_id == target {
                if !before.result.is_tie() {
                    assert_ne!(before.result.prediction, after.result.prediction);
                }
            } else {
                assert_eq!(before.result.prediction, after.result.prediction);
                assert_eq!(before.result.confidence.to_bits(), after.result.confidence.to_bits());
            }
        }
    }

    #[test]
    fn test_cross_validation_is_deterministic() {
        let spec = TrialSpec { mix: EegMix::Both, noise_std: 0.5, ..TrialSpec::default() };
        let s = subject(5, 4, &spec);
        let config = AnalysisConfig::default();
        let record = run_decoder(&s, Algorithm::Cca, &config, &full()).unwrap();

        // each fold recomputed on its own matches the parallel run
        let decoder = CcaDecoder::new(config.cca.clone());
        for (i, unit) in record.units.iter().enumerate() {
            let alone = evaluate_fold(&decoder, s.trials(), &[i]);
            assert_eq!(alone, vec![unit.clone()]);
        }
        assert_eq!(run_decoder(&s, Algorithm::Cca, &config, &full()).unwrap(), record);
    }

    #[test]
    fn test_identical_streams_are_at_chance() {
        // two 60 s trials at 64 Hz
        let spec = TrialSpec { n_samples: 3840, mix: EegMix::Both, identical_streams: true, ..TrialSpec::default() };
        let s = subject(3, 2, &spec);
        let config = AnalysisConfig::default();
        for algorithm in Algorithm::ALL {
            let record = run_decoder(&s, algorithm, &config, &full()).unwrap();
            assert_eq!(record.accuracy(), Some(0.5), "{algorithm}");
        }
    }

    #[test]
    fn test_noise_free_attended_eeg_is_perfect() {
        let spec = TrialSpec { mix: EegMix::AttendedOnly, ..TrialSpec::default() };
        let s = subject(21, 4, &spec);
        let config = AnalysisConfig::default();
        for algorithm in [Algorithm::Correlation, Algorithm::Trf] {
            let record = run_decoder(&s, algorithm, &config, &full()).unwrap();
            assert_eq!(record.accuracy(), Some(1.0), "{algorithm}");
        }
    }

    #[test]
    fn test_single_trial_subject_is_excluded_not_zero() {
        let s = subject(9, 1, &TrialSpec::default());
        let config = AnalysisConfig::default();
        for algorithm in [Algorithm::Trf, Algorithm::Cca] {
            let record = run_decoder(&s, algorithm, &config, &full()).unwrap();
            assert!(record.is_excluded());
            assert_eq!(record.accuracy(), None);
        }
    }

    #[test]
    fn test_short_trials_exclude_correlation_record() {
        let spec = TrialSpec { n_samples: 200, ..TrialSpec::default() };
        let s = subject(2, 3, &spec);
        let record = run_decoder(&s, Algorithm::Correlation, &AnalysisConfig::default(), &full()).unwrap();
        assert!(record.is_excluded());
        assert_eq!(record.excluded_trials.len(), 3);
    }

    #[test]
    fn test_non_integer_decimation_aborts_before_fitting() {
        let config = AnalysisConfig { target_rate_hz: 33.0, band_high_hz: 9.0, ..AnalysisConfig::default() };
        let s = subject(1, 2, &TrialSpec::default());
        assert!(matches!(
            Evaluation::new(config.clone()).run(&[s.clone()]),
            Err(ConfigurationError::NonIntegerDecimation { .. })
        ));
        assert!(run_decoder(&s, Algorithm::Trf, &config, &full()).is_err());
    }

    #[test]
    fn test_evaluation_covers_every_task() {
        let spec = TrialSpec { mix: EegMix::AttendedOnly, noise_std: 0.1, ..TrialSpec::default() };
        let subjects = vec![subject(11, 3, &spec), subject(12, 3, &spec)];
        let evaluation = Evaluation::new(AnalysisConfig::default())
            .with_configurations(vec![
                ChannelConfiguration::full("full"),
                ChannelConfiguration::subset("pair", vec![0, 1]),
                ChannelConfiguration::subset("missing", vec![0, 9]),
            ]);

        let store = evaluation.run(&subjects).unwrap();
        assert_eq!(store.len(), 2 * 3 * 3);

        let missing = store.for_configuration(Algorithm::Trf, &ConfigurationId::new("missing"));
        assert!(missing.iter().all(|r| r.is_excluded()));
        let pair = store.for_configuration(Algorithm::Trf, &ConfigurationId::new("pair"));
        assert!(pair.iter().all(|r| r.accuracy().is_some()));

        let comparisons = evaluation.compare(&store, &full(), &ConfigurationId::new("pair"));
        assert_eq!(comparisons.len(), 3);
        let excluded = evaluation.compare(&store, &full(), &ConfigurationId::new("missing"));
        assert!(excluded.values().all(Result::is_err));
    }
}
