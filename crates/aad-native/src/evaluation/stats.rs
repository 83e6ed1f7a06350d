//! Group statistics over accuracy records
//!
//! - Per-configuration summaries (mean, standard deviation, counts)
//! - Paired comparison of two configurations across subjects: mean
//!   difference, two-sided p-value (Student t or Wilcoxon signed-rank) and
//!   Cohen's d_z effect size
//!
//! Swapping the two configurations negates the mean difference, the test
//! statistic and the effect size, and leaves the p-value unchanged.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use aad_core::config::PairedTest;
use aad_core::error::StatisticalInputError;
use aad_core::math::{average_ranks, mean, normal_two_sided_p, std_dev, student_t_two_sided_p};
use aad_core::types::{AccuracyRecord, Algorithm, ConfigurationId, SubjectId};

use super::results::ResultStore;

/// Minimum paired subjects for either test
pub const MIN_PAIRS: usize = 2;

// ============================================================================
// Summaries
// ============================================================================

/// Accuracy summary of one algorithm under one configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfigurationSummary {
    /// Algorithm
    pub algorithm: Algorithm,
    /// Channel configuration
    pub configuration: ConfigurationId,
    /// Mean accuracy over scored subjects
    pub mean_accuracy: Option<f64>,
    /// Sample standard deviation over scored subjects
    pub std_accuracy: Option<f64>,
    /// Scored subjects
    pub n_subjects: usize,
    /// Excluded subjects
    pub n_excluded: usize,
}

/// Summarize every algorithm × configuration present in `store`.
pub fn summarize(store: &ResultStore) -> Vec<ConfigurationSummary> {
    let mut groups: BTreeMap<(Algorithm, &ConfigurationId), (Vec<f64>, usize)> = BTreeMap::new();
    for record in store.records() {
        let entry = groups.entry((record.key.algorithm, &record.key.configuration)).or_default();
        match record.accuracy() {
            Some(accuracy) => entry.0.push(accuracy),
            None => entry.1 += 1,
        }
    }

    groups
        .into_iter()
        .map(|((algorithm, configuration), (accuracies, n_excluded))| ConfigurationSummary {
            algorithm,
            configuration: configuration.clone(),
            mean_accuracy: (!accuracies.is_empty()).then(|| mean(&accuracies)),
            std_accuracy: (accuracies.len() >= 2).then(|| std_dev(&accuracies)),
            n_subjects: accuracies.len(),
            n_excluded,
        })
        .collect()
}

// ============================================================================
// Paired comparison
// ============================================================================

/// Paired comparison of `first` against `second`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comparison {
    /// Test used for the p-value
    pub test: PairedTest,
    /// Subjects scored under both configurations
    pub n_pairs: usize,
    /// Mean of `first − second`
    pub mean_difference: f64,
    /// t statistic, or signed-rank z statistic
    pub statistic: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Cohen's d_z: mean difference over its standard deviation
    pub effect_size: f64,
}

/// Mean and d_z of paired differences, handling zero spread.
fn difference_moments(differences: &[f64]) -> (f64, f64, f64) {
    let m = mean(differences);
    let sd = std_dev(differences);
    let effect = if sd > 0.0 {
        m / sd
    } else if m == 0.0 {
        0.0
    } else {
        f64::INFINITY.copysign(m)
    };
    (m, sd, effect)
}

fn student_t(differences: &[f64]) -> (f64, f64) {
    let (m, sd, _) = difference_moments(differences);
    let n = differences.len() as f64;
    if sd > 0.0 {
        let t = m / (sd / n.sqrt());
        (t, student_t_two_sided_p(t, n - 1.0))
    } else if m == 0.0 {
        (0.0, 1.0)
    } else {
        (f64::INFINITY.copysign(m), 0.0)
    }
}

/// Signed-rank test with average ranks for ties, zero differences dropped
/// and the tie-corrected normal approximation.
fn wilcoxon(differences: &[f64]) -> (f64, f64) {
    let nonzero: Vec<f64> = differences.iter().copied().filter(|d| *d != 0.0).collect();
    if nonzero.is_empty() {
        return (0.0, 1.0);
    }
    let magnitudes: Vec<f64> = nonzero.iter().map(|d| d.abs()).collect();
    let (ranks, tie_term) = average_ranks(&magnitudes);
    let w_plus: f64 = nonzero.iter().zip(&ranks).filter(|(d, _)| **d > 0.0).map(|(_, r)| r).sum();

    let n = nonzero.len() as f64;
    let expected = n * (n + 1.0) / 4.0;
    let variance = n * (n + 1.0) * (2.0 * n + 1.0) / 24.0 - tie_term / 48.0;
    if variance <= 0.0 {
        return (0.0, 1.0);
    }
    let z = (w_plus - expected) / variance.sqrt();
    (z, normal_two_sided_p(z))
}

/// Compare paired per-subject accuracies.
pub fn paired_comparison(
    first: &[f64],
    second: &[f64],
    test: PairedTest,
) -> Result<Comparison, StatisticalInputError> {
    let n_pairs = first.len().min(second.len());
    if n_pairs < MIN_PAIRS {
        return Err(StatisticalInputError::InsufficientPairs { got: n_pairs, need: MIN_PAIRS });
    }
    let differences: Vec<f64> = first.iter().zip(second).map(|(a, b)| a - b).collect();
    let (mean_difference, _, effect_size) = difference_moments(&differences);
    let (statistic, p_value) = match test {
        PairedTest::StudentT => student_t(&differences),
        PairedTest::Wilcoxon => wilcoxon(&differences),
    };
    Ok(Comparison { test, n_pairs, mean_difference, statistic, p_value, effect_size })
}

/// Compare two configurations per algorithm, pairing records by subject.
///
/// Subjects excluded (or unscored) under either configuration are left out
/// of the pairing. Algorithms with fewer than [`MIN_PAIRS`] pairs report
/// [`StatisticalInputError::InsufficientPairs`].
pub fn compare_configurations(
    first: &[&AccuracyRecord],
    second: &[&AccuracyRecord],
    test: PairedTest,
) -> BTreeMap<Algorithm, Result<Comparison, StatisticalInputError>> {
    let index = |records: &[&AccuracyRecord]| -> BTreeMap<(Algorithm, SubjectId), f64> {
        records
            .iter()
            .filter_map(|r| r.accuracy().map(|a| ((r.key.algorithm, r.key.subject.clone()), a)))
            .collect()
    };
    let a = index(first);
    let b = index(second);
    let algorithms: BTreeSet<Algorithm> =
        first.iter().chain(second).map(|r| r.key.algorithm).collect();

    algorithms
        .into_iter()
        .map(|algorithm| {
            let (xs, ys): (Vec<f64>, Vec<f64>) = a
                .iter()
                .filter(|((alg, _), _)| *alg == algorithm)
                .filter_map(|(key, x)| b.get(key).map(|y| (*x, *y)))
                .unzip();
            (algorithm, paired_comparison(&xs, &ys, test))
        })
        .collect()
}

/// [`compare_configurations`] over every algorithm in a store.
pub fn compare_in_store(
    store: &ResultStore,
    first: &ConfigurationId,
    second: &ConfigurationId,
    test: PairedTest,
) -> BTreeMap<Algorithm, Result<Comparison, StatisticalInputError>> {
    let a: Vec<&AccuracyRecord> = store.records().filter(|r| &r.key.configuration == first).collect();
    let b: Vec<&AccuracyRecord> = store.records().filter(|r| &r.key.configuration == second).collect();
    compare_configurations(&a, &b, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aad_core::types::{PredictionResult, RecordKey, TrialId, UnitOutcome};

    fn record(subject: &str, algorithm: Algorithm, config: &str, credits: &[f64]) -> AccuracyRecord {
        let units = credits
            .iter()
            .enumerate()
            .map(|(i, &c)| UnitOutcome {
                trial_id: TrialId(i as u32),
                unit: 0,
                result: if c == 1.0 {
                    PredictionResult::from_scores(1.0, 0.0)
                } else if c == 0.0 {
                    PredictionResult::from_scores(0.0, 1.0)
                } else {
                    PredictionResult::from_scores(0.5, 0.5)
                },
            })
            .collect();
        AccuracyRecord::scored(
            RecordKey::new(SubjectId::new(subject), algorithm, ConfigurationId::new(config)),
            units,
            credits.len(),
            Vec::new(),
        )
    }

    #[test]
    fn test_known_t_test() {
        // differences 1, 2, 3: mean 2, sd 1, t = 2√3, df 2
        let result = paired_comparison(&[2.0, 4.0, 6.0], &[1.0, 2.0, 3.0], PairedTest::StudentT).unwrap();
        assert!((result.mean_difference - 2.0).abs() < 1e-12);
        assert!((result.statistic - 2.0 * 3f64.sqrt()).abs() < 1e-12);
        assert!((result.effect_size - 2.0).abs() < 1e-12);
        // two-sided p for t = 3.4641, df = 2
        assert!((result.p_value - 0.0742).abs() < 1e-3);
    }

    #[test]
    fn test_swapping_configurations_is_antisymmetric() {
        let a = [0.8, 0.7, 0.9, 0.65, 0.75];
        let b = [0.6, 0.72, 0.7, 0.5, 0.7];
        for test in [PairedTest::StudentT, PairedTest::Wilcoxon] {
            let ab = paired_comparison(&a, &b, test).unwrap();
            let ba = paired_comparison(&b, &a, test).unwrap();
            assert_eq!(ab.mean_difference, -ba.mean_difference);
            assert_eq!(ab.statistic, -ba.statistic);
            assert_eq!(ab.effect_size, -ba.effect_size);
            assert_eq!(ab.p_value, ba.p_value);
        }
    }

    #[test]
    fn test_identical_configurations_are_not_different() {
        let a = [0.8, 0.7, 0.9];
        let result = paired_comparison(&a, &a, PairedTest::StudentT).unwrap();
        assert_eq!(result.mean_difference, 0.0);
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.effect_size, 0.0);
        let result = paired_comparison(&a, &a, PairedTest::Wilcoxon).unwrap();
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_constant_nonzero_difference() {
        let result = paired_comparison(&[1.0, 0.5], &[0.5, 0.0], PairedTest::StudentT).unwrap();
        assert_eq!(result.p_value, 0.0);
        assert_eq!(result.effect_size, f64::INFINITY);
    }

    #[test]
    fn test_single_pair_is_insufficient() {
        assert_eq!(
            paired_comparison(&[0.9], &[0.5], PairedTest::StudentT),
            Err(StatisticalInputError::InsufficientPairs { got: 1, need: 2 })
        );
    }

    #[test]
    fn test_wilcoxon_all_positive() {
        // n = 6, all positive: W+ = 21, z = (21 − 10.5) / √22.75
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [0.0; 6];
        let result = paired_comparison(&a, &b, PairedTest::Wilcoxon).unwrap();
        let z = 10.5 / 22.75f64.sqrt();
        assert!((result.statistic - z).abs() < 1e-12);
        assert!((result.p_value - 0.0277).abs() < 1e-3);
    }

    #[test]
    fn test_compare_pairs_by_subject_and_skips_excluded() {
        let full = [
            record("s1", Algorithm::Trf, "full", &[1.0, 1.0]),
            record("s2", Algorithm::Trf, "full", &[1.0, 0.0]),
            record("s3", Algorithm::Trf, "full", &[1.0, 1.0]),
        ];
        let mut ear = vec![
            record("s1", Algorithm::Trf, "ear", &[1.0, 0.0]),
            record("s2", Algorithm::Trf, "ear", &[0.0, 0.0]),
        ];
        ear.push(AccuracyRecord::excluded(
            RecordKey::new(SubjectId::new("s3"), Algorithm::Trf, ConfigurationId::new("ear")),
            "no trials",
            Vec::new(),
        ));

        let first: Vec<&AccuracyRecord> = full.iter().collect();
        let second: Vec<&AccuracyRecord> = ear.iter().collect();
        let comparisons = compare_configurations(&first, &second, PairedTest::StudentT);
        let trf = comparisons[&Algorithm::Trf].as_ref().unwrap();
        assert_eq!(trf.n_pairs, 2);
        assert!((trf.mean_difference - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_summary_counts_excluded() {
        let mut store: ResultStore = [
            record("s1", Algorithm::Cca, "full", &[1.0, 0.5]),
            record("s2", Algorithm::Cca, "full", &[1.0, 1.0]),
        ]
        .into_iter()
        .collect();
        store.insert(AccuracyRecord::excluded(
            RecordKey::new(SubjectId::new("s3"), Algorithm::Cca, ConfigurationId::new("full")),
            "no trials",
            Vec::new(),
        ));

        let summaries = summarize(&store);
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.n_subjects, 2);
        assert_eq!(summary.n_excluded, 1);
        assert!((summary.mean_accuracy.unwrap() - 0.875).abs() < 1e-12);
    }
}
