//! Typed store of accuracy records
//!
//! Records are keyed by [`RecordKey`] (subject, algorithm, configuration).
//! Partial stores produced by parallel workers are merged additively; the
//! merged store does not depend on the order in which workers finish.

use std::collections::BTreeMap;

use aad_core::types::{AccuracyRecord, Algorithm, ConfigurationId, RecordKey, SubjectId};

/// Accuracy records keyed by subject × algorithm × configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultStore {
    records: BTreeMap<RecordKey, AccuracyRecord>,
}

impl ResultStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, merging with any record under the same key
    pub fn insert(&mut self, record: AccuracyRecord) {
        match self.records.get_mut(&record.key) {
            Some(existing) => existing.merge(record),
            None => {
                self.records.insert(record.key.clone(), record);
            }
        }
    }

    /// Merge every record of `other` into this store
    pub fn merge(&mut self, other: Self) {
        for record in other.records.into_values() {
            self.insert(record);
        }
    }

    /// Consuming variant of [`ResultStore::merge`], for reductions
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        self.merge(other);
        self
    }

    /// Record under `key`
    pub fn get(&self, key: &RecordKey) -> Option<&AccuracyRecord> {
        self.records.get(key)
    }

    /// All records in key order
    pub fn records(&self) -> impl Iterator<Item = &AccuracyRecord> {
        self.records.values()
    }

    /// Records of one algorithm under one configuration, in subject order
    pub fn for_configuration(&self, algorithm: Algorithm, configuration: &ConfigurationId) -> Vec<&AccuracyRecord> {
        self.records
            .values()
            .filter(|r| r.key.algorithm == algorithm && &r.key.configuration == configuration)
            .collect()
    }

    /// Distinct subjects present
    pub fn subjects(&self) -> Vec<&SubjectId> {
        let mut subjects: Vec<&SubjectId> = self.records.keys().map(|k| &k.subject).collect();
        subjects.dedup();
        subjects
    }

    /// Distinct configurations present
    pub fn configurations(&self) -> Vec<&ConfigurationId> {
        let mut configurations: Vec<&ConfigurationId> = self.records.keys().map(|k| &k.configuration).collect();
        configurations.sort();
        configurations.dedup();
        configurations
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<AccuracyRecord> for ResultStore {
    fn from_iter<I: IntoIterator<Item = AccuracyRecord>>(iter: I) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}

impl Extend<AccuracyRecord> for ResultStore {
    fn extend<I: IntoIterator<Item = AccuracyRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aad_core::types::{PredictionResult, TrialId, UnitOutcome};

    fn record(subject: &str, config: &str, trial: u32, attended: f64) -> AccuracyRecord {
        AccuracyRecord::scored(
            RecordKey::new(SubjectId::new(subject), Algorithm::Trf, ConfigurationId::new(config)),
            vec![UnitOutcome {
                trial_id: TrialId(trial),
                unit: 0,
                result: PredictionResult::from_scores(attended, 0.5),
            }],
            1,
            Vec::new(),
        )
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let parts = [
            record("s1", "full", 0, 0.9),
            record("s1", "full", 1, 0.1),
            record("s2", "full", 0, 0.9),
            record("s1", "ear", 0, 0.9),
        ];
        let forward: ResultStore = parts.iter().cloned().collect();
        let backward: ResultStore = parts.iter().rev().cloned().collect();
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 3);

        let key = RecordKey::new(SubjectId::new("s1"), Algorithm::Trf, ConfigurationId::new("full"));
        assert_eq!(forward.get(&key).unwrap().accuracy(), Some(0.5));
    }

    #[test]
    fn test_query_by_configuration() {
        let store: ResultStore =
            [record("s1", "full", 0, 0.9), record("s2", "full", 0, 0.9), record("s1", "ear", 0, 0.1)]
                .into_iter()
                .collect();
        let full = store.for_configuration(Algorithm::Trf, &ConfigurationId::new("full"));
        assert_eq!(full.len(), 2);
        assert!(store.for_configuration(Algorithm::Cca, &ConfigurationId::new("full")).is_empty());
        assert_eq!(store.subjects().len(), 2);
        assert_eq!(store.configurations().len(), 2);
    }
}
