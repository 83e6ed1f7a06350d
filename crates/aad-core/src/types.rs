//! Core types for auditory attention decoding
//!
//! This module provides the data model shared by every stage of the pipeline:
//! - Identifiers for subjects, trials, stimuli and channel configurations
//! - [`SampleMatrix`], a channel-major `[T × C]` buffer
//! - [`Envelope`] and [`Trial`], the time-aligned inputs of the decoders
//! - [`PredictionResult`] and [`AccuracyRecord`], the outputs of evaluation

use core::cmp::Ordering;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Relative tolerance under which two decoder scores are considered tied.
pub const TIE_TOLERANCE: f64 = 1e-12;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique subject identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub String);

impl SubjectId {
    /// Create a subject identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trial index within a subject.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TrialId(pub u32);

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trial {}", self.0)
    }
}

/// Identifier of an audio stimulus whose envelope is loaded by the I/O layer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StimulusId(pub String);

impl StimulusId {
    /// Create a stimulus identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for StimulusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a spatial/channel configuration (e.g. "full-cap", "around-ear").
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigurationId(pub String);

impl ConfigurationId {
    /// Create a configuration identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ConfigurationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Labels and referencing
// ============================================================================

/// Ground-truth attention label of a trial.
///
/// Always explicit; any inference of labels belongs to the data-loading layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttentionLabel {
    /// Listener attends the left stream
    AttendedLeft,
    /// Listener attends the right stream
    AttendedRight,
}

impl AttentionLabel {
    /// Order a left/right pair as `(attended, unattended)`
    pub fn attended_first<T>(self, left: T, right: T) -> (T, T) {
        match self {
            Self::AttendedLeft => (left, right),
            Self::AttendedRight => (right, left),
        }
    }
}

/// The two competing stimuli of a trial.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusPair {
    /// Stimulus presented on the left
    pub left: StimulusId,
    /// Stimulus presented on the right
    pub right: StimulusId,
}

impl StimulusPair {
    /// Create a stimulus pair
    pub fn new(left: StimulusId, right: StimulusId) -> Self {
        Self { left, right }
    }
}

/// EEG rereferencing scheme.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rereference {
    /// Keep the recording reference
    None,
    /// Subtract one designated channel from every channel
    Channel(usize),
    /// Subtract the per-sample mean across channels
    #[default]
    CommonAverage,
}

// ============================================================================
// Sample Matrix
// ============================================================================

/// Multi-channel time series of shape `[T × C]`, stored channel-major.
///
/// Each channel is a contiguous slice of `T` samples, which is the access
/// pattern of every filter and correlation in the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleMatrix {
    n_samples: usize,
    n_channels: usize,
    data: Vec<f64>,
}

impl SampleMatrix {
    /// Create a zero-filled matrix
    #[must_use]
    pub fn zeros(n_samples: usize, n_channels: usize) -> Self {
        Self { n_samples, n_channels, data: vec![0.0; n_samples * n_channels] }
    }

    /// Build from per-channel vectors, which must all have equal length
    pub fn from_channels(channels: Vec<Vec<f64>>) -> Result<Self, DataError> {
        let n_samples = channels.first().map_or(0, Vec::len);
        let n_channels = channels.len();
        let mut data = Vec::with_capacity(n_samples * n_channels);
        for channel in channels {
            if channel.len() != n_samples {
                return Err(DataError::LengthMismatch {
                    series: "channel",
                    expected: n_samples,
                    got: channel.len(),
                });
            }
            data.extend(channel);
        }
        Ok(Self { n_samples, n_channels, data })
    }

    /// Build from sample rows (`rows[t][c]`), the layout delivered by loaders
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, DataError> {
        let n_samples = rows.len();
        let n_channels = rows.first().map_or(0, Vec::len);
        let mut matrix = Self::zeros(n_samples, n_channels);
        for (t, row) in rows.iter().enumerate() {
            if row.len() != n_channels {
                return Err(DataError::LengthMismatch {
                    series: "sample row",
                    expected: n_channels,
                    got: row.len(),
                });
            }
            for (c, &value) in row.iter().enumerate() {
                matrix.data[c * n_samples + t] = value;
            }
        }
        Ok(matrix)
    }

    /// Number of samples (T)
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Number of channels (C)
    #[inline]
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Samples of one channel
    ///
    /// # Panics
    ///
    /// Panics if `index >= n_channels()`.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f64] {
        let start = index * self.n_samples;
        &self.data[start..start + self.n_samples]
    }

    /// Mutable samples of one channel
    ///
    /// # Panics
    ///
    /// Panics if `index >= n_channels()`.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f64] {
        let start = index * self.n_samples;
        &mut self.data[start..start + self.n_samples]
    }

    /// Iterate over channels as slices
    pub fn channels(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_channels).map(move |c| self.channel(c))
    }

    /// Value at sample `t` of channel `c`
    #[inline]
    pub fn get(&self, t: usize, c: usize) -> f64 {
        self.data[c * self.n_samples + t]
    }

    /// Keep only the first `n_samples` samples of every channel
    #[must_use]
    pub fn truncated(&self, n_samples: usize) -> Self {
        let n = n_samples.min(self.n_samples);
        let channels = self.channels().map(|ch| ch[..n].to_vec()).collect();
        Self::from_channels(channels).unwrap_or_else(|_| Self::zeros(n, self.n_channels))
    }

    /// Keep only the listed channels, in the listed order
    pub fn select_channels(&self, channels: &[usize]) -> Result<Self, DataError> {
        let mut out = Self::zeros(self.n_samples, channels.len());
        for (dst, &src) in channels.iter().enumerate() {
            if src >= self.n_channels {
                return Err(DataError::ChannelOutOfRange { channel: src, channels: self.n_channels });
            }
            out.channel_mut(dst).copy_from_slice(self.channel(src));
        }
        Ok(out)
    }

    /// Per-sample sum across channels
    pub fn summed_channels(&self) -> Vec<f64> {
        let mut sum = vec![0.0; self.n_samples];
        for channel in self.channels() {
            for (acc, &v) in sum.iter_mut().zip(channel) {
                *acc += v;
            }
        }
        sum
    }

    /// Whether every sample is finite
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Smallest sample value, `None` when empty
    pub fn min_value(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::min)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Which filter-bank design produced an envelope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BankQuality {
    /// Preferred auditory (gammatone) filter bank
    Preferred,
    /// Approximate band-limited (Butterworth) bank over the same range
    Approximate,
    /// Single broadband channel (last resort)
    Broadband,
}

impl BankQuality {
    /// Whether the envelope was produced by a fallback design
    pub fn is_degraded(self) -> bool {
        self != Self::Preferred
    }
}

/// Multi-band audio envelope, shape `[T × B]`, sampled at a fixed rate.
///
/// Produced once by the extractor (or supplied by the I/O layer) and
/// immutable thereafter. All samples are finite and nonnegative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    bands: SampleMatrix,
    rate_hz: f64,
    quality: BankQuality,
}

impl Envelope {
    /// Create an envelope, checking finiteness and non-negativity
    pub fn new(bands: SampleMatrix, rate_hz: f64, quality: BankQuality) -> Result<Self, DataError> {
        if bands.n_channels() == 0 {
            return Err(DataError::EmptySignal { series: "envelope" });
        }
        if !bands.is_finite() {
            return Err(DataError::NonFinite { series: "envelope" });
        }
        if bands.min_value().is_some_and(|v| v < 0.0) {
            return Err(DataError::NegativeEnvelope);
        }
        Ok(Self { bands, rate_hz, quality })
    }

    /// Number of samples (T)
    pub fn len(&self) -> usize {
        self.bands.n_samples()
    }

    /// Whether the envelope holds no samples
    pub fn is_empty(&self) -> bool {
        self.bands.n_samples() == 0
    }

    /// Number of sub-bands (B)
    pub fn band_count(&self) -> usize {
        self.bands.n_channels()
    }

    /// Sample rate in Hz
    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    /// Filter-bank design that produced this envelope
    pub fn quality(&self) -> BankQuality {
        self.quality
    }

    /// Sub-band samples
    pub fn bands(&self) -> &SampleMatrix {
        &self.bands
    }

    /// Duration in seconds
    pub fn duration_s(&self) -> f64 {
        self.len() as f64 / self.rate_hz
    }

    /// Keep the first `n_samples` samples
    #[must_use]
    pub fn truncated(&self, n_samples: usize) -> Self {
        Self { bands: self.bands.truncated(n_samples), rate_hz: self.rate_hz, quality: self.quality }
    }
}

// ============================================================================
// Trial
// ============================================================================

/// One aligned trial: EEG plus attended and unattended envelopes.
///
/// Invariant: the three series share length and sample rate. Trials are built
/// once by the aligner and read-only afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    id: TrialId,
    eeg: SampleMatrix,
    attended: SampleMatrix,
    unattended: SampleMatrix,
    label: AttentionLabel,
    rate_hz: f64,
}

impl Trial {
    /// Create a trial, enforcing the shared-length and finiteness invariants
    pub fn new(
        id: TrialId,
        eeg: SampleMatrix,
        attended: SampleMatrix,
        unattended: SampleMatrix,
        label: AttentionLabel,
        rate_hz: f64,
    ) -> Result<Self, DataError> {
        if eeg.n_samples() == 0 || eeg.n_channels() == 0 {
            return Err(DataError::EmptySignal { series: "eeg" });
        }
        for (series, matrix) in [("attended envelope", &attended), ("unattended envelope", &unattended)] {
            if matrix.n_samples() != eeg.n_samples() {
                return Err(DataError::LengthMismatch {
                    series,
                    expected: eeg.n_samples(),
                    got: matrix.n_samples(),
                });
            }
        }
        if attended.n_channels() != unattended.n_channels() || attended.n_channels() == 0 {
            return Err(DataError::BandMismatch {
                attended: attended.n_channels(),
                unattended: unattended.n_channels(),
            });
        }
        if !eeg.is_finite() {
            return Err(DataError::NonFinite { series: "eeg" });
        }
        if !attended.is_finite() || !unattended.is_finite() {
            return Err(DataError::NonFinite { series: "envelope" });
        }
        Ok(Self { id, eeg, attended, unattended, label, rate_hz })
    }

    /// Trial identifier
    pub fn id(&self) -> TrialId {
        self.id
    }

    /// EEG samples `[T × C]`
    pub fn eeg(&self) -> &SampleMatrix {
        &self.eeg
    }

    /// Attended envelope `[T × B]`
    pub fn attended(&self) -> &SampleMatrix {
        &self.attended
    }

    /// Unattended envelope `[T × B]`
    pub fn unattended(&self) -> &SampleMatrix {
        &self.unattended
    }

    /// Ground-truth label
    pub fn label(&self) -> AttentionLabel {
        self.label
    }

    /// Shared sample rate in Hz
    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    /// Shared length T
    pub fn len(&self) -> usize {
        self.eeg.n_samples()
    }

    /// Always false for a constructed trial
    pub fn is_empty(&self) -> bool {
        self.eeg.n_samples() == 0
    }

    /// Duration in seconds
    pub fn duration_s(&self) -> f64 {
        self.len() as f64 / self.rate_hz
    }

    /// Copy of this trial restricted to a subset of EEG channels
    pub fn with_channels(&self, channels: &[usize]) -> Result<Self, DataError> {
        Ok(Self { eeg: self.eeg.select_channels(channels)?, ..self.clone() })
    }
}

// ============================================================================
// Subject
// ============================================================================

/// A trial that was dropped before decoding, with the reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedTrial {
    /// Dropped trial
    pub trial_id: TrialId,
    /// Human-readable reason (usually a rendered [`DataError`])
    pub reason: String,
}

/// Ordered collection of trials for one subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    id: SubjectId,
    trials: Vec<Trial>,
    excluded: Vec<ExcludedTrial>,
}

impl Subject {
    /// Create a subject from aligned trials
    pub fn new(id: SubjectId, trials: Vec<Trial>) -> Self {
        Self { id, trials, excluded: Vec::new() }
    }

    /// Subject identifier
    pub fn id(&self) -> &SubjectId {
        &self.id
    }

    /// Aligned trials in order
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    /// Trials excluded while assembling this subject
    pub fn excluded(&self) -> &[ExcludedTrial] {
        &self.excluded
    }

    /// Append an aligned trial
    pub fn push_trial(&mut self, trial: Trial) {
        self.trials.push(trial);
    }

    /// Record an excluded trial
    pub fn exclude(&mut self, trial_id: TrialId, reason: impl Into<String>) {
        self.excluded.push(ExcludedTrial { trial_id, reason: reason.into() });
    }

    /// Number of usable trials
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    /// Whether no usable trial remains
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Copy of this subject with every trial restricted to `channels`
    pub fn with_channels(&self, channels: &[usize]) -> Result<Self, DataError> {
        let trials = self
            .trials
            .iter()
            .map(|trial| trial.with_channels(channels))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { id: self.id.clone(), trials, excluded: self.excluded.clone() })
    }
}

// ============================================================================
// Predictions
// ============================================================================

/// Decision of a decoder for one analysis unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prediction {
    /// The attended envelope was scored higher
    Attended,
    /// The unattended envelope was scored at least as high
    Unattended,
}

/// Prediction with its confidence for one analysis unit.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Decision
    pub prediction: Prediction,
    /// Absolute score difference (>= 0); zero marks a tie
    pub confidence: f64,
}

impl PredictionResult {
    /// Decide from the attended-side and unattended-side scores.
    ///
    /// Non-finite scores count as zero. Scores equal within
    /// [`TIE_TOLERANCE`] produce a tie with zero confidence.
    pub fn from_scores(attended_score: f64, unattended_score: f64) -> Self {
        let a = if attended_score.is_finite() { attended_score } else { 0.0 };
        let u = if unattended_score.is_finite() { unattended_score } else { 0.0 };
        let scale = a.abs().max(u.abs()).max(1.0);
        let diff = (a - u).abs();
        if diff <= TIE_TOLERANCE * scale {
            return Self { prediction: Prediction::Unattended, confidence: 0.0 };
        }
        let prediction = if a > u { Prediction::Attended } else { Prediction::Unattended };
        Self { prediction, confidence: diff }
    }

    /// Whether both scores were equal
    pub fn is_tie(&self) -> bool {
        self.confidence == 0.0
    }

    /// Correctness credit: 1 for correct, 0 for wrong, 0.5 (chance) for a tie
    pub fn credit(&self) -> f64 {
        if self.is_tie() {
            0.5
        } else if self.prediction == Prediction::Attended {
            1.0
        } else {
            0.0
        }
    }
}

// ============================================================================
// Accuracy Records
// ============================================================================

/// Decoding algorithm.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Windowed maximum cross-correlation
    Correlation,
    /// Temporal response function (ridge regression)
    Trf,
    /// Canonical correlation analysis
    Cca,
}

impl Algorithm {
    /// All algorithms, in reporting order
    pub const ALL: [Self; 3] = [Self::Correlation, Self::Trf, Self::Cca];

    /// Short display name
    pub fn name(self) -> &'static str {
        match self {
            Self::Correlation => "correlation",
            Self::Trf => "trf",
            Self::Cca => "cca",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed key of an accuracy record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Subject
    pub subject: SubjectId,
    /// Algorithm
    pub algorithm: Algorithm,
    /// Channel configuration
    pub configuration: ConfigurationId,
}

impl RecordKey {
    /// Create a record key
    pub fn new(subject: SubjectId, algorithm: Algorithm, configuration: ConfigurationId) -> Self {
        Self { subject, algorithm, configuration }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.subject, self.algorithm, self.configuration)
    }
}

/// Prediction for one analysis unit (window or held-out trial).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    /// Trial the unit belongs to
    pub trial_id: TrialId,
    /// Unit index within the trial (window index; 0 for trial-level units)
    pub unit: usize,
    /// Decoder decision
    pub result: PredictionResult,
}

impl UnitOutcome {
    /// Correctness credit of this unit
    pub fn credit(&self) -> f64 {
        self.result.credit()
    }

    /// Total order: by (trial, unit), then by decision and confidence.
    ///
    /// Sorting with it gives the same vector whatever order units arrived in,
    /// including units that share a (trial, unit) key.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        let decision = |p: Prediction| match p {
            Prediction::Attended => 0_u8,
            Prediction::Unattended => 1,
        };
        (self.trial_id, self.unit, decision(self.result.prediction))
            .cmp(&(other.trial_id, other.unit, decision(other.result.prediction)))
            .then_with(|| self.result.confidence.total_cmp(&other.result.confidence))
    }
}

/// Whether a record carries a score or was excluded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Units were scored
    Scored,
    /// Nothing could be scored; distinct from zero accuracy
    Excluded {
        /// Why the subject produced no score
        reason: String,
    },
}

/// Accuracy of one subject × algorithm × configuration, with its units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRecord {
    /// Record key
    pub key: RecordKey,
    /// Per-unit outcomes, sorted by (trial, unit)
    pub units: Vec<UnitOutcome>,
    /// Number of cross-validation folds (or scored trials for correlation)
    pub folds: usize,
    /// Trials excluded before or during decoding
    pub excluded_trials: Vec<ExcludedTrial>,
    /// Scored or excluded
    pub status: RecordStatus,
}

impl AccuracyRecord {
    /// Create a scored record
    pub fn scored(
        key: RecordKey,
        mut units: Vec<UnitOutcome>,
        folds: usize,
        excluded_trials: Vec<ExcludedTrial>,
    ) -> Self {
        units.sort_by(UnitOutcome::total_cmp);
        Self { key, units, folds, excluded_trials, status: RecordStatus::Scored }
    }

    /// Create an excluded record
    pub fn excluded(key: RecordKey, reason: impl Into<String>, excluded_trials: Vec<ExcludedTrial>) -> Self {
        Self {
            key,
            units: Vec::new(),
            folds: 0,
            excluded_trials,
            status: RecordStatus::Excluded { reason: reason.into() },
        }
    }

    /// Whether this record was excluded
    pub fn is_excluded(&self) -> bool {
        matches!(self.status, RecordStatus::Excluded { .. })
    }

    /// Fraction of correct units in [0, 1]; `None` when excluded or empty
    pub fn accuracy(&self) -> Option<f64> {
        if self.is_excluded() || self.units.is_empty() {
            return None;
        }
        Some(self.units.iter().map(UnitOutcome::credit).sum::<f64>() / self.units.len() as f64)
    }

    /// Per-unit correctness credits, in unit order
    pub fn correctness(&self) -> Vec<f64> {
        self.units.iter().map(UnitOutcome::credit).collect()
    }

    /// Additively merge another record with the same key.
    ///
    /// The result does not depend on merge order. Units are never
    /// deduplicated: a (trial, unit) key present in both records is counted
    /// twice, as are the folds.
    pub fn merge(&mut self, other: Self) {
        debug_assert_eq!(self.key, other.key);
        self.units.extend(other.units);
        self.units.sort_by(UnitOutcome::total_cmp);
        self.folds += other.folds;
        self.excluded_trials.extend(other.excluded_trials);
        self.excluded_trials.sort_by(|a, b| (a.trial_id, &a.reason).cmp(&(b.trial_id, &b.reason)));
        self.excluded_trials.dedup();
        let reason = [&self.status, &other.status]
            .into_iter()
            .filter_map(|status| match status {
                RecordStatus::Excluded { reason } => Some(reason.clone()),
                RecordStatus::Scored => None,
            })
            .min();
        self.status = match reason {
            Some(reason) if self.units.is_empty() => RecordStatus::Excluded { reason },
            _ => RecordStatus::Scored,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(channels: Vec<Vec<f64>>) -> SampleMatrix {
        SampleMatrix::from_channels(channels).unwrap()
    }

    #[test]
    fn test_sample_matrix_rows_and_channels_agree() {
        let rows = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];
        let m = SampleMatrix::from_rows(&rows).unwrap();
        assert_eq!(m.n_samples(), 3);
        assert_eq!(m.n_channels(), 2);
        assert_eq!(m.channel(1), &[10.0, 20.0, 30.0]);
        assert_eq!(m.get(2, 0), 3.0);
        assert_eq!(m.summed_channels(), vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_sample_matrix_rejects_ragged_channels() {
        let err = SampleMatrix::from_channels(vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, DataError::LengthMismatch { .. }));
    }

    #[test]
    fn test_select_channels_out_of_range() {
        let m = matrix(vec![vec![1.0], vec![2.0]]);
        assert_eq!(m.select_channels(&[1]).unwrap().channel(0), &[2.0]);
        assert!(matches!(
            m.select_channels(&[2]),
            Err(DataError::ChannelOutOfRange { channel: 2, channels: 2 })
        ));
    }

    #[test]
    fn test_trial_rejects_length_mismatch() {
        let eeg = matrix(vec![vec![0.0; 10]]);
        let att = matrix(vec![vec![0.0; 10]]);
        let unatt = matrix(vec![vec![0.0; 9]]);
        let err = Trial::new(TrialId(1), eeg, att, unatt, AttentionLabel::AttendedLeft, 64.0).unwrap_err();
        assert!(matches!(err, DataError::LengthMismatch { expected: 10, got: 9, .. }));
    }

    #[test]
    fn test_trial_rejects_non_finite() {
        let eeg = matrix(vec![vec![0.0, f64::NAN]]);
        let env = matrix(vec![vec![0.0, 0.0]]);
        let err =
            Trial::new(TrialId(0), eeg, env.clone(), env, AttentionLabel::AttendedRight, 64.0).unwrap_err();
        assert!(matches!(err, DataError::NonFinite { series: "eeg" }));
    }

    #[test]
    fn test_envelope_rejects_negative() {
        let err = Envelope::new(matrix(vec![vec![0.1, -0.2]]), 64.0, BankQuality::Preferred).unwrap_err();
        assert_eq!(err, DataError::NegativeEnvelope);
    }

    #[test]
    fn test_label_orders_attended_first() {
        let pair = StimulusPair::new(StimulusId::new("a"), StimulusId::new("b"));
        let (attended, unattended) = AttentionLabel::AttendedLeft.attended_first(&pair.left, &pair.right);
        assert_eq!((attended.0.as_str(), unattended.0.as_str()), ("a", "b"));
        let (attended, unattended) = AttentionLabel::AttendedRight.attended_first(&pair.left, &pair.right);
        assert_eq!((attended.0.as_str(), unattended.0.as_str()), ("b", "a"));
    }

    #[test]
    fn test_prediction_from_scores() {
        let win = PredictionResult::from_scores(0.4, 0.1);
        assert_eq!(win.prediction, Prediction::Attended);
        assert!((win.confidence - 0.3).abs() < 1e-12);
        assert_eq!(win.credit(), 1.0);

        let loss = PredictionResult::from_scores(0.1, 0.4);
        assert_eq!(loss.prediction, Prediction::Unattended);
        assert_eq!(loss.credit(), 0.0);

        let tie = PredictionResult::from_scores(0.25, 0.25);
        assert!(tie.is_tie());
        assert_eq!(tie.credit(), 0.5);

        let nan = PredictionResult::from_scores(f64::NAN, 0.0);
        assert!(nan.is_tie());
    }

    #[test]
    fn test_excluded_record_has_no_accuracy() {
        let key = RecordKey::new(SubjectId::new("s1"), Algorithm::Trf, ConfigurationId::new("full"));
        let record = AccuracyRecord::excluded(key.clone(), "too few trials", Vec::new());
        assert!(record.is_excluded());
        assert_eq!(record.accuracy(), None);

        let zero = AccuracyRecord::scored(
            key,
            vec![UnitOutcome {
                trial_id: TrialId(0),
                unit: 0,
                result: PredictionResult::from_scores(0.0, 1.0),
            }],
            1,
            Vec::new(),
        );
        assert_eq!(zero.accuracy(), Some(0.0));
    }

    #[test]
    fn test_record_merge_is_order_independent() {
        let key = RecordKey::new(SubjectId::new("s1"), Algorithm::Cca, ConfigurationId::new("full"));
        let unit = |trial: u32, a: f64| UnitOutcome {
            trial_id: TrialId(trial),
            unit: 0,
            result: PredictionResult::from_scores(a, 0.5),
        };
        let a = AccuracyRecord::scored(key.clone(), vec![unit(0, 1.0)], 1, Vec::new());
        let b = AccuracyRecord::scored(key, vec![unit(1, 0.0)], 1, Vec::new());

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
        assert_eq!(ab.accuracy(), Some(0.5));
        assert_eq!(ab.folds, 2);
    }

    #[test]
    fn test_record_merge_with_shared_unit_keys() {
        let key = RecordKey::new(SubjectId::new("s1"), Algorithm::Trf, ConfigurationId::new("ear"));
        let unit = |a: f64| UnitOutcome {
            trial_id: TrialId(3),
            unit: 0,
            result: PredictionResult::from_scores(a, 0.5),
        };
        let a = AccuracyRecord::scored(key.clone(), vec![unit(0.9)], 1, Vec::new());
        let b = AccuracyRecord::scored(key, vec![unit(0.1), unit(0.7)], 1, Vec::new());

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
        assert_eq!(ab.units.len(), 3);
        assert!((ab.accuracy().unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_only_preferred_bank_is_not_degraded() {
        assert!(!BankQuality::Preferred.is_degraded());
        assert!(BankQuality::Approximate.is_degraded());
        assert!(BankQuality::Broadband.is_degraded());
    }
}
