//! Data-loading boundary
//!
//! File formats are the concern of an external I/O layer. This module only
//! defines what that layer must deliver ([`TrialSource`], [`EnvelopeSource`])
//! and assembles delivered data into aligned [`Subject`]s, excluding trials
//! whose data is unusable.

use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use aad_core::error::{AadError, ConfigurationError, DataError};
use aad_core::types::{
    AttentionLabel, BankQuality, Envelope, Rereference, SampleMatrix, StimulusId, StimulusPair, Subject, SubjectId,
    Trial, TrialId,
};

use crate::processing::alignment::TrialAligner;

/// One trial as delivered by the I/O layer, before alignment.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTrial {
    /// Trial identifier
    pub trial_id: TrialId,
    /// EEG `[T × C]` at the native rate
    pub eeg: SampleMatrix,
    /// Native EEG sample rate (Hz)
    pub native_rate_hz: f64,
    /// Rereferencing scheme for this recording
    pub rereference: Rereference,
    /// Stimuli presented left and right
    pub stimuli: StimulusPair,
    /// Explicit attention label
    pub label: AttentionLabel,
}

/// Supplies raw trials per subject.
pub trait TrialSource: Sync {
    /// Number of trials recorded for a subject
    fn trial_count(&self, subject: &SubjectId) -> usize;

    /// Load one raw trial
    fn load_raw_trial(&self, subject: &SubjectId, trial_index: usize) -> Result<RawTrial, DataError>;
}

/// Supplies precomputed envelopes per stimulus.
pub trait EnvelopeSource: Sync {
    /// Envelope of a stimulus, `None` when unavailable
    fn load_envelope(&self, stimulus: &StimulusId) -> Option<Envelope>;
}

/// In-memory [`TrialSource`], keyed by subject.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTrials {
    subjects: BTreeMap<SubjectId, Vec<RawTrial>>,
}

impl InMemoryTrials {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trial for a subject
    pub fn push(&mut self, subject: SubjectId, trial: RawTrial) {
        self.subjects.entry(subject).or_default().push(trial);
    }

    /// Subjects with at least one trial
    pub fn subjects(&self) -> impl Iterator<Item = &SubjectId> {
        self.subjects.keys()
    }
}

impl TrialSource for InMemoryTrials {
    fn trial_count(&self, subject: &SubjectId) -> usize {
        self.subjects.get(subject).map_or(0, Vec::len)
    }

    fn load_raw_trial(&self, subject: &SubjectId, trial_index: usize) -> Result<RawTrial, DataError> {
        self.subjects
            .get(subject)
            .and_then(|trials| trials.get(trial_index))
            .cloned()
            .ok_or_else(|| DataError::Source { reason: format!("{subject} has no trial index {trial_index}") })
    }
}

/// In-memory [`EnvelopeSource`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryEnvelopes {
    envelopes: HashMap<StimulusId, Envelope>,
}

impl InMemoryEnvelopes {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the envelope of a stimulus
    pub fn insert(&mut self, stimulus: StimulusId, envelope: Envelope) {
        self.envelopes.insert(stimulus, envelope);
    }
}

impl EnvelopeSource for InMemoryEnvelopes {
    fn load_envelope(&self, stimulus: &StimulusId) -> Option<Envelope> {
        self.envelopes.get(stimulus).cloned()
    }
}

/// Builds aligned subjects from the I/O boundary.
pub struct SubjectAssembler<'a> {
    aligner: &'a TrialAligner,
}

impl<'a> SubjectAssembler<'a> {
    /// Create an assembler around an aligner
    pub fn new(aligner: &'a TrialAligner) -> Self {
        Self { aligner }
    }

    /// Load, align and collect every trial of `subject`.
    ///
    /// Data errors exclude the affected trial and are logged; configuration
    /// errors abort the whole run.
    pub fn assemble(
        &self,
        subject: &SubjectId,
        trials: &dyn TrialSource,
        envelopes: &dyn EnvelopeSource,
    ) -> Result<Subject, ConfigurationError> {
        let mut assembled = Subject::new(subject.clone(), Vec::new());
        let mut degraded = 0_usize;

        for index in 0..trials.trial_count(subject) {
            // the source's own numbering once the trial is loaded
            let raw = match trials.load_raw_trial(subject, index) {
                Ok(raw) => raw,
                Err(e) => {
                    let trial_id = TrialId(u32::try_from(index).unwrap_or(u32::MAX));
                    warn!(%subject, %trial_id, error = %e, "Trial excluded");
                    assembled.exclude(trial_id, e.to_string());
                    continue;
                }
            };
            match self.assemble_trial(&raw, envelopes) {
                Ok((trial, quality)) => {
                    if quality.is_degraded() {
                        degraded += 1;
                    }
                    assembled.push_trial(trial);
                }
                Err(AadError::Configuration(e)) => return Err(e),
                Err(e) => {
                    warn!(%subject, trial_id = %raw.trial_id, error = %e, "Trial excluded");
                    assembled.exclude(raw.trial_id, e.to_string());
                }
            }
        }

        if degraded > 0 {
            warn!(%subject, trials = degraded, "Envelopes from a fallback filter bank");
        }
        info!(
            %subject,
            trials = assembled.len(),
            excluded = assembled.excluded().len(),
            degraded,
            "Subject assembled"
        );
        Ok(assembled)
    }

    /// Align one loaded trial; also returns the worse of its two envelope qualities
    fn assemble_trial(&self, raw: &RawTrial, envelopes: &dyn EnvelopeSource) -> Result<(Trial, BankQuality), AadError> {
        let load = |stimulus: &StimulusId| {
            envelopes
                .load_envelope(stimulus)
                .ok_or_else(|| DataError::MissingEnvelope { stimulus: stimulus.clone() })
        };
        let left = load(&raw.stimuli.left)?;
        let right = load(&raw.stimuli.right)?;
        let trial = self.aligner.align(raw, &left, &right)?;
        Ok((trial, left.quality().max(right.quality())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aad_core::config::AnalysisConfig;

    fn raw(trial: u32, left: &str, right: &str, native_rate_hz: f64) -> RawTrial {
        let n = (native_rate_hz * 4.0) as usize;
        let channels = (0..2)
            .map(|c| (0..n).map(|i| ((i * (c + 3)) % 17) as f64 - 8.0).collect())
            .collect();
        RawTrial {
            trial_id: TrialId(trial),
            eeg: SampleMatrix::from_channels(channels).unwrap(),
            native_rate_hz,
            rereference: Rereference::None,
            stimuli: StimulusPair::new(StimulusId::new(left), StimulusId::new(right)),
            label: AttentionLabel::AttendedLeft,
        }
    }

    fn envelopes() -> InMemoryEnvelopes {
        let mut source = InMemoryEnvelopes::new();
        for name in ["a", "b"] {
            let bands = SampleMatrix::from_channels(vec![vec![0.5; 256]]).unwrap();
            source.insert(StimulusId::new(name), Envelope::new(bands, 64.0, BankQuality::Preferred).unwrap());
        }
        source
    }

    #[test]
    fn test_missing_envelope_excludes_trial() {
        let subject = SubjectId::new("s1");
        let mut trials = InMemoryTrials::new();
        // the source numbers its trials 10 and 12
        trials.push(subject.clone(), raw(10, "a", "b", 256.0));
        trials.push(subject.clone(), raw(12, "a", "missing", 256.0));

        let aligner = TrialAligner::new(&AnalysisConfig::default()).unwrap();
        let assembled = SubjectAssembler::new(&aligner).assemble(&subject, &trials, &envelopes()).unwrap();

        assert_eq!(assembled.len(), 1);
        assert_eq!(assembled.trials()[0].id(), TrialId(10));
        assert_eq!(assembled.excluded().len(), 1);
        assert_eq!(assembled.excluded()[0].trial_id, TrialId(12));
        assert!(assembled.excluded()[0].reason.contains("missing"));
    }

    #[test]
    fn test_non_integer_rate_aborts() {
        let subject = SubjectId::new("s1");
        let mut trials = InMemoryTrials::new();
        trials.push(subject.clone(), raw(0, "a", "b", 100.0));

        let aligner = TrialAligner::new(&AnalysisConfig::default()).unwrap();
        let err = SubjectAssembler::new(&aligner).assemble(&subject, &trials, &envelopes()).unwrap_err();
        assert!(matches!(err, ConfigurationError::NonIntegerDecimation { .. }));
    }

    #[test]
    fn test_unknown_subject_is_empty() {
        let trials = InMemoryTrials::new();
        let aligner = TrialAligner::new(&AnalysisConfig::default()).unwrap();
        let assembled = SubjectAssembler::new(&aligner)
            .assemble(&SubjectId::new("nobody"), &trials, &envelopes())
            .unwrap();
        assert!(assembled.is_empty());
    }
}
