//! AAD Native - host-side preprocessing, decoding and evaluation
//!
//! This crate provides the numeric core of the auditory attention decoding
//! evaluation:
//! - Signal processing (filters, resampling, envelope extraction)
//! - Trial alignment of EEG with attended/unattended envelopes
//! - Three decoders: windowed cross-correlation, TRF and CCA
//! - Cross-validated evaluation with paired configuration statistics
//!
//! # Modules
//!
//! - [`processing`]: Filters, FFT helpers, envelope extraction, alignment
//! - [`decoding`]: Correlation, TRF and CCA decoders
//! - [`evaluation`]: Cross-validation harness, result store, statistics
//! - [`loader`]: Boundary traits for the (external) data-loading layer
//! - [`sim`]: Deterministic synthetic data for tests and benchmarks

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

pub mod decoding;
pub mod evaluation;
pub mod loader;
pub mod processing;
pub mod sim;

// Re-export key types
pub use decoding::{CcaDecoder, CorrelationDecoder, TrfDecoder, TrialDecoder};
pub use evaluation::{
    compare_configurations, run_decoder, summarize, ChannelConfiguration, Comparison,
    ConfigurationSummary, Evaluation, ResultStore,
};
pub use loader::{EnvelopeSource, RawTrial, SubjectAssembler, TrialSource};
pub use processing::alignment::TrialAligner;
pub use processing::envelope::EnvelopeExtractor;
pub use processing::filters::{select_filter_bank, FilterBankProvider};
