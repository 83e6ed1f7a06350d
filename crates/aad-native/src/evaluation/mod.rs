//! Evaluation harness
//!
//! # Modules
//!
//! - [`harness`]: cross-validation, per-subject records and the parallel
//!   evaluation plan
//! - [`results`]: order-independent store of accuracy records
//! - [`stats`]: configuration summaries and paired comparisons

pub mod harness;
pub mod results;
pub mod stats;

pub use harness::{cross_validate, evaluate_fold, folds, run_decoder, ChannelConfiguration, Evaluation};
pub use results::ResultStore;
pub use stats::{compare_configurations, compare_in_store, paired_comparison, summarize, Comparison, ConfigurationSummary};
