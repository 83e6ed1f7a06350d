//! Auditory attention decoding evaluation driver
//!
//! Runs the full pipeline on synthetic recordings: audio envelopes are
//! extracted, raw EEG is aligned into trials, and every decoder is evaluated
//! under a full and a reduced channel configuration.
//!
//! # Usage
//!
//! ```bash
//! # Default synthetic study
//! aad simulate
//!
//! # Larger study with a custom analysis configuration
//! aad simulate --subjects 8 --trials 6 --config analysis.toml
//!
//! # Print the default configuration as TOML
//! aad show-config
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use aad_core::config::AnalysisConfig;
use aad_core::types::{AttentionLabel, ConfigurationId, StimulusId, StimulusPair, SubjectId, TrialId};
use aad_native::loader::{InMemoryEnvelopes, InMemoryTrials};
use aad_native::sim::SyntheticGenerator;
use aad_native::{summarize, ChannelConfiguration, EnvelopeExtractor, Evaluation, SubjectAssembler, TrialAligner};

/// Auditory attention decoding evaluation
#[derive(Parser, Debug)]
#[command(name = "aad")]
#[command(author, version, about = "Auditory attention decoding evaluation", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate all decoders on synthetic subjects (default if no subcommand)
    Simulate {
        /// Number of subjects
        #[arg(short, long, default_value = "4")]
        subjects: usize,

        /// Trials per subject
        #[arg(short, long, default_value = "4")]
        trials: usize,

        /// Trial duration in seconds
        #[arg(short, long, default_value = "60")]
        duration: f64,

        /// EEG channels per recording
        #[arg(long, default_value = "16")]
        channels: usize,

        /// Native EEG sample rate (Hz)
        #[arg(long, default_value = "512")]
        eeg_rate: f64,

        /// Standard deviation of additive EEG noise
        #[arg(long, default_value = "1.0")]
        noise: f64,

        /// Random seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Envelope shortfall (samples) absorbed by truncating the EEG
        #[arg(long, default_value_t = TrialAligner::DEFAULT_LENGTH_TOLERANCE)]
        length_tolerance: usize,

        /// Analysis configuration (TOML); defaults apply to missing keys
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default analysis configuration
    ShowConfig,
}

/// Synthetic study parameters
struct Study {
    subjects: usize,
    trials: usize,
    duration_s: f64,
    channels: usize,
    eeg_rate_hz: f64,
    noise_std: f64,
    seed: u64,
    length_tolerance: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("AAD evaluation v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::ShowConfig) => {
            print!("{}", toml::to_string(&AnalysisConfig::default())?);
        }
        Some(Commands::Simulate {
            subjects,
            trials,
            duration,
            channels,
            eeg_rate,
            noise,
            seed,
            length_tolerance,
            config,
        }) => {
            let config = load_config(config.as_deref())?;
            let study = Study {
                subjects,
                trials,
                duration_s: duration,
                channels,
                eeg_rate_hz: eeg_rate,
                noise_std: noise,
                seed,
                length_tolerance,
            };
            run_simulation(&config, &study)?;
        }
        None => {
            let study = Study {
                subjects: 4,
                trials: 4,
                duration_s: 60.0,
                channels: 16,
                eeg_rate_hz: 512.0,
                noise_std: 1.0,
                seed: 1,
                length_tolerance: TrialAligner::DEFAULT_LENGTH_TOLERANCE,
            };
            run_simulation(&AnalysisConfig::default(), &study)?;
        }
    }

    Ok(())
}

/// Read and validate a TOML configuration, or use the defaults
fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading configuration {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing configuration {}", path.display()))?
        }
        None => AnalysisConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Generate, align and evaluate a synthetic study
fn run_simulation(config: &AnalysisConfig, study: &Study) -> anyhow::Result<()> {
    let extractor = EnvelopeExtractor::from_config(config)?;
    let aligner = TrialAligner::new(config)?.with_length_tolerance(study.length_tolerance);
    let audio_rate = config.envelope.audio_rate_hz;

    info!(
        subjects = study.subjects,
        trials = study.trials,
        duration_s = study.duration_s,
        channels = study.channels,
        "Generating synthetic study"
    );

    let mut generator = SyntheticGenerator::new(study.seed);
    let mut raw_trials = InMemoryTrials::new();
    let mut envelopes = InMemoryEnvelopes::new();
    let subject_ids: Vec<SubjectId> = (0..study.subjects).map(|s| SubjectId::new(format!("S{:02}", s + 1))).collect();

    for subject in &subject_ids {
        for t in 0..study.trials {
            let stimuli = StimulusPair::new(
                StimulusId::new(format!("{subject}_t{t}_left")),
                StimulusId::new(format!("{subject}_t{t}_right")),
            );
            let left = extractor.extract(&generator.speech_like_audio(study.duration_s, audio_rate), audio_rate)?;
            let right = extractor.extract(&generator.speech_like_audio(study.duration_s, audio_rate), audio_rate)?;
            let label = if t % 2 == 0 { AttentionLabel::AttendedLeft } else { AttentionLabel::AttendedRight };

            let raw = generator.raw_trial(
                TrialId(u32::try_from(t)?),
                stimuli.clone(),
                label,
                &left,
                &right,
                study.eeg_rate_hz,
                study.channels,
                study.noise_std,
            );
            envelopes.insert(stimuli.left, left);
            envelopes.insert(stimuli.right, right);
            raw_trials.push(subject.clone(), raw);
        }
    }

    let assembler = SubjectAssembler::new(&aligner);
    let subjects = subject_ids
        .iter()
        .map(|id| assembler.assemble(id, &raw_trials, &envelopes))
        .collect::<Result<Vec<_>, _>>()?;

    let full = ChannelConfiguration::full("full");
    let reduced = ChannelConfiguration::subset("reduced", (0..study.channels.div_ceil(4)).collect());
    let evaluation = Evaluation::new(config.clone()).with_configurations(vec![full.clone(), reduced.clone()]);
    let store = evaluation.run(&subjects)?;

    for summary in summarize(&store) {
        info!(
            algorithm = %summary.algorithm,
            configuration = %summary.configuration,
            mean = ?summary.mean_accuracy,
            std = ?summary.std_accuracy,
            subjects = summary.n_subjects,
            excluded = summary.n_excluded,
            "Accuracy summary"
        );
    }

    report_comparison(&evaluation, &store, &full.id, &reduced.id);
    Ok(())
}

fn report_comparison(
    evaluation: &Evaluation,
    store: &aad_native::ResultStore,
    first: &ConfigurationId,
    second: &ConfigurationId,
) {
    for (algorithm, outcome) in evaluation.compare(store, first, second) {
        match outcome {
            Ok(comparison) => info!(
                %algorithm,
                test = ?comparison.test,
                pairs = comparison.n_pairs,
                mean_difference = comparison.mean_difference,
                p_value = comparison.p_value,
                effect_size = comparison.effect_size,
                "{first} vs {second}"
            ),
            Err(e) => warn!(%algorithm, error = %e, "{first} vs {second}: comparison skipped"),
        }
    }
}
