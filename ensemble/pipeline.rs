// ========================================================================================
//
//                            The ensembling pipeline
//
// ========================================================================================
//
// A straight-line batch job: load every model's submission, align them on the
// reference ID order, sum the weighted labels, project to integer classes, and
// write a single timestamped CSV. Any failure before the writer completes
// aborts the run without touching the output directory.

use std::path::PathBuf;
use thiserror::Error;

use crate::combine;
use crate::combine::AlignError;
use crate::config::{ConfigError, EnsembleConfig, ModelEntry};
use crate::data;
use crate::data::DataError;
use crate::write;
use crate::write::WriteError;

/// Tolerance on `|Σw − 1|` before the summary is flagged as unnormalized.
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Align(#[from] AlignError),
    #[error("failed to write the submission: {0}")]
    Write(#[from] WriteError),
}

impl EnsembleError {
    /// The process exit code the CLI reports for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            EnsembleError::Config(_) => 2,
            EnsembleError::Data(_) => 3,
            EnsembleError::Align(_) => 4,
            EnsembleError::Write(_) => 1,
        }
    }
}

/// The informational score estimate printed after a successful run. These
/// numbers never influence the file contents.
#[derive(Debug, Clone, Copy)]
pub struct ScoreSummary {
    /// `Σ weight_i · observed_score_i` over the model set.
    pub expected: f64,
    /// The best single observed score in the model set.
    pub best_single: f64,
    /// `expected - best_single`.
    pub delta: f64,
}

pub fn score_summary(models: &[ModelEntry]) -> ScoreSummary {
    let expected = models
        .iter()
        .map(|model| model.weight * model.observed_score)
        .sum();
    let best_single = models
        .iter()
        .map(|model| model.observed_score)
        .fold(f64::NEG_INFINITY, f64::max);
    ScoreSummary {
        expected,
        best_single,
        delta: expected - best_single,
    }
}

/// Runs the full load → combine → project → write pipeline and returns the
/// path of the emitted CSV.
pub fn run(config: &EnsembleConfig) -> Result<PathBuf, EnsembleError> {
    config.validate()?;

    let weight_sum = config.weight_sum();
    if (weight_sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
        log::warn!(
            "model weights sum to {weight_sum}; the expected-score summary assumes normalized weights"
        );
    }

    let mut entries = Vec::with_capacity(config.models.len());
    for model in &config.models {
        println!(
            "Loading predictions for '{}' from '{}'",
            model.name,
            model.csv_path.display()
        );
        let table = data::load(model)?;
        println!("Loaded {} rows for model '{}'", table.len(), model.name);
        entries.push((model.clone(), table));
    }

    let num_classes = match config.num_classes {
        Some(num_classes) => num_classes,
        None => {
            let inferred = combine::infer_num_classes(&entries);
            log::info!("num_classes not configured; inferred K = {inferred} from the inputs");
            inferred
        }
    };

    let accumulator = combine::combine(&entries)?;
    let labels = combine::project(&accumulator, num_classes);

    let reference_ids = &entries[0].1.ids;
    let path = write::write_submission(
        reference_ids,
        &labels,
        &config.output_dir,
        &config.tag,
        config.models.len(),
    )?;

    for model in &config.models {
        println!(
            "  {}: weight {:.3}, observed public score {:.5}",
            model.name, model.weight, model.observed_score
        );
    }
    let summary = score_summary(&config.models);
    println!(
        "Expected public score: {:.5} (best single {:.5}, delta {:+.5})",
        summary.expected, summary.best_single, summary.delta
    );
    println!("Submission written to: {}", path.display());

    Ok(path)
}
