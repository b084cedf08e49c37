//! # Ensemble Configuration
//!
//! The exclusive entry point for run parameters. A run is described by a
//! TOML file listing the participating models, each with the path to its
//! submission CSV, its previously observed public score, and the weight its
//! predictions carry in the blend. Weights are applied as-is; they are not
//! required to sum to one.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One participating model: a display label, the submission CSV it produced,
/// the public score observed for that submission, and its blend weight.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub csv_path: PathBuf,
    pub observed_score: f64,
    pub weight: f64,
}

/// The declared model set plus output options.
#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    pub models: Vec<ModelEntry>,
    /// Upper bound K for label clipping. Inferred from the inputs when absent.
    pub num_classes: Option<i64>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_tag() -> String {
    "blend".to_string()
}

/// Failures while reading or validating the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file '{}': {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("the configuration lists no models")]
    NoModels,
    #[error("the model at index {0} has an empty name")]
    EmptyName(usize),
    #[error("the model name '{0}' appears more than once")]
    DuplicateName(String),
    #[error("model '{name}' has weight {weight}; weights must lie in [0, 1]")]
    WeightOutOfRange { name: String, weight: f64 },
    #[error("model '{name}' has observed score {score}; scores must lie in [0, 1]")]
    ScoreOutOfRange { name: String, score: f64 },
    #[error("the model weights sum to {0}; the sum must be positive")]
    NonPositiveWeightSum(f64),
    #[error("num_classes must be at least 1 (got {0})")]
    InvalidNumClasses(i64),
}

impl EnsembleConfig {
    /// Reads and parses a configuration file. Validation is deferred so that
    /// command-line overrides can be applied first.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text)?;
        Ok(config)
    }

    /// Checks the invariants the rest of the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::NoModels);
        }

        let mut seen = ahash::AHashSet::with_capacity(self.models.len());
        for (index, model) in self.models.iter().enumerate() {
            if model.name.is_empty() {
                return Err(ConfigError::EmptyName(index));
            }
            if !seen.insert(model.name.as_str()) {
                return Err(ConfigError::DuplicateName(model.name.clone()));
            }
            if !(0.0..=1.0).contains(&model.weight) {
                return Err(ConfigError::WeightOutOfRange {
                    name: model.name.clone(),
                    weight: model.weight,
                });
            }
            if !(0.0..=1.0).contains(&model.observed_score) {
                return Err(ConfigError::ScoreOutOfRange {
                    name: model.name.clone(),
                    score: model.observed_score,
                });
            }
        }

        let weight_sum = self.weight_sum();
        if !(weight_sum > 0.0) {
            return Err(ConfigError::NonPositiveWeightSum(weight_sum));
        }

        if let Some(num_classes) = self.num_classes {
            if num_classes < 1 {
                return Err(ConfigError::InvalidNumClasses(num_classes));
            }
        }

        Ok(())
    }

    pub fn weight_sum(&self) -> f64 {
        self.models.iter().map(|model| model.weight).sum()
    }
}
