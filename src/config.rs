//! Configuration module for shuffle-split experiments.
//!
//! Handles YAML experiment configuration loading and validates the feature
//! budget, partition sizes and randomness policy before any split executes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid feature budget {budget}: {reason}")]
    InvalidFeatureBudget { budget: String, reason: String },

    #[error("Partition size fraction must lie in (0, 1), got {0}")]
    InvalidSizeFraction(f64),

    #[error("Partition size count must be positive")]
    EmptyPartition,

    #[error("Unsupported random source: {0} (expected an integer seed, \"entropy\" or \"fixed\")")]
    UnsupportedRandomSource(String),

    #[error("Number of shuffle-split iterations must be at least 1, got {0}")]
    InvalidIterations(usize),
}

/// How many of the ranked features each split keeps
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureBudget {
    /// Absolute number of top-ranked features
    Count(usize),
    /// Fraction of the available features, on [0, 1]
    Fraction(f64),
}

impl FeatureBudget {
    /// Resolve the budget into a feature count for a space of `total` features
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFeatureBudget` if a fraction lies outside
    /// [0, 1] or a count exceeds `total`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn resolve(self, total: usize) -> Result<usize, ConfigError> {
        match self {
            Self::Fraction(fraction) => {
                if !(0.0..=1.0).contains(&fraction) {
                    return Err(ConfigError::InvalidFeatureBudget {
                        budget: self.to_string(),
                        reason: "fraction must be on interval [0, 1]".to_string(),
                    });
                }
                Ok((fraction * total as f64).round() as usize)
            }
            Self::Count(count) => {
                if count > total {
                    return Err(ConfigError::InvalidFeatureBudget {
                        budget: self.to_string(),
                        reason: format!("count must be on interval [0, {total}]"),
                    });
                }
                Ok(count)
            }
        }
    }
}

impl fmt::Display for FeatureBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count} features"),
            Self::Fraction(fraction) => write!(f, "{fraction} of features"),
        }
    }
}

/// Requested size of a train or test partition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SplitSize {
    /// Absolute number of samples (per class for categorical data)
    Count(usize),
    /// Fraction of the available samples, on (0, 1)
    Fraction(f64),
}

impl SplitSize {
    /// Check that the size is usable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSizeFraction` for fractions outside (0, 1)
    /// and `ConfigError::EmptyPartition` for a zero count.
    pub fn validate(self) -> Result<(), ConfigError> {
        match self {
            Self::Fraction(f) if f <= 0.0 || f >= 1.0 || f.is_nan() => {
                Err(ConfigError::InvalidSizeFraction(f))
            }
            Self::Count(0) => Err(ConfigError::EmptyPartition),
            _ => Ok(()),
        }
    }

    /// Number of samples this size selects out of `available`
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn resolve(self, available: usize) -> usize {
        match self {
            Self::Count(count) => count.min(available),
            Self::Fraction(f) => ((f * available as f64).round() as usize).min(available),
        }
    }
}

/// Source of randomness for the train/test partitions
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RandomSourceRepr", into = "RandomSourceRepr")]
pub enum RandomSource {
    /// Fresh operating-system entropy for every run
    #[default]
    Entropy,
    /// Reproducible run derived from a top-level seed
    Seeded(u64),
    /// No randomness: every iteration sees the identical split
    Fixed,
}

impl RandomSource {
    /// Whether iterations are independent samples, so confidence intervals
    /// over the pooled classifications are meaningful
    #[must_use]
    pub const fn use_error_bars(self) -> bool {
        !matches!(self, Self::Fixed)
    }
}

impl FromStr for RandomSource {
    type Err = ConfigError;

    /// Parse random source from string
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnsupportedRandomSource` if the string is neither
    /// a seed nor a known keyword.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(seed) = trimmed.parse::<u64>() {
            return Ok(Self::Seeded(seed));
        }
        match trimmed.to_lowercase().as_str() {
            "entropy" | "random" | "true" => Ok(Self::Entropy),
            "fixed" | "none" | "false" => Ok(Self::Fixed),
            _ => Err(ConfigError::UnsupportedRandomSource(s.to_string())),
        }
    }
}

impl fmt::Display for RandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entropy => write!(f, "entropy"),
            Self::Seeded(seed) => write!(f, "seed {seed}"),
            Self::Fixed => write!(f, "fixed"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RandomSourceRepr {
    Seed(u64),
    Flag(bool),
    Name(String),
}

impl TryFrom<RandomSourceRepr> for RandomSource {
    type Error = ConfigError;

    fn try_from(repr: RandomSourceRepr) -> Result<Self, Self::Error> {
        match repr {
            RandomSourceRepr::Seed(seed) => Ok(Self::Seeded(seed)),
            RandomSourceRepr::Flag(true) => Ok(Self::Entropy),
            RandomSourceRepr::Flag(false) => Ok(Self::Fixed),
            RandomSourceRepr::Name(name) => name.parse(),
        }
    }
}

impl From<RandomSource> for RandomSourceRepr {
    fn from(source: RandomSource) -> Self {
        match source {
            RandomSource::Entropy => Self::Name("entropy".to_string()),
            RandomSource::Seeded(seed) => Self::Seed(seed),
            RandomSource::Fixed => Self::Name("fixed".to_string()),
        }
    }
}

/// Shuffle-split experiment configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    /// Experiment name used in reports
    #[serde(default)]
    pub name: Option<String>,
    /// Number of shuffle-split iterations
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Feature budget per split
    #[serde(default = "default_features_size")]
    pub features_size: FeatureBudget,
    /// Training partition size (collaborator default when absent)
    #[serde(default)]
    pub train_size: Option<SplitSize>,
    /// Test partition size (collaborator default when absent)
    #[serde(default)]
    pub test_size: Option<SplitSize>,
    /// Randomness policy for the partitions
    #[serde(default)]
    pub random_state: RandomSource,
    /// Number of ranked features shown in reports
    #[serde(default = "default_display")]
    pub display: usize,
}

const fn default_iterations() -> usize {
    5
}
const fn default_features_size() -> FeatureBudget {
    FeatureBudget::Fraction(0.15)
}
const fn default_display() -> usize {
    15
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: None,
            iterations: default_iterations(),
            features_size: default_features_size(),
            train_size: None,
            test_size: None,
            random_state: RandomSource::default(),
            display: default_display(),
        }
    }
}

impl ExperimentConfig {
    /// Load experiment configuration from YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load experiment configuration from YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Validate against a feature space of `num_features` features and
    /// return the resolved top-K feature count
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn validate(&self, num_features: usize) -> Result<usize, ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::InvalidIterations(self.iterations));
        }
        if let Some(size) = self.train_size {
            size.validate()?;
        }
        if let Some(size) = self.test_size {
            size.validate()?;
        }
        self.features_size.resolve(num_features)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==========================================================================
    // Defaults and YAML loading
    // ==========================================================================

    #[test]
    fn test_experiment_config_default_values() {
        let config = ExperimentConfig::default();
        assert_eq!(config.iterations, 5);
        assert_eq!(config.features_size, FeatureBudget::Fraction(0.15));
        assert_eq!(config.random_state, RandomSource::Entropy);
        assert_eq!(config.display, 15);
        assert!(config.train_size.is_none());
    }

    #[test]
    fn test_experiment_config_from_yaml() {
        let yaml = r"
name: hela-splits
iterations: 20
features_size: 50
train_size: 0.75
test_size: 10
random_state: 1234
";
        let config = ExperimentConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("hela-splits"));
        assert_eq!(config.iterations, 20);
        assert_eq!(config.features_size, FeatureBudget::Count(50));
        assert_eq!(config.train_size, Some(SplitSize::Fraction(0.75)));
        assert_eq!(config.test_size, Some(SplitSize::Count(10)));
        assert_eq!(config.random_state, RandomSource::Seeded(1234));
        assert_eq!(config.display, 15);
    }

    #[test]
    fn test_experiment_config_yaml_defaults() {
        let config = ExperimentConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn test_experiment_config_serialization_roundtrip() {
        let config = ExperimentConfig {
            random_state: RandomSource::Fixed,
            features_size: FeatureBudget::Fraction(0.5),
            ..ExperimentConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).expect("serialize");
        let parsed = ExperimentConfig::from_yaml(&yaml).expect("deserialize");
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_experiment_config_unsupported_random_state() {
        let result = ExperimentConfig::from_yaml("random_state: sometimes");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_experiment_config_load_missing_file() {
        let result = ExperimentConfig::load("/nonexistent/experiment.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    // ==========================================================================
    // Feature budget
    // ==========================================================================

    #[test]
    fn test_feature_budget_fraction() {
        assert_eq!(FeatureBudget::Fraction(0.15).resolve(100).unwrap(), 15);
        assert_eq!(FeatureBudget::Fraction(0.0).resolve(100).unwrap(), 0);
        assert_eq!(FeatureBudget::Fraction(1.0).resolve(7).unwrap(), 7);
        // 0.25 * 10 = 2.5 rounds away from zero
        assert_eq!(FeatureBudget::Fraction(0.25).resolve(10).unwrap(), 3);
    }

    #[test]
    fn test_feature_budget_fraction_out_of_range() {
        assert!(matches!(
            FeatureBudget::Fraction(1.5).resolve(10),
            Err(ConfigError::InvalidFeatureBudget { .. })
        ));
        assert!(FeatureBudget::Fraction(-0.1).resolve(10).is_err());
    }

    #[test]
    fn test_feature_budget_count() {
        assert_eq!(FeatureBudget::Count(0).resolve(10).unwrap(), 0);
        assert_eq!(FeatureBudget::Count(10).resolve(10).unwrap(), 10);
        let err = FeatureBudget::Count(11).resolve(10).unwrap_err();
        assert!(err.to_string().contains("[0, 10]"));
    }

    // ==========================================================================
    // Split sizes and validation
    // ==========================================================================

    #[test]
    fn test_split_size_validate() {
        assert!(SplitSize::Fraction(0.5).validate().is_ok());
        assert!(SplitSize::Count(3).validate().is_ok());
        assert!(matches!(
            SplitSize::Fraction(1.0).validate(),
            Err(ConfigError::InvalidSizeFraction(_))
        ));
        assert!(SplitSize::Fraction(0.0).validate().is_err());
        assert!(matches!(
            SplitSize::Count(0).validate(),
            Err(ConfigError::EmptyPartition)
        ));
    }

    #[test]
    fn test_split_size_resolve() {
        assert_eq!(SplitSize::Fraction(0.75).resolve(8), 6);
        assert_eq!(SplitSize::Count(5).resolve(3), 3);
    }

    #[test]
    fn test_validate_reports_before_running() {
        let config = ExperimentConfig {
            features_size: FeatureBudget::Count(30),
            ..ExperimentConfig::default()
        };
        assert!(config.validate(20).is_err());
        assert_eq!(config.validate(30).unwrap(), 30);

        let config = ExperimentConfig {
            iterations: 0,
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            config.validate(20),
            Err(ConfigError::InvalidIterations(0))
        ));

        let config = ExperimentConfig {
            test_size: Some(SplitSize::Fraction(2.0)),
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            config.validate(20),
            Err(ConfigError::InvalidSizeFraction(_))
        ));
    }

    // ==========================================================================
    // Random source
    // ==========================================================================

    #[test]
    fn test_random_source_parsing() {
        assert_eq!(RandomSource::from_str("42").unwrap(), RandomSource::Seeded(42));
        assert_eq!(RandomSource::from_str("entropy").unwrap(), RandomSource::Entropy);
        assert_eq!(RandomSource::from_str("TRUE").unwrap(), RandomSource::Entropy);
        assert_eq!(RandomSource::from_str("fixed").unwrap(), RandomSource::Fixed);
        assert_eq!(RandomSource::from_str("none").unwrap(), RandomSource::Fixed);
        assert!(matches!(
            RandomSource::from_str("mersenne"),
            Err(ConfigError::UnsupportedRandomSource(_))
        ));
    }

    #[test]
    fn test_random_source_yaml_flags() {
        let config = ExperimentConfig::from_yaml("random_state: false").unwrap();
        assert_eq!(config.random_state, RandomSource::Fixed);
        let config = ExperimentConfig::from_yaml("random_state: true").unwrap();
        assert_eq!(config.random_state, RandomSource::Entropy);
    }

    #[test]
    fn test_random_source_error_bars() {
        assert!(RandomSource::Entropy.use_error_bars());
        assert!(RandomSource::Seeded(7).use_error_bars());
        assert!(!RandomSource::Fixed.use_error_bars());
    }
}
