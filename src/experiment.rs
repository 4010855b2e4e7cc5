//! Experiment container and base aggregation across shuffle splits.
//!
//! An [`ExperimentResult`] owns every [`BatchResult`] of one experiment. Its
//! aggregate statistics start out absent, are produced by
//! [`ExperimentResult::generate_stats`], and are dropped whenever the batch
//! list changes.

use crate::classification::ClassificationStatistics;
use crate::per_sample::PerSampleReport;
use crate::prediction::{BatchResult, PredictionKind};
use crate::regression::RegressionStatistics;
use crate::weights::{aggregate_feature_weights, FeatureWeightStatistic};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while aggregating batch results
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("No batch results to analyze")]
    NoBatches,

    #[error("No sample carries both a ground-truth and a predicted class")]
    NoScoredClassifications,

    #[error("Batch results carry no numeric ground truth")]
    MissingGroundTruth,

    #[error("Sample {0} has no predicted value")]
    MissingPrediction(String),

    #[error("Ground truth ({ground_truth} values) and predictions ({predicted} values) do not pair up")]
    LengthMismatch { ground_truth: usize, predicted: usize },

    #[error("Sample {sample_id} names class {class} outside the declared class lists")]
    UnknownClass { sample_id: String, class: String },

    #[error("Sample {sample_id} has {found} marginal probabilities, expected {expected}")]
    ProbabilityLengthMismatch {
        sample_id: String,
        expected: usize,
        found: usize,
    },

    #[error("Similarity matrix undefined: average probability of class {0} for itself is zero")]
    ZeroSimilarityDiagonal(String),

    #[error("Similarity matrix requires identical training and test class sets")]
    ClassSetsDiffer,

    #[error("Expected {expected} batch results, found {found} in split {split_index}")]
    WrongKind {
        expected: PredictionKind,
        found: PredictionKind,
        split_index: usize,
    },

    #[error("Need at least {needed} paired values, found {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("Cannot regress on ground truth with zero variance")]
    ZeroVariance,
}

/// Figures shared by classification and regression experiments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatistics {
    /// Number of batches aggregated
    pub num_batches: usize,
    /// Total number of sample predictions across batches
    pub num_classifications: usize,
    /// Numeric ground truth of every labeled sample, in batch order
    pub ground_truth_values: Vec<f64>,
    /// Prediction paired with each entry of `ground_truth_values`
    pub predicted_values: Vec<f64>,
    /// Ranked feature-weight statistics
    pub feature_weight_statistics: Vec<FeatureWeightStatistic>,
}

impl ExperimentStatistics {
    /// Aggregate ground truth, predictions and feature weights over all batches.
    ///
    /// Computes the summary of every batch that has not computed it yet;
    /// already cached summaries are reused untouched.
    ///
    /// # Errors
    ///
    /// Returns the first batch summary error encountered, or
    /// `StatsError::MissingPrediction` for a labeled regression sample
    /// without a predicted value.
    pub fn generate(batches: &mut [BatchResult]) -> Result<Self, StatsError> {
        let mut num_classifications = 0;
        let mut ground_truth_values = Vec::new();
        let mut predicted_values = Vec::new();

        for batch in batches.iter_mut() {
            batch.generate_stats()?;
            num_classifications += batch.len();
            if batch.kind() == PredictionKind::Regression {
                let (ground_truth, predicted) = batch.paired_values()?;
                ground_truth_values.extend(ground_truth);
                predicted_values.extend(predicted);
            }
        }

        let feature_weight_statistics =
            aggregate_feature_weights(batches.iter().map(BatchResult::feature_weights));

        Ok(Self {
            num_batches: batches.len(),
            num_classifications,
            ground_truth_values,
            predicted_values,
            feature_weight_statistics,
        })
    }
}

/// Aggregate statistics of a finished experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateStatistics {
    Classification(ClassificationStatistics),
    Regression(RegressionStatistics),
}

impl AggregateStatistics {
    /// Base figures common to both kinds
    #[must_use]
    pub const fn base(&self) -> &ExperimentStatistics {
        match self {
            Self::Classification(stats) => &stats.base,
            Self::Regression(stats) => &stats.base,
        }
    }

    /// Classification statistics, if this is a classification experiment
    #[must_use]
    pub const fn as_classification(&self) -> Option<&ClassificationStatistics> {
        match self {
            Self::Classification(stats) => Some(stats),
            Self::Regression(_) => None,
        }
    }

    /// Regression statistics, if this is a regression experiment
    #[must_use]
    pub const fn as_regression(&self) -> Option<&RegressionStatistics> {
        match self {
            Self::Regression(stats) => Some(stats),
            Self::Classification(_) => None,
        }
    }
}

/// All batch results of one shuffle-split experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    #[serde(default)]
    name: Option<String>,
    kind: PredictionKind,
    training_class_names: Vec<String>,
    test_class_names: Vec<String>,
    #[serde(default = "default_use_error_bars")]
    use_error_bars: bool,
    #[serde(default)]
    batches: Vec<BatchResult>,
    #[serde(skip)]
    statistics: Option<AggregateStatistics>,
}

const fn default_use_error_bars() -> bool {
    true
}

impl ExperimentResult {
    /// Create an empty experiment
    #[must_use]
    pub const fn new(
        kind: PredictionKind,
        training_class_names: Vec<String>,
        test_class_names: Vec<String>,
    ) -> Self {
        Self {
            name: None,
            kind,
            training_class_names,
            test_class_names,
            use_error_bars: true,
            batches: Vec::new(),
            statistics: None,
        }
    }

    /// Set the experiment name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable confidence intervals (disable when iterations reuse
    /// the same split and are not independent samples)
    #[must_use]
    pub fn with_error_bars(mut self, use_error_bars: bool) -> Self {
        self.use_error_bars = use_error_bars;
        self.statistics = None;
        self
    }

    /// Append a batch; invalidates any previously generated statistics
    pub fn push_batch(&mut self, batch: BatchResult) {
        self.batches.push(batch);
        self.statistics = None;
    }

    /// Experiment name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Categorical or continuous
    #[must_use]
    pub const fn kind(&self) -> PredictionKind {
        self.kind
    }

    /// Training class names in declared order
    #[must_use]
    pub fn training_class_names(&self) -> &[String] {
        &self.training_class_names
    }

    /// Test class names in declared order
    #[must_use]
    pub fn test_class_names(&self) -> &[String] {
        &self.test_class_names
    }

    /// Whether confidence intervals are reported
    #[must_use]
    pub const fn use_error_bars(&self) -> bool {
        self.use_error_bars
    }

    /// Batch results in split order
    #[must_use]
    pub fn batches(&self) -> &[BatchResult] {
        &self.batches
    }

    /// Number of batches
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Check if no batches have been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Statistics from the last `generate_stats`, if still valid
    #[must_use]
    pub const fn statistics(&self) -> Option<&AggregateStatistics> {
        self.statistics.as_ref()
    }

    /// Aggregate ground truth, predictions and feature weights only
    ///
    /// # Errors
    ///
    /// Returns the first batch summary error encountered.
    pub fn base_statistics(&mut self) -> Result<ExperimentStatistics, StatsError> {
        ExperimentStatistics::generate(&mut self.batches)
    }

    /// Compute (or recompute) the aggregate statistics for this experiment
    ///
    /// # Errors
    ///
    /// Returns an error if there are no batches or the batches cannot be
    /// aggregated; see [`StatsError`].
    pub fn generate_stats(&mut self) -> Result<&AggregateStatistics, StatsError> {
        let statistics = match self.kind {
            PredictionKind::Classification => {
                AggregateStatistics::Classification(ClassificationStatistics::generate(
                    &mut self.batches,
                    &self.training_class_names,
                    &self.test_class_names,
                    self.use_error_bars,
                )?)
            }
            PredictionKind::Regression => {
                AggregateStatistics::Regression(RegressionStatistics::generate(&mut self.batches)?)
            }
        };
        Ok(self.statistics.insert(statistics))
    }

    /// Re-key every prediction by sample identity
    ///
    /// # Errors
    ///
    /// Returns `StatsError::NoBatches` if no batch has been recorded.
    pub fn per_sample_statistics(&self) -> Result<PerSampleReport, StatsError> {
        PerSampleReport::aggregate(self.kind, &self.batches)
    }
}

/// Reject batches of the wrong kind before aggregating
pub(crate) fn ensure_kind(
    batches: &[BatchResult],
    expected: PredictionKind,
) -> Result<(), StatsError> {
    if batches.is_empty() {
        return Err(StatsError::NoBatches);
    }
    match batches.iter().find(|b| b.kind() != expected) {
        Some(batch) => Err(StatsError::WrongKind {
            expected,
            found: batch.kind(),
            split_index: batch.split_index(),
        }),
        None => Ok(()),
    }
}
