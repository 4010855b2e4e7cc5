//! Classification statistics across shuffle splits.
//!
//! Matrices are assembled by walking the declared class-name lists (test
//! classes as rows, training classes as columns), never by iterating a
//! per-batch map, so cell order and presence do not depend on which classes a
//! particular split happened to see.

use crate::experiment::{ensure_kind, ExperimentStatistics, StatsError};
use crate::matrix::ClassMatrix;
use crate::prediction::{BatchResult, BatchSummary, PredictionKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// 97.5% quantile of the standard normal distribution
pub const Z_95: f64 = 1.959_96;

/// `Z_95` squared, as used by the Wilson score interval
pub const Z_95_SQUARED: f64 = 3.841_44;

/// Minimum expected successes and failures for the normal approximation
const NORMAL_APPROXIMATION_MIN: f64 = 5.0;

/// Which binomial interval was used
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    /// Normal approximation of the binomial distribution
    NormalApproximation,
    /// Wilson score interval (small-sample correction)
    WilsonScore,
}

impl fmt::Display for IntervalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NormalApproximation => write!(f, "normal approx. interval"),
            Self::WilsonScore => write!(f, "Wilson score interval"),
        }
    }
}

/// 95% confidence interval on classification accuracy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccuracyInterval {
    /// Interval construction used
    pub method: IntervalMethod,
    /// Uncorrected `num_correct / num_classifications`
    pub raw_accuracy: f64,
    /// Interval centre (Wilson-corrected for the Wilson branch)
    pub accuracy: f64,
    /// Half-width of the interval
    pub half_width: f64,
}

impl AccuracyInterval {
    /// Lower bound of the interval
    #[must_use]
    pub fn lower(&self) -> f64 {
        self.accuracy - self.half_width
    }

    /// Upper bound of the interval
    #[must_use]
    pub fn upper(&self) -> f64 {
        self.accuracy + self.half_width
    }
}

/// 95% confidence interval for an accuracy measured over `num_classifications`
/// independent trials.
///
/// Uses the normal approximation when both expected successes and failures
/// exceed 5, the Wilson score interval otherwise.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::suboptimal_flops)]
pub fn confidence_interval(num_classifications: u64, accuracy: f64) -> AccuracyInterval {
    let n = num_classifications as f64;

    if n * accuracy > NORMAL_APPROXIMATION_MIN && n * (1.0 - accuracy) > NORMAL_APPROXIMATION_MIN
    {
        let std_error_of_mean = (accuracy * (1.0 - accuracy) / n).sqrt();
        return AccuracyInterval {
            method: IntervalMethod::NormalApproximation,
            raw_accuracy: accuracy,
            accuracy,
            half_width: Z_95 * std_error_of_mean,
        };
    }

    // tends to 1 as n grows
    let coeff = 1.0 / (1.0 + Z_95_SQUARED / n);
    let corrected = coeff * (accuracy + Z_95_SQUARED / (2.0 * n));
    let half_width = coeff
        * Z_95
        * (accuracy * (1.0 - accuracy) / n + Z_95_SQUARED / (4.0 * n * n)).sqrt();

    AccuracyInterval {
        method: IntervalMethod::WilsonScore,
        raw_accuracy: accuracy,
        accuracy: corrected,
        half_width,
    }
}

/// Outcome of the similarity-matrix computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum SimilarityMatrix {
    /// Training and test class sets differ
    NotApplicable,
    /// Probability matrix rows scaled so the diagonal is 1.0
    Computed(ClassMatrix<f64>),
    /// The named class has zero average probability for itself
    Degenerate(String),
}

/// Aggregate statistics of a classification experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationStatistics {
    /// Ground truth / prediction / feature-weight aggregation
    pub base: ExperimentStatistics,
    /// Summed counts by (ground-truth, predicted) class
    pub confusion_matrix: ClassMatrix<u64>,
    /// Per-batch class probability matrices averaged over batches
    pub average_class_probability_matrix: ClassMatrix<f64>,
    /// Probability matrix normalised by its diagonal
    pub similarity: SimilarityMatrix,
    /// Total scored classifications (sum of all confusion cells)
    pub num_classifications: u64,
    /// Total correct classifications (diagonal cells)
    pub num_correct: u64,
    /// Scored classifications per ground-truth class
    pub num_classifications_per_class: IndexMap<String, u64>,
    /// Correct classifications per ground-truth class
    pub num_correct_per_class: IndexMap<String, u64>,
    /// `num_correct / num_classifications`
    pub accuracy: f64,
    /// 95% interval, absent when iterations are not independent
    pub confidence_interval: Option<AccuracyInterval>,
}

impl ClassificationStatistics {
    /// Aggregate classification batches.
    ///
    /// `training_class_names` fixes the column order and `test_class_names`
    /// the row order of every matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no batches, a batch is not a
    /// classification, a batch summary fails, or no sample carries both a
    /// ground-truth and a predicted class.
    #[allow(clippy::cast_precision_loss)]
    pub fn generate(
        batches: &mut [BatchResult],
        training_class_names: &[String],
        test_class_names: &[String],
        use_error_bars: bool,
    ) -> Result<Self, StatsError> {
        ensure_kind(batches, PredictionKind::Classification)?;
        let base = ExperimentStatistics::generate(batches)?;

        let mut confusion_matrix = ClassMatrix::zeros(test_class_names, training_class_names);
        let mut probability_matrix: ClassMatrix<f64> =
            ClassMatrix::zeros(test_class_names, training_class_names);
        let mut per_class: IndexMap<String, u64> =
            test_class_names.iter().map(|c| (c.clone(), 0)).collect();
        let mut correct_per_class = per_class.clone();
        let mut num_correct = 0_u64;
        let mut batch_scored = 0_u64;

        for batch in batches.iter_mut() {
            let BatchSummary::Classification(summary) = batch.generate_stats()? else {
                continue;
            };
            batch_scored += summary.num_classifications;

            for truth in test_class_names {
                for predicted in training_class_names {
                    let count = summary.confusion_matrix.get(truth, predicted).unwrap_or(0);
                    confusion_matrix.add(truth, predicted, count);
                    if let Some(total) = per_class.get_mut(truth) {
                        *total += count;
                    }
                    if truth == predicted {
                        num_correct += count;
                        if let Some(total) = correct_per_class.get_mut(truth) {
                            *total += count;
                        }
                    }

                    let probability = summary
                        .class_probability_matrix
                        .get(truth, predicted)
                        .unwrap_or(0.0);
                    probability_matrix.add(truth, predicted, probability);
                }
            }
        }

        // Assumes every batch classified the same number of samples
        let num_batches = batches.len() as f64;
        for truth in test_class_names {
            if let Some(row) = probability_matrix.row_mut(truth) {
                for cell in row {
                    *cell /= num_batches;
                }
            }
        }

        let num_classifications = confusion_matrix.total();
        if num_classifications != batch_scored {
            tracing::warn!(
                aggregated = num_classifications,
                scored = batch_scored,
                "Batch classifications fall outside the experiment's class lists"
            );
        }
        if num_classifications == 0 {
            return Err(StatsError::NoScoredClassifications);
        }

        let accuracy = num_correct as f64 / num_classifications as f64;
        let similarity =
            similarity_matrix(&probability_matrix, training_class_names, test_class_names);
        let interval = use_error_bars.then(|| confidence_interval(num_classifications, accuracy));

        tracing::info!(
            batches = batches.len(),
            num_classifications,
            num_correct,
            accuracy,
            "Aggregated classification statistics"
        );

        Ok(Self {
            base,
            confusion_matrix,
            average_class_probability_matrix: probability_matrix,
            similarity,
            num_classifications,
            num_correct,
            num_classifications_per_class: per_class,
            num_correct_per_class: correct_per_class,
            accuracy,
            confidence_interval: interval,
        })
    }

    /// The similarity matrix, or why it is unavailable
    ///
    /// # Errors
    ///
    /// Returns `StatsError::ClassSetsDiffer` when training and test classes
    /// differ and `StatsError::ZeroSimilarityDiagonal` when a diagonal entry
    /// of the probability matrix is zero.
    pub fn similarity_matrix(&self) -> Result<&ClassMatrix<f64>, StatsError> {
        match &self.similarity {
            SimilarityMatrix::Computed(matrix) => Ok(matrix),
            SimilarityMatrix::NotApplicable => Err(StatsError::ClassSetsDiffer),
            SimilarityMatrix::Degenerate(class) => {
                Err(StatsError::ZeroSimilarityDiagonal(class.clone()))
            }
        }
    }

    /// Accuracy of one ground-truth class, `None` if it was never scored
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn class_accuracy(&self, class: &str) -> Option<f64> {
        let total = *self.num_classifications_per_class.get(class)?;
        let correct = *self.num_correct_per_class.get(class)?;
        (total > 0).then(|| correct as f64 / total as f64)
    }
}

#[allow(clippy::float_cmp)]
fn similarity_matrix(
    probabilities: &ClassMatrix<f64>,
    training_class_names: &[String],
    test_class_names: &[String],
) -> SimilarityMatrix {
    let training: HashSet<&String> = training_class_names.iter().collect();
    let test: HashSet<&String> = test_class_names.iter().collect();
    if training != test {
        return SimilarityMatrix::NotApplicable;
    }

    let mut similarity = probabilities.clone();
    for class in test_class_names {
        let denom = probabilities.get(class, class).unwrap_or(0.0);
        if denom == 0.0 {
            return SimilarityMatrix::Degenerate(class.clone());
        }
        if let Some(row) = similarity.row_mut(class) {
            for cell in row {
                *cell /= denom;
            }
        }
    }
    SimilarityMatrix::Computed(similarity)
}
