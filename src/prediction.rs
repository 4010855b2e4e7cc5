//! Per-sample predictions and per-split batch results.
//!
//! A [`BatchResult`] is what the classifier/regressor collaborator hands back
//! for one shuffle split. Its own summary (confusion matrix and accuracy, or
//! RMS error) is computed on first request and cached from then on.

use crate::experiment::StatsError;
use crate::matrix::ClassMatrix;
use crate::weights::FeatureWeights;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether predictions are categorical or continuous
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    /// Class-name ground truth and predictions
    Classification,
    /// Numeric ground truth and predictions
    Regression,
}

impl fmt::Display for PredictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification => write!(f, "classification"),
            Self::Regression => write!(f, "regression"),
        }
    }
}

/// One classified or regressed sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePrediction {
    /// Stable sample identity (e.g. source path)
    pub sample_id: String,
    /// Index of the split that produced this prediction
    pub split_index: usize,
    /// Ground-truth class, absent for unlabeled test samples
    #[serde(default)]
    pub ground_truth_class: Option<String>,
    /// Ground-truth numeric value
    #[serde(default)]
    pub ground_truth_value: Option<f64>,
    /// Predicted class
    #[serde(default)]
    pub predicted_class: Option<String>,
    /// Predicted numeric value
    #[serde(default)]
    pub predicted_value: Option<f64>,
    /// Marginal probabilities aligned with the training class order
    #[serde(default)]
    pub marginal_probabilities: Vec<f64>,
    /// Classifier normalization factor
    #[serde(default)]
    pub normalization_factor: Option<f64>,
}

impl SamplePrediction {
    /// Create an empty prediction for a sample in a split
    #[must_use]
    pub fn new(sample_id: impl Into<String>, split_index: usize) -> Self {
        Self {
            sample_id: sample_id.into(),
            split_index,
            ground_truth_class: None,
            ground_truth_value: None,
            predicted_class: None,
            predicted_value: None,
            marginal_probabilities: Vec::new(),
            normalization_factor: None,
        }
    }

    /// Set the ground-truth class
    #[must_use]
    pub fn with_ground_truth_class(mut self, class: impl Into<String>) -> Self {
        self.ground_truth_class = Some(class.into());
        self
    }

    /// Set the ground-truth value
    #[must_use]
    pub const fn with_ground_truth_value(mut self, value: f64) -> Self {
        self.ground_truth_value = Some(value);
        self
    }

    /// Set the predicted class
    #[must_use]
    pub fn with_predicted_class(mut self, class: impl Into<String>) -> Self {
        self.predicted_class = Some(class.into());
        self
    }

    /// Set the predicted value
    #[must_use]
    pub const fn with_predicted_value(mut self, value: f64) -> Self {
        self.predicted_value = Some(value);
        self
    }

    /// Set the marginal probabilities
    #[must_use]
    pub fn with_marginal_probabilities(mut self, probabilities: Vec<f64>) -> Self {
        self.marginal_probabilities = probabilities;
        self
    }

    /// Set the normalization factor
    #[must_use]
    pub const fn with_normalization_factor(mut self, factor: f64) -> Self {
        self.normalization_factor = Some(factor);
        self
    }

    /// Whether predicted and ground-truth classes agree; `None` without both
    #[must_use]
    pub fn is_correct(&self) -> Option<bool> {
        match (&self.ground_truth_class, &self.predicted_class) {
            (Some(truth), Some(predicted)) => Some(truth == predicted),
            _ => None,
        }
    }
}

/// Summary of a classification split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSummary {
    /// Counts by (ground-truth, predicted) class
    pub confusion_matrix: ClassMatrix<u64>,
    /// Mean marginal probability by (ground-truth, predicted) class
    pub class_probability_matrix: ClassMatrix<f64>,
    /// Samples carrying both a ground-truth and a predicted class
    pub num_classifications: u64,
    /// Correctly classified samples
    pub num_correct: u64,
    /// `num_correct / num_classifications`, absent without ground truth
    pub accuracy: Option<f64>,
}

/// Summary of a regression split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionSummary {
    /// Number of (ground truth, predicted) pairs
    pub num_classifications: usize,
    /// Root mean squared residual, absent without ground truth
    pub std_err: Option<f64>,
}

/// Per-split figures of merit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchSummary {
    Classification(ClassificationSummary),
    Regression(RegressionSummary),
}

/// Outcome of one shuffle split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    split_index: usize,
    kind: PredictionKind,
    training_class_names: Vec<String>,
    test_class_names: Vec<String>,
    predictions: Vec<SamplePrediction>,
    #[serde(default)]
    feature_weights: Option<FeatureWeights>,
    #[serde(default)]
    confusion_matrix: Option<ClassMatrix<u64>>,
    #[serde(default)]
    class_probability_matrix: Option<ClassMatrix<f64>>,
    /// `None` until the first `generate_stats`, then fixed
    #[serde(skip)]
    summary: Option<BatchSummary>,
}

impl BatchResult {
    /// Create a batch from the collaborator's predictions
    #[must_use]
    pub fn new(
        split_index: usize,
        kind: PredictionKind,
        training_class_names: Vec<String>,
        test_class_names: Vec<String>,
        predictions: Vec<SamplePrediction>,
    ) -> Self {
        Self {
            split_index,
            kind,
            training_class_names,
            test_class_names,
            predictions,
            feature_weights: None,
            confusion_matrix: None,
            class_probability_matrix: None,
            summary: None,
        }
    }

    /// Attach the feature weights used for this split
    #[must_use]
    pub fn with_feature_weights(mut self, weights: FeatureWeights) -> Self {
        self.feature_weights = Some(weights);
        self
    }

    /// Supply a confusion matrix instead of deriving one from the samples
    #[must_use]
    pub fn with_confusion_matrix(mut self, matrix: ClassMatrix<u64>) -> Self {
        self.confusion_matrix = Some(matrix);
        self.summary = None;
        self
    }

    /// Supply a class probability matrix instead of deriving one from the samples
    #[must_use]
    pub fn with_class_probability_matrix(mut self, matrix: ClassMatrix<f64>) -> Self {
        self.class_probability_matrix = Some(matrix);
        self.summary = None;
        self
    }

    /// Re-label the batch with the split that produced it
    #[must_use]
    pub fn with_split_index(mut self, split_index: usize) -> Self {
        self.split_index = split_index;
        for prediction in &mut self.predictions {
            prediction.split_index = split_index;
        }
        self
    }

    /// Split index
    #[must_use]
    pub const fn split_index(&self) -> usize {
        self.split_index
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

    /// Per-sample predictions
    #[must_use]
    pub fn predictions(&self) -> &[SamplePrediction] {
        &self.predictions
    }

    /// Feature weights used for this split
    #[must_use]
    pub const fn feature_weights(&self) -> Option<&FeatureWeights> {
        self.feature_weights.as_ref()
    }

    /// Number of predictions
    #[must_use]
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    /// Check if the batch holds no predictions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// `(ground truth, prediction)` of every labeled sample, in sample order.
    ///
    /// Samples without numeric ground truth are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StatsError::MissingPrediction` for a labeled sample that has
    /// no predicted value.
    pub fn paired_values(&self) -> Result<(Vec<f64>, Vec<f64>), StatsError> {
        let mut ground_truth = Vec::with_capacity(self.predictions.len());
        let mut predicted = Vec::with_capacity(self.predictions.len());
        for prediction in &self.predictions {
            let Some(truth) = prediction.ground_truth_value else {
                continue;
            };
            let value = prediction
                .predicted_value
                .ok_or_else(|| StatsError::MissingPrediction(prediction.sample_id.clone()))?;
            ground_truth.push(truth);
            predicted.push(value);
        }
        Ok((ground_truth, predicted))
    }

    /// Cached summary, `None` until [`BatchResult::generate_stats`] has run
    #[must_use]
    pub const fn summary(&self) -> Option<&BatchSummary> {
        self.summary.as_ref()
    }

    /// Compute the split summary once and return the cached value afterwards
    ///
    /// # Errors
    ///
    /// Returns an error if a sample names a class outside the declared class
    /// lists, carries a probability vector of the wrong length, or numeric
    /// ground truth and predictions do not pair up.
    pub fn generate_stats(&mut self) -> Result<&BatchSummary, StatsError> {
        let summary = match self.summary.take() {
            Some(summary) => summary,
            None => {
                let summary = match self.kind {
                    PredictionKind::Classification => {
                        BatchSummary::Classification(self.classification_summary()?)
                    }
                    PredictionKind::Regression => {
                        BatchSummary::Regression(self.regression_summary()?)
                    }
                };
                tracing::debug!(split = self.split_index, kind = %self.kind, "Computed batch summary");
                summary
            }
        };
        Ok(self.summary.insert(summary))
    }

    fn classification_summary(&self) -> Result<ClassificationSummary, StatsError> {
        let confusion_matrix = match &self.confusion_matrix {
            Some(matrix) => matrix.clone(),
            None => self.derive_confusion_matrix()?,
        };
        let class_probability_matrix = match &self.class_probability_matrix {
            Some(matrix) => matrix.clone(),
            None => self.derive_class_probability_matrix()?,
        };

        let num_classifications = confusion_matrix.total();
        let num_correct = confusion_matrix.matching_total();
        #[allow(clippy::cast_precision_loss)]
        let accuracy =
            (num_classifications > 0).then(|| num_correct as f64 / num_classifications as f64);

        Ok(ClassificationSummary {
            confusion_matrix,
            class_probability_matrix,
            num_classifications,
            num_correct,
            accuracy,
        })
    }

    fn derive_confusion_matrix(&self) -> Result<ClassMatrix<u64>, StatsError> {
        let mut matrix = ClassMatrix::zeros(&self.test_class_names, &self.training_class_names);
        for prediction in &self.predictions {
            let (Some(truth), Some(predicted)) =
                (&prediction.ground_truth_class, &prediction.predicted_class)
            else {
                continue;
            };
            if !matrix.add(truth, predicted, 1) {
                let class = if self.test_class_names.contains(truth) {
                    predicted
                } else {
                    truth
                };
                return Err(StatsError::UnknownClass {
                    sample_id: prediction.sample_id.clone(),
                    class: class.clone(),
                });
            }
        }
        Ok(matrix)
    }

    #[allow(clippy::cast_precision_loss)]
    fn derive_class_probability_matrix(&self) -> Result<ClassMatrix<f64>, StatsError> {
        let mut matrix: ClassMatrix<f64> =
            ClassMatrix::zeros(&self.test_class_names, &self.training_class_names);
        let expected = self.training_class_names.len();

        for truth in &self.test_class_names {
            let mut totals = vec![0.0; expected];
            let mut count = 0_usize;
            for prediction in &self.predictions {
                if prediction.ground_truth_class.as_ref() != Some(truth)
                    || prediction.marginal_probabilities.is_empty()
                {
                    continue;
                }
                if prediction.marginal_probabilities.len() != expected {
                    return Err(StatsError::ProbabilityLengthMismatch {
                        sample_id: prediction.sample_id.clone(),
                        expected,
                        found: prediction.marginal_probabilities.len(),
                    });
                }
                for (total, p) in totals.iter_mut().zip(&prediction.marginal_probabilities) {
                    *total += p;
                }
                count += 1;
            }
            if count == 0 {
                continue;
            }
            if let Some(row) = matrix.row_mut(truth) {
                for (cell, total) in row.iter_mut().zip(totals) {
                    *cell = total / count as f64;
                }
            }
        }
        Ok(matrix)
    }

    fn regression_summary(&self) -> Result<RegressionSummary, StatsError> {
        let (ground_truth, predicted) = self.paired_values()?;
        let std_err = if ground_truth.is_empty() {
            None
        } else {
            Some(rms_error(&ground_truth, &predicted, self.len())?)
        };
        Ok(RegressionSummary {
            num_classifications: self.len(),
            std_err,
        })
    }
}

/// Root mean squared residual between paired ground truth and predictions.
///
/// The squared residuals of the pairs are divided by `num_classifications`,
/// the number of samples classified, unlabeled ones included. The divisor
/// never drops below the number of pairs.
///
/// # Errors
///
/// Returns `StatsError::LengthMismatch` if the sequences differ in length and
/// `StatsError::MissingGroundTruth` if they are empty.
#[allow(clippy::cast_precision_loss)]
pub fn rms_error(
    ground_truth: &[f64],
    predicted: &[f64],
    num_classifications: usize,
) -> Result<f64, StatsError> {
    if ground_truth.len() != predicted.len() {
        return Err(StatsError::LengthMismatch {
            ground_truth: ground_truth.len(),
            predicted: predicted.len(),
        });
    }
    if ground_truth.is_empty() {
        return Err(StatsError::MissingGroundTruth);
    }
    let err_sum: f64 = ground_truth
        .iter()
        .zip(predicted)
        .map(|(gt, pv)| (gt - pv).powi(2))
        .sum();
    let divisor = num_classifications.max(ground_truth.len());
    Ok((err_sum / divisor as f64).sqrt())
}
