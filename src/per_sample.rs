//! Per-sample consistency across shuffle splits.
//!
//! Every prediction of every batch is re-keyed by sample identity, so a
//! sample tested in several splits reports how often it was classified
//! correctly (or how much its predicted value moved).

use crate::experiment::StatsError;
use crate::metrics::{compute_mean, compute_population_std, min_max};
use crate::prediction::{BatchResult, PredictionKind, SamplePrediction};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Consistency figures for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleSummary {
    Classification {
        ground_truth_class: Option<String>,
        /// Fraction of scored evaluations that matched ground truth
        fraction_correct: Option<f64>,
        /// Element-wise mean of the marginal probability vectors
        mean_marginal_probabilities: Vec<f64>,
    },
    Regression {
        ground_truth_value: Option<f64>,
        min: f64,
        mean: f64,
        max: f64,
        /// Population standard deviation of the predicted values
        std_dev: f64,
    },
}

/// Every evaluation of one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleStatistics {
    pub sample_id: String,
    /// Predictions in batch order
    pub predictions: Vec<SamplePrediction>,
    pub times_tested: usize,
    pub summary: SampleSummary,
}

/// Per-sample report, sorted by ground truth then sample identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerSampleReport {
    pub kind: PredictionKind,
    pub samples: Vec<SampleStatistics>,
}

impl PerSampleReport {
    /// Group all predictions of `batches` by sample identity.
    ///
    /// # Errors
    ///
    /// Returns `StatsError::NoBatches` if `batches` is empty and
    /// `StatsError::MissingPrediction` when a regression sample carries no
    /// predicted value.
    pub fn aggregate(kind: PredictionKind, batches: &[BatchResult]) -> Result<Self, StatsError> {
        if batches.is_empty() {
            return Err(StatsError::NoBatches);
        }

        let mut grouped: IndexMap<&str, Vec<&SamplePrediction>> = IndexMap::new();
        for prediction in batches.iter().flat_map(BatchResult::predictions) {
            grouped
                .entry(prediction.sample_id.as_str())
                .or_default()
                .push(prediction);
        }

        let mut samples = grouped
            .into_iter()
            .map(|(sample_id, predictions)| {
                let summary = match kind {
                    PredictionKind::Classification => classification_summary(&predictions),
                    PredictionKind::Regression => regression_summary(sample_id, &predictions)?,
                };
                Ok(SampleStatistics {
                    sample_id: sample_id.to_string(),
                    times_tested: predictions.len(),
                    predictions: predictions.into_iter().cloned().collect(),
                    summary,
                })
            })
            .collect::<Result<Vec<_>, StatsError>>()?;

        samples.sort_by(compare_samples);
        tracing::debug!(samples = samples.len(), %kind, "Aggregated per-sample statistics");

        Ok(Self { kind, samples })
    }

    /// Number of distinct samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if no sample was tested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Look up one sample
    #[must_use]
    pub fn get(&self, sample_id: &str) -> Option<&SampleStatistics> {
        self.samples.iter().find(|s| s.sample_id == sample_id)
    }
}

#[allow(clippy::cast_precision_loss)]
fn classification_summary(predictions: &[&SamplePrediction]) -> SampleSummary {
    let ground_truth_class = predictions
        .iter()
        .find_map(|p| p.ground_truth_class.clone());

    let outcomes: Vec<bool> = predictions.iter().filter_map(|p| p.is_correct()).collect();
    let fraction_correct = (!outcomes.is_empty()).then(|| {
        outcomes.iter().filter(|&&correct| correct).count() as f64 / outcomes.len() as f64
    });

    let width = predictions
        .iter()
        .map(|p| p.marginal_probabilities.len())
        .max()
        .unwrap_or(0);
    let mut mean_marginal_probabilities = vec![0.0; width];
    let with_probabilities: Vec<&[f64]> = predictions
        .iter()
        .map(|p| p.marginal_probabilities.as_slice())
        .filter(|probs| probs.len() == width && width > 0)
        .collect();
    for probs in &with_probabilities {
        for (total, p) in mean_marginal_probabilities.iter_mut().zip(*probs) {
            *total += p;
        }
    }
    if !with_probabilities.is_empty() {
        let count = with_probabilities.len() as f64;
        for total in &mut mean_marginal_probabilities {
            *total /= count;
        }
    }

    SampleSummary::Classification {
        ground_truth_class,
        fraction_correct,
        mean_marginal_probabilities,
    }
}

fn regression_summary(
    sample_id: &str,
    predictions: &[&SamplePrediction],
) -> Result<SampleSummary, StatsError> {
    let values = predictions
        .iter()
        .map(|p| p.predicted_value)
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| StatsError::MissingPrediction(sample_id.to_string()))?;
    let (min, max) =
        min_max(&values).ok_or_else(|| StatsError::MissingPrediction(sample_id.to_string()))?;

    Ok(SampleSummary::Regression {
        ground_truth_value: predictions.iter().find_map(|p| p.ground_truth_value),
        min,
        mean: compute_mean(&values),
        max,
        std_dev: compute_population_std(&values),
    })
}

/// Ground truth first (unlabeled samples last), then sample identity
fn compare_samples(a: &SampleStatistics, b: &SampleStatistics) -> Ordering {
    let by_truth = match (&a.summary, &b.summary) {
        (
            SampleSummary::Classification {
                ground_truth_class: x,
                ..
            },
            SampleSummary::Classification {
                ground_truth_class: y,
                ..
            },
        ) => match (x, y) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        (
            SampleSummary::Regression {
                ground_truth_value: x,
                ..
            },
            SampleSummary::Regression {
                ground_truth_value: y,
                ..
            },
        ) => match (x, y) {
            (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        _ => Ordering::Equal,
    };
    by_truth.then_with(|| a.sample_id.cmp(&b.sample_id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn classes() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    fn classified(split: usize, id: &str, truth: &str, predicted: &str, probs: [f64; 2]) -> SamplePrediction {
        SamplePrediction::new(id, split)
            .with_ground_truth_class(truth)
            .with_predicted_class(predicted)
            .with_marginal_probabilities(probs.to_vec())
    }

    fn classification_batches() -> Vec<BatchResult> {
        vec![
            BatchResult::new(
                0,
                PredictionKind::Classification,
                classes(),
                classes(),
                vec![
                    classified(0, "img_b2", "B", "B", [0.2, 0.8]),
                    classified(0, "img_a1", "A", "A", [0.9, 0.1]),
                ],
            ),
            BatchResult::new(
                1,
                PredictionKind::Classification,
                classes(),
                classes(),
                vec![
                    classified(1, "img_a1", "A", "B", [0.3, 0.7]),
                    classified(1, "img_b1", "B", "B", [0.4, 0.6]),
                ],
            ),
        ]
    }

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn test_groups_by_sample_identity() {
        let report =
            PerSampleReport::aggregate(PredictionKind::Classification, &classification_batches())
                .unwrap();
        assert_eq!(report.len(), 3);

        let a1 = report.get("img_a1").unwrap();
        assert_eq!(a1.times_tested, 2);
        assert_eq!(a1.predictions[0].split_index, 0);
        assert_eq!(a1.predictions[1].split_index, 1);
        let SampleSummary::Classification {
            fraction_correct,
            mean_marginal_probabilities,
            ..
        } = &a1.summary
        else {
            panic!("expected classification summary");
        };
        assert_eq!(*fraction_correct, Some(0.5));
        assert!((mean_marginal_probabilities[0] - 0.6).abs() < 1e-12);
        assert!((mean_marginal_probabilities[1] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_sorted_by_ground_truth_then_identity() {
        let report =
            PerSampleReport::aggregate(PredictionKind::Classification, &classification_batches())
                .unwrap();
        let order: Vec<&str> = report.samples.iter().map(|s| s.sample_id.as_str()).collect();
        assert_eq!(order, vec!["img_a1", "img_b1", "img_b2"]);
    }

    #[test]
    fn test_unlabeled_samples_have_no_fraction() {
        let batches = vec![BatchResult::new(
            0,
            PredictionKind::Classification,
            classes(),
            classes(),
            vec![
                SamplePrediction::new("z", 0).with_predicted_class("A"),
                classified(0, "y", "B", "B", [0.5, 0.5]),
            ],
        )];
        let report = PerSampleReport::aggregate(PredictionKind::Classification, &batches).unwrap();
        assert_eq!(report.samples[0].sample_id, "y");
        let SampleSummary::Classification {
            fraction_correct,
            mean_marginal_probabilities,
            ..
        } = &report.samples[1].summary
        else {
            panic!("expected classification summary");
        };
        assert!(fraction_correct.is_none());
        assert!(mean_marginal_probabilities.is_empty());
    }

    #[test]
    fn test_no_batches_is_an_error() {
        assert_eq!(
            PerSampleReport::aggregate(PredictionKind::Classification, &[]).unwrap_err(),
            StatsError::NoBatches
        );
    }

    // =========================================================================
    // Regression
    // =========================================================================

    fn regressed(split: usize, id: &str, truth: f64, predicted: f64) -> SamplePrediction {
        SamplePrediction::new(id, split)
            .with_ground_truth_value(truth)
            .with_predicted_value(predicted)
    }

    #[test]
    fn test_regression_spread() {
        let batches = vec![
            BatchResult::new(
                0,
                PredictionKind::Regression,
                vec![],
                vec![],
                vec![regressed(0, "s2", 5.0, 4.0), regressed(0, "s1", 9.0, 8.0)],
            ),
            BatchResult::new(
                1,
                PredictionKind::Regression,
                vec![],
                vec![],
                vec![regressed(1, "s2", 5.0, 6.0)],
            ),
        ];
        let report = PerSampleReport::aggregate(PredictionKind::Regression, &batches).unwrap();
        let order: Vec<&str> = report.samples.iter().map(|s| s.sample_id.as_str()).collect();
        assert_eq!(order, vec!["s2", "s1"]);

        let SampleSummary::Regression {
            min, mean, max, std_dev, ..
        } = report.samples[0].summary
        else {
            panic!("expected regression summary");
        };
        assert_eq!((min, mean, max), (4.0, 5.0, 6.0));
        assert!((std_dev - 1.0).abs() < 1e-12);
        assert_eq!(report.samples[0].times_tested, 2);
    }

    #[test]
    fn test_regression_missing_prediction() {
        let batches = vec![BatchResult::new(
            0,
            PredictionKind::Regression,
            vec![],
            vec![],
            vec![SamplePrediction::new("s", 0).with_ground_truth_value(1.0)],
        )];
        assert_eq!(
            PerSampleReport::aggregate(PredictionKind::Regression, &batches).unwrap_err(),
            StatsError::MissingPrediction("s".to_string())
        );
    }
}
