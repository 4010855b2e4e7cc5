//! Collaborator seams for the shuffle-split runner.
//!
//! The runner never touches feature values itself. It drives a
//! [`FeatureDataset`] through split, normalize and feature-reduce, asks a
//! [`FeatureRanker`] for weights and hands the prepared partitions to a
//! [`Predictor`]. [`InMemoryDataset`] and the rankers here are small dense
//! reference implementations of those seams.

use crate::config::SplitSize;
use crate::prediction::BatchResult;
use crate::regression::linear_regression;
use crate::weights::FeatureWeights;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper end of the normalized feature range
pub const NORMALIZED_MAX: f64 = 100.0;

/// Default share of the smallest class (or all samples) used for training
const DEFAULT_TRAIN_FRACTION: f64 = 0.75;

/// A feature matrix that can be partitioned, normalized and reduced
pub trait FeatureDataset: Sized {
    /// Class names in declared order (empty for continuous data)
    fn class_names(&self) -> &[String];

    /// Feature names in column order
    fn feature_names(&self) -> &[String];

    /// Number of feature columns
    fn num_features(&self) -> usize {
        self.feature_names().len()
    }

    /// Number of samples
    fn num_samples(&self) -> usize;

    /// Categorical (`true`) or continuous ground truth
    fn is_discrete(&self) -> bool;

    /// Partition into (train, test); `seed = None` yields the unshuffled split
    ///
    /// # Errors
    ///
    /// Returns an error if the requested sizes cannot be satisfied.
    fn split(
        &self,
        train_size: Option<SplitSize>,
        test_size: Option<SplitSize>,
        seed: Option<u64>,
    ) -> anyhow::Result<(Self, Self)>;

    /// Normalize in place, with own statistics or those recorded on `reference`
    ///
    /// # Errors
    ///
    /// Returns an error if `reference` has not been normalized or has a
    /// different feature layout.
    fn normalize(&mut self, reference: Option<&Self>) -> anyhow::Result<()>;

    /// Copy of the dataset restricted to the weighted features, in weight order
    ///
    /// # Errors
    ///
    /// Returns an error if a weighted feature does not exist.
    fn feature_reduce(&self, weights: &FeatureWeights) -> anyhow::Result<Self>;
}

/// Scores every feature of a (normalized, training) dataset
pub trait FeatureRanker<D> {
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be ranked by this method.
    fn rank(&self, dataset: &D) -> anyhow::Result<FeatureWeights>;
}

/// Classifier or regressor producing one split's predictions
pub trait Predictor<D> {
    /// # Errors
    ///
    /// Returns an error if the model cannot be trained or applied.
    fn predict(
        &self,
        train: &D,
        test: &D,
        weights: &FeatureWeights,
        split_index: usize,
    ) -> anyhow::Result<BatchResult>;
}

/// Errors from the in-memory reference dataset
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("Sample {sample} has {found} features, expected {expected}")]
    ShapeMismatch {
        sample: String,
        expected: usize,
        found: usize,
    },

    #[error("{samples} samples but {targets} targets")]
    TargetCountMismatch { samples: usize, targets: usize },

    #[error("Class label {0} is out of range")]
    UnknownLabel(usize),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Cannot take {train} training and {test} test samples from {available}")]
    NotEnoughSamples {
        train: usize,
        test: usize,
        available: usize,
    },

    #[error("Reference dataset carries no normalization parameters")]
    NotNormalized,

    #[error("Reference normalization covers {reference} features, dataset has {found}")]
    FeatureLayoutMismatch { reference: usize, found: usize },

    #[error("{0} ranking requires {1} ground truth")]
    WrongTargetKind(&'static str, &'static str),
}

/// Ground truth of an [`InMemoryDataset`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Targets {
    /// Index into the class-name list, one per sample
    Classes {
        class_names: Vec<String>,
        labels: Vec<usize>,
    },
    /// Continuous value, one per sample
    Values(Vec<f64>),
}

impl Targets {
    fn len(&self) -> usize {
        match self {
            Self::Classes { labels, .. } => labels.len(),
            Self::Values(values) => values.len(),
        }
    }

    fn select(&self, rows: &[usize]) -> Self {
        match self {
            Self::Classes {
                class_names,
                labels,
            } => Self::Classes {
                class_names: class_names.clone(),
                labels: rows.iter().map(|&r| labels[r]).collect(),
            },
            Self::Values(values) => Self::Values(rows.iter().map(|&r| values[r]).collect()),
        }
    }
}

/// Per-feature min/max recorded by [`FeatureDataset::normalize`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mins: Vec<f64>,
    pub maxs: Vec<f64>,
}

impl Normalization {
    fn fit(data: &[Vec<f64>], num_features: usize) -> Self {
        let mut mins = vec![f64::INFINITY; num_features];
        let mut maxs = vec![f64::NEG_INFINITY; num_features];
        for row in data {
            for (j, &value) in row.iter().enumerate() {
                mins[j] = mins[j].min(value);
                maxs[j] = maxs[j].max(value);
            }
        }
        // an empty dataset normalizes onto a zero-width range
        for (lo, hi) in mins.iter_mut().zip(maxs.iter_mut()) {
            if !lo.is_finite() || !hi.is_finite() {
                *lo = 0.0;
                *hi = 0.0;
            }
        }
        Self { mins, maxs }
    }

    fn apply(&self, value: f64, feature: usize) -> f64 {
        let (lo, hi) = (self.mins[feature], self.maxs[feature]);
        if hi <= lo {
            return 0.0;
        }
        (value.clamp(lo, hi) - lo) / (hi - lo) * NORMALIZED_MAX
    }

    fn select(&self, columns: &[usize]) -> Self {
        Self {
            mins: columns.iter().map(|&c| self.mins[c]).collect(),
            maxs: columns.iter().map(|&c| self.maxs[c]).collect(),
        }
    }
}

/// Dense row-major feature matrix held in memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InMemoryDataset {
    sample_names: Vec<String>,
    feature_names: Vec<String>,
    data: Vec<Vec<f64>>,
    targets: Targets,
    #[serde(default)]
    normalization: Option<Normalization>,
}

impl InMemoryDataset {
    /// Create a dataset with categorical ground truth
    ///
    /// # Errors
    ///
    /// Returns an error if rows, names and labels disagree in size or a
    /// label indexes past `class_names`.
    pub fn discrete(
        sample_names: Vec<String>,
        feature_names: Vec<String>,
        data: Vec<Vec<f64>>,
        class_names: Vec<String>,
        labels: Vec<usize>,
    ) -> Result<Self, DatasetError> {
        if let Some(&bad) = labels.iter().find(|&&l| l >= class_names.len()) {
            return Err(DatasetError::UnknownLabel(bad));
        }
        Self::build(
            sample_names,
            feature_names,
            data,
            Targets::Classes {
                class_names,
                labels,
            },
        )
    }

    /// Create a dataset with continuous ground truth
    ///
    /// # Errors
    ///
    /// Returns an error if rows, names and values disagree in size.
    pub fn continuous(
        sample_names: Vec<String>,
        feature_names: Vec<String>,
        data: Vec<Vec<f64>>,
        values: Vec<f64>,
    ) -> Result<Self, DatasetError> {
        Self::build(sample_names, feature_names, data, Targets::Values(values))
    }

    fn build(
        sample_names: Vec<String>,
        feature_names: Vec<String>,
        data: Vec<Vec<f64>>,
        targets: Targets,
    ) -> Result<Self, DatasetError> {
        if sample_names.len() != data.len() || targets.len() != data.len() {
            return Err(DatasetError::TargetCountMismatch {
                samples: data.len(),
                targets: targets.len().min(sample_names.len()),
            });
        }
        for (name, row) in sample_names.iter().zip(&data) {
            if row.len() != feature_names.len() {
                return Err(DatasetError::ShapeMismatch {
                    sample: name.clone(),
                    expected: feature_names.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self {
            sample_names,
            feature_names,
            data,
            targets,
            normalization: None,
        })
    }

    #[must_use]
    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    /// Feature vector of every sample, row-major
    #[must_use]
    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    #[must_use]
    pub const fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Parameters from the last [`FeatureDataset::normalize`]
    #[must_use]
    pub const fn normalization(&self) -> Option<&Normalization> {
        self.normalization.as_ref()
    }

    /// Class name of one sample, `None` for continuous data
    #[must_use]
    pub fn class_of(&self, sample: usize) -> Option<&str> {
        match &self.targets {
            Targets::Classes {
                class_names,
                labels,
            } => labels
                .get(sample)
                .and_then(|&l| class_names.get(l))
                .map(String::as_str),
            Targets::Values(_) => None,
        }
    }

    /// Target value of one sample, `None` for categorical data
    #[must_use]
    pub fn value_of(&self, sample: usize) -> Option<f64> {
        match &self.targets {
            Targets::Values(values) => values.get(sample).copied(),
            Targets::Classes { .. } => None,
        }
    }

    /// One feature column
    #[must_use]
    pub fn column(&self, feature: usize) -> Vec<f64> {
        self.data.iter().map(|row| row[feature]).collect()
    }

    fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            sample_names: rows.iter().map(|&r| self.sample_names[r].clone()).collect(),
            feature_names: self.feature_names.clone(),
            data: rows.iter().map(|&r| self.data[r].clone()).collect(),
            targets: self.targets.select(rows),
            normalization: self.normalization.clone(),
        }
    }
}

/// Train and test counts out of `available` samples
fn partition_sizes(
    train_size: Option<SplitSize>,
    test_size: Option<SplitSize>,
    available: usize,
) -> Result<(usize, usize), DatasetError> {
    let default_train = SplitSize::Fraction(DEFAULT_TRAIN_FRACTION).resolve(available);
    let (train, test) = match (train_size, test_size) {
        (Some(train), Some(test)) => (train.resolve(available), test.resolve(available)),
        (Some(train), None) => {
            let train = train.resolve(available);
            (train, available.saturating_sub(train))
        }
        (None, Some(test)) => {
            let test = test.resolve(available);
            (available.saturating_sub(test), test)
        }
        (None, None) => (default_train, available - default_train),
    };
    if train == 0 || test == 0 || train + test > available {
        return Err(DatasetError::NotEnoughSamples {
            train,
            test,
            available,
        });
    }
    Ok((train, test))
}

impl FeatureDataset for InMemoryDataset {
    fn class_names(&self) -> &[String] {
        match &self.targets {
            Targets::Classes { class_names, .. } => class_names,
            Targets::Values(_) => &[],
        }
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn num_samples(&self) -> usize {
        self.data.len()
    }

    fn is_discrete(&self) -> bool {
        matches!(self.targets, Targets::Classes { .. })
    }

    /// Categorical data is split per class: every class contributes the same
    /// number of training and test samples, sized against the smallest class.
    fn split(
        &self,
        train_size: Option<SplitSize>,
        test_size: Option<SplitSize>,
        seed: Option<u64>,
    ) -> anyhow::Result<(Self, Self)> {
        let mut rng = seed.map(ChaCha8Rng::seed_from_u64);

        let groups: Vec<Vec<usize>> = match &self.targets {
            Targets::Classes {
                class_names,
                labels,
            } => (0..class_names.len())
                .map(|class| {
                    (0..labels.len())
                        .filter(|&i| labels[i] == class)
                        .collect()
                })
                .collect(),
            Targets::Values(values) => vec![(0..values.len()).collect()],
        };

        let available = groups.iter().map(Vec::len).min().unwrap_or(0);
        let (train_count, test_count) = partition_sizes(train_size, test_size, available)?;

        let mut train_rows = Vec::new();
        let mut test_rows = Vec::new();
        for mut group in groups {
            if let Some(rng) = rng.as_mut() {
                group.shuffle(rng);
            }
            train_rows.extend_from_slice(&group[..train_count]);
            test_rows.extend_from_slice(&group[train_count..train_count + test_count]);
        }

        Ok((self.select_rows(&train_rows), self.select_rows(&test_rows)))
    }

    fn normalize(&mut self, reference: Option<&Self>) -> anyhow::Result<()> {
        let params = match reference {
            Some(reference) => {
                let params = reference
                    .normalization
                    .clone()
                    .ok_or(DatasetError::NotNormalized)?;
                if params.mins.len() != self.feature_names.len() {
                    return Err(DatasetError::FeatureLayoutMismatch {
                        reference: params.mins.len(),
                        found: self.feature_names.len(),
                    }
                    .into());
                }
                params
            }
            None => Normalization::fit(&self.data, self.feature_names.len()),
        };

        for row in &mut self.data {
            for (j, value) in row.iter_mut().enumerate() {
                *value = params.apply(*value, j);
            }
        }
        self.normalization = Some(params);
        Ok(())
    }

    fn feature_reduce(&self, weights: &FeatureWeights) -> anyhow::Result<Self> {
        let columns = weights
            .names()
            .map(|name| {
                self.feature_names
                    .iter()
                    .position(|f| f == name)
                    .ok_or_else(|| DatasetError::UnknownFeature(name.to_string()))
            })
            .collect::<Result<Vec<usize>, DatasetError>>()?;

        Ok(Self {
            sample_names: self.sample_names.clone(),
            feature_names: columns
                .iter()
                .map(|&c| self.feature_names[c].clone())
                .collect(),
            data: self
                .data
                .iter()
                .map(|row| columns.iter().map(|&c| row[c]).collect())
                .collect(),
            targets: self.targets.clone(),
            normalization: self.normalization.as_ref().map(|n| n.select(&columns)),
        })
    }
}

/// Fisher discriminant score for categorical data
#[derive(Debug, Clone, Copy, Default)]
pub struct FisherScore;

impl FeatureRanker<InMemoryDataset> for FisherScore {
    /// Variance of the class means over the mean within-class variance
    #[allow(clippy::cast_precision_loss)]
    fn rank(&self, dataset: &InMemoryDataset) -> anyhow::Result<FeatureWeights> {
        let Targets::Classes {
            class_names,
            labels,
        } = dataset.targets()
        else {
            return Err(DatasetError::WrongTargetKind("Fisher score", "categorical").into());
        };

        let mut weights = FeatureWeights::new();
        for (j, name) in dataset.feature_names().iter().enumerate() {
            let column = dataset.column(j);
            let mut class_means = Vec::with_capacity(class_names.len());
            let mut class_variances = Vec::with_capacity(class_names.len());
            for class in 0..class_names.len() {
                let values: Vec<f64> = column
                    .iter()
                    .zip(labels)
                    .filter(|&(_, &l)| l == class)
                    .map(|(&v, _)| v)
                    .collect();
                if values.is_empty() {
                    continue;
                }
                class_means.push(crate::metrics::compute_mean(&values));
                class_variances.push(crate::metrics::compute_population_std(&values).powi(2));
            }

            let score = if class_means.len() < 2 {
                0.0
            } else {
                let grand_mean = crate::metrics::compute_mean(&class_means);
                let between = class_means
                    .iter()
                    .map(|m| (m - grand_mean).powi(2))
                    .sum::<f64>()
                    / (class_means.len() - 1) as f64;
                let within = crate::metrics::compute_mean(&class_variances);
                if within > 0.0 {
                    between / within
                } else {
                    0.0
                }
            };
            weights.insert(name.clone(), score);
        }
        Ok(weights)
    }
}

/// Squared Pearson correlation with a continuous target
#[derive(Debug, Clone, Copy, Default)]
pub struct PearsonScore;

impl FeatureRanker<InMemoryDataset> for PearsonScore {
    fn rank(&self, dataset: &InMemoryDataset) -> anyhow::Result<FeatureWeights> {
        let Targets::Values(values) = dataset.targets() else {
            return Err(DatasetError::WrongTargetKind("Pearson score", "continuous").into());
        };

        Ok(dataset
            .feature_names()
            .iter()
            .enumerate()
            .map(|(j, name)| {
                // constant features carry no signal
                let score = linear_regression(&dataset.column(j), values)
                    .map_or(0.0, |fit| fit.coefficient.powi(2));
                (name.clone(), score)
            })
            .collect())
    }
}

/// Fisher score for categorical data, Pearson score for continuous data
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoRanker;

impl FeatureRanker<InMemoryDataset> for AutoRanker {
    fn rank(&self, dataset: &InMemoryDataset) -> anyhow::Result<FeatureWeights> {
        if dataset.is_discrete() {
            FisherScore.rank(dataset)
        } else {
            PearsonScore.rank(dataset)
        }
    }
}
