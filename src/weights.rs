//! Feature weights and their aggregation across shuffle splits.

use crate::metrics::{compute_mean, compute_population_std, min_max};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Ordered mapping from feature name to importance score.
///
/// Insertion order is the ranked order for the split that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureWeights {
    weights: IndexMap<String, f64>,
}

impl FeatureWeights {
    /// Create an empty weight set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feature; an existing name keeps its position and takes the new value
    pub fn insert(&mut self, name: impl Into<String>, weight: f64) {
        self.weights.insert(name.into(), weight);
    }

    /// Weight of one feature
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }

    /// Number of weighted features
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Check if no features are weighted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Iterate `(name, weight)` in ranked order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(name, w)| (name.as_str(), *w))
    }

    /// Feature names in ranked order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.weights.keys().map(String::as_str)
    }

    /// Keep the `top_k` heaviest features, sorted by descending weight.
    /// Equal weights keep their original relative order.
    #[must_use]
    pub fn threshold(&self, top_k: usize) -> Self {
        let mut ranked: Vec<(&String, &f64)> = self.weights.iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(Ordering::Equal));
        ranked
            .into_iter()
            .take(top_k)
            .map(|(name, w)| (name.clone(), *w))
            .collect()
    }
}

impl FromIterator<(String, f64)> for FeatureWeights {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            weights: iter.into_iter().collect(),
        }
    }
}

/// Aggregate importance of one feature across all splits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeightStatistic {
    /// Feature name
    pub name: String,
    /// Mean over every split, counting 0 for splits that did not select the feature
    pub mean: f64,
    /// Number of splits that selected the feature
    pub count: usize,
    /// Population standard deviation over the selecting splits only
    pub std_dev: f64,
    /// Smallest weight among the selecting splits
    pub min: f64,
    /// Largest weight among the selecting splits
    pub max: f64,
}

/// Merge per-split feature weights into ranked statistics.
///
/// `per_split` yields one entry per split, `None` for splits that carried no
/// weights. A feature selected in few splits has its mean pulled towards zero
/// because the mean is taken over all splits. The result is sorted by
/// descending mean; ties keep discovery order.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_feature_weights<'a, I>(per_split: I) -> Vec<FeatureWeightStatistic>
where
    I: IntoIterator<Item = Option<&'a FeatureWeights>>,
{
    let mut num_splits = 0_usize;
    let mut collected: IndexMap<&'a str, Vec<f64>> = IndexMap::new();

    for weights in per_split {
        num_splits += 1;
        let Some(weights) = weights else { continue };
        for (name, weight) in weights.iter() {
            collected.entry(name).or_default().push(weight);
        }
    }

    let mut stats: Vec<FeatureWeightStatistic> = collected
        .into_iter()
        .filter_map(|(name, values)| {
            let (min, max) = min_max(&values)?;
            let mut padded = values.clone();
            padded.resize(num_splits.max(values.len()), 0.0);
            Some(FeatureWeightStatistic {
                name: name.to_string(),
                mean: compute_mean(&padded),
                count: values.len(),
                std_dev: compute_population_std(&values),
                min,
                max,
            })
        })
        .collect();

    stats.sort_by(|a, b| b.mean.partial_cmp(&a.mean).unwrap_or(Ordering::Equal));
    stats
}
