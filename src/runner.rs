//! Shuffle-split experiment driver.
//!
//! Each iteration partitions the dataset with its own pre-assigned seed,
//! normalizes the training partition, ranks and thresholds features on it,
//! reduces both partitions, normalizes the test partition with the training
//! parameters and hands both to the predictor. Iterations share nothing but
//! read-only access to the source dataset, so they can also run on a rayon
//! pool.

use crate::config::{ConfigError, ExperimentConfig, FeatureBudget, RandomSource};
use crate::dataset::{FeatureDataset, FeatureRanker, Predictor};
use crate::experiment::{ExperimentResult, StatsError};
use crate::prediction::{BatchResult, BatchSummary, PredictionKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Per-split seeds are drawn from `[0, SEED_LIMIT)`
const SEED_LIMIT: u64 = u32::MAX as u64;

/// Pipeline stage of one shuffle split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Split,
    Normalize,
    Rank,
    Reduce,
    Predict,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Split => write!(f, "split"),
            Self::Normalize => write!(f, "normalize"),
            Self::Rank => write!(f, "feature ranking"),
            Self::Reduce => write!(f, "feature reduction"),
            Self::Predict => write!(f, "prediction"),
        }
    }
}

/// Errors that can occur while running a shuffle-split experiment
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Split {split_index} failed during {stage}: {source}")]
    Collaborator {
        split_index: usize,
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("Feature-count grid search requires categorical ground truth")]
    NotCategorical,

    #[error("Empty feature-count grid: {start}..{stop} step {step}")]
    EmptyGrid {
        start: usize,
        stop: usize,
        step: usize,
    },

    #[error("Aggregation failed: {0}")]
    Stats(#[from] StatsError),
}

/// Outcome of [`ShuffleSplitRunner::feature_grid_search`]
#[derive(Debug)]
pub struct GridSearchResult {
    /// Feature count of the most accurate experiment (first on ties)
    pub best_feature_count: usize,
    /// Experiment at that feature count, statistics already generated
    pub best: ExperimentResult,
    /// Accuracy of every feature count tried
    pub accuracy_by_feature_count: BTreeMap<usize, f64>,
}

/// One seed per shuffle split.
///
/// Seeded sources reproduce the same list on every call; every entry of a
/// list is distinct. `Fixed` yields `None` everywhere, i.e. no shuffling.
#[must_use]
pub fn derive_split_seeds(source: RandomSource, iterations: usize) -> Vec<Option<u64>> {
    let mut rng = match source {
        RandomSource::Entropy => ChaCha8Rng::from_entropy(),
        RandomSource::Seeded(seed) => ChaCha8Rng::seed_from_u64(seed),
        RandomSource::Fixed => return vec![None; iterations],
    };

    let mut seen = HashSet::with_capacity(iterations);
    let mut seeds = Vec::with_capacity(iterations);
    while seeds.len() < iterations {
        let seed = rng.gen_range(0..SEED_LIMIT);
        if seen.insert(seed) {
            seeds.push(Some(seed));
        }
    }
    seeds
}

/// Repeated randomized train/test evaluation of one dataset
#[derive(Debug, Clone)]
pub struct ShuffleSplitRunner<R, P> {
    config: ExperimentConfig,
    ranker: R,
    predictor: P,
}

impl<R, P> ShuffleSplitRunner<R, P> {
    /// Create a runner; the configuration is validated when a run starts
    #[must_use]
    pub const fn new(config: ExperimentConfig, ranker: R, predictor: P) -> Self {
        Self {
            config,
            ranker,
            predictor,
        }
    }

    /// Get current configuration
    #[must_use]
    pub const fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Run every iteration in order on the calling thread
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Config` before any split executes if the
    /// configuration does not fit the dataset, or the first collaborator
    /// failure otherwise.
    pub fn run<D>(&self, dataset: &D) -> Result<ExperimentResult, RunnerError>
    where
        D: FeatureDataset,
        R: FeatureRanker<D>,
        P: Predictor<D>,
    {
        let top_k = self.config.validate(dataset.num_features())?;
        self.run_sequential(dataset, top_k)
    }

    /// Run the iterations on the rayon pool.
    ///
    /// Seeds are assigned before dispatch, so the result matches [`run`]
    /// for a seeded configuration.
    ///
    /// # Errors
    ///
    /// Same as [`ShuffleSplitRunner::run`].
    ///
    /// [`run`]: ShuffleSplitRunner::run
    pub fn run_parallel<D>(&self, dataset: &D) -> Result<ExperimentResult, RunnerError>
    where
        D: FeatureDataset + Sync,
        R: FeatureRanker<D> + Sync,
        P: Predictor<D> + Sync,
    {
        let top_k = self.config.validate(dataset.num_features())?;
        let seeds = derive_split_seeds(self.config.random_state, self.config.iterations);
        tracing::info!(
            iterations = seeds.len(),
            features = top_k,
            threads = rayon::current_num_threads(),
            "Starting parallel shuffle-split experiment"
        );

        let batches = seeds
            .par_iter()
            .enumerate()
            .map(|(split_index, seed)| self.run_split(dataset, split_index, *seed, top_k))
            .collect::<Result<Vec<_>, RunnerError>>()?;

        Ok(self.assemble(dataset, batches))
    }

    /// Run a full experiment for every feature count in `start..stop` by
    /// `step` and keep the most accurate one.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::NotCategorical` for continuous data,
    /// `RunnerError::EmptyGrid` when the range selects nothing, a
    /// configuration error for counts beyond the feature space, or the first
    /// run or aggregation failure.
    pub fn feature_grid_search<D>(
        &self,
        dataset: &D,
        start: usize,
        stop: usize,
        step: usize,
    ) -> Result<GridSearchResult, RunnerError>
    where
        D: FeatureDataset,
        R: FeatureRanker<D>,
        P: Predictor<D>,
    {
        if !dataset.is_discrete() {
            return Err(RunnerError::NotCategorical);
        }
        if step == 0 || start >= stop {
            return Err(RunnerError::EmptyGrid { start, stop, step });
        }
        self.config.validate(dataset.num_features())?;

        let grid = (start..stop)
            .step_by(step)
            .map(|count| FeatureBudget::Count(count).resolve(dataset.num_features()))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut accuracy_by_feature_count = BTreeMap::new();
        let mut best: Option<(usize, f64, ExperimentResult)> = None;

        for feature_count in grid {
            let mut experiment = self.run_sequential(dataset, feature_count)?;
            let accuracy = match experiment.generate_stats()?.as_classification() {
                Some(stats) => stats.accuracy,
                None => return Err(RunnerError::NotCategorical),
            };
            tracing::info!(feature_count, accuracy, "Grid search point");
            accuracy_by_feature_count.insert(feature_count, accuracy);

            if best.as_ref().map_or(true, |(_, a, _)| accuracy > *a) {
                best = Some((feature_count, accuracy, experiment));
            }
        }

        let (best_feature_count, _, best) = best.ok_or(RunnerError::EmptyGrid { start, stop, step })?;
        Ok(GridSearchResult {
            best_feature_count,
            best,
            accuracy_by_feature_count,
        })
    }

    fn run_sequential<D>(&self, dataset: &D, top_k: usize) -> Result<ExperimentResult, RunnerError>
    where
        D: FeatureDataset,
        R: FeatureRanker<D>,
        P: Predictor<D>,
    {
        let seeds = derive_split_seeds(self.config.random_state, self.config.iterations);
        tracing::info!(
            iterations = seeds.len(),
            features = top_k,
            random_state = %self.config.random_state,
            "Starting shuffle-split experiment"
        );

        let batches = seeds
            .iter()
            .enumerate()
            .map(|(split_index, seed)| self.run_split(dataset, split_index, *seed, top_k))
            .collect::<Result<Vec<_>, RunnerError>>()?;

        Ok(self.assemble(dataset, batches))
    }

    fn assemble<D: FeatureDataset>(&self, dataset: &D, batches: Vec<BatchResult>) -> ExperimentResult {
        let kind = if dataset.is_discrete() {
            PredictionKind::Classification
        } else {
            PredictionKind::Regression
        };
        let class_names = dataset.class_names().to_vec();
        let mut experiment = ExperimentResult::new(kind, class_names.clone(), class_names)
            .with_error_bars(self.config.random_state.use_error_bars());
        if let Some(name) = &self.config.name {
            experiment = experiment.with_name(name.clone());
        }
        for batch in batches {
            experiment.push_batch(batch);
        }
        experiment
    }

    fn run_split<D>(
        &self,
        dataset: &D,
        split_index: usize,
        seed: Option<u64>,
        top_k: usize,
    ) -> Result<BatchResult, RunnerError>
    where
        D: FeatureDataset,
        R: FeatureRanker<D>,
        P: Predictor<D>,
    {
        let failed = move |stage: Stage| {
            move |source: anyhow::Error| RunnerError::Collaborator {
                split_index,
                stage,
                source,
            }
        };

        let (mut train, test) = dataset
            .split(self.config.train_size, self.config.test_size, seed)
            .map_err(failed(Stage::Split))?;
        train.normalize(None).map_err(failed(Stage::Normalize))?;

        let weights = self
            .ranker
            .rank(&train)
            .map_err(failed(Stage::Rank))?
            .threshold(top_k);

        let train = train.feature_reduce(&weights).map_err(failed(Stage::Reduce))?;
        let mut test = test.feature_reduce(&weights).map_err(failed(Stage::Reduce))?;
        test.normalize(Some(&train)).map_err(failed(Stage::Normalize))?;

        let mut batch = self
            .predictor
            .predict(&train, &test, &weights, split_index)
            .map_err(failed(Stage::Predict))?
            .with_split_index(split_index);
        if batch.feature_weights().is_none() {
            batch = batch.with_feature_weights(weights);
        }

        match batch.generate_stats() {
            Ok(BatchSummary::Classification(summary)) => tracing::info!(
                split = split_index,
                seed = ?seed,
                features = top_k,
                train = train.num_samples(),
                test = test.num_samples(),
                accuracy = ?summary.accuracy,
                "Shuffle split complete"
            ),
            Ok(BatchSummary::Regression(summary)) => tracing::info!(
                split = split_index,
                seed = ?seed,
                features = top_k,
                train = train.num_samples(),
                test = test.num_samples(),
                std_err = ?summary.std_err,
                "Shuffle split complete"
            ),
            Err(e) => tracing::warn!(split = split_index, error = %e, "Batch summary failed"),
        }

        Ok(batch)
    }
}
