//! # Shuffle-Split Eval
//!
//! Repeated randomized train/test evaluation of feature-space classifiers and
//! regressors, and aggregation of the per-split results into experiment-level
//! figures of merit.
//!
//! ## Architecture
//!
//! ```text
//! FeatureDataset
//!        ↓
//! ShuffleSplitRunner (split → normalize → rank → reduce → predict) × N
//!        ↓
//! BatchResult × N
//!        ↓
//! ExperimentStatistics
//!        ├── ClassificationStatistics (confusion / similarity matrices, accuracy ± CI)
//!        └── RegressionStatistics (RMS error, Pearson, Spearman)
//!        ↓
//! PerSampleReport / ExperimentReport
//! ```
//!
//! Matrices are always built by walking the declared class-name lists, so
//! every (ground truth, predicted) cell exists even when no split produced
//! it. Feature weights missing from a split count as zero in the mean.

pub mod classification;
pub mod config;
pub mod dataset;
pub mod experiment;
pub mod matrix;
pub mod metrics;
pub mod per_sample;
pub mod prediction;
pub mod regression;
pub mod report;
pub mod runner;
pub mod weights;

pub use classification::{
    confidence_interval, AccuracyInterval, ClassificationStatistics, IntervalMethod,
    SimilarityMatrix,
};
pub use config::{ConfigError, ExperimentConfig, FeatureBudget, RandomSource, SplitSize};
pub use dataset::{
    AutoRanker, DatasetError, FeatureDataset, FeatureRanker, FisherScore, InMemoryDataset,
    Normalization, PearsonScore, Predictor, Targets,
};
pub use experiment::{AggregateStatistics, ExperimentResult, ExperimentStatistics, StatsError};
pub use matrix::ClassMatrix;
pub use per_sample::{PerSampleReport, SampleStatistics, SampleSummary};
pub use prediction::{
    rms_error, BatchResult, BatchSummary, ClassificationSummary, PredictionKind,
    RegressionSummary, SamplePrediction,
};
pub use regression::{
    linear_regression, spearman, PearsonCorrelation, RegressionStatistics, SpearmanCorrelation,
};
pub use report::{ExperimentReport, ReportMetadata};
pub use runner::{derive_split_seeds, GridSearchResult, RunnerError, ShuffleSplitRunner, Stage};
pub use weights::{aggregate_feature_weights, FeatureWeightStatistic, FeatureWeights};
