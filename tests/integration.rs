//! Integration tests for the shuffle-split-eval CLI and library.
//!
//! These tests verify end-to-end functionality including:
//! - A full shuffle-split run over an in-memory dataset
//! - YAML configuration and JSON batch files on disk
//! - Report rendering and the CLI subcommands

#![allow(clippy::unwrap_used)]
#![allow(clippy::float_cmp)]
#![allow(clippy::cast_precision_loss)]

use shuffle_split_eval::{
    AggregateStatistics, AutoRanker, BatchResult, ClassMatrix, ExperimentConfig, ExperimentReport,
    ExperimentResult, FeatureBudget, FeatureDataset, FeatureWeights, InMemoryDataset,
    PredictionKind, Predictor, RandomSource, SamplePrediction, ShuffleSplitRunner,
};
use std::process::Command;

/// Nearest class centroid over whatever features survived reduction
struct NearestCentroid;

impl Predictor<InMemoryDataset> for NearestCentroid {
    fn predict(
        &self,
        train: &InMemoryDataset,
        test: &InMemoryDataset,
        _weights: &FeatureWeights,
        split_index: usize,
    ) -> anyhow::Result<BatchResult> {
        let classes = train.class_names().to_vec();
        let centroids: Vec<Vec<f64>> = classes
            .iter()
            .map(|class| {
                let rows: Vec<&Vec<f64>> = (0..train.num_samples())
                    .filter(|&i| train.class_of(i) == Some(class.as_str()))
                    .map(|i| &train.data()[i])
                    .collect();
                (0..train.num_features())
                    .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / rows.len() as f64)
                    .collect()
            })
            .collect();

        let predictions = (0..test.num_samples())
            .map(|i| {
                let row = &test.data()[i];
                let scores: Vec<f64> = centroids
                    .iter()
                    .map(|c| {
                        let d: f64 = c.iter().zip(row).map(|(a, b)| (a - b).powi(2)).sum();
                        1.0 / (1.0 + d.sqrt())
                    })
                    .collect();
                let total: f64 = scores.iter().sum();
                let best = scores
                    .iter()
                    .enumerate()
                    .fold(0, |best, (k, s)| if *s > scores[best] { k } else { best });
                SamplePrediction::new(test.sample_names()[i].clone(), split_index)
                    .with_ground_truth_class(test.class_of(i).unwrap_or_default())
                    .with_predicted_class(classes[best].clone())
                    .with_marginal_probabilities(scores.iter().map(|s| s / total).collect())
            })
            .collect();

        Ok(BatchResult::new(
            split_index,
            PredictionKind::Classification,
            classes.clone(),
            test.class_names().to_vec(),
            predictions,
        ))
    }
}

fn two_class_dataset() -> InMemoryDataset {
    let mut data = Vec::new();
    let mut labels = Vec::new();
    for i in 0..20_usize {
        let class = i / 10;
        let jitter = ((i * 3) % 4) as f64 * 0.25;
        data.push(vec![
            class as f64 * 8.0 + jitter,
            ((i * 7) % 9) as f64,
            ((i * 5) % 6) as f64,
        ]);
        labels.push(class);
    }
    InMemoryDataset::discrete(
        (0..20).map(|i| format!("sample{i:02}")).collect(),
        vec!["signal".into(), "noise_a".into(), "noise_b".into()],
        data,
        vec!["healthy".into(), "diseased".into()],
        labels,
    )
    .unwrap()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

/// Two recorded classification batches over classes A and B
fn recorded_experiment() -> ExperimentResult {
    let classes = names(&["A", "B"]);
    let mut experiment =
        ExperimentResult::new(PredictionKind::Classification, classes.clone(), classes.clone())
            .with_name("recorded");

    for split in 0..2 {
        let predictions = vec![
            SamplePrediction::new("s1", split)
                .with_ground_truth_class("A")
                .with_predicted_class("A")
                .with_marginal_probabilities(vec![0.8, 0.2]),
            SamplePrediction::new("s2", split)
                .with_ground_truth_class("B")
                .with_predicted_class(if split == 0 { "B" } else { "A" })
                .with_marginal_probabilities(if split == 0 {
                    vec![0.3, 0.7]
                } else {
                    vec![0.6, 0.4]
                }),
        ];
        let mut weights = FeatureWeights::new();
        weights.insert("texture", 0.9 - split as f64 * 0.1);
        weights.insert("shape", 0.4);
        experiment.push_batch(
            BatchResult::new(
                split,
                PredictionKind::Classification,
                classes.clone(),
                classes.clone(),
                predictions,
            )
            .with_feature_weights(weights),
        );
    }
    experiment
}

// ============================================================================
// Library Pipeline Tests
// ============================================================================

#[test]
fn test_full_pipeline_classification() {
    let dataset = two_class_dataset();
    let config = ExperimentConfig {
        name: Some("pipeline".to_string()),
        iterations: 6,
        features_size: FeatureBudget::Count(1),
        random_state: RandomSource::Seeded(7),
        ..ExperimentConfig::default()
    };
    let runner = ShuffleSplitRunner::new(config, AutoRanker, NearestCentroid);

    let mut experiment = runner.run(&dataset).unwrap();
    assert_eq!(experiment.len(), 6);
    assert!(experiment.use_error_bars());

    let stats = experiment.generate_stats().unwrap();
    let classification = stats.as_classification().unwrap();

    // Default split keeps 8 of 10 per class for training, 2 per class tested
    assert_eq!(classification.num_classifications, 6 * 4);
    assert_eq!(classification.num_correct, 24);
    assert_eq!(classification.accuracy, 1.0);
    assert!(classification.confidence_interval.is_some());

    // The separating feature wins the ranking in every split
    let top = &classification.base.feature_weight_statistics[0];
    assert_eq!(top.name, "signal");
    assert_eq!(top.count, 6);
}

#[test]
fn test_parallel_run_matches_sequential() {
    let dataset = two_class_dataset();
    let config = ExperimentConfig {
        iterations: 4,
        features_size: FeatureBudget::Count(2),
        random_state: RandomSource::Seeded(42),
        ..ExperimentConfig::default()
    };
    let runner = ShuffleSplitRunner::new(config, AutoRanker, NearestCentroid);

    let mut sequential = runner.run(&dataset).unwrap();
    let mut parallel = runner.run_parallel(&dataset).unwrap();

    let a = sequential.generate_stats().unwrap().clone();
    let b = parallel.generate_stats().unwrap().clone();
    assert_eq!(a, b);
}

#[test]
fn test_fixed_random_state_disables_error_bars() {
    let dataset = two_class_dataset();
    let config = ExperimentConfig {
        iterations: 3,
        features_size: FeatureBudget::Count(1),
        random_state: RandomSource::Fixed,
        ..ExperimentConfig::default()
    };
    let runner = ShuffleSplitRunner::new(config, AutoRanker, NearestCentroid);

    let mut experiment = runner.run(&dataset).unwrap();
    assert!(!experiment.use_error_bars());
    let stats = experiment.generate_stats().unwrap();
    assert!(stats.as_classification().unwrap().confidence_interval.is_none());
}

#[test]
fn test_per_sample_after_run() {
    let dataset = two_class_dataset();
    let config = ExperimentConfig {
        iterations: 5,
        features_size: FeatureBudget::Count(1),
        random_state: RandomSource::Seeded(3),
        ..ExperimentConfig::default()
    };
    let runner = ShuffleSplitRunner::new(config, AutoRanker, NearestCentroid);
    let experiment = runner.run(&dataset).unwrap();

    let report = experiment.per_sample_statistics().unwrap();
    let total_tested: usize = report.samples.iter().map(|s| s.times_tested).sum();
    assert_eq!(total_tested, 5 * 4);
    assert!(report.samples.iter().all(|s| s.times_tested >= 1));
}

// ============================================================================
// Files on Disk
// ============================================================================

#[test]
fn test_yaml_config_from_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("experiment.yaml");
    std::fs::write(
        &path,
        "name: lymphoma\niterations: 20\nfeatures_size: 0.5\ntrain_size: 6\nrandom_state: 1234\n",
    )
    .unwrap();

    let config = ExperimentConfig::load(&path).unwrap();
    assert_eq!(config.name.as_deref(), Some("lymphoma"));
    assert_eq!(config.iterations, 20);
    assert_eq!(config.random_state, RandomSource::Seeded(1234));
    assert_eq!(config.validate(3).unwrap(), 2);
}

#[test]
fn test_experiment_json_roundtrip_through_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("batches.json");

    let mut original = recorded_experiment();
    std::fs::write(&path, serde_json::to_string_pretty(&original).unwrap()).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let mut restored: ExperimentResult = serde_json::from_str(&content).unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(restored.name(), Some("recorded"));

    let a = original.generate_stats().unwrap().clone();
    let b = restored.generate_stats().unwrap().clone();
    assert_eq!(a, b);
}

#[test]
fn test_supplied_confusion_matrix_takes_precedence() {
    let classes = names(&["A", "B"]);
    let mut supplied = ClassMatrix::zeros(&classes, &classes);
    supplied.add("A", "A", 3_u64);
    supplied.add("B", "A", 1_u64);

    let batch = BatchResult::new(
        0,
        PredictionKind::Classification,
        classes.clone(),
        classes.clone(),
        vec![SamplePrediction::new("s1", 0)
            .with_ground_truth_class("A")
            .with_predicted_class("A")
            .with_marginal_probabilities(vec![0.9, 0.1])],
    )
    .with_confusion_matrix(supplied);

    let mut experiment =
        ExperimentResult::new(PredictionKind::Classification, classes.clone(), classes);
    experiment.push_batch(batch);

    let stats = experiment.generate_stats().unwrap();
    let classification = stats.as_classification().unwrap();
    assert_eq!(classification.num_classifications, 4);
    assert_eq!(classification.num_correct, 3);
}

// ============================================================================
// Report Tests
// ============================================================================

#[test]
fn test_report_markdown_and_json() {
    let mut experiment = recorded_experiment();
    let report = ExperimentReport::from_experiment(&mut experiment, 10).unwrap();

    let markdown = report.to_markdown();
    assert!(markdown.contains("recorded"));
    assert!(markdown.contains("3/4 correct"));
    assert!(markdown.contains("texture"));

    let json = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["num_batches"], 2);
    assert!(matches!(
        report.statistics,
        AggregateStatistics::Classification(_)
    ));
}

// ============================================================================
// CLI Integration Tests
// ============================================================================

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_shuffle-split-eval"))
}

#[test]
fn test_cli_help_command() {
    let output = cli().arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("aggregate"), "Help should list aggregate command");
    assert!(stdout.contains("check-config"), "Help should list check-config command");
}

#[test]
fn test_cli_aggregate_markdown() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("batches.json");
    std::fs::write(&path, serde_json::to_string(&recorded_experiment()).unwrap()).unwrap();

    let output = cli()
        .args(["aggregate", "--batches"])
        .arg(&path)
        .args(["--name", "cli-run"])
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("cli-run"));
    assert!(stdout.contains("3/4 correct"));
}

#[test]
fn test_cli_aggregate_json_without_error_bars() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("batches.json");
    std::fs::write(&path, serde_json::to_string(&recorded_experiment()).unwrap()).unwrap();

    let output = cli()
        .args(["aggregate", "--format", "json", "--no-error-bars", "--batches"])
        .arg(&path)
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["use_error_bars"], false);
}

#[test]
fn test_cli_aggregate_missing_file_fails() {
    let output = cli()
        .args(["aggregate", "--batches", "/nonexistent/batches.json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load batch results"));
}

#[test]
fn test_cli_per_sample() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("batches.json");
    std::fs::write(&path, serde_json::to_string(&recorded_experiment()).unwrap()).unwrap();

    let output = cli().args(["per-sample", "--batches"]).arg(&path).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("s1"));
    assert!(stdout.contains("s2"));
}

#[test]
fn test_cli_check_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("experiment.yaml");
    std::fs::write(&path, "iterations: 10\nfeatures_size: 0.25\nrandom_state: fixed\n").unwrap();

    let output = cli()
        .args(["check-config", "--num-features", "40", "--config"])
        .arg(&path)
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Features: 10 of 40"));
    assert!(stdout.contains("Confidence intervals: disabled"));
}

#[test]
fn test_cli_check_config_rejects_oversized_budget() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("experiment.yaml");
    std::fs::write(&path, "features_size: 50\n").unwrap();

    let output = cli()
        .args(["check-config", "--num-features", "10", "--config"])
        .arg(&path)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid configuration"));
}
