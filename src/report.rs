//! Report generation for aggregated experiment statistics.
//!
//! Renders the figures of merit of one experiment:
//! - accuracy with its confidence interval
//! - confusion, similarity and average class probability matrices
//! - ranked feature weights
//! - RMS error and correlation coefficients for regression
//!
//! The report is plain data; markdown and JSON are the only renderings.

use crate::classification::{ClassificationStatistics, IntervalMethod};
use crate::experiment::{AggregateStatistics, ExperimentResult, StatsError};
use crate::matrix::ClassMatrix;
use crate::per_sample::{PerSampleReport, SampleSummary};
use crate::prediction::PredictionKind;
use crate::regression::RegressionStatistics;
use crate::weights::FeatureWeightStatistic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use tabled::builder::Builder;
use tabled::{Table, Tabled};

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Experiment name
    pub title: String,
    /// Report generation timestamp
    pub generated_at: DateTime<Utc>,
    /// Framework version
    pub framework_version: String,
}

/// Aggregate statistics of one experiment, ready for rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Categorical or continuous
    pub kind: PredictionKind,
    /// Number of shuffle splits
    pub num_batches: usize,
    /// Whether a confidence interval is reported
    pub use_error_bars: bool,
    /// Number of feature-weight rows to render (0 renders none)
    pub display: usize,
    /// Aggregate statistics
    pub statistics: AggregateStatistics,
    /// Per-sample consistency, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_sample: Option<PerSampleReport>,
}

/// Table row for the feature-weight ranking
#[derive(Tabled)]
struct FeatureWeightRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "StdDev")]
    std_dev: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl ExperimentReport {
    /// Generate the experiment's statistics and wrap them in a report
    ///
    /// # Errors
    ///
    /// Returns an error if the statistics cannot be generated.
    pub fn from_experiment(
        experiment: &mut ExperimentResult,
        display: usize,
    ) -> Result<Self, StatsError> {
        let statistics = experiment.generate_stats()?.clone();
        Ok(Self {
            metadata: ReportMetadata {
                title: experiment.name().unwrap_or("unnamed experiment").to_string(),
                generated_at: Utc::now(),
                framework_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            kind: experiment.kind(),
            num_batches: experiment.len(),
            use_error_bars: experiment.use_error_bars(),
            display,
            statistics,
            per_sample: None,
        })
    }

    /// Attach per-sample statistics
    #[must_use]
    pub fn with_per_sample(mut self, report: PerSampleReport) -> Self {
        self.per_sample = Some(report);
        self
    }

    /// Render report as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render report as markdown
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        writeln!(
            output,
            "# {} ({} iterations)",
            self.metadata.title, self.num_batches
        )
        .ok();
        writeln!(output).ok();
        writeln!(
            output,
            "**Generated:** {}",
            self.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .ok();
        writeln!(
            output,
            "**Framework Version:** {}",
            self.metadata.framework_version
        )
        .ok();
        writeln!(output).ok();

        match &self.statistics {
            AggregateStatistics::Classification(stats) => {
                self.write_classification(&mut output, stats);
            }
            AggregateStatistics::Regression(stats) => write_regression(&mut output, stats),
        }

        if self.display > 0 {
            let weights = &self.statistics.base().feature_weight_statistics;
            writeln!(
                output,
                "## Feature Weight Analysis (top {} features)",
                self.display.min(weights.len())
            )
            .ok();
            writeln!(output).ok();
            writeln!(output, "{}", feature_weight_table(weights, self.display)).ok();
            writeln!(output).ok();
        }

        if let Some(per_sample) = &self.per_sample {
            output.push_str(&per_sample_markdown(per_sample));
        }

        output
    }

    fn write_classification(&self, output: &mut String, stats: &ClassificationStatistics) {
        writeln!(output, "## Accuracy").ok();
        writeln!(output).ok();
        writeln!(output, "{}", accuracy_line(stats, self.use_error_bars)).ok();
        writeln!(output).ok();

        writeln!(output, "## Confusion Matrix").ok();
        writeln!(output).ok();
        writeln!(
            output,
            "{}",
            matrix_table(&stats.confusion_matrix, |count| count.to_string())
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "## Similarity Matrix").ok();
        writeln!(output).ok();
        match stats.similarity_matrix() {
            Ok(similarity) => {
                writeln!(output, "{}", matrix_table(similarity, |v| format!("{v:.4}"))).ok();
            }
            Err(e) => {
                writeln!(output, "_{e}_").ok();
            }
        }
        writeln!(output).ok();

        writeln!(output, "## Average Class Probability Matrix").ok();
        writeln!(output).ok();
        writeln!(
            output,
            "{}",
            matrix_table(&stats.average_class_probability_matrix, |v| format!("{v:.4}"))
        )
        .ok();
        writeln!(output).ok();
    }
}

/// One-line accuracy summary.
///
/// `n_correct/n correct = acc%`, followed by the 95% interval and its method
/// when error bars are enabled. The Wilson branch reports the raw accuracy
/// and the corrected interval centre separately.
#[must_use]
pub fn accuracy_line(stats: &ClassificationStatistics, use_error_bars: bool) -> String {
    let n = stats.num_classifications;
    let n_correct = stats.num_correct;

    let interval = match (&stats.confidence_interval, use_error_bars) {
        (Some(interval), true) => interval,
        _ => {
            return format!(
                "{n_correct}/{n} correct = {:.2}%",
                stats.accuracy * 100.0
            )
        }
    };

    match interval.method {
        IntervalMethod::NormalApproximation => format!(
            "{n_correct}/{n} correct = {:.2} +/- {:.2}% w/ 95% conf. ({})",
            interval.accuracy * 100.0,
            interval.half_width * 100.0,
            interval.method
        ),
        IntervalMethod::WilsonScore => format!(
            "{n_correct}/{n} correct = {:.1}% raw accuracy ({:.2} +/- {:.2}% w/ 95% conf. ({}))",
            interval.raw_accuracy * 100.0,
            interval.accuracy * 100.0,
            interval.half_width * 100.0,
            interval.method
        ),
    }
}

/// Render a class matrix with ground truth as rows and predictions as columns
#[must_use]
pub fn matrix_table<T, F>(matrix: &ClassMatrix<T>, format_cell: F) -> String
where
    T: Copy + Default,
    F: Fn(T) -> String,
{
    let mut builder = Builder::default();
    let mut header = vec!["Ground truth \\ Predicted".to_string()];
    header.extend(matrix.columns().iter().cloned());
    builder.push_record(header);

    for row in matrix.rows() {
        let mut record = vec![row.clone()];
        if let Some(cells) = matrix.row(row) {
            record.extend(cells.iter().map(|&v| format_cell(v)));
        }
        builder.push_record(record);
    }
    builder.build().to_string()
}

/// Ranked feature weights, top `display` rows
#[must_use]
pub fn feature_weight_table(weights: &[FeatureWeightStatistic], display: usize) -> String {
    let rows: Vec<FeatureWeightRow> = weights
        .iter()
        .take(display)
        .enumerate()
        .map(|(i, w)| FeatureWeightRow {
            rank: i + 1,
            mean: format!("{:.3}", w.mean),
            count: w.count,
            std_dev: format!("{:.3}", w.std_dev),
            min: format!("{:.3}", w.min),
            max: format!("{:.3}", w.max),
            name: w.name.clone(),
        })
        .collect();
    Table::new(rows).to_string()
}

fn write_regression(output: &mut String, stats: &RegressionStatistics) {
    writeln!(output, "## Regression").ok();
    writeln!(output).ok();
    writeln!(output, "| Metric | Value |").ok();
    writeln!(output, "|--------|-------|").ok();
    writeln!(
        output,
        "| Total Classifications | {} |",
        stats.base.num_classifications
    )
    .ok();
    writeln!(output, "| Standard Error | {:.4} |", stats.std_err).ok();
    match &stats.pearson {
        Some(pearson) => {
            writeln!(output, "| Pearson Coefficient | {:.4} |", pearson.coefficient).ok();
            writeln!(output, "| Pearson p-value | {:.4e} |", pearson.p_value).ok();
            writeln!(output, "| Pearson Std. Error | {:.4} |", pearson.std_err).ok();
            writeln!(
                output,
                "| Fit | y = {:.4}x + {:.4} |",
                pearson.slope, pearson.intercept
            )
            .ok();
        }
        None => {
            writeln!(output, "| Pearson Coefficient | n/a |").ok();
        }
    }
    writeln!(
        output,
        "| Spearman Coefficient | {:.4} |",
        stats.spearman.coefficient
    )
    .ok();
    writeln!(output, "| Spearman p-value | {:.4e} |", stats.spearman.p_value).ok();
    writeln!(output).ok();
}

/// Render per-sample statistics as markdown, one section per sample
#[must_use]
pub fn per_sample_markdown(report: &PerSampleReport) -> String {
    let mut output = String::new();
    writeln!(output, "## Per-Sample Statistics ({} samples)", report.len()).ok();
    writeln!(output).ok();

    for sample in &report.samples {
        writeln!(output, "### {}", sample.sample_id).ok();
        writeln!(output).ok();
        let mut builder = Builder::default();
        builder.push_record(
            ["Split", "Ground truth", "Predicted", "Marginal probabilities"].map(String::from),
        );
        for p in &sample.predictions {
            let truth = p
                .ground_truth_class
                .clone()
                .or_else(|| p.ground_truth_value.map(|v| format!("{v:.4}")))
                .unwrap_or_else(|| "-".to_string());
            let predicted = p
                .predicted_class
                .clone()
                .or_else(|| p.predicted_value.map(|v| format!("{v:.4}")))
                .unwrap_or_else(|| "-".to_string());
            builder.push_record([
                p.split_index.to_string(),
                truth,
                predicted,
                join_probabilities(&p.marginal_probabilities),
            ]);
        }
        writeln!(output, "{}", builder.build()).ok();

        match &sample.summary {
            SampleSummary::Classification {
                fraction_correct,
                mean_marginal_probabilities,
                ..
            } => {
                let fraction = fraction_correct
                    .map_or_else(|| "n/a".to_string(), |f| format!("{:.1}%", f * 100.0));
                writeln!(
                    output,
                    "Tested {} times, {fraction} correct, mean probabilities [{}]",
                    sample.times_tested,
                    join_probabilities(mean_marginal_probabilities)
                )
                .ok();
            }
            SampleSummary::Regression {
                min,
                mean,
                max,
                std_dev,
                ..
            } => {
                writeln!(
                    output,
                    "Tested {} times, min {min:.4}, mean {mean:.4}, max {max:.4}, std. dev. {std_dev:.4}",
                    sample.times_tested
                )
                .ok();
            }
        }
        writeln!(output).ok();
    }
    output
}

fn join_probabilities(probabilities: &[f64]) -> String {
    probabilities
        .iter()
        .map(|p| format!("{p:.3}"))
        .collect::<Vec<_>>()
        .join(", ")
}
