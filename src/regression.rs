//! Regression statistics across shuffle splits.

use crate::experiment::{ensure_kind, ExperimentStatistics, StatsError};
use crate::metrics::{compute_mean, fractional_ranks, min_max, two_sided_t_p_value};
use crate::prediction::{rms_error, BatchResult, PredictionKind};
use serde::{Deserialize, Serialize};

/// Guards the t statistic against division by zero at |r| = 1
const TINY: f64 = 1.0e-20;

/// Least-squares fit of predicted values on ground truth
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PearsonCorrelation {
    /// Pearson product-moment correlation coefficient
    pub coefficient: f64,
    /// Two-sided p-value for a non-zero slope
    pub p_value: f64,
    /// Standard error of the estimated slope
    pub std_err: f64,
    /// Slope of the regression line
    pub slope: f64,
    /// Intercept of the regression line
    pub intercept: f64,
}

/// Spearman rank-order correlation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpearmanCorrelation {
    /// Rank correlation coefficient
    pub coefficient: f64,
    /// Two-sided p-value for a non-zero correlation
    pub p_value: f64,
}

impl SpearmanCorrelation {
    const DEGENERATE: Self = Self {
        coefficient: 0.0,
        p_value: 1.0,
    };
}

/// Aggregate statistics of a regression experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionStatistics {
    /// Ground truth / prediction / feature-weight aggregation
    pub base: ExperimentStatistics,
    /// Root mean squared residual over every paired prediction
    pub std_err: f64,
    /// Pearson correlation of predicted on ground-truth values, `None` for
    /// fewer than three pairs or constant ground truth
    pub pearson: Option<PearsonCorrelation>,
    /// Spearman rank correlation of predicted and ground-truth values
    pub spearman: SpearmanCorrelation,
}

impl RegressionStatistics {
    /// Aggregate regression batches.
    ///
    /// An undefined Pearson fit is logged and left out; the RMS error and
    /// Spearman correlation are still reported.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no batches, a batch is not a
    /// regression, a labeled sample has no prediction, or no sample carries
    /// numeric ground truth.
    pub fn generate(batches: &mut [BatchResult]) -> Result<Self, StatsError> {
        ensure_kind(batches, PredictionKind::Regression)?;
        let base = ExperimentStatistics::generate(batches)?;

        let std_err = rms_error(
            &base.ground_truth_values,
            &base.predicted_values,
            base.num_classifications,
        )?;
        let pearson = match linear_regression(&base.ground_truth_values, &base.predicted_values)
        {
            Ok(fit) => Some(fit),
            Err(e) => {
                tracing::warn!(error = %e, "Pearson correlation undefined, omitting it");
                None
            }
        };
        let spearman = spearman(&base.ground_truth_values, &base.predicted_values);

        tracing::info!(
            batches = base.num_batches,
            pairs = base.ground_truth_values.len(),
            std_err,
            pearson = ?pearson.map(|p| p.coefficient),
            spearman = spearman.coefficient,
            "Aggregated regression statistics"
        );

        Ok(Self {
            base,
            std_err,
            pearson,
            spearman,
        })
    }
}

/// Ordinary least-squares regression of `y` on `x`
///
/// # Errors
///
/// Returns `StatsError::LengthMismatch` for unpaired input,
/// `StatsError::InsufficientData` for fewer than three pairs and
/// `StatsError::ZeroVariance` when `x` is constant.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn linear_regression(x: &[f64], y: &[f64]) -> Result<PearsonCorrelation, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::LengthMismatch {
            ground_truth: x.len(),
            predicted: y.len(),
        });
    }
    if x.len() < 3 {
        return Err(StatsError::InsufficientData {
            needed: 3,
            found: x.len(),
        });
    }

    let n = x.len() as f64;
    let x_mean = compute_mean(x);
    let y_mean = compute_mean(y);

    let (mut ssxm, mut ssym, mut ssxym) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ssxm += dx * dx;
        ssym += dy * dy;
        ssxym += dx * dy;
    }
    ssxm /= n;
    ssym /= n;
    ssxym /= n;

    if ssxm == 0.0 {
        return Err(StatsError::ZeroVariance);
    }

    let coefficient = if ssym == 0.0 {
        0.0
    } else {
        // rounding can push |r| a hair past 1
        (ssxym / (ssxm * ssym).sqrt()).clamp(-1.0, 1.0)
    };

    let df = n - 2.0;
    let t = coefficient * (df / ((1.0 - coefficient + TINY) * (1.0 + coefficient + TINY))).sqrt();
    let p_value = two_sided_t_p_value(t, df).unwrap_or(1.0);
    let slope = ssxym / ssxm;
    let intercept = slope.mul_add(-x_mean, y_mean);
    let std_err = ((1.0 - coefficient * coefficient) * ssym / ssxm / df).sqrt();

    Ok(PearsonCorrelation {
        coefficient,
        p_value,
        std_err,
        slope,
        intercept,
    })
}

/// Spearman rank-order correlation of `x` and `y`.
///
/// Degenerate input (fewer than three pairs, unequal lengths, constant
/// ranks or a non-finite result) yields a coefficient of 0 with p-value 1.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn spearman(x: &[f64], y: &[f64]) -> SpearmanCorrelation {
    if x.len() != y.len() || x.len() < 3 {
        tracing::warn!(
            x = x.len(),
            y = y.len(),
            "Spearman correlation needs at least three paired values, using 0"
        );
        return SpearmanCorrelation::DEGENERATE;
    }

    let x_ranks = fractional_ranks(x);
    let y_ranks = fractional_ranks(y);
    if is_constant(&x_ranks) || is_constant(&y_ranks) {
        tracing::warn!("Spearman correlation undefined for constant input, using 0");
        return SpearmanCorrelation::DEGENERATE;
    }
    let Ok(fit) = linear_regression(&x_ranks, &y_ranks) else {
        tracing::warn!("Spearman correlation undefined for constant input, using 0");
        return SpearmanCorrelation::DEGENERATE;
    };
    let rho = fit.coefficient;

    let df = x.len() as f64 - 2.0;
    let t = rho * (df / ((rho + 1.0) * (1.0 - rho))).sqrt();
    let p_value = if t.is_nan() {
        None
    } else {
        two_sided_t_p_value(t, df)
    };

    match p_value {
        Some(p_value) if rho.is_finite() => SpearmanCorrelation {
            coefficient: rho,
            p_value,
        },
        _ => {
            tracing::warn!(rho, "Spearman correlation is numerically degenerate, using 0");
            SpearmanCorrelation::DEGENERATE
        }
    }
}

#[allow(clippy::float_cmp)]
fn is_constant(values: &[f64]) -> bool {
    min_max(values).map_or(true, |(lo, hi)| lo == hi)
}
