//! Numeric helpers shared by the aggregation modules.
//!
//! Everything here works on plain `f64` slices:
//! - mean and population standard deviation (divide by `n`)
//! - fractional ranks with averaged ties
//! - two-sided Student's t p-values

use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::statistics::{Data, OrderStatistics, RankTieBreaker};

/// Compute mean of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Compute population standard deviation of samples (denominator `n`)
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_population_std(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mean = compute_mean(samples);
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    variance.sqrt()
}

/// Smallest and largest sample, `None` when empty
#[must_use]
pub fn min_max(samples: &[f64]) -> Option<(f64, f64)> {
    let first = *samples.first()?;
    Some(
        samples
            .iter()
            .fold((first, first), |(lo, hi), &x| (lo.min(x), hi.max(x))),
    )
}

/// Fractional (1-based) ranks; tied values share the average of their ranks
#[must_use]
pub fn fractional_ranks(samples: &[f64]) -> Vec<f64> {
    Data::new(samples.to_vec()).ranks(RankTieBreaker::Average)
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom
///
/// Returns `None` when the distribution cannot be built (`df <= 0`) or the
/// statistic is NaN.
#[must_use]
pub fn two_sided_t_p_value(t_statistic: f64, df: f64) -> Option<f64> {
    if t_statistic.is_nan() {
        return None;
    }
    if t_statistic.is_infinite() {
        return Some(0.0);
    }
    let t_dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * t_dist.sf(t_statistic.abs())).clamp(0.0, 1.0))
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_mean() {
        assert!((compute_mean(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < f64::EPSILON);
        assert!(compute_mean(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compute_population_std() {
        // Population std for this data is exactly 2.0
        let samples = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = compute_population_std(&samples);
        assert!((std - 2.0).abs() < 1e-12, "std = {std}");
    }

    #[test]
    fn test_compute_population_std_small() {
        assert!(compute_population_std(&[]).abs() < f64::EPSILON);
        assert!(compute_population_std(&[5.0]).abs() < f64::EPSILON);
        assert!((compute_population_std(&[4.0, 6.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_min_max() {
        assert_eq!(min_max(&[3.0, -1.0, 7.5]), Some((-1.0, 7.5)));
        assert_eq!(min_max(&[]), None);
    }

    #[test]
    fn test_fractional_ranks_no_ties() {
        assert_eq!(fractional_ranks(&[10.0, 30.0, 20.0]), vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_fractional_ranks_ties_averaged() {
        assert_eq!(
            fractional_ranks(&[1.0, 2.0, 2.0, 3.0]),
            vec![1.0, 2.5, 2.5, 4.0]
        );
        assert_eq!(fractional_ranks(&[5.0, 5.0, 5.0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_fractional_ranks_keep_sample_order() {
        assert_eq!(
            fractional_ranks(&[3.0, -1.0, 3.0, 0.5]),
            vec![3.5, 1.0, 3.5, 2.0]
        );
        assert!(fractional_ranks(&[]).is_empty());
    }

    #[test]
    fn test_two_sided_t_p_value() {
        assert!((two_sided_t_p_value(0.0, 10.0).unwrap() - 1.0).abs() < 1e-12);
        // t = 2.228 is the 97.5% quantile for df = 10
        let p = two_sided_t_p_value(2.228, 10.0).unwrap();
        assert!((p - 0.05).abs() < 1e-3, "p = {p}");
        assert_eq!(two_sided_t_p_value(f64::INFINITY, 3.0), Some(0.0));
        assert!(two_sided_t_p_value(1.0, 0.0).is_none());
        assert!(two_sided_t_p_value(f64::NAN, 3.0).is_none());
    }
}
