//! Welch's two-sample t-test and the zero-measurement check.
//!
//! Both tests run over finished measurement distributions: Welch's test
//! compares a benchmark against a baseline without assuming equal variances
//! or sample sizes, and the zero-measurement check flags a workload whose
//! mean cannot be distinguished from a threshold near the timer resolution.

use serde::{Deserialize, Serialize};

use crate::statistics::{student_one_tail, student_two_tail, Statistics};
use crate::types::EngineError;

/// One side of a Welch comparison: the three summary numbers the test needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// Number of observations.
    pub n: usize,
    /// Sample mean.
    pub mean: f64,
    /// Sample variance (`n - 1` denominator).
    pub variance: f64,
}

impl From<&Statistics> for SampleSummary {
    fn from(stats: &Statistics) -> Self {
        Self {
            n: stats.n,
            mean: stats.mean,
            variance: stats.variance,
        }
    }
}

/// Outcome of a Welch two-sample t-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WelchResult {
    /// The t-statistic `(mean_x - mean_y) / se`.
    pub t: f64,
    /// Welch-Satterthwaite degrees of freedom (fractional).
    pub df: f64,
    /// Two-tailed p-value.
    pub p_value: f64,
}

/// Welch's t-test over two sample summaries.
///
/// When both variances are zero and the means coincide the t-statistic is a
/// `0 / 0` form; that is "no detectable difference", reported as `t = 0`,
/// `p = 1` instead of a NaN. Zero variances with distinct means are the
/// opposite certainty: `t` is signed infinity and `p = 0`.
///
/// # Errors
///
/// Returns [`EngineError::TooFewObservations`] if either side has fewer than
/// two observations: the Welch degrees of freedom are undefined below that.
pub fn welch_t_test(x: SampleSummary, y: SampleSummary) -> Result<WelchResult, EngineError> {
    let smaller = x.n.min(y.n);
    if smaller < 2 {
        return Err(EngineError::TooFewObservations {
            needed: 2,
            got: smaller,
        });
    }

    let sx = x.variance / x.n as f64;
    let sy = y.variance / y.n as f64;
    let se = (sx + sy).sqrt();

    if se == 0.0 {
        // Two constant samples. Equal means are the 0/0 form ("no detectable
        // difference"); distinct means differ with certainty, the limit of
        // the unguarded statistic as the variances vanish.
        let df = (x.n + y.n - 2) as f64;
        if x.mean == y.mean {
            return Ok(WelchResult { t: 0.0, df, p_value: 1.0 });
        }
        let t = if x.mean > y.mean { f64::INFINITY } else { f64::NEG_INFINITY };
        return Ok(WelchResult { t, df, p_value: 0.0 });
    }

    let t = (x.mean - y.mean) / se;
    let df = (sx + sy) * (sx + sy)
        / (sx * sx / (x.n - 1) as f64 + sy * sy / (y.n - 1) as f64);
    let p_value = student_two_tail(t, df);

    Ok(WelchResult { t, df, p_value })
}

/// One-sample check: is this workload indistinguishable from `threshold_ns`?
///
/// Runs a one-sided t-test of the hypothesis "the mean exceeds the
/// threshold" at a 5% significance level and returns `true` when that
/// hypothesis cannot be accepted. The threshold is typically half a CPU
/// cycle: anything that cannot clear it is noise from the timer, not a
/// measured workload.
///
/// Fewer than three observations return `false` (not enough evidence to
/// call anything zero). A zero-deviation sample falls back to a direct mean
/// comparison.
pub fn is_zero_measurement(sample: &[f64], threshold_ns: f64) -> bool {
    if sample.len() < 3 {
        return false;
    }
    // Guarded by the length check above.
    let stats = match Statistics::new(sample) {
        Ok(stats) => stats,
        Err(_) => return false,
    };
    if stats.standard_deviation == 0.0 {
        return stats.mean < threshold_ns;
    }

    let t = (stats.mean - threshold_ns) / stats.standard_error;
    let p_value = 1.0 - student_one_tail(t, (stats.n - 1) as f64);
    p_value > 0.05
}
