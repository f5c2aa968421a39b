//! Descriptive statistics over a sample of nanosecond timings.
//!
//! [`Statistics`] is an immutable snapshot: quartiles, IQR outlier fences,
//! moments, the fixed percentile set, and confidence intervals. It is cheap
//! enough to recompute after every iteration of the adaptive measurement
//! loop (one sort of a working copy), which is exactly how the engine uses
//! it.
//!
//! The quartile convention is the median-split one: Q1 is the median of the
//! lower half (first `n / 2` elements), Q3 the median of the upper half
//! (elements from `(n + 1) / 2` on). The outlier fences are derived from
//! these exact split points, so the convention is load-bearing and must not
//! be replaced by an interpolating quartile estimator.

pub mod approx;
mod percentile;

use serde::{Deserialize, Serialize};

use crate::types::EngineError;

pub use approx::{
    critical_value, gauss_cdf, inverse_student, student_one_tail, student_two_tail,
    ConfidenceLevel,
};
pub use percentile::{percentile, PercentileSet};

/// Which side of the outlier fences a trimming pass removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutlierMode {
    /// Keep every value.
    #[default]
    DontRemove,
    /// Remove values above the upper fence only.
    RemoveUpper,
    /// Remove values below the lower fence only.
    RemoveLower,
    /// Remove values outside either fence.
    RemoveAll,
}

/// Two-sided confidence interval around a sample mean.
///
/// `margin` is `critical_value(level, n) * standard_error`; the critical
/// value comes from the Student-t approximation in [`approx`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Sample mean the interval is centered on.
    pub mean: f64,
    /// Standard error of the mean.
    pub standard_error: f64,
    /// Number of observations behind the mean.
    pub n: usize,
    /// Confidence level of the interval.
    pub level: ConfidenceLevel,
    /// Half-width of the interval.
    pub margin: f64,
    /// `mean - margin`.
    pub lower: f64,
    /// `mean + margin`.
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Build the interval for a mean observed `n` times.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TooFewObservations`] for `n <= 2`, where no
    /// critical value is defined. The adaptive loop treats that as "keep
    /// measuring" rather than reporting a NaN-margin interval.
    pub fn new(
        mean: f64,
        standard_error: f64,
        n: usize,
        level: ConfidenceLevel,
    ) -> Result<Self, EngineError> {
        let margin = critical_value(level, n)? * standard_error;
        Ok(Self {
            mean,
            standard_error,
            n,
            level,
            margin,
            lower: mean - margin,
            upper: mean + margin,
        })
    }

    /// True if `value` lies inside the interval (with a 1e-9 tolerance).
    pub fn contains(&self, value: f64) -> bool {
        self.lower - 1e-9 < value && value < self.upper + 1e-9
    }
}

/// Immutable descriptive-statistics snapshot over a non-empty sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    sorted: Vec<f64>,
    /// Number of observations.
    pub n: usize,
    /// Smallest observation.
    pub min: f64,
    /// Largest observation.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample median.
    pub median: f64,
    /// First quartile (median of the lower half).
    pub q1: f64,
    /// Third quartile (median of the upper half).
    pub q3: f64,
    /// `q3 - q1`.
    pub interquartile_range: f64,
    /// `q1 - 1.5 * IQR`; values below are outliers.
    pub lower_fence: f64,
    /// `q3 + 1.5 * IQR`; values above are outliers.
    pub upper_fence: f64,
    /// Sample variance (`n - 1` denominator; 0 for a single observation).
    pub variance: f64,
    /// Square root of the variance.
    pub standard_deviation: f64,
    /// `standard_deviation / sqrt(n)`.
    pub standard_error: f64,
    /// Third standardized central moment (0 when the deviation is 0).
    pub skewness: f64,
    /// Fourth standardized central moment (0 when the deviation is 0).
    pub kurtosis: f64,
    /// The fixed percentile set over the sorted sample.
    pub percentiles: PercentileSet,
}

impl Statistics {
    /// Build a snapshot from a sample, in any order.
    ///
    /// The sample is copied and sorted once; everything else is derived from
    /// the sorted working copy.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptySample`] for an empty input.
    pub fn new(values: &[f64]) -> Result<Self, EngineError> {
        if values.is_empty() {
            return Err(EngineError::EmptySample);
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();

        let (q1, median, q3) = if n == 1 {
            (sorted[0], sorted[0], sorted[0])
        } else {
            (
                median_of(&sorted[..n / 2]),
                median_of(&sorted),
                median_of(&sorted[(n + 1) / 2..]),
            )
        };

        let min = sorted[0];
        let max = sorted[n - 1];
        let mean = sorted.iter().sum::<f64>() / n as f64;

        let interquartile_range = q3 - q1;
        let lower_fence = q1 - 1.5 * interquartile_range;
        let upper_fence = q3 + 1.5 * interquartile_range;

        let variance = if n == 1 {
            0.0
        } else {
            sorted.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1) as f64
        };
        let standard_deviation = variance.sqrt();
        let standard_error = standard_deviation / (n as f64).sqrt();

        let (skewness, kurtosis) = if standard_deviation == 0.0 {
            (0.0, 0.0)
        } else {
            let central_moment =
                |k: i32| sorted.iter().map(|x| (x - mean).powi(k)).sum::<f64>() / n as f64;
            (
                central_moment(3) / standard_deviation.powi(3),
                central_moment(4) / standard_deviation.powi(4),
            )
        };

        let percentiles = PercentileSet::from_sorted(&sorted);

        Ok(Self {
            sorted,
            n,
            min,
            max,
            mean,
            median,
            q1,
            q3,
            interquartile_range,
            lower_fence,
            upper_fence,
            variance,
            standard_deviation,
            standard_error,
            skewness,
            kurtosis,
            percentiles,
        })
    }

    /// The sorted working copy of the sample.
    pub fn values(&self) -> &[f64] {
        &self.sorted
    }

    /// True if `value` lies outside the IQR fences.
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower_fence || value > self.upper_fence
    }

    /// All observations outside the fences, in ascending order.
    pub fn outliers(&self) -> Vec<f64> {
        self.sorted.iter().copied().filter(|&v| self.is_outlier(v)).collect()
    }

    /// Observations below the lower fence, in ascending order.
    pub fn lower_outliers(&self) -> Vec<f64> {
        self.sorted.iter().copied().filter(|&v| v < self.lower_fence).collect()
    }

    /// Observations above the upper fence, in ascending order.
    pub fn upper_outliers(&self) -> Vec<f64> {
        self.sorted.iter().copied().filter(|&v| v > self.upper_fence).collect()
    }

    /// Percentile of the sample at `ratio` in `[0, 1]`.
    pub fn percentile(&self, ratio: f64) -> f64 {
        percentile(&self.sorted, ratio)
    }

    /// Confidence interval at the default level ([`ConfidenceLevel::L999`]).
    ///
    /// # Errors
    ///
    /// [`EngineError::TooFewObservations`] for `n <= 2`; see
    /// [`ConfidenceInterval::new`].
    pub fn confidence_interval(&self) -> Result<ConfidenceInterval, EngineError> {
        self.confidence_interval_at(ConfidenceLevel::default())
    }

    /// Confidence interval at an explicit level.
    ///
    /// # Errors
    ///
    /// [`EngineError::TooFewObservations`] for `n <= 2`.
    pub fn confidence_interval_at(
        &self,
        level: ConfidenceLevel,
    ) -> Result<ConfidenceInterval, EngineError> {
        ConfidenceInterval::new(self.mean, self.standard_error, self.n, level)
    }

    /// New snapshot with both-fence outliers removed.
    ///
    /// A window consisting of nothing but outliers is indistinguishable from
    /// a window of signal, so if removal would empty the sample the original
    /// snapshot is returned unchanged.
    pub fn without_outliers(&self) -> Statistics {
        self.trimmed(OutlierMode::RemoveAll)
    }

    /// New snapshot with the outliers selected by `mode` removed.
    ///
    /// Same empty-sample guard as [`Statistics::without_outliers`].
    pub fn trimmed(&self, mode: OutlierMode) -> Statistics {
        let keep = |v: f64| match mode {
            OutlierMode::DontRemove => true,
            OutlierMode::RemoveUpper => v <= self.upper_fence,
            OutlierMode::RemoveLower => v >= self.lower_fence,
            OutlierMode::RemoveAll => !self.is_outlier(v),
        };
        let kept: Vec<f64> = self.sorted.iter().copied().filter(|&v| keep(v)).collect();
        match Statistics::new(&kept) {
            Ok(stats) => stats,
            Err(_) => self.clone(),
        }
    }
}

/// Median of a non-empty sorted slice.
fn median_of(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}
