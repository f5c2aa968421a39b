//! Offline analysis of finished measurement series.
//!
//! Everything here runs after the measurement loop is done:
//!
//! 1. **Welch's t-test** ([`welch`]): compare a benchmark against a baseline.
//! 2. **Changepoint detection** ([`changepoint`]): ED-PELT segmentation of a
//!    series into homogeneous pieces.
//! 3. **Multimodality score** ([`m_value`]): how many distinct regimes a
//!    series visits; above 2 the distribution is unreliable.
//! 4. **Batch summaries** ([`summarize_all`]): per-series descriptive
//!    statistics for many finished benchmarks at once, one rayon task each.

pub mod changepoint;
pub mod welch;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::statistics::Statistics;
use crate::types::EngineError;

pub use changepoint::changepoint_indexes;
pub use welch::{is_zero_measurement, welch_t_test, SampleSummary, WelchResult};

/// Segment levels closer than the separation threshold collapse into one;
/// this floor keeps perfectly constant segments separable.
const MIN_LEVEL_SEPARATION: f64 = 1e-9;

/// Multimodality score of a measurement series.
///
/// Runs ED-PELT over the series, takes each homogeneous segment's median as
/// its level, and counts distinct levels: levels closer than the mean
/// within-segment IQR (floored at a small epsilon) are the same regime.
/// `1.0` means unimodal and steady; `2.0` or more means the series visits
/// several statistically distinct regimes and its summary statistics are
/// suspect. Series of length 2 or less score `1.0`.
///
/// # Errors
///
/// Propagates [`EngineError::ArgumentRange`] from the changepoint detector
/// for an invalid `min_distance`.
pub fn m_value(data: &[f64], min_distance: usize) -> Result<f64, EngineError> {
    if data.len() <= 2 {
        return Ok(1.0);
    }

    let changepoints = changepoint_indexes(data, min_distance)?;

    let mut segments = Vec::with_capacity(changepoints.len() + 1);
    let mut start = 0;
    for &end in changepoints.iter().chain(std::iter::once(&(data.len() - 1))) {
        // Segments are non-empty by the detector's spacing invariant.
        segments.push(Statistics::new(&data[start..=end])?);
        start = end + 1;
    }

    let threshold = (segments.iter().map(|s| s.interquartile_range).sum::<f64>()
        / segments.len() as f64)
        .max(MIN_LEVEL_SEPARATION);

    let mut levels: Vec<f64> = segments.iter().map(|s| s.median).collect();
    levels.sort_by(|a, b| a.total_cmp(b));

    let mut distinct = 1;
    for pair in levels.windows(2) {
        if pair[1] - pair[0] > threshold {
            distinct += 1;
        }
    }
    Ok(distinct as f64)
}

/// Everything report collaborators need about one finished series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    /// Descriptive statistics over the series.
    pub statistics: Statistics,
    /// ED-PELT changepoint indices.
    pub changepoints: Vec<usize>,
    /// Multimodality score derived from the changepoints.
    pub m_value: f64,
}

impl SeriesSummary {
    /// Summarize one series.
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptySample`] for an empty series,
    /// [`EngineError::ArgumentRange`] for an invalid `min_distance`.
    pub fn new(series: &[f64], min_distance: usize) -> Result<Self, EngineError> {
        Ok(Self {
            statistics: Statistics::new(series)?,
            changepoints: changepoint_indexes(series, min_distance)?,
            m_value: m_value(series, min_distance)?,
        })
    }
}

/// Summarize a batch of finished series, one rayon task per series.
///
/// The analyses are pure functions over immutable inputs, so cross-series
/// parallelism is safe; each individual series is still processed on a
/// single thread. A defective series (empty, bad `min_distance`) produces an
/// error entry at its position instead of aborting the batch.
pub fn summarize_all(
    series: &[Vec<f64>],
    min_distance: usize,
) -> Vec<Result<SeriesSummary, EngineError>> {
    series
        .par_iter()
        .map(|s| SeriesSummary::new(s, min_distance))
        .collect()
}
