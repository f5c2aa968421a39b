//! Percentile computation over a sorted sample.
//!
//! Uses linear interpolation between closest ranks, the same convention
//! spreadsheet tools use for their PERCENTILE function, so exported numbers
//! are directly comparable against ad-hoc analysis done elsewhere. Do not
//! swap in another convention (nearest-rank, R-6, ...): the fixed percentile
//! set below is part of the published report format.

use serde::{Deserialize, Serialize};

/// Percentile at `ratio` in `[0, 1]` over an already **sorted** sample.
///
/// `real_index = ratio * (n - 1)`; the result interpolates linearly between
/// the two neighboring ranks.
///
/// # Panics
///
/// Panics if `sorted` is empty or `ratio` is outside `[0, 1]`. Callers hold
/// a non-empty sample by construction ([`super::Statistics`] rejects empty
/// input before anything reaches this function).
pub fn percentile(sorted: &[f64], ratio: f64) -> f64 {
    assert!(!sorted.is_empty(), "cannot take a percentile of an empty sample");
    assert!(
        (0.0..=1.0).contains(&ratio),
        "percentile ratio must be in [0, 1], got {ratio}"
    );

    let n = sorted.len();
    let real_index = ratio * (n - 1) as f64;
    let idx = real_index.floor() as usize;
    let frac = real_index - idx as f64;
    if idx + 1 < n {
        sorted[idx] * (1.0 - frac) + sorted[idx + 1] * frac
    } else {
        sorted[idx]
    }
}

/// The fixed percentile set carried on every [`super::Statistics`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct PercentileSet {
    pub p0: f64,
    pub p25: f64,
    pub p50: f64,
    pub p67: f64,
    pub p80: f64,
    pub p85: f64,
    pub p90: f64,
    pub p95: f64,
    pub p100: f64,
}

impl PercentileSet {
    /// Compute the set from an already sorted sample.
    pub(crate) fn from_sorted(sorted: &[f64]) -> Self {
        Self {
            p0: percentile(sorted, 0.0),
            p25: percentile(sorted, 0.25),
            p50: percentile(sorted, 0.50),
            p67: percentile(sorted, 0.67),
            p80: percentile(sorted, 0.80),
            p85: percentile(sorted, 0.85),
            p90: percentile(sorted, 0.90),
            p95: percentile(sorted, 0.95),
            p100: percentile(sorted, 1.0),
        }
    }
}
