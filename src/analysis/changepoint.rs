//! ED-PELT changepoint detection.
//!
//! Splits a measurement series into statistically homogeneous segments
//! using the nonparametric ED-PELT algorithm:
//!
//! - Haynes, Fearnhead, Eckley, "A computationally efficient nonparametric
//!   approach for changepoint detection", Statistics and Computing 27 (2017).
//! - Killick, Fearnhead, Eckley, "Optimal detection of changepoints with a
//!   linear computational cost", JASA 107 (2012).
//!
//! The segment cost is a discrete empirical-CDF likelihood evaluated at
//! `k = ceil(4 ln n)` quantiles, the penalty is the Modified BIC
//! (`3 ln n` per changepoint), and PELT pruning keeps the dynamic program
//! at expected `O(n log n)`.

use crate::types::EngineError;

/// 0-based indices of changepoints in `data`, each marking the last element
/// of a homogeneous segment.
///
/// For `{0,0,0,0,0,0, 1,1,1,1,1,1, 2,2,2,2,2,2}` the result is `[5, 11]`.
/// Series of length 2 or less carry no evidence of structure and yield an
/// empty result.
///
/// # Errors
///
/// Returns [`EngineError::ArgumentRange`] unless
/// `1 <= min_distance <= data.len()`.
pub fn changepoint_indexes(data: &[f64], min_distance: usize) -> Result<Vec<usize>, EngineError> {
    let n = data.len();

    if n <= 2 {
        return Ok(Vec::new());
    }

    if min_distance < 1 || min_distance > n {
        return Err(EngineError::ArgumentRange {
            name: "min_distance",
            message: format!("{min_distance} should be in range from 1 to {n}"),
        });
    }

    // Modified Bayesian Information Criterion penalty per changepoint.
    let penalty = 3.0 * (n as f64).ln();

    // Quantile count for the empirical-CDF approximation; k can't exceed n
    // (matters for n <= 8).
    let k = n.min((4.0 * (n as f64).ln()).ceil() as usize);

    let partial_sums = partial_sums(data, k);
    let cost = |tau1: usize, tau2: usize| segment_cost(&partial_sums, tau1, tau2, k, n);

    // `best_cost[tau]` is the optimal cost of data[0..tau]; 1-based over the
    // prefix lengths, with an artificial -penalty seed so the first real
    // segment is not charged for a changepoint.
    let mut best_cost = vec![0.0; n + 1];
    best_cost[0] = -penalty;
    for current_tau in min_distance..(2 * min_distance).min(n + 1) {
        best_cost[current_tau] = cost(0, current_tau);
    }

    // `previous_changepoint[tau]` is the end of the segment preceding the one
    // that ends at `tau` (1-based prefix lengths again).
    let mut previous_changepoint = vec![0usize; n + 1];

    // PELT candidate list of admissible previous segment ends.
    let mut previous_taus: Vec<usize> = Vec::with_capacity(n + 1);
    previous_taus.push(0);
    previous_taus.push(min_distance);
    let mut cost_for_previous_tau: Vec<f64> = Vec::with_capacity(n + 1);

    for current_tau in 2 * min_distance..=n {
        cost_for_previous_tau.clear();
        cost_for_previous_tau.extend(
            previous_taus
                .iter()
                .map(|&tau| best_cost[tau] + cost(tau, current_tau) + penalty),
        );

        let best_index = which_min(&cost_for_previous_tau);
        best_cost[current_tau] = cost_for_previous_tau[best_index];
        previous_changepoint[current_tau] = previous_taus[best_index];

        // Prune candidates that can never participate in an optimal
        // solution (the classic PELT bound), then admit the tau that comes
        // into range for the next position.
        let current_best_cost = best_cost[current_tau];
        let mut kept = 0;
        for i in 0..previous_taus.len() {
            if cost_for_previous_tau[i] < current_best_cost + penalty {
                previous_taus[kept] = previous_taus[i];
                kept += 1;
            }
        }
        previous_taus.truncate(kept);
        previous_taus.push(current_tau - min_distance + 1);
    }

    // Walk the chain backwards from the full prefix, then convert 1-based
    // segment ends to 0-based last-element indices.
    let mut changepoints = Vec::new();
    let mut current = previous_changepoint[n];
    while current != 0 {
        changepoints.push(current - 1);
        current = previous_changepoint[current];
    }
    changepoints.reverse();
    Ok(changepoints)
}

/// Prefix sums of the doubled empirical CDF: for quantile `i` and prefix
/// length `tau`, `partial_sums[i * (n + 1) + tau]` counts
/// `2 * |{j < tau : data[j] < t_i}| + |{j < tau : data[j] == t_i}|`.
///
/// Doubling keeps the table integral (the 0.5 weight for ties becomes 1).
/// The quantiles `t_i` are not uniform: the tails of the distribution get
/// more of them than the center.
fn partial_sums(data: &[f64], k: usize) -> Vec<i64> {
    let n = data.len();
    let mut sums = vec![0i64; k * (n + 1)];

    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    for i in 0..k {
        // z walks from -1 + 1/k to 1 - 1/k in steps of 2/k; p maps it into
        // (0, 1) with tail emphasis.
        let z = -1.0 + (2 * i + 1) as f64 / k as f64;
        let p = 1.0 / (1.0 + (2.0 * n as f64 - 1.0).powf(-z));
        let t = sorted[((n - 1) as f64 * p).trunc() as usize];

        let offset = i * (n + 1);
        for tau in 1..=n {
            let mut value = sums[offset + tau - 1];
            if data[tau - 1] < t {
                value += 2;
            }
            if data[tau - 1] == t {
                value += 1;
            }
            sums[offset + tau] = value;
        }
    }

    sums
}

/// Nonparametric likelihood cost of the half-open segment `(tau1, tau2]`.
fn segment_cost(partial_sums: &[i64], tau1: usize, tau2: usize, k: usize, n: usize) -> f64 {
    let tau_diff = tau2 - tau1;
    let mut sum = 0.0;
    let mut offset = tau1;
    for _ in 0..k {
        let actual_sum = partial_sums[offset + tau_diff] - partial_sums[offset];
        // fit = 0 and fit = 1 contribute nothing (and would take ln(0)).
        if actual_sum != 0 && actual_sum != 2 * tau_diff as i64 {
            let fit = actual_sum as f64 * 0.5 / tau_diff as f64;
            let lnp = tau_diff as f64 * (fit * fit.ln() + (1.0 - fit) * (1.0 - fit).ln());
            sum += lnp;
        }
        offset += n + 1;
    }

    let c = -(2.0 * n as f64 - 1.0).ln();
    2.0 * c / k as f64 * sum
}

/// Index of the smallest element of a non-empty slice.
fn which_min(values: &[f64]) -> usize {
    let mut min_index = 0;
    let mut min_value = values[0];
    for (i, &value) in values.iter().enumerate().skip(1) {
        if value < min_value {
            min_value = value;
            min_index = i;
        }
    }
    min_index
}
