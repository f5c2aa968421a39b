//! Normal and Student-t distribution approximations.
//!
//! Implements the classic polynomial approximation of the standard normal
//! CDF (ACM Algorithm 209) and the asymptotic expansion of the two-tailed
//! Student-t distribution (ACM Algorithm 395), plus a bisection inverse used
//! to turn confidence levels into critical values.
//!
//! The Student expansion is accurate to roughly 1e-6 for 20 or more degrees
//! of freedom and degrades below that; callers working with very small
//! samples must treat the results as approximate.

use serde::{Deserialize, Serialize};

use crate::types::EngineError;

/// Standard normal CDF via the ACM 209 polynomial approximation.
///
/// Valid over the whole real line; accurate to about 1e-6. Branches on
/// `|x|/2`: one polynomial below 1.0, another on `[1.0, 3.0)`, and
/// saturation to 0/1 beyond.
pub fn gauss_cdf(x: f64) -> f64 {
    let z = if x.abs() < 1e-9 {
        0.0
    } else {
        let mut y = x.abs() / 2.0;
        if y >= 3.0 {
            1.0
        } else if y < 1.0 {
            let w = y * y;
            ((((((((0.000124818987 * w - 0.001075204047) * w + 0.005198775019) * w
                - 0.019198292004)
                * w
                + 0.059054035642)
                * w
                - 0.151968751364)
                * w
                + 0.319152932694)
                * w
                - 0.531923007300)
                * w
                + 0.797884560593)
                * y
                * 2.0
        } else {
            y -= 2.0;
            (((((((((((((-0.000045255659 * y + 0.000152529290) * y - 0.000019538132) * y
                - 0.000676904986)
                * y
                + 0.001390604284)
                * y
                - 0.000794620820)
                * y
                - 0.002034254874)
                * y
                + 0.006549791214)
                * y
                - 0.010557625006)
                * y
                + 0.011630447319)
                * y
                - 0.009279453341)
                * y
                + 0.005353579108)
                * y
                - 0.002141268741)
                * y
                + 0.000535310849)
                * y
                + 0.999936657524
        }
    };

    if x > 0.0 {
        (z + 1.0) / 2.0
    } else {
        (1.0 - z) / 2.0
    }
}

/// Two-tailed Student-t probability `P(|T| > t)` via the ACM 395 expansion.
///
/// `df` may be fractional (Welch's test produces non-integer degrees of
/// freedom). Accurate for `df >= ~20`; see the module docs.
pub fn student_two_tail(t: f64, df: f64) -> f64 {
    let t2 = t * t;
    let mut y = t2 / df;
    let b = y + 1.0;
    if y > 1e-6 {
        y = b.ln();
    }
    let a = df - 0.5;
    let b = 48.0 * a * a;
    y *= a;
    y = (((((-0.4 * y - 3.3) * y - 24.0) * y - 85.5) / (0.8 * y * y + 100.0 + b) + y + 3.0) / b
        + 1.0)
        * y.sqrt();

    2.0 * gauss_cdf(-y)
}

/// One-tailed Student-t CDF `P(T <= t)`, derived from [`student_two_tail`].
pub fn student_one_tail(t: f64, df: f64) -> f64 {
    if t < 0.0 {
        1.0 - student_one_tail(-t, df)
    } else {
        1.0 - student_two_tail(t, df) / 2.0
    }
}

/// Smallest `t >= 0` with `student_two_tail(t, df) <= p`, by bisection.
///
/// The two-tail probability is strictly decreasing in `t`, so plain
/// bisection over `[0, 1000]` down to an interval width of 1e-9 suffices
/// for every supported confidence level.
pub fn inverse_student(p: f64, df: f64) -> f64 {
    let mut lower = 0.0_f64;
    let mut upper = 1000.0_f64;
    while upper - lower > 1e-9 {
        let t = (lower + upper) / 2.0;
        if student_two_tail(t, df) > p {
            lower = t;
        } else {
            upper = t;
        }
    }
    (lower + upper) / 2.0
}

/// Two-sided confidence level for an interval around the mean.
///
/// The default used throughout the engine is [`ConfidenceLevel::L999`]
/// (99.9%): with dozens of benchmarks in one run, the weaker conventional
/// levels flag spurious differences far too often.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    /// 50.0% confidence interval.
    L50,
    /// 70.0% confidence interval.
    L70,
    /// 75.0% confidence interval.
    L75,
    /// 80.0% confidence interval.
    L80,
    /// 85.0% confidence interval.
    L85,
    /// 90.0% confidence interval.
    L90,
    /// 92.0% confidence interval.
    L92,
    /// 95.0% confidence interval.
    L95,
    /// 96.0% confidence interval.
    L96,
    /// 97.0% confidence interval.
    L97,
    /// 98.0% confidence interval.
    L98,
    /// 99.0% confidence interval.
    L99,
    /// 99.9% confidence interval.
    L999,
}

impl ConfidenceLevel {
    /// The level as a fraction, e.g. `L999` is `0.999`.
    pub fn value(self) -> f64 {
        match self {
            ConfidenceLevel::L50 => 0.50,
            ConfidenceLevel::L70 => 0.70,
            ConfidenceLevel::L75 => 0.75,
            ConfidenceLevel::L80 => 0.80,
            ConfidenceLevel::L85 => 0.85,
            ConfidenceLevel::L90 => 0.90,
            ConfidenceLevel::L92 => 0.92,
            ConfidenceLevel::L95 => 0.95,
            ConfidenceLevel::L96 => 0.96,
            ConfidenceLevel::L97 => 0.97,
            ConfidenceLevel::L98 => 0.98,
            ConfidenceLevel::L99 => 0.99,
            ConfidenceLevel::L999 => 0.999,
        }
    }

    /// The level as a display label, e.g. `"99.9%"`.
    pub fn percent_label(self) -> &'static str {
        match self {
            ConfidenceLevel::L50 => "50%",
            ConfidenceLevel::L70 => "70%",
            ConfidenceLevel::L75 => "75%",
            ConfidenceLevel::L80 => "80%",
            ConfidenceLevel::L85 => "85%",
            ConfidenceLevel::L90 => "90%",
            ConfidenceLevel::L92 => "92%",
            ConfidenceLevel::L95 => "95%",
            ConfidenceLevel::L96 => "96%",
            ConfidenceLevel::L97 => "97%",
            ConfidenceLevel::L98 => "98%",
            ConfidenceLevel::L99 => "99%",
            ConfidenceLevel::L999 => "99.9%",
        }
    }
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        ConfidenceLevel::L999
    }
}

/// Critical value (z-star) for a two-sided interval over `n` observations.
///
/// Computed as `inverse_student(1 - level, n - 1)`.
///
/// # Errors
///
/// Returns [`EngineError::TooFewObservations`] for `n <= 2`: one degree of
/// freedom cannot bound the mean, and the expansion behind
/// [`student_two_tail`] is meaningless there anyway.
pub fn critical_value(level: ConfidenceLevel, n: usize) -> Result<f64, EngineError> {
    if n <= 2 {
        return Err(EngineError::TooFewObservations { needed: 3, got: n });
    }
    Ok(inverse_student(1.0 - level.value(), (n - 1) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauss_cdf_center_and_symmetry() {
        assert!((gauss_cdf(0.0) - 0.5).abs() < 1e-12);
        for &x in &[0.5, 1.0, 1.96, 2.5, 3.3] {
            let sum = gauss_cdf(x) + gauss_cdf(-x);
            assert!((sum - 1.0).abs() < 1e-9, "Gauss({x}) not symmetric: sum={sum}");
        }
    }

    #[test]
    fn test_gauss_cdf_known_values() {
        assert!((gauss_cdf(1.96) - 0.975).abs() < 1e-4);
        assert!((gauss_cdf(-1.96) - 0.025).abs() < 1e-4);
        assert!((gauss_cdf(1.0) - 0.841345).abs() < 1e-4);
        assert!((gauss_cdf(2.575829) - 0.995).abs() < 1e-4);
        // Saturation beyond |x|/2 >= 3.
        assert_eq!(gauss_cdf(7.0), 1.0);
        assert_eq!(gauss_cdf(-7.0), 0.0);
    }

    #[test]
    fn test_student_two_tail_at_zero_is_one() {
        for &df in &[1.0, 2.0, 5.0, 20.0, 61.7, 507.2] {
            assert!((student_two_tail(0.0, df) - 1.0).abs() < 1e-12, "df={df}");
        }
    }

    #[test]
    fn test_student_one_tail_reference_values() {
        // Recorded reference values; the expansion is reliable at these df.
        let cases = [
            (-1.8084, 507.2, 0.03556814),
            (1.8084, 507.2, 0.9644319),
            (-1.488, 507.2, 0.06868611),
            (1.488, 507.2, 0.9313139),
            (-1.488, 20.0, 0.07617457),
            (1.488, 20.0, 0.9238254),
        ];
        for (t, df, expected) in cases {
            let actual = student_one_tail(t, df);
            assert!(
                (actual - expected).abs() < 1e-4,
                "one_tail({t}, {df}) = {actual}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_student_two_tail_decreases_in_t() {
        let mut last = 1.0 + 1e-12;
        for i in 0..40 {
            let t = i as f64 * 0.25;
            let p = student_two_tail(t, 30.0);
            assert!(p <= last, "two_tail not decreasing at t={t}");
            last = p;
        }
    }

    #[test]
    fn test_inverse_student_round_trip() {
        for &df in &[19.0, 29.0, 99.0, 507.2] {
            for &p in &[0.05, 0.01, 0.001] {
                let t = inverse_student(p, df);
                let back = student_two_tail(t, df);
                assert!(
                    (back - p).abs() < 1e-8,
                    "round trip failed: df={df} p={p} t={t} back={back}"
                );
            }
        }
    }

    #[test]
    fn test_critical_value_reference_table() {
        // Student t-table entries. Tolerance reflects the expansion's
        // accuracy floor near df = 20.
        let cases = [
            (ConfidenceLevel::L95, 20, 2.093024, 2e-3),
            (ConfidenceLevel::L95, 100, 1.984217, 1e-3),
            (ConfidenceLevel::L99, 100, 2.626405, 1e-3),
            (ConfidenceLevel::L999, 20, 3.883406, 2e-3),
            (ConfidenceLevel::L999, 100, 3.391529, 2e-3),
        ];
        for (level, n, expected, tol) in cases {
            let actual = critical_value(level, n).unwrap();
            assert!(
                (actual - expected).abs() < tol,
                "critical_value({level:?}, {n}) = {actual}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_critical_value_rejects_tiny_samples() {
        assert!(matches!(
            critical_value(ConfidenceLevel::L999, 2),
            Err(EngineError::TooFewObservations { needed: 3, got: 2 })
        ));
        assert!(matches!(
            critical_value(ConfidenceLevel::L95, 0),
            Err(EngineError::TooFewObservations { .. })
        ));
    }

    #[test]
    fn test_confidence_level_values() {
        assert_eq!(ConfidenceLevel::default(), ConfidenceLevel::L999);
        assert!((ConfidenceLevel::L999.value() - 0.999).abs() < 1e-12);
        assert!((ConfidenceLevel::L50.value() - 0.5).abs() < 1e-12);
        assert_eq!(ConfidenceLevel::L999.percent_label(), "99.9%");
        assert_eq!(ConfidenceLevel::L95.percent_label(), "95%");
    }
}
