//! Engine and stopping-criteria configuration.
//!
//! Plain data, public fields, consuming builder setters. Criteria selection
//! is an explicit tagged variant resolved by
//! [`StoppingCriteria::from_config`](crate::criteria::StoppingCriteria::from_config);
//! there is no attribute or reflection surface.

use serde::{Deserialize, Serialize};

use crate::criteria::StoppingCriteria;
use crate::statistics::{ConfidenceLevel, OutlierMode};

/// Iterations run by a pinned-count workload stage when no explicit count is
/// configured (monitoring-style forced runs).
pub const DEFAULT_WORKLOAD_COUNT: i32 = 10;

/// Tagged stopping-criteria configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CriteriaConfig {
    /// Run exactly `count` iterations.
    Fixed {
        /// Iteration count.
        count: i32,
    },
    /// Warmup until the series fluctuates instead of drifting.
    AutoWarmup {
        /// Minimum iterations regardless of fluctuations.
        min: i32,
        /// Hard iteration cap.
        max: i32,
        /// Fluctuations required before `min` can stop the stage.
        min_fluctuations: i32,
    },
    /// Measure until the confidence-interval margin is small enough.
    AutoTarget {
        /// Minimum iterations before convergence can stop the stage.
        min: i32,
        /// Hard iteration cap.
        max: i32,
        /// Hard cap when the stage measures loop overhead.
        max_idle: i32,
        /// Allowed margin as a fraction of the mean.
        max_relative_error: f64,
        /// Optional absolute margin bound, in per-iteration nanoseconds.
        max_absolute_error_ns: Option<f64>,
        /// Confidence level the margin is computed at.
        confidence_level: ConfidenceLevel,
        /// Trim upper-fence outliers before testing convergence.
        remove_outliers: bool,
    },
}

/// Full engine configuration with the measurement-accuracy defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 1-based index of the process launch, stamped on every measurement.
    pub launch_index: u32,
    /// Loop-unroll granularity of the generated benchmark body.
    pub unroll_factor: u64,
    /// Smallest invocation batch the pilot search may start from.
    pub min_invoke_count: u64,
    /// Pinned invocation count; set, it skips the pilot stage entirely.
    pub invocation_count: Option<u64>,
    /// Desired time of one iteration; set, the pilot searches for the
    /// invocation count hitting it instead of growing until measurable.
    pub target_iteration_time_ns: Option<f64>,
    /// Smallest iteration time the auto pilot accepts.
    pub min_iteration_time_ns: f64,
    /// Resolution of the harness clock, for the pilot's precision bound.
    pub clock_resolution_ns: f64,
    /// Run the idle (overhead) stages and subtract the measured overhead.
    pub evaluate_overhead: bool,
    /// Workload warmup: minimum iterations.
    pub warmup_min: i32,
    /// Workload warmup: hard cap.
    pub warmup_max: i32,
    /// Warmup fluctuations required for an early stop.
    pub warmup_min_fluctuations: i32,
    /// Overhead warmup: minimum iterations (small fixed bounds).
    pub idle_warmup_min: i32,
    /// Overhead warmup: hard cap.
    pub idle_warmup_max: i32,
    /// Explicit workload iteration count; set, it overrides adaptivity.
    pub target_count: Option<i32>,
    /// Adaptive target: minimum iterations.
    pub target_min: i32,
    /// Adaptive target: hard cap.
    pub target_max: i32,
    /// Adaptive target: hard cap in idle (overhead) mode.
    pub target_max_idle: i32,
    /// Allowed confidence-interval margin as a fraction of the mean.
    pub max_relative_error: f64,
    /// Optional absolute margin bound, in per-iteration nanoseconds.
    pub max_absolute_error_ns: Option<f64>,
    /// Confidence level the convergence margin is computed at.
    pub confidence_level: ConfidenceLevel,
    /// Trim upper-fence outliers before testing convergence.
    pub remove_outliers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            launch_index: 1,
            unroll_factor: 16,
            min_invoke_count: 4,
            invocation_count: None,
            target_iteration_time_ns: None,
            min_iteration_time_ns: 100_000_000.0, // 100 ms
            clock_resolution_ns: 100.0,
            evaluate_overhead: true,
            warmup_min: 6,
            warmup_max: 50,
            warmup_min_fluctuations: 4,
            idle_warmup_min: 4,
            idle_warmup_max: 10,
            target_count: None,
            target_min: 15,
            target_max: 100,
            target_max_idle: 20,
            max_relative_error: 0.02,
            max_absolute_error_ns: None,
            confidence_level: ConfidenceLevel::default(),
            remove_outliers: true,
        }
    }
}

impl EngineConfig {
    /// The default accuracy profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fast smoke-run profile: single invocations, pinned tiny counts, no
    /// overhead evaluation. For validating a harness wiring, not for
    /// numbers worth reporting.
    pub fn dry() -> Self {
        Self {
            unroll_factor: 1,
            min_invoke_count: 1,
            invocation_count: Some(1),
            evaluate_overhead: false,
            warmup_min: 1,
            warmup_max: 2,
            target_count: Some(3),
            ..Self::default()
        }
    }

    /// Set the loop-unroll granularity.
    pub fn unroll_factor(mut self, unroll_factor: u64) -> Self {
        self.unroll_factor = unroll_factor;
        self
    }

    /// Pin the invocation count, skipping the pilot stage.
    pub fn invocation_count(mut self, count: u64) -> Self {
        self.invocation_count = Some(count);
        self
    }

    /// Aim the pilot at a specific iteration time.
    pub fn target_iteration_time_ns(mut self, nanoseconds: f64) -> Self {
        self.target_iteration_time_ns = Some(nanoseconds);
        self
    }

    /// Set the harness clock resolution.
    pub fn clock_resolution_ns(mut self, nanoseconds: f64) -> Self {
        self.clock_resolution_ns = nanoseconds;
        self
    }

    /// Enable or disable the overhead stages.
    pub fn evaluate_overhead(mut self, evaluate: bool) -> Self {
        self.evaluate_overhead = evaluate;
        self
    }

    /// Pin the workload iteration count, overriding adaptivity.
    pub fn target_count(mut self, count: i32) -> Self {
        self.target_count = Some(count);
        self
    }

    /// Set the allowed relative confidence-interval margin.
    pub fn max_relative_error(mut self, fraction: f64) -> Self {
        self.max_relative_error = fraction;
        self
    }

    /// Bound the margin in absolute per-iteration nanoseconds.
    pub fn max_absolute_error_ns(mut self, nanoseconds: f64) -> Self {
        self.max_absolute_error_ns = Some(nanoseconds);
        self
    }

    /// Set the confidence level the convergence margin is computed at.
    pub fn confidence_level(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_level = level;
        self
    }

    /// Enable or disable outlier trimming during convergence checks.
    pub fn remove_outliers(mut self, remove: bool) -> Self {
        self.remove_outliers = remove;
        self
    }

    /// Criteria for the workload warmup stage.
    pub fn main_warmup_criteria(&self) -> StoppingCriteria {
        StoppingCriteria::auto_warmup(
            self.warmup_min,
            self.warmup_max,
            self.warmup_min_fluctuations,
        )
    }

    /// Criteria for the overhead warmup stage.
    pub fn idle_warmup_criteria(&self) -> StoppingCriteria {
        StoppingCriteria::auto_warmup(
            self.idle_warmup_min,
            self.idle_warmup_max,
            self.warmup_min_fluctuations,
        )
    }

    /// Criteria for the workload target stage.
    ///
    /// An explicit `target_count` (or `force_specific`) pins the count; only
    /// without either does the adaptive criteria drive the stage.
    pub fn main_target_criteria(&self, force_specific: bool) -> StoppingCriteria {
        if force_specific || self.target_count.is_some() {
            StoppingCriteria::fixed(self.target_count.unwrap_or(DEFAULT_WORKLOAD_COUNT))
        } else {
            self.auto_target_criteria()
        }
    }

    /// Criteria for the overhead target stage (always adaptive, idle mode).
    pub fn idle_target_criteria(&self) -> StoppingCriteria {
        self.auto_target_criteria().for_idle_stage()
    }

    fn auto_target_criteria(&self) -> StoppingCriteria {
        StoppingCriteria::from_config(&CriteriaConfig::AutoTarget {
            min: self.target_min,
            max: self.target_max,
            max_idle: self.target_max_idle,
            max_relative_error: self.max_relative_error,
            max_absolute_error_ns: self.max_absolute_error_ns,
            confidence_level: self.confidence_level,
            remove_outliers: self.remove_outliers,
        })
    }

    /// Outlier mode the final result statistics are reported with.
    pub fn outlier_mode(&self) -> OutlierMode {
        if self.remove_outliers {
            OutlierMode::RemoveUpper
        } else {
            OutlierMode::DontRemove
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.unroll_factor, 16);
        assert_eq!(config.min_invoke_count, 4);
        assert_eq!(config.target_min, 15);
        assert_eq!(config.target_max, 100);
        assert_eq!(config.target_max_idle, 20);
        assert!(config.evaluate_overhead);
        assert!(config.invocation_count.is_none());
        assert!(config.target_count.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::new()
            .unroll_factor(1)
            .invocation_count(256)
            .max_relative_error(0.05)
            .confidence_level(ConfidenceLevel::L95)
            .remove_outliers(false)
            .evaluate_overhead(false);
        assert_eq!(config.unroll_factor, 1);
        assert_eq!(config.invocation_count, Some(256));
        assert!((config.max_relative_error - 0.05).abs() < 1e-12);
        assert_eq!(config.confidence_level, ConfidenceLevel::L95);
        assert!(!config.remove_outliers);
        assert!(!config.evaluate_overhead);
    }

    #[test]
    fn test_explicit_count_overrides_adaptivity() {
        let adaptive = EngineConfig::new();
        assert_eq!(
            adaptive.main_target_criteria(false).title(),
            "AutoTarget(min=15, max=100, maxIdle=20)"
        );
        assert_eq!(
            adaptive.main_target_criteria(true).title(),
            "Fixed(count=10)"
        );

        let pinned = EngineConfig::new().target_count(25);
        assert_eq!(pinned.main_target_criteria(false).title(), "Fixed(count=25)");
        assert_eq!(pinned.main_target_criteria(true).title(), "Fixed(count=25)");
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = EngineConfig::dry();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
