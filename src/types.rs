//! Shared types: execution stages, iteration requests, and timed samples.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hard cap on the invocation batch size the pilot search may reach.
///
/// Doubling stops at this bound so the per-iteration operation count can
/// never overflow a signed 64-bit accumulator downstream.
pub const MAX_INVOKE_COUNT: u64 = (i64::MAX as u64 / 2 + 1) / 2;

/// Execution phase a measurement was taken in.
///
/// The engine walks these in order: a pilot search picks the invocation
/// batch size, the idle stages calibrate loop overhead, and the main stages
/// warm up and then time the workload itself. Only `MainTarget` samples
/// reach the final result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Invocation-count search before any calibration.
    Pilot,
    /// Warmup of the empty (overhead) loop.
    IdleWarmup,
    /// Timed overhead-calibration iterations.
    IdleTarget,
    /// Warmup of the workload.
    MainWarmup,
    /// Timed workload iterations.
    MainTarget,
}

impl Stage {
    /// True for the overhead-calibration stages.
    pub fn is_idle(self) -> bool {
        matches!(self, Stage::IdleWarmup | Stage::IdleTarget)
    }

    /// True for the stages whose measurements feed statistics (idle or main).
    pub fn is_target(self) -> bool {
        matches!(self, Stage::IdleTarget | Stage::MainTarget)
    }

    /// Short name used in output lines (`Pilot`, `IdleWarmup`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Stage::Pilot => "Pilot",
            Stage::IdleWarmup => "IdleWarmup",
            Stage::IdleTarget => "IdleTarget",
            Stage::MainWarmup => "MainWarmup",
            Stage::MainTarget => "MainTarget",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One iteration request handed to the external invoker.
///
/// The invoker must execute the benchmark body `invoke_count` times (in
/// chunks of `unroll_factor`) and report the total elapsed time as a single
/// [`Measurement`] tagged with the same stage and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationData {
    /// Stage the iteration belongs to.
    pub stage: Stage,
    /// 1-based index of the iteration within its stage.
    pub iteration_index: u64,
    /// Number of operations to execute.
    pub invoke_count: u64,
    /// Loop-unroll granularity; `invoke_count` is a multiple of this.
    pub unroll_factor: u64,
}

impl IterationData {
    /// Build an iteration request.
    ///
    /// # Panics
    ///
    /// Panics if `invoke_count` is not a multiple of `unroll_factor`: the
    /// generated benchmark loop executes `unroll_factor` operations per
    /// pass, so any other count is a bug in the calling engine.
    pub fn new(stage: Stage, iteration_index: u64, invoke_count: u64, unroll_factor: u64) -> Self {
        assert!(
            unroll_factor > 0 && invoke_count % unroll_factor == 0,
            "invoke count ({invoke_count}) must be a positive multiple of unroll factor ({unroll_factor})"
        );
        Self {
            stage,
            iteration_index,
            invoke_count,
            unroll_factor,
        }
    }
}

/// One timed sample: the total time to run `operations` invocations.
///
/// Created once per timed iteration by the external invoker and immutable
/// thereafter. Per-operation time is `nanoseconds / operations`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Stage the sample was taken in.
    pub stage: Stage,
    /// 1-based index of the process launch this sample belongs to.
    pub launch_index: u32,
    /// 1-based index of the iteration within its stage.
    pub iteration_index: u64,
    /// Number of operations timed in this sample.
    pub operations: u64,
    /// Total elapsed time for all operations, in nanoseconds.
    pub nanoseconds: f64,
}

impl Measurement {
    /// Build a measurement.
    ///
    /// # Panics
    ///
    /// Panics if `operations` is zero or `nanoseconds` is negative; both
    /// indicate a defective invoker, not a recoverable condition.
    pub fn new(
        stage: Stage,
        launch_index: u32,
        iteration_index: u64,
        operations: u64,
        nanoseconds: f64,
    ) -> Self {
        assert!(operations >= 1, "a measurement must cover at least one operation");
        assert!(
            nanoseconds >= 0.0,
            "elapsed time must be non-negative, got {nanoseconds} ns"
        );
        Self {
            stage,
            launch_index,
            iteration_index,
            operations,
            nanoseconds,
        }
    }

    /// Average time of one operation, in nanoseconds.
    pub fn nanoseconds_per_operation(&self) -> f64 {
        self.nanoseconds / self.operations as f64
    }
}

impl fmt::Display for Measurement {
    /// Human-readable output line, e.g. `MainTarget  3: 16 op, 12345.00 ns, 771.5625 ns/op`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>2}: {} op, {:.2} ns, {:.4} ns/op",
            self.stage,
            self.iteration_index,
            self.operations,
            self.nanoseconds,
            self.nanoseconds_per_operation()
        )
    }
}

/// Errors surfaced by the fallible engine and analysis operations.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A statistics snapshot was requested over an empty sample.
    EmptySample,
    /// An argument fell outside its documented range.
    ArgumentRange {
        /// Name of the offending argument.
        name: &'static str,
        /// What the argument must satisfy, and what was passed.
        message: String,
    },
    /// An operation needs more observations than the sample holds.
    TooFewObservations {
        /// Minimum number of observations the operation is defined for.
        needed: usize,
        /// Number of observations actually supplied.
        got: usize,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::EmptySample => write!(f, "sample is empty"),
            EngineError::ArgumentRange { name, message } => {
                write!(f, "{name} out of range: {message}")
            }
            EngineError::TooFewObservations { needed, got } => {
                write!(f, "needs at least {needed} observations, got {got}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_classification() {
        assert!(Stage::IdleWarmup.is_idle());
        assert!(Stage::IdleTarget.is_idle());
        assert!(!Stage::MainTarget.is_idle());
        assert!(!Stage::Pilot.is_idle());

        assert!(Stage::IdleTarget.is_target());
        assert!(Stage::MainTarget.is_target());
        assert!(!Stage::MainWarmup.is_target());
    }

    #[test]
    fn test_measurement_per_operation() {
        let m = Measurement::new(Stage::MainTarget, 1, 3, 16, 12345.0);
        assert!((m.nanoseconds_per_operation() - 771.5625).abs() < 1e-12);
    }

    #[test]
    fn test_measurement_output_line() {
        let m = Measurement::new(Stage::MainTarget, 1, 3, 16, 12345.0);
        assert_eq!(m.to_string(), "MainTarget  3: 16 op, 12345.00 ns, 771.5625 ns/op");
    }

    #[test]
    #[should_panic(expected = "multiple of unroll factor")]
    fn test_iteration_data_rejects_ragged_invoke_count() {
        IterationData::new(Stage::Pilot, 1, 17, 16);
    }

    #[test]
    #[should_panic(expected = "at least one operation")]
    fn test_measurement_rejects_zero_operations() {
        Measurement::new(Stage::MainTarget, 1, 1, 0, 1.0);
    }

    #[test]
    fn test_max_invoke_count_is_a_power_of_two() {
        assert_eq!(MAX_INVOKE_COUNT, 1u64 << 61);
    }
}
