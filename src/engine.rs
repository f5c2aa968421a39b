//! The measurement engine: pilot search, warmup and target stages.
//!
//! The engine drives an external invoker through the stage pipeline
//!
//! ```text
//! pilot -> idle warmup -> idle target -> main warmup -> main target
//! ```
//!
//! one blocking invoker call per iteration, with the active
//! [`StoppingCriteria`] deciding after each sample whether the stage has
//! seen enough. Everything is single-threaded and synchronous: running
//! iterations concurrently would perturb the very timings being measured.
//! Cancellation is the caller's business, at iteration boundaries; the only
//! internal caps are the criteria's `max_iteration_count`s and the pilot's
//! invoke-count ceiling.
//!
//! The invoker is any `FnMut(IterationData) -> Measurement`; the engine
//! never allocates between timed iterations (buffers come preallocated from
//! the [`MeasurementPool`]).

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::criteria::StoppingCriteria;
use crate::pool::MeasurementPool;
use crate::statistics::{OutlierMode, Statistics};
use crate::types::{EngineError, IterationData, Measurement, Stage, MAX_INVOKE_COUNT};

/// Invoke-count threshold below which the auto pilot grows additively
/// (matches the default unroll factor: batches smaller than one unrolled
/// pass double too aggressively).
const ADDITIVE_GROWTH_LIMIT: u64 = 16;

/// Buffers one engine pops from its pool over a full run: one per warmup
/// stage, two per target stage (measurements plus the statistics window).
const POOL_CAPACITY: usize = 6;

/// Final engine output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    /// Every measurement taken, in execution order (pilot included).
    pub measurements: Vec<Measurement>,
    /// Median per-operation overhead from the idle target stage; 0 when
    /// overhead evaluation was disabled.
    pub overhead_per_operation_ns: f64,
    /// Raw workload (main target) measurements.
    pub workload: Vec<Measurement>,
    /// Workload measurements with the per-operation overhead subtracted,
    /// clamped at zero.
    pub result: Vec<Measurement>,
    /// Outlier mode the result statistics are reported with.
    pub outlier_mode: OutlierMode,
}

impl RunResults {
    /// Statistics over the per-operation times of the corrected result
    /// sample, trimmed per the configured outlier mode.
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptySample`] if the result sample is empty (a
    /// zero-count pinned run).
    pub fn result_statistics(&self) -> Result<Statistics, EngineError> {
        let per_op: Vec<f64> = self
            .result
            .iter()
            .map(Measurement::nanoseconds_per_operation)
            .collect();
        Ok(Statistics::new(&per_op)?.trimmed(self.outlier_mode))
    }
}

/// The stage controller, generic over the external invoker.
///
/// One engine instance means one benchmark execution: it owns its
/// measurement pool, is not thread-safe, and is consumed by [`Engine::run`].
pub struct Engine<F>
where
    F: FnMut(IterationData) -> Measurement,
{
    config: EngineConfig,
    invoker: F,
    pool: MeasurementPool,
    log: Vec<Measurement>,
}

impl<F> Engine<F>
where
    F: FnMut(IterationData) -> Measurement,
{
    /// Build an engine around an invoker.
    ///
    /// All buffer allocation happens here; criteria parameter warnings are
    /// echoed to stderr as advisories.
    pub fn new(config: EngineConfig, invoker: F) -> Self {
        let criteria = [
            config.idle_warmup_criteria(),
            config.idle_target_criteria(),
            config.main_warmup_criteria(),
            config.main_target_criteria(false),
            config.main_target_criteria(true),
        ];
        let mut buffer_capacity = 0;
        for c in &criteria {
            for warning in c.warnings() {
                eprintln!("bench-engine: {}: {warning}", c.title());
            }
            buffer_capacity = buffer_capacity.max(c.max_iteration_count());
        }

        Self {
            config,
            invoker,
            pool: MeasurementPool::new(POOL_CAPACITY, buffer_capacity),
            log: Vec::new(),
        }
    }

    /// Run the full stage pipeline and assemble the results.
    ///
    /// Consumes the engine: buffers migrate into the returned
    /// [`RunResults`] and the pool is dropped with the engine.
    pub fn run(mut self) -> RunResults {
        let invoke_count = match self.config.invocation_count {
            Some(count) => count,
            None => self.run_pilot(),
        };

        let idle = if self.config.evaluate_overhead {
            Some(self.run_idle(invoke_count))
        } else {
            None
        };

        let workload = self.run_main(invoke_count, false);

        let overhead_per_operation_ns = idle
            .as_ref()
            .map(|measurements| median_per_operation(measurements))
            .unwrap_or(0.0);

        let result = workload
            .iter()
            .map(|m| {
                let adjusted =
                    (m.nanoseconds - overhead_per_operation_ns * m.operations as f64).max(0.0);
                Measurement::new(m.stage, m.launch_index, m.iteration_index, m.operations, adjusted)
            })
            .collect();

        RunResults {
            measurements: self.log,
            overhead_per_operation_ns,
            workload,
            result,
            outlier_mode: self.config.outlier_mode(),
        }
    }

    /// Pilot stage: find the invocation batch size for one iteration.
    ///
    /// With a target iteration time configured the search homes in on it;
    /// otherwise the batch grows until one iteration is long enough to
    /// measure within the clock's precision. Pilot measurements land in the
    /// full log but never in any result sample.
    pub fn run_pilot(&mut self) -> u64 {
        eprintln!("bench-engine: {} stage started", Stage::Pilot);
        match self.config.target_iteration_time_ns {
            Some(target_ns) => self.run_pilot_specific(target_ns),
            None => self.run_pilot_auto(),
        }
    }

    fn run_pilot_auto(&mut self) -> u64 {
        let config = self.config.clone();
        let mut invoke_count = round_up(config.min_invoke_count, config.unroll_factor);

        let mut iteration = 0;
        loop {
            iteration += 1;
            let measurement = self.run_iteration(Stage::Pilot, iteration, invoke_count);
            let iteration_time = measurement.nanoseconds;

            // Precision the clock can offer per operation at this batch
            // size, against the precision the configuration asks for.
            let operation_error = 2.0 * config.clock_resolution_ns / invoke_count as f64;
            let operation_max_error = (iteration_time / invoke_count as f64
                * config.max_relative_error)
                .min(config.max_absolute_error_ns.unwrap_or(f64::MAX));

            if operation_error < operation_max_error
                && iteration_time >= config.min_iteration_time_ns
            {
                break;
            }
            if invoke_count >= MAX_INVOKE_COUNT {
                break;
            }

            if config.unroll_factor == 1 && invoke_count < ADDITIVE_GROWTH_LIMIT {
                invoke_count += 1;
            } else {
                invoke_count *= 2;
            }
        }

        invoke_count
    }

    fn run_pilot_specific(&mut self, target_ns: f64) -> u64 {
        let config = self.config.clone();
        let mut invoke_count = round_up(4, config.unroll_factor);

        let mut iteration = 0;
        let mut down_count = 0;
        loop {
            iteration += 1;
            let measurement = self.run_iteration(Stage::Pilot, iteration, invoke_count);
            let actual_ns = measurement.nanoseconds;
            // A zero-time measurement gives no ratio to scale by; jump to
            // the batch-size cap and let the |delta| <= 1 check terminate.
            // The cap is applied before rounding so the u64 arithmetic below
            // cannot overflow.
            let perfect_invoke_count = if actual_ns > 0.0 {
                (invoke_count as f64 * target_ns / actual_ns).round()
            } else {
                MAX_INVOKE_COUNT as f64
            }
            .min(MAX_INVOKE_COUNT as f64) as u64;
            let new_invoke_count = round_up(
                config.min_invoke_count.max(perfect_invoke_count),
                config.unroll_factor,
            );

            if new_invoke_count < invoke_count {
                down_count += 1;
            }

            // Within one invocation of the target, or oscillating: stop.
            if new_invoke_count.abs_diff(invoke_count) <= 1 || down_count >= 3 {
                break;
            }

            invoke_count = new_invoke_count;
        }

        invoke_count
    }

    /// Overhead calibration: idle warmup followed by the idle target stage.
    ///
    /// Returns the idle target measurements; the warmup samples are only
    /// retained in the full log.
    pub fn run_idle(&mut self, invoke_count: u64) -> Vec<Measurement> {
        let warmup = self.config.idle_warmup_criteria();
        self.run_warmup_stage(Stage::IdleWarmup, &warmup, invoke_count);

        let target = self.config.idle_target_criteria();
        self.run_adaptive_target_stage(Stage::IdleTarget, &target, invoke_count)
    }

    /// Workload: main warmup followed by the main target stage.
    ///
    /// `force_specific` pins the iteration count regardless of
    /// configuration (as does an explicit configured count); otherwise the
    /// adaptive criteria drives the stage. Returns the main target
    /// measurements.
    pub fn run_main(&mut self, invoke_count: u64, force_specific: bool) -> Vec<Measurement> {
        let warmup = self.config.main_warmup_criteria();
        self.run_warmup_stage(Stage::MainWarmup, &warmup, invoke_count);

        let criteria = self.config.main_target_criteria(force_specific);
        if force_specific || self.config.target_count.is_some() {
            self.run_fixed_target_stage(Stage::MainTarget, &criteria, invoke_count)
        } else {
            self.run_adaptive_target_stage(Stage::MainTarget, &criteria, invoke_count)
        }
    }

    /// Warmup loop: the criteria is consulted before each iteration, so a
    /// criteria that is already satisfied runs zero iterations.
    fn run_warmup_stage(
        &mut self,
        stage: Stage,
        criteria: &StoppingCriteria,
        invoke_count: u64,
    ) -> Vec<Measurement> {
        eprintln!("bench-engine: {stage} stage started ({})", criteria.title());
        let mut measurements = self.pool.next_buffer();
        let mut iteration = 0;
        while !criteria.evaluate(&measurements).finished {
            iteration += 1;
            let measurement = self.run_iteration(stage, iteration, invoke_count);
            measurements.push(measurement);
        }
        measurements
    }

    /// Pinned-count loop; same pre-check shape as warmup, so a zero count
    /// runs zero iterations.
    fn run_fixed_target_stage(
        &mut self,
        stage: Stage,
        criteria: &StoppingCriteria,
        invoke_count: u64,
    ) -> Vec<Measurement> {
        self.run_warmup_stage(stage, criteria, invoke_count)
    }

    /// Adaptive loop: the criteria is consulted after each appended sample,
    /// over the parallel statistics window.
    fn run_adaptive_target_stage(
        &mut self,
        stage: Stage,
        criteria: &StoppingCriteria,
        invoke_count: u64,
    ) -> Vec<Measurement> {
        eprintln!("bench-engine: {stage} stage started ({})", criteria.title());
        let mut measurements = self.pool.next_buffer();
        let mut for_statistics = self.pool.next_buffer();
        let mut iteration = 0;
        loop {
            iteration += 1;
            let measurement = self.run_iteration(stage, iteration, invoke_count);
            measurements.push(measurement);
            for_statistics.push(measurement);
            if criteria.evaluate(&for_statistics).finished {
                break;
            }
        }
        measurements
    }

    /// One blocking call to the external invoker.
    ///
    /// # Panics
    ///
    /// Panics if the invoker returns a measurement tagged with a different
    /// stage than requested; that is a defective harness, not a recoverable
    /// condition.
    fn run_iteration(&mut self, stage: Stage, iteration_index: u64, invoke_count: u64) -> Measurement {
        let data = IterationData::new(stage, iteration_index, invoke_count, self.config.unroll_factor);
        let measurement = (self.invoker)(data);
        assert!(
            measurement.stage == stage,
            "invoker returned a {} measurement for a {} iteration",
            measurement.stage,
            stage
        );
        self.log.push(measurement);
        measurement
    }
}

/// Round `count` up to a multiple of `unroll_factor`.
fn round_up(count: u64, unroll_factor: u64) -> u64 {
    (count + unroll_factor - 1) / unroll_factor * unroll_factor
}

/// Median of the per-operation times of a non-empty measurement list.
fn median_per_operation(measurements: &[Measurement]) -> f64 {
    let per_op: Vec<f64> = measurements
        .iter()
        .map(Measurement::nanoseconds_per_operation)
        .collect();
    match Statistics::new(&per_op) {
        Ok(stats) => stats.median,
        Err(_) => 0.0,
    }
}
