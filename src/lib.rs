//! # bench-engine
//!
//! Adaptive measurement engine for micro-benchmarks.
//!
//! The engine decides *how much* to measure instead of trusting a fixed
//! iteration count: a pilot stage sizes the invocation batch so one
//! iteration is long enough to time, warmup runs until the series stops
//! drifting, and the target stage keeps measuring until the confidence
//! interval around the mean is tight enough. The result is a sample of
//! overhead-corrected measurements plus the statistics to judge it by:
//! - Descriptive statistics with outlier fences and confidence intervals
//! - Welch's t-test for comparing two benchmarks
//! - ED-PELT changepoint detection and a multimodality score
//!
//! ## Quick Start
//!
//! The engine is harness-agnostic: you supply an invoker that runs the
//! benchmark body `invoke_count` times and reports the elapsed time.
//!
//! ```no_run
//! use std::time::Instant;
//! use bench_engine::{Engine, EngineConfig, IterationData, Measurement};
//!
//! let config = EngineConfig::new().unroll_factor(1);
//! let engine = Engine::new(config, |data: IterationData| {
//!     let start = Instant::now();
//!     for _ in 0..data.invoke_count {
//!         std::hint::black_box(my_workload());
//!     }
//!     let elapsed = start.elapsed().as_nanos() as f64;
//!     Measurement::new(data.stage, 1, data.iteration_index, data.invoke_count, elapsed)
//! });
//!
//! let results = engine.run();
//! let stats = results.result_statistics().unwrap();
//! println!("{:.2} ns/op +- {:.2}", stats.mean, stats.standard_error);
//! # fn my_workload() -> u64 { 42 }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod config;
mod criteria;
mod engine;
mod pool;
mod types;

// Functional modules
pub mod analysis;
pub mod statistics;

// Re-exports for public API
pub use config::{CriteriaConfig, EngineConfig, DEFAULT_WORKLOAD_COUNT};
pub use criteria::{StoppingCriteria, StoppingDecision, IDLE_MAX_RELATIVE_ERROR};
pub use engine::{Engine, RunResults};
pub use pool::MeasurementPool;
pub use types::{EngineError, IterationData, Measurement, Stage, MAX_INVOKE_COUNT};

pub use analysis::{
    changepoint_indexes, is_zero_measurement, m_value, summarize_all, welch_t_test,
    SampleSummary, SeriesSummary, WelchResult,
};
pub use statistics::{
    approx::ConfidenceLevel, ConfidenceInterval, OutlierMode, Statistics,
};
