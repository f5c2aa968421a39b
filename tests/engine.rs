//! End-to-end pipeline tests with scripted invokers.

use std::cell::RefCell;
use std::rc::Rc;

use bench_engine::{Engine, EngineConfig, IterationData, Measurement, Stage};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Invoker with a scripted constant per-operation time that records every
/// request the engine makes.
fn recording_invoker(
    per_op_ns: f64,
    requests: Rc<RefCell<Vec<IterationData>>>,
) -> impl FnMut(IterationData) -> Measurement {
    move |data| {
        requests.borrow_mut().push(data);
        Measurement::new(
            data.stage,
            1,
            data.iteration_index,
            data.invoke_count,
            per_op_ns * data.invoke_count as f64,
        )
    }
}

/// Basic smoke test: the full pipeline produces a non-empty corrected
/// result sample.
#[test]
fn smoke_test() {
    let engine = Engine::new(EngineConfig::dry(), |data: IterationData| {
        Measurement::new(data.stage, 1, data.iteration_index, data.invoke_count, 100.0)
    });
    let results = engine.run();

    assert_eq!(results.workload.len(), 3);
    assert_eq!(results.result.len(), 3);
    assert!(!results.measurements.is_empty());

    let stats = results.result_statistics().expect("non-empty result sample");
    assert!(stats.mean >= 0.0);
}

/// The engine walks the stages in pipeline order and restarts iteration
/// indices at 1 within each stage.
#[test]
fn stage_pipeline_order() {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let config = EngineConfig::new()
        .invocation_count(16)
        .target_count(3);
    let engine = Engine::new(config, recording_invoker(50.0, requests.clone()));
    let _ = engine.run();

    let requests = requests.borrow();
    let order = [
        Stage::IdleWarmup,
        Stage::IdleTarget,
        Stage::MainWarmup,
        Stage::MainTarget,
    ];
    let mut last_seen = 0;
    for request in requests.iter() {
        let position = order
            .iter()
            .position(|&s| s == request.stage)
            .expect("no pilot with a pinned invocation count");
        assert!(position >= last_seen, "stage order violated at {}", request.stage);
        last_seen = position;
    }

    for stage in order {
        let indices: Vec<u64> = requests
            .iter()
            .filter(|r| r.stage == stage)
            .map(|r| r.iteration_index)
            .collect();
        assert_eq!(indices, (1..=indices.len() as u64).collect::<Vec<_>>());
    }
}

/// Warmup consults its criteria before running, so a satisfied criteria
/// (max = 0) produces no warmup iterations at all.
#[test]
fn warmup_evaluates_before_iterating() {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let config = EngineConfig {
        invocation_count: Some(16),
        evaluate_overhead: false,
        warmup_min: 0,
        warmup_max: 0,
        target_count: Some(2),
        ..EngineConfig::default()
    };
    let engine = Engine::new(config, recording_invoker(50.0, requests.clone()));
    let _ = engine.run();

    assert!(requests.borrow().iter().all(|r| r.stage != Stage::MainWarmup));
}

/// An adaptive target stage evaluates after each appended measurement: a
/// constant-time workload converges at exactly the minimum count.
#[test]
fn adaptive_target_evaluates_after_appending() {
    let config = EngineConfig::new()
        .invocation_count(16)
        .evaluate_overhead(false);
    let target_min = config.target_min as usize;
    let engine = Engine::new(config, |data: IterationData| {
        Measurement::new(data.stage, 1, data.iteration_index, data.invoke_count, 2000.0)
    });
    let results = engine.run();
    assert_eq!(results.workload.len(), target_min);
}

/// A noisy but stationary workload still converges before the hard cap.
#[test]
fn noisy_workload_converges_before_the_cap() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    let noise = Normal::new(10_000.0, 100.0).unwrap();
    let config = EngineConfig::new()
        .invocation_count(16)
        .evaluate_overhead(false);
    let target_max = config.target_max as usize;
    let engine = Engine::new(config, move |data: IterationData| {
        let ns: f64 = noise.sample(&mut rng);
        Measurement::new(data.stage, 1, data.iteration_index, data.invoke_count, ns.max(0.0))
    });
    let results = engine.run();
    assert!(results.workload.len() < target_max);
}

/// `run_main(_, true)` pins the workload count even without a configured
/// target count.
#[test]
fn force_specific_pins_the_iteration_count() {
    let config = EngineConfig {
        invocation_count: Some(16),
        warmup_min: 0,
        warmup_max: 0,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config, |data: IterationData| {
        Measurement::new(data.stage, 1, data.iteration_index, data.invoke_count, 100.0)
    });
    let main = engine.run_main(16, true);
    assert_eq!(main.len(), bench_engine::DEFAULT_WORKLOAD_COUNT as usize);
}

/// The auto pilot grows the batch until one iteration is long enough, and
/// every pilot request is a multiple of the unroll factor.
#[test]
fn pilot_respects_the_unroll_factor() {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let config = EngineConfig {
        min_iteration_time_ns: 10_000.0,
        clock_resolution_ns: 10.0,
        evaluate_overhead: false,
        target_count: Some(1),
        warmup_min: 0,
        warmup_max: 0,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config, recording_invoker(1.0, requests.clone()));
    let invoke_count = engine.run_pilot();

    assert!(invoke_count as f64 * 1.0 >= 10_000.0);
    assert!(requests.borrow().iter().all(|r| r.invoke_count % 16 == 0));
    assert!(requests.borrow().iter().all(|r| r.stage == Stage::Pilot));
}

/// Overhead is subtracted per operation from the workload sample and the
/// corrected times never go negative.
#[test]
fn overhead_correction() {
    let config = EngineConfig::new()
        .invocation_count(160)
        .target_count(5);
    // 3 ns/op of overhead under a 10 ns/op workload.
    let engine = Engine::new(config, |data: IterationData| {
        let per_op = if data.stage.is_idle() { 3.0 } else { 10.0 };
        Measurement::new(
            data.stage,
            1,
            data.iteration_index,
            data.invoke_count,
            per_op * data.invoke_count as f64,
        )
    });
    let results = engine.run();

    assert!((results.overhead_per_operation_ns - 3.0).abs() < 1e-9);
    for m in &results.result {
        assert!((m.nanoseconds - 7.0 * 160.0).abs() < 1e-6);
    }
    let stats = results.result_statistics().unwrap();
    assert!((stats.mean - 7.0).abs() < 1e-9);
}

/// Disabling overhead evaluation skips the idle stages entirely and leaves
/// the workload uncorrected.
#[test]
fn overhead_evaluation_can_be_disabled() {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let config = EngineConfig::new()
        .invocation_count(16)
        .evaluate_overhead(false)
        .target_count(3);
    let engine = Engine::new(config, recording_invoker(50.0, requests.clone()));
    let results = engine.run();

    assert!(requests.borrow().iter().all(|r| !r.stage.is_idle()));
    assert_eq!(results.overhead_per_operation_ns, 0.0);
    assert_eq!(results.workload, results.result);
}

/// Run results round-trip through JSON.
#[test]
fn results_serialize() {
    let engine = Engine::new(EngineConfig::dry(), |data: IterationData| {
        Measurement::new(data.stage, 1, data.iteration_index, data.invoke_count, 100.0)
    });
    let results = engine.run();
    let json = serde_json::to_string(&results).expect("should serialize");
    assert!(json.contains("overhead_per_operation_ns"));
    let back: bench_engine::RunResults = serde_json::from_str(&json).unwrap();
    assert_eq!(results, back);
}
