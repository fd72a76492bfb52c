//! Integration tests for the pool runtime.
//!
//! These run real thread-backed units through the control task and check
//! ordering, queueing, memoization, failure propagation, and unit lifecycle
//! as seen from the public API.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

use wheelhouse_compute::{
    ExecutionUnit, Runtime, TaskError, TaskOutput, TaskRequest, UnitFactory, UnitId, UnitSpawnError,
    UnitWork,
};
use wheelhouse_core::{
    Comparison, DataType, Expr, Operator, PartitionError, PoolConfig, Reducer, SortOrder, TypedArray, WheelhouseError,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn config(max_threads: usize, persistence: bool) -> PoolConfig {
    PoolConfig {
        max_threads,
        persistence,
        ..Default::default()
    }
}

fn numbers(n: i64) -> Vec<Value> {
    (0..n).map(|i| json!(i)).collect()
}

fn double() -> Expr {
    Expr::mul(Expr::X, Expr::constant(2.0))
}

async fn run(runtime: &Runtime, request: TaskRequest) -> Result<TaskOutput, TaskError> {
    timeout(TIMEOUT, runtime.submit(request).unwrap())
        .await
        .expect("task did not settle in time")
}

#[tokio::test]
async fn map_preserves_input_order() {
    let runtime = Runtime::start(config(3, true)).unwrap();
    let output = timeout(TIMEOUT, runtime.map(numbers(10), double(), 3, None))
        .await
        .unwrap()
        .unwrap();
    let expected: Vec<Value> = (0..10).map(|i| json!(i * 2)).collect();
    assert_eq!(output, TaskOutput::Flat(expected));
    runtime.shutdown().await;
}

#[tokio::test]
async fn fan_out_beyond_capacity_completes_in_range_order() {
    let runtime = Runtime::start(config(4, true)).unwrap();
    let request = TaskRequest::new(Operator::Reduce { reducer: Reducer::Min })
        .input(numbers(12))
        .threads(6)
        .aggregate(false);
    let output = run(&runtime, request).await.unwrap();
    let mins: Vec<TaskOutput> = (0..6).map(|k| TaskOutput::Flat(vec![json!(k * 2)])).collect();
    assert_eq!(output, TaskOutput::PerRange(mins));

    let metrics = runtime.snapshot().await.unwrap().metrics;
    assert_eq!(metrics.ranges_dispatched, 6);
    assert!(metrics.peak_running <= 4);
    runtime.shutdown().await;
}

#[tokio::test]
async fn typed_output_uses_typed_array_conversion() {
    let runtime = Runtime::start(config(2, true)).unwrap();
    let request = TaskRequest::new(Operator::Identity)
        .input(vec![json!(-1), json!(256), json!(7.9), json!("x")])
        .threads(2)
        .data_type(DataType::Uint8);
    let output = run(&runtime, request).await.unwrap();
    assert_eq!(output, TaskOutput::Typed(TypedArray::Uint8(vec![255, 0, 7, 0])));
    runtime.shutdown().await;
}

#[tokio::test]
async fn unaggregated_ranges_come_back_typed() {
    let runtime = Runtime::start(config(2, true)).unwrap();
    let request = TaskRequest::new(Operator::Identity)
        .input(vec![json!(300), json!(2), json!(511)])
        .threads(3)
        .aggregate(false)
        .data_type(DataType::Uint8);
    let output = run(&runtime, request).await.unwrap();
    assert_eq!(
        output,
        TaskOutput::PerRange(vec![
            TaskOutput::Typed(TypedArray::Uint8(vec![44])),
            TaskOutput::Typed(TypedArray::Uint8(vec![2])),
            TaskOutput::Typed(TypedArray::Uint8(vec![255])),
        ])
    );
    runtime.shutdown().await;
}

#[tokio::test]
async fn filter_then_sort_descending() {
    let runtime = Runtime::start(config(2, true)).unwrap();
    let request = TaskRequest::new(Operator::Filter {
        cmp: Comparison::Ge,
        value: Expr::constant(3.0),
    })
    .input(vec![json!(5), json!(1), json!(9), json!(3), json!(2)])
    .threads(2)
    .sort(SortOrder::Desc);
    let output = run(&runtime, request).await.unwrap();
    assert_eq!(output, TaskOutput::Flat(vec![json!(9), json!(5), json!(3)]));
    runtime.shutdown().await;
}

#[tokio::test]
async fn generate_runs_once_per_range() {
    let runtime = Runtime::start(config(3, true)).unwrap();
    let request = TaskRequest::new(Operator::Generate {
        count: 2,
        expr: Expr::I,
    })
    .threads(3);
    let output = run(&runtime, request).await.unwrap();
    assert_eq!(output.into_values(), vec![json!(0), json!(1), json!(0), json!(1), json!(0), json!(1)]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn memoized_result_skips_dispatch() {
    let runtime = Runtime::start(config(2, true)).unwrap();
    let request = TaskRequest::new(Operator::Map { expr: double() })
        .input(numbers(6))
        .threads(2)
        .cacheable(true);

    let first = run(&runtime, request.clone()).await.unwrap();
    let dispatched = runtime.snapshot().await.unwrap().metrics.ranges_dispatched;

    let second = run(&runtime, request).await.unwrap();
    assert_eq!(first, second);

    let snapshot = runtime.snapshot().await.unwrap();
    assert_eq!(snapshot.metrics.cache_hits, 1);
    assert_eq!(snapshot.metrics.ranges_dispatched, dispatched);
    assert_eq!(snapshot.cache_entries, 1);
    assert!(snapshot.errors.is_empty());
    runtime.shutdown().await;
}

#[tokio::test]
async fn unit_fault_rejects_task_and_is_logged() {
    let runtime = Runtime::start(config(2, true)).unwrap();
    let request = TaskRequest::new(Operator::Map { expr: double() })
        .input(vec![json!(1), json!(2), json!("three"), json!(4)])
        .threads(2);

    let record = match run(&runtime, request).await {
        Err(TaskError::Unit(record)) => record,
        other => panic!("expected unit error, got {:?}", other),
    };
    assert_eq!(record.range_index, 1);
    assert!(record.message.starts_with("Error unit #"));
    assert!(record.message.contains("in map"));

    let snapshot = runtime.snapshot().await.unwrap();
    assert_eq!(snapshot.errors.len(), 1);
    assert_eq!(snapshot.errors[0], record);
    assert_eq!(snapshot.metrics.tasks_failed, 1);

    // The pool keeps serving after a fault.
    let ok = run(&runtime, TaskRequest::new(Operator::Identity).input(numbers(2))).await;
    assert!(ok.is_ok());
    runtime.shutdown().await;
}

#[tokio::test]
async fn many_tasks_share_a_small_pool() {
    let runtime = Runtime::start(config(2, true)).unwrap();
    let handles: Vec<_> = (0..8)
        .map(|k| {
            let request = TaskRequest::new(Operator::Reduce { reducer: Reducer::Sum })
                .input(numbers(10 + k))
                .threads(2)
                .aggregate(false);
            runtime.submit(request).unwrap()
        })
        .collect();

    for (k, handle) in handles.into_iter().enumerate() {
        let output = timeout(TIMEOUT, handle).await.unwrap().unwrap();
        let total: i64 = output
            .into_values()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .sum();
        let n = 10 + k as i64;
        assert_eq!(total, n * (n - 1) / 2);
    }

    let snapshot = runtime.snapshot().await.unwrap();
    assert!(snapshot.metrics.peak_running <= 2);
    assert_eq!(snapshot.metrics.tasks_succeeded, 8);
    assert_eq!(snapshot.pending, 0);
    assert!(snapshot.running.is_empty());
    runtime.shutdown().await;
}

#[tokio::test]
async fn transient_units_are_reclaimed() {
    let runtime = Runtime::start(config(2, false)).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            runtime
                .submit(TaskRequest::new(Operator::Identity).input(numbers(4)).threads(2))
                .unwrap()
        })
        .collect();
    for handle in handles {
        assert!(timeout(TIMEOUT, handle).await.unwrap().is_ok());
    }

    let metrics = runtime.snapshot().await.unwrap().metrics;
    assert_eq!(metrics.units_spawned, 8);
    assert_eq!(metrics.units_terminated, 8);
    runtime.shutdown().await;
}

#[tokio::test]
async fn legacy_mode_runs_inline() {
    let runtime = Runtime::start(PoolConfig {
        legacy: true,
        ..config(8, true)
    })
    .unwrap();
    assert_eq!(runtime.capacity(), 1);

    let output = run(&runtime, TaskRequest::new(Operator::Identity).input(numbers(5)).threads(4))
        .await
        .unwrap();
    assert_eq!(output, TaskOutput::Flat(numbers(5)));
    assert_eq!(runtime.snapshot().await.unwrap().metrics.ranges_dispatched, 1);
    runtime.shutdown().await;
}

#[tokio::test]
async fn json_helpers() {
    let runtime = Runtime::start(config(1, true)).unwrap();

    let value = runtime.parse_json(r#"{"a":[1,2]}"#).await.unwrap();
    assert_eq!(value, json!({"a": [1, 2]}));

    let text = runtime.stringify_json(&json!([true, null])).await.unwrap();
    assert_eq!(text, "[true,null]");

    let err = runtime.parse_json("{oops").await.unwrap_err();
    assert!(matches!(err, TaskError::Unit(_)));
    runtime.shutdown().await;
}

// ── custom factories ────────────────────────────────────────────────

/// Units that accept work and never answer.
struct SilentFactory;

struct SilentUnit(UnitId);

impl ExecutionUnit for SilentUnit {
    fn id(&self) -> UnitId {
        self.0
    }

    fn post(&mut self, _work: UnitWork) {}

    fn terminate(&mut self) {}
}

impl UnitFactory for SilentFactory {
    type Unit = SilentUnit;

    fn spawn(&mut self, id: UnitId) -> Result<SilentUnit, UnitSpawnError> {
        Ok(SilentUnit(id))
    }
}

#[tokio::test]
async fn silent_unit_holds_its_slot_until_shutdown() {
    let (_tx, rx) = mpsc::unbounded_channel();
    let runtime = Runtime::with_factory(config(1, true), SilentFactory, rx).unwrap();

    let first = runtime.submit(TaskRequest::new(Operator::Identity).input(numbers(1))).unwrap();
    let second = runtime.submit(TaskRequest::new(Operator::Identity).input(numbers(1))).unwrap();

    let snapshot = runtime.snapshot().await.unwrap();
    assert_eq!(snapshot.running, vec![0]);
    assert_eq!(snapshot.pending, 1);
    assert_eq!(snapshot.live_tasks, 2);

    runtime.shutdown().await;
    assert!(matches!(timeout(TIMEOUT, first).await.unwrap(), Err(TaskError::Abandoned)));
    assert!(matches!(timeout(TIMEOUT, second).await.unwrap(), Err(TaskError::Abandoned)));
}

#[tokio::test]
async fn oversized_fan_out_fails_at_submit() {
    let runtime = Runtime::start(config(2, true)).unwrap();
    let request = TaskRequest::new(Operator::Identity).input(numbers(4)).threads(1usize << 40);
    let err = runtime.submit(request).err().unwrap();
    assert!(matches!(
        err,
        WheelhouseError::Partition(PartitionError::InvalidThreadCount(n)) if n == 1 << 40
    ));
    assert_eq!(runtime.snapshot().await.unwrap().live_tasks, 0);
    runtime.shutdown().await;
}

#[test]
fn start_requires_tokio_runtime() {
    let err = Runtime::start(config(1, true)).err().unwrap();
    assert!(matches!(err, WheelhouseError::Other(_)));
}
