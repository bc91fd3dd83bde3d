// crates/chainops/tests/trigger_test.rs

use chaincore::{
    operation_fn, FlowRecord, HookBus, KeyedData, OperationError, OperationRecord, RuntimeContext,
    TriggerKind,
};
use chainops::register_all;
use chainruntime::{FlowRun, FlowRuntime, RuntimeConfig, StaticFlowSource};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Records start/end of every child run and the peak number running at once.
#[derive(Default)]
struct Tracker {
    log: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Tracker {
    fn position(&self, entry: &str) -> usize {
        self.log
            .lock()
            .iter()
            .position(|logged| logged == entry)
            .unwrap_or_else(|| panic!("{entry} was never logged"))
    }

    fn count(&self, prefix: &str) -> usize {
        self.log.lock().iter().filter(|entry| entry.starts_with(prefix)).count()
    }
}

/// Child flow: multiplies `$trigger` by ten after a short delay.
fn child_flow() -> FlowRecord {
    let mut record = FlowRecord::new("times ten", TriggerKind::Operation).with_return("$last");
    record.add_operation(OperationRecord::new("times_ten").with_key("result"));
    record
}

/// Parent flow: a single `trigger` operation, with a reject branch that echoes the error.
fn parent_flow(options: Value) -> FlowRecord {
    let mut record = FlowRecord::new("fan out", TriggerKind::Operation).with_return("$last");
    let failed = OperationRecord::new("transform")
        .with_key("failed")
        .with_options(json!({ "json": { "failed": "{{ $last }}" } }));
    record.add_operation(
        OperationRecord::new("trigger")
            .with_key("fan_out")
            .with_options(options)
            .on_reject(failed.id),
    );
    record.add_operation(failed);
    record
}

async fn run_parent(options: impl FnOnce(Uuid) -> Value, input: Value) -> (FlowRun, Arc<Tracker>) {
    let tracker = Arc::new(Tracker::default());
    let child = child_flow();
    let parent = parent_flow(options(child.id));
    let parent_id = parent.id;

    let runtime = FlowRuntime::new(
        Arc::new(StaticFlowSource::new(vec![child, parent])),
        Arc::new(HookBus::new()),
        Arc::new(chainruntime::CronScheduler::new()),
        RuntimeConfig::default(),
    );
    register_all(&mut runtime.registry().write());

    let measured = tracker.clone();
    runtime.add_operation(operation_fn("times_ten", move |data: KeyedData, _, _| {
        let tracker = measured.clone();
        async move {
            let item = data.trigger().clone();
            let now = tracker.running.fetch_add(1, Ordering::SeqCst) + 1;
            tracker.peak.fetch_max(now, Ordering::SeqCst);
            tracker.log.lock().push(format!("start {item}"));

            tokio::time::sleep(Duration::from_millis(20)).await;

            tracker.log.lock().push(format!("end {item}"));
            tracker.running.fetch_sub(1, Ordering::SeqCst);
            match item.as_i64() {
                Some(n) => Ok::<Value, OperationError>(json!(n * 10)),
                None => Err(OperationError::Failed(format!("not a number: {item}"))),
            }
        }
    }));
    runtime.initialize().await.unwrap();

    let run = runtime
        .run_flow_with_report(parent_id, input, RuntimeContext::new())
        .await
        .unwrap();
    (run, tracker)
}

#[tokio::test]
async fn test_batch_runs_chunks_in_order() {
    let (run, tracker) = run_parent(
        |flow| json!({ "flow": flow, "payload": "{{ $trigger }}", "iterationMode": "batch", "batchSize": 2 }),
        json!([1, 2, 3]),
    )
    .await;

    assert_eq!(run.value, json!([10, 20, 30]));
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 2);

    // The second chunk starts only once the first has finished.
    let third = tracker.position("start 3");
    assert!(third > tracker.position("end 1"));
    assert!(third > tracker.position("end 2"));
}

#[tokio::test]
async fn test_parallel_runs_everything_at_once() {
    let (run, tracker) = run_parent(
        |flow| json!({ "flow": flow, "payload": "{{ $trigger }}", "iterationMode": "parallel" }),
        json!([1, 2, 3]),
    )
    .await;

    assert_eq!(run.value, json!([10, 20, 30]));
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_parallel_is_the_default_mode() {
    let (run, tracker) = run_parent(
        |flow| json!({ "flow": flow, "payload": [4, 5] }),
        Value::Null,
    )
    .await;

    assert_eq!(run.value, json!([40, 50]));
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_serial_runs_one_at_a_time() {
    let (run, tracker) = run_parent(
        |flow| json!({ "flow": flow, "payload": [3, 1, 2], "iterationMode": "serial" }),
        Value::Null,
    )
    .await;

    assert_eq!(run.value, json!([30, 10, 20]));
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    assert_eq!(
        *tracker.log.lock(),
        vec!["start 3", "end 3", "start 1", "end 1", "start 2", "end 2"]
    );
}

#[tokio::test]
async fn test_non_array_payload_runs_once() {
    let (run, tracker) = run_parent(
        |flow| json!({ "flow": flow, "payload": 7, "iterationMode": "batch" }),
        Value::Null,
    )
    .await;

    assert_eq!(run.value, json!(70));
    assert_eq!(tracker.count("start"), 1);
}

#[tokio::test]
async fn test_json_string_payload_is_parsed() {
    let (run, _) = run_parent(
        |flow| json!({ "flow": flow, "payload": "[1, 2]" }),
        Value::Null,
    )
    .await;

    assert_eq!(run.value, json!([10, 20]));
}

#[tokio::test]
async fn test_child_failure_stays_in_the_child() {
    let (run, tracker) = run_parent(
        |flow| json!({ "flow": flow, "payload": [1, "x", 3], "iterationMode": "serial" }),
        Value::Null,
    )
    .await;

    // The failing child has no reject branch, so its `$last` is the error value.
    assert_eq!(run.visited(), vec!["fan_out"]);
    assert_eq!(run.value[0], json!(10));
    assert_eq!(run.value[1]["code"], "OPERATION_FAILED");
    assert_eq!(run.value[2], json!(30));
    assert_eq!(tracker.count("end"), 3);
}

#[tokio::test]
async fn test_unknown_flow_yields_null_results() {
    let (run, tracker) = run_parent(
        |_| json!({ "flow": Uuid::new_v4(), "payload": [1, 2] }),
        Value::Null,
    )
    .await;

    assert_eq!(run.value, json!([null, null]));
    assert_eq!(tracker.count("start"), 0);
}

#[tokio::test]
async fn test_non_operation_flows_cannot_be_fanned_out_to() {
    let tracker = Arc::new(Tracker::default());
    let mut action = FlowRecord::new("on create", TriggerKind::Action)
        .with_event("items.create")
        .with_return("$last");
    action.add_operation(OperationRecord::new("times_ten"));
    let parent = parent_flow(json!({ "flow": action.id, "payload": [1, 2] }));
    let parent_id = parent.id;

    let runtime = FlowRuntime::new(
        Arc::new(StaticFlowSource::new(vec![action, parent])),
        Arc::new(HookBus::new()),
        Arc::new(chainruntime::CronScheduler::new()),
        RuntimeConfig::default(),
    );
    register_all(&mut runtime.registry().write());
    let measured = tracker.clone();
    runtime.add_operation(operation_fn("times_ten", move |_, _, _| {
        measured.log.lock().push("start".to_string());
        async move { Ok::<Value, OperationError>(Value::Null) }
    }));
    runtime.initialize().await.unwrap();

    let run = runtime
        .run_flow_with_report(parent_id, Value::Null, RuntimeContext::new())
        .await
        .unwrap();
    assert_eq!(run.value, json!([null, null]));
    assert_eq!(tracker.count("start"), 0);
}

#[tokio::test]
async fn test_missing_flow_option_takes_reject_branch() {
    let (run, tracker) = run_parent(|_| json!({ "payload": [1] }), Value::Null).await;

    assert_eq!(run.visited(), vec!["fan_out", "failed"]);
    assert_eq!(run.value["failed"]["code"], "MISSING_OPTION");
    assert_eq!(tracker.count("start"), 0);
}

#[tokio::test]
async fn test_zero_batch_size_is_invalid() {
    let (run, tracker) = run_parent(
        |flow| json!({ "flow": flow, "payload": [1], "iterationMode": "batch", "batchSize": 0 }),
        Value::Null,
    )
    .await;

    assert_eq!(run.visited(), vec!["fan_out", "failed"]);
    assert_eq!(run.value["failed"]["code"], "INVALID_OPTION");
    assert_eq!(tracker.count("start"), 0);
}

#[tokio::test]
async fn test_trigger_without_runner_fails() {
    let data = KeyedData::new(Value::Null, None, Default::default());
    let result = chaincore::Operation::handle(
        &chainops::TriggerOperation,
        &data,
        json!({ "flow": Uuid::new_v4(), "payload": 1 }),
        &RuntimeContext::new(),
    )
    .await;

    assert!(matches!(result, Err(OperationError::Failed(_))));
}
