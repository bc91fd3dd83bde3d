// crates/chainruntime/tests/common/mod.rs
#![allow(dead_code)]

use chaincore::{
    operation_fn, EventBus, KeyedData, Operation, OperationError, ScheduledTask, Scheduler,
    TickHandler, TriggerError,
};
use chainruntime::{FlowRunner, OperationRegistry};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

pub fn registry_with(operations: Vec<Arc<dyn Operation>>) -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    for operation in operations {
        registry.register(operation);
    }
    registry
}

pub fn runner_with(operations: Vec<Arc<dyn Operation>>) -> FlowRunner {
    FlowRunner::new(
        registry_with(operations).shared(),
        Arc::new(EventBus::new(64)),
        Map::new(),
    )
}

/// Resolves with a fixed value.
pub fn constant(operation_type: &str, value: Value) -> Arc<dyn Operation> {
    operation_fn(operation_type, move |_, _, _| {
        let value = value.clone();
        async move { Ok::<Value, OperationError>(value) }
    })
}

/// Always rejects with `message`.
pub fn failing(operation_type: &str, message: &'static str) -> Arc<dyn Operation> {
    operation_fn(operation_type, move |_, _, _| async move {
        Err::<Value, _>(OperationError::Failed(message.to_string()))
    })
}

/// Resolves with `$last`.
pub fn echo_last(operation_type: &str) -> Arc<dyn Operation> {
    operation_fn(operation_type, |data: KeyedData, _, _| async move { Ok::<Value, OperationError>(data.last().clone()) })
}

/// Resolves with the rendered options.
pub fn echo_options(operation_type: &str) -> Arc<dyn Operation> {
    operation_fn(operation_type, |_, options: Value, _| async move { Ok::<Value, OperationError>(options) })
}

/// Counts invocations and resolves with the count so far.
pub fn counting(operation_type: &str, counter: Arc<AtomicUsize>) -> Arc<dyn Operation> {
    operation_fn(operation_type, move |_, _, _| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Ok::<Value, OperationError>(Value::from(n)) }
    })
}

/// Sends `$trigger` on a channel every time it runs.
pub fn reporting(
    operation_type: &str,
    tx: tokio::sync::mpsc::UnboundedSender<Value>,
) -> Arc<dyn Operation> {
    operation_fn(operation_type, move |data: KeyedData, _, _| {
        let _ = tx.send(data.trigger().clone());
        async move { Ok::<Value, OperationError>(Value::Null) }
    })
}

/// Scheduler that accepts anything except `invalid`, and never ticks.
#[derive(Default)]
pub struct RecordingScheduler {
    pub tasks: Mutex<Vec<ScheduledTask>>,
}

impl RecordingScheduler {
    pub fn active_tasks(&self) -> usize {
        self.tasks.lock().iter().filter(|task| !task.is_stopped()).count()
    }
}

impl Scheduler for RecordingScheduler {
    fn validate(&self, expression: &str) -> bool {
        !expression.is_empty() && expression != "invalid"
    }

    fn schedule(&self, expression: &str, _tick: TickHandler) -> Result<ScheduledTask, TriggerError> {
        let task = ScheduledTask::new(expression, CancellationToken::new());
        self.tasks.lock().push(task.clone());
        Ok(task)
    }
}
