use crate::registry::SharedRegistry;
use async_trait::async_trait;
use chaincore::template::render_options;
use chaincore::{
    EventBus, ExecutionEvent, Flow, FlowId, FlowInvoker, KeyedData, OperationNode, RunId,
    RuntimeContext, StepStatus, TriggerKind,
};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Loaded flows by id, shared between the runtime and every runner clone.
pub type FlowIndex = Arc<RwLock<HashMap<FlowId, Arc<Flow>>>>;

/// Outcome of one executed node: where to go next and what it produced.
#[derive(Debug)]
pub struct Step<'a> {
    pub next: Option<&'a OperationNode>,
    pub value: Value,
    pub status: StepStatus,
}

/// Runs a single operation node against the registry.
#[derive(Clone)]
pub struct OperationExecutor {
    registry: SharedRegistry,
}

impl OperationExecutor {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Execute `node`. Never fails: handler errors (and panics) become the
    /// step value and select the `reject` successor; an unregistered type
    /// ends the branch with `null`.
    pub async fn step<'a>(
        &self,
        node: &'a OperationNode,
        data: &KeyedData,
        ctx: &RuntimeContext,
    ) -> Step<'a> {
        let operation = self.registry.read().get(&node.operation_type);
        let Some(operation) = operation else {
            tracing::warn!("Couldn't find operation {}", node.operation_type);
            return Step {
                next: None,
                value: Value::Null,
                status: StepStatus::Unknown,
            };
        };

        let options = render_options(&node.options, data);
        let outcome = AssertUnwindSafe(operation.handle(data, options, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => Step {
                next: node.resolve.as_deref(),
                value,
                status: StepStatus::Resolve,
            },
            Ok(Err(err)) => {
                tracing::debug!("Operation {} ({}) rejected: {}", node.key, node.operation_type, err);
                Step {
                    next: node.reject.as_deref(),
                    value: err.into_value(),
                    status: StepStatus::Reject,
                }
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "operation panicked".to_string());
                tracing::error!("Operation {} ({}) panicked: {}", node.key, node.operation_type, message);
                Step {
                    next: node.reject.as_deref(),
                    value: json!({ "code": "OPERATION_PANICKED", "message": message }),
                    status: StepStatus::Reject,
                }
            }
        }
    }
}

/// One visited operation in a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub key: String,
    pub operation_type: String,
    pub status: StepStatus,
}

/// Result of a run with its trace
#[derive(Debug, Clone)]
pub struct FlowRun {
    pub run_id: RunId,
    pub value: Value,
    pub steps: Vec<StepRecord>,
    pub data: KeyedData,
}

impl FlowRun {
    pub fn visited(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.key.as_str()).collect()
    }
}

/// Walks a materialized flow from its root to a terminal successor.
#[derive(Clone)]
pub struct FlowRunner {
    executor: OperationExecutor,
    flows: FlowIndex,
    events: Arc<EventBus>,
    env: Arc<Map<String, Value>>,
}

impl FlowRunner {
    pub fn new(registry: SharedRegistry, events: Arc<EventBus>, env: Map<String, Value>) -> Self {
        Self {
            executor: OperationExecutor::new(registry),
            flows: Arc::new(RwLock::new(HashMap::new())),
            events,
            env: Arc::new(env),
        }
    }

    /// Flows that sub-flow invocations can reach.
    pub fn flows(&self) -> &FlowIndex {
        &self.flows
    }

    pub async fn run(&self, flow: &Flow, data: Value, ctx: RuntimeContext) -> Value {
        self.run_with_report(flow, data, ctx).await.value
    }

    pub async fn run_with_report(&self, flow: &Flow, data: Value, ctx: RuntimeContext) -> FlowRun {
        let run_id = RunId::new_v4();
        let start_time = Instant::now();

        self.events.emit(ExecutionEvent::FlowStarted {
            run_id,
            flow_id: flow.id,
            timestamp: Utc::now(),
        });
        tracing::debug!("Starting flow {} ({}), run {}", flow.name, flow.id, run_id);

        let ctx = ctx.with_flows(Arc::new(self.clone()));
        let mut keyed = KeyedData::new(data, ctx.accountability.clone(), (*self.env).clone());
        let mut steps = Vec::new();
        let mut current = flow.root.as_deref();

        while let Some(node) = current {
            self.events.emit(ExecutionEvent::OperationStarted {
                run_id,
                flow_id: flow.id,
                key: node.key.clone(),
                operation_type: node.operation_type.clone(),
                timestamp: Utc::now(),
            });

            let started = Instant::now();
            let step = self.executor.step(node, &keyed, &ctx).await;
            keyed.record(&node.key, step.value);

            self.events.emit(ExecutionEvent::OperationFinished {
                run_id,
                flow_id: flow.id,
                key: node.key.clone(),
                status: step.status,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });

            steps.push(StepRecord {
                key: node.key.clone(),
                operation_type: node.operation_type.clone(),
                status: step.status,
            });
            current = step.next;
        }

        let value = keyed.select(flow.options.return_key.as_deref());
        let duration_ms = start_time.elapsed().as_millis() as u64;

        self.events.emit(ExecutionEvent::FlowCompleted {
            run_id,
            flow_id: flow.id,
            steps: steps.len(),
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::debug!("Flow {} finished after {} steps in {}ms", flow.id, steps.len(), duration_ms);

        FlowRun {
            run_id,
            value,
            steps,
            data: keyed,
        }
    }
}

#[async_trait]
impl FlowInvoker for FlowRunner {
    async fn run_operation_flow(&self, flow: FlowId, data: Value, ctx: RuntimeContext) -> Value {
        let target = self.flows.read().get(&flow).cloned();
        // The index holds every loaded flow; only operation-triggered ones are invocable.
        let Some(target) = target.filter(|target| target.trigger == TriggerKind::Operation) else {
            tracing::warn!("Couldn't find operation triggered flow with id \"{}\"", flow);
            return Value::Null;
        };
        self.run(&target, data, ctx).await
    }
}
