use async_trait::async_trait;
use chaincore::{FlowId, KeyedData, Operation, OperationError, OperationMetadata, RuntimeContext};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// How an array payload is fanned out to the target flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationMode {
    /// One item at a time, in order.
    Serial,
    /// Chunks of `batchSize` items; items of a chunk run concurrently.
    Batch,
    /// Every item at once.
    #[default]
    Parallel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubflowOptions {
    flow: FlowId,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    iteration_mode: Option<IterationMode>,
    #[serde(default)]
    batch_size: Option<usize>,
}

/// Runs another loaded flow once per payload item (or once for a non-array
/// payload) and returns its result(s), in payload order.
///
/// Failures inside a child run stay inside that run: the child's own reject
/// branches handle them and its return value lands in the result array.
pub struct TriggerOperation;

#[async_trait]
impl Operation for TriggerOperation {
    fn operation_type(&self) -> &str {
        "trigger"
    }

    async fn handle(
        &self,
        _data: &KeyedData,
        options: Value,
        ctx: &RuntimeContext,
    ) -> Result<Value, OperationError> {
        if options.get("flow").map_or(true, Value::is_null) {
            return Err(OperationError::MissingOption("flow".to_string()));
        }
        let options: SubflowOptions = serde_json::from_value(options)
            .map_err(|e| OperationError::invalid_option("options", e.to_string()))?;
        let batch_size = options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(OperationError::invalid_option("batchSize", "a positive integer"));
        }

        let flows = ctx
            .flows()
            .ok_or_else(|| OperationError::Failed("no flow runner available".to_string()))?;
        let flow = options.flow;

        let items = match parse_payload(options.payload) {
            Value::Array(items) => items,
            payload => return Ok(flows.run_operation_flow(flow, payload, ctx.clone()).await),
        };

        let results = match options.iteration_mode.unwrap_or_default() {
            IterationMode::Serial => {
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    results.push(flows.run_operation_flow(flow, item, ctx.clone()).await);
                }
                results
            }
            IterationMode::Batch => {
                let mut results = Vec::with_capacity(items.len());
                for chunk in items.chunks(batch_size) {
                    let runs = chunk
                        .iter()
                        .map(|item| flows.run_operation_flow(flow, item.clone(), ctx.clone()));
                    results.extend(join_all(runs).await);
                }
                results
            }
            IterationMode::Parallel => {
                let runs = items
                    .into_iter()
                    .map(|item| flows.run_operation_flow(flow, item, ctx.clone()));
                join_all(runs).await
            }
        };

        Ok(Value::Array(results))
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            description: "Run another flow for a payload or each item of an array payload".to_string(),
            category: "flow".to_string(),
        }
    }
}

/// String payloads holding JSON are parsed; anything else is used as is.
fn parse_payload(payload: Value) -> Value {
    match payload {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}
