use async_trait::async_trait;
use chaincore::{KeyedData, Operation, OperationError, OperationMetadata, RuntimeContext};
use serde_json::Value;

/// Writes its `message` option to the log
pub struct LogOperation;

#[async_trait]
impl Operation for LogOperation {
    fn operation_type(&self) -> &str {
        "log"
    }

    async fn handle(
        &self,
        _data: &KeyedData,
        options: Value,
        _ctx: &RuntimeContext,
    ) -> Result<Value, OperationError> {
        let message = match options.get("message") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => "(no message)".to_string(),
            Some(other) => other.to_string(),
        };

        tracing::info!(target: "flows", "{}", message);

        Ok(Value::Null)
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            description: "Log a message".to_string(),
            category: "debug".to_string(),
        }
    }
}
