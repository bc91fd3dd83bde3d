use async_trait::async_trait;
use chaincore::{KeyedData, Operation, OperationError, OperationMetadata, RuntimeContext};
use serde_json::Value;
use tokio::time::{sleep, Duration};

/// Delay the flow for `milliseconds`
pub struct SleepOperation;

#[async_trait]
impl Operation for SleepOperation {
    fn operation_type(&self) -> &str {
        "sleep"
    }

    async fn handle(
        &self,
        _data: &KeyedData,
        options: Value,
        _ctx: &RuntimeContext,
    ) -> Result<Value, OperationError> {
        let milliseconds = match options.get("milliseconds") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            None | Some(Value::Null) => return Err(OperationError::MissingOption("milliseconds".to_string())),
            Some(_) => None,
        }
        .ok_or_else(|| OperationError::invalid_option("milliseconds", "a non-negative integer"))?;

        tracing::debug!("Sleeping for {}ms", milliseconds);
        sleep(Duration::from_millis(milliseconds)).await;

        Ok(Value::Null)
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            description: "Delay execution for the given milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
