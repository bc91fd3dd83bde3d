use async_trait::async_trait;
use chaincore::{KeyedData, Operation, OperationError, OperationMetadata, RuntimeContext};
use serde_json::Value;

/// Returns its `json` option, parsing it first when it is a string
pub struct TransformOperation;

#[async_trait]
impl Operation for TransformOperation {
    fn operation_type(&self) -> &str {
        "transform"
    }

    async fn handle(
        &self,
        _data: &KeyedData,
        options: Value,
        _ctx: &RuntimeContext,
    ) -> Result<Value, OperationError> {
        match options.get("json") {
            Some(Value::String(text)) => serde_json::from_str(text)
                .map_err(|e| OperationError::Failed(format!("JSON parse error: {}", e))),
            Some(value) => Ok(value.clone()),
            None => Ok(Value::Null),
        }
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            description: "Produce a JSON value, usually built from earlier results".to_string(),
            category: "transform".to_string(),
        }
    }
}
