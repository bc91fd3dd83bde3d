use crate::{KeyedData, OperationError, RuntimeContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Core trait that all operation handlers implement
#[async_trait]
pub trait Operation: Send + Sync {
    /// Unique type identifier (e.g., "log", "trigger")
    fn operation_type(&self) -> &str;

    /// Run the operation. `options` have already been rendered against `data`.
    async fn handle(
        &self,
        data: &KeyedData,
        options: Value,
        ctx: &RuntimeContext,
    ) -> Result<Value, OperationError>;

    /// Optional: description shown by tooling
    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::default()
    }
}

/// Metadata about an operation type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetadata {
    pub description: String,
    pub category: String,
}

impl Default for OperationMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// How a single step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Resolve,
    Reject,
    /// The operation type was not registered.
    Unknown,
}

/// Operation backed by a closure. Handy for embedding and tests.
pub struct FnOperation<F> {
    operation_type: String,
    handler: F,
}

#[async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(KeyedData, Value, RuntimeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, OperationError>> + Send,
{
    fn operation_type(&self) -> &str {
        &self.operation_type
    }

    async fn handle(
        &self,
        data: &KeyedData,
        options: Value,
        ctx: &RuntimeContext,
    ) -> Result<Value, OperationError> {
        (self.handler)(data.clone(), options, ctx.clone()).await
    }
}

pub fn operation_fn<F, Fut>(operation_type: impl Into<String>, handler: F) -> Arc<dyn Operation>
where
    F: Fn(KeyedData, Value, RuntimeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, OperationError>> + Send + 'static,
{
    Arc::new(FnOperation {
        operation_type: operation_type.into(),
        handler,
    })
}
