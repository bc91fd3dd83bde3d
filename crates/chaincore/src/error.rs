use crate::flow::{Edge, FlowId, OperationId};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Flow {flow}: operation {operation} has a {edge} successor {missing} that does not exist in the flow")]
    MissingSuccessor {
        flow: FlowId,
        operation: OperationId,
        edge: Edge,
        missing: OperationId,
    },

    #[error("Flow {flow}: operations form a cycle")]
    CyclicFlow { flow: FlowId },

    #[error("Flow not found: {0}")]
    NotFound(FlowId),

    #[error("Invalid flow: {0}")]
    InvalidFlow(String),

    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure raised by an operation handler.
///
/// The executor never propagates these; it stores [`OperationError::into_value`]
/// in the keyed data and follows the `reject` edge.
#[derive(Error, Debug, Clone)]
pub enum OperationError {
    #[error("Missing required option: {0}")]
    MissingOption(String),

    #[error("Invalid option '{field}': expected {expected}")]
    InvalidOption { field: String, expected: String },

    #[error("Operation failed: {0}")]
    Failed(String),

    /// Reject with an arbitrary payload, handed to the reject branch as is.
    #[error("Operation rejected: {0}")]
    Rejected(Value),
}

impl OperationError {
    pub fn invalid_option(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidOption {
            field: field.into(),
            expected: expected.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingOption(_) => "MISSING_OPTION",
            Self::InvalidOption { .. } => "INVALID_OPTION",
            Self::Failed(_) => "OPERATION_FAILED",
            Self::Rejected(_) => "OPERATION_REJECTED",
        }
    }

    /// Value stored in the context when a handler fails.
    pub fn into_value(self) -> Value {
        match self {
            Self::Rejected(value) => value,
            other => json!({
                "code": other.code(),
                "message": other.to_string(),
            }),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum TriggerError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_payload_is_kept_verbatim() {
        let err = OperationError::Rejected(json!({"status": 404}));
        assert_eq!(err.into_value(), json!({"status": 404}));
    }

    #[test]
    fn other_failures_become_code_and_message() {
        let value = OperationError::MissingOption("flow".into()).into_value();
        assert_eq!(value["code"], "MISSING_OPTION");
        assert_eq!(value["message"], "Missing required option: flow");
    }
}
