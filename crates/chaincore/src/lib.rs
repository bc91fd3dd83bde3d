//! Core abstractions for the flow engine
//!
//! This crate provides the data model shared by every other component:
//! persisted and materialized flows, the per-run keyed data, the operation
//! handler trait and the collaborator interfaces (event hooks, scheduler).
//! It has no runtime logic of its own.

mod context;
mod error;
pub mod events;
mod flow;
mod operation;
pub mod template;

pub use context::{
    FlowInvoker, KeyedData, RuntimeContext, ACCOUNTABILITY_KEY, ALL_KEY, ENV_KEY, LAST_KEY,
    TRIGGER_KEY,
};
pub use error::{FlowError, OperationError, TriggerError};
pub use events::*;
pub use flow::{
    Edge, Flow, FlowId, FlowRecord, FlowStatus, OperationId, OperationNode, OperationRecord,
    TriggerKind, TriggerOptions,
};
pub use operation::{operation_fn, FnOperation, Operation, OperationMetadata, StepStatus};

/// Result type for flow loading
pub type Result<T> = std::result::Result<T, FlowError>;
