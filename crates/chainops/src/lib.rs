//! Standard operation library
//!
//! Built-in operations, including the `trigger` operation that fans out to
//! other flows.

mod log;
mod request;
mod sleep;
mod transform;
mod trigger;

pub use log::LogOperation;
pub use request::RequestOperation;
pub use sleep::SleepOperation;
pub use transform::TransformOperation;
pub use trigger::{IterationMode, TriggerOperation, DEFAULT_BATCH_SIZE};
use chainruntime::OperationRegistry;

use std::sync::Arc;

/// Register all standard operations with a registry
pub fn register_all(registry: &mut OperationRegistry) {
    registry.register(Arc::new(LogOperation));
    registry.register(Arc::new(RequestOperation::new()));
    registry.register(Arc::new(SleepOperation));
    registry.register(Arc::new(TransformOperation));
    registry.register(Arc::new(TriggerOperation));
}
