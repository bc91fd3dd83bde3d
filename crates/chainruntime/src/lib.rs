//! Flow execution runtime
//!
//! This crate turns persisted flows into executable operation trees, binds
//! their triggers to the event bus and the cron scheduler, and walks the
//! trees at run time.

mod executor;
mod loader;
mod registry;
mod runtime;
mod schedule;
mod tree;
mod triggers;

pub use executor::{FlowIndex, FlowRun, FlowRunner, OperationExecutor, Step, StepRecord};
pub use loader::{FlowSource, JsonFlowSource, StaticFlowSource};
pub use registry::{OperationRegistry, SharedRegistry};
pub use runtime::{FlowRuntime, LoadPolicy, LoadReport, RuntimeConfig};
pub use schedule::{normalize_cron_expression, parse_schedule, CronScheduler};
pub use tree::materialize;
pub use triggers::{TriggerBinding, TriggerHandlerRecord, TriggerRegistrar};
