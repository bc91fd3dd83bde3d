// crates/chaincore/src/events/mod.rs

mod base;
mod hooks;
mod schedule;

pub use base::{EventBus, ExecutionEvent, RunId};
pub use hooks::{ActionHandler, EventHooks, FilterHandler, HookBus, InitHandler};
pub use schedule::{ScheduledTask, Scheduler, TickHandler};
