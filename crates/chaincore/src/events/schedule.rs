use crate::TriggerError;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Callback fired on every schedule tick.
pub type TickHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Recurring task scheduler (cron).
pub trait Scheduler: Send + Sync {
    fn validate(&self, expression: &str) -> bool;

    fn schedule(&self, expression: &str, tick: TickHandler) -> Result<ScheduledTask, TriggerError>;
}

/// Handle to a scheduled task. Stopping it prevents any further tick.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    expression: String,
    token: CancellationToken,
}

impl ScheduledTask {
    pub fn new(expression: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            expression: expression.into(),
            token,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}
