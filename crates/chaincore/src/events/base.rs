use crate::{FlowId, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

/// Events emitted while flows run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    FlowStarted {
        run_id: RunId,
        flow_id: FlowId,
        timestamp: DateTime<Utc>,
    },
    OperationStarted {
        run_id: RunId,
        flow_id: FlowId,
        key: String,
        operation_type: String,
        timestamp: DateTime<Utc>,
    },
    OperationFinished {
        run_id: RunId,
        flow_id: FlowId,
        key: String,
        status: StepStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    FlowCompleted {
        run_id: RunId,
        flow_id: FlowId,
        steps: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            Self::FlowStarted { run_id, .. }
            | Self::OperationStarted { run_id, .. }
            | Self::OperationFinished { run_id, .. }
            | Self::FlowCompleted { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast bus for execution events. Events sent with no subscriber are dropped.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
