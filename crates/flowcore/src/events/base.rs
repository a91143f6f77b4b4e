use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during flow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    FlowStarted {
        execution_id: ExecutionId,
        kind: String,
        style: String,
        timestamp: DateTime<Utc>,
    },
    FlowCompleted {
        execution_id: ExecutionId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: ExecutionId,
        label: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        label: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        execution_id: ExecutionId,
        label: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    RetryScheduled {
        execution_id: ExecutionId,
        attempt: u32,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
    TimeoutFired {
        execution_id: ExecutionId,
        timeout_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        execution_id: ExecutionId,
        label: String,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::FlowStarted { execution_id, .. }
            | ExecutionEvent::FlowCompleted { execution_id, .. }
            | ExecutionEvent::NodeStarted { execution_id, .. }
            | ExecutionEvent::NodeCompleted { execution_id, .. }
            | ExecutionEvent::NodeFailed { execution_id, .. }
            | ExecutionEvent::RetryScheduled { execution_id, .. }
            | ExecutionEvent::TimeoutFired { execution_id, .. }
            | ExecutionEvent::NodeEvent { execution_id, .. } => *execution_id,
        }
    }
}

/// Events specific to task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
    Data { key: String, value: Value },
}

/// Event emitter for tasks to send real-time updates.
///
/// A detached emitter (no bus attached) silently drops everything.
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    label: String,
    sender: Option<broadcast::Sender<ExecutionEvent>>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        label: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            label: label.into(),
            sender: Some(sender),
        }
    }

    pub fn detached() -> Self {
        Self {
            execution_id: Uuid::nil(),
            label: String::new(),
            sender: None,
        }
    }

    /// Emit a task-specific event
    pub fn emit(&self, event: NodeEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(ExecutionEvent::NodeEvent {
                execution_id: self.execution_id,
                label: self.label.clone(),
                event,
                timestamp: Utc::now(),
            });
        }
    }

    /// Emit info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    /// Emit warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }

    /// Emit progress update
    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(NodeEvent::Progress { percent, message });
    }

    /// Publish an intermediate value under `key`
    pub fn data(&self, key: impl Into<String>, value: Value) {
        self.emit(NodeEvent::Data {
            key: key.into(),
            value,
        });
    }
}

/// Broadcast bus shared by every execution of a runtime
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
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

    pub fn create_emitter(&self, execution_id: ExecutionId, label: impl Into<String>) -> EventEmitter {
        EventEmitter::new(execution_id, label, self.sender.clone())
    }
}
