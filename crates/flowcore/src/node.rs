use crate::{events::EventEmitter, Deadline, Flow, NodeError, Value};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Core trait for a single unit of work
#[async_trait]
pub trait Task: Send + Sync {
    /// Name used in logs and tree rendering
    fn name(&self) -> &str {
        ""
    }

    /// Run the task with the injected arguments in `ctx`
    async fn execute(&self, ctx: TaskContext) -> Result<Value, NodeError>;
}

/// Execution context passed to each task
#[derive(Clone)]
pub struct TaskContext {
    /// Label of the node running this task
    pub label: String,

    /// Positional arguments resolved from upstream nodes
    pub args: Vec<Value>,

    /// Budget of the enclosing flow, if one is armed
    pub deadline: Option<Deadline>,

    /// Cancelled when the enclosing execution gives up (timeout)
    pub cancellation: CancellationToken,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl TaskContext {
    pub fn new(label: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            label: label.into(),
            args,
            deadline: None,
            cancellation: CancellationToken::new(),
            events: EventEmitter::detached(),
        }
    }

    /// Get positional argument or return error
    pub fn require_arg(&self, index: usize) -> Result<&Value, NodeError> {
        self.args
            .get(index)
            .ok_or_else(|| NodeError::MissingInput(format!("argument {}", index)))
    }

    /// Last positional argument, `Null` when there is none
    pub fn last_arg(&self) -> Value {
        self.args.last().cloned().unwrap_or_default()
    }
}

/// Adapter turning an async closure over the argument list into a [`Task`]
pub struct TaskFn<F> {
    name: String,
    f: F,
}

/// Wrap `f` as a task.
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
{
    TaskFn {
        name: String::new(),
        f,
    }
}

impl<F> TaskFn<F> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: TaskContext) -> Result<Value, NodeError> {
        (self.f)(ctx.args).await
    }
}

/// Payload of a node: a primitive task or a nested flow
#[derive(Clone)]
pub enum NodeTask {
    Task(Arc<dyn Task>),
    Flow(Flow),
}

impl NodeTask {
    pub fn as_flow(&self) -> Option<&Flow> {
        match self {
            NodeTask::Flow(flow) => Some(flow),
            NodeTask::Task(_) => None,
        }
    }

    pub fn is_flow(&self) -> bool {
        self.as_flow().is_some()
    }
}

impl fmt::Debug for NodeTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTask::Task(task) => write!(f, "Task({:?})", task.name()),
            NodeTask::Flow(flow) => f.debug_tuple("Flow").field(flow).finish(),
        }
    }
}

/// One labeled unit of work inside a flow
#[derive(Debug, Clone)]
pub struct Node {
    pub label: Option<String>,
    pub depends: Vec<String>,
    pub task: NodeTask,
}

impl Node {
    pub fn new(task: NodeTask) -> Self {
        Self {
            label: None,
            depends: Vec::new(),
            task,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_depends(mut self, depends: Vec<String>) -> Self {
        self.depends = depends;
        self
    }
}
