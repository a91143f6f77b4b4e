use crate::FlowExecutor;
use flowcore::{BuildError, EventBus, ExecutionEvent, ExecutionResult, Flow, FlowError, Spec, Value};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

/// Main runtime for executing flows
pub struct FlowRuntime {
    executor: FlowExecutor,
    event_bus: EventBus,
    flows: Arc<RwLock<HashMap<String, Flow>>>,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);
        let executor = FlowExecutor::new(config.max_parallel_nodes).with_events(event_bus.clone());

        Self {
            executor,
            event_bus,
            flows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a flow under `name`, replacing any previous one
    pub async fn register(&self, name: impl Into<String>, flow: Flow) {
        let mut flows = self.flows.write().await;
        flows.insert(name.into(), flow);
    }

    /// Execute a registered flow by name
    pub async fn execute_registered(&self, name: &str, args: Vec<Value>) -> Result<ExecutionResult, FlowError> {
        let flow = {
            let flows = self.flows.read().await;
            flows
                .get(name)
                .cloned()
                .ok_or_else(|| FlowError::NotFound(name.to_string()))?
        };

        Ok(self.execute_flow(flow, args).await)
    }

    /// Build `spec` into a flow and execute it (without registration)
    pub async fn execute(&self, args: Vec<Value>, spec: impl Into<Spec>) -> Result<ExecutionResult, BuildError> {
        let flow = Flow::build(spec)?;
        Ok(self.execute_flow(flow, args).await)
    }

    pub async fn execute_flow(&self, flow: Flow, args: Vec<Value>) -> ExecutionResult {
        info!(kind = flow.kind().as_str(), style = %flow.style(), "Starting flow execution");

        let execution = self.executor.execute(flow, args).await;
        match &execution.result {
            Ok(_) => info!(
                execution_id = %execution.id,
                duration_ms = execution.meta.bench.duration.as_millis() as u64,
                "Flow execution completed"
            ),
            Err(e) => warn!(execution_id = %execution.id, error = %e, "Flow execution failed"),
        }

        execution
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Build `spec` into a flow and execute it without an event bus.
///
/// The parallelism cap comes from [`RuntimeConfig::from_env`]. A plain task
/// is wrapped in a one-child series flow; a flow runs as is. Only
/// construction can fail here; execution failures are reported in the
/// returned result.
pub async fn execute(args: Vec<Value>, spec: impl Into<Spec>) -> Result<ExecutionResult, BuildError> {
    let flow = Flow::build(spec)?;
    let config = RuntimeConfig::from_env();
    Ok(FlowExecutor::new(config.max_parallel_nodes).execute(flow, args).await)
}

/// Configuration for the runtime
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    pub const MAX_PARALLEL_ENV: &'static str = "FLOWENGINE_MAX_PARALLEL";
    pub const EVENT_BUFFER_ENV: &'static str = "FLOWENGINE_EVENT_BUFFER";

    /// Defaults overridden by `FLOWENGINE_MAX_PARALLEL` and
    /// `FLOWENGINE_EVENT_BUFFER`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_parallel_nodes: env_usize(Self::MAX_PARALLEL_ENV).unwrap_or(defaults.max_parallel_nodes),
            event_buffer_size: env_usize(Self::EVENT_BUFFER_ENV).unwrap_or(defaults.event_buffer_size),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1000,
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(variable = name, value = %raw, "Ignoring invalid runtime setting");
            None
        }
    }
}
