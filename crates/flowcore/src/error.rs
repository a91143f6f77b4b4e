use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Flow not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure reported by a task, a nested flow or the timeout guard.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Flow timeout of {millis}(ms) occurred")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::ExecutionFailed(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, NodeError::Timeout { .. })
    }
}

/// Construction-time rejection of a flow description or setting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Invalid flow: {0}")]
    Invalid(String),

    #[error("Will not create new flow that consists of only a single flow")]
    DegenerateComposition,

    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),

    #[error("Label '{0}' is reserved")]
    ReservedLabel(String),

    #[error("Task '{label}' depends on unknown task '{dependency}'")]
    UnknownDependency { label: String, dependency: String },

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Cannot convert style to {style}. Child task {label} has dependency {depends}")]
    StyleConflict {
        style: String,
        label: String,
        depends: String,
    },

    #[error("Invalid setting '{setting}': {reason}")]
    InvalidSetting { setting: String, reason: String },
}
