//! Core abstractions for the flow engine
//!
//! This crate provides the flow value, its construction and configuration
//! API, and the types every execution produces. It does not execute
//! anything; see `flowruntime`.

mod builtin;
mod error;
pub mod events;
mod flow;
pub mod labels;
mod node;
mod result;
mod schema;
mod settings;
mod spec;
mod tree;
mod value;

pub use builtin::{input, input_with_schema, wait};
pub use error::{BuildError, FlowError, NodeError};
pub use events::*;
pub use flow::{Flow, FlowKind, Style};
pub use node::{task_fn, Node, NodeTask, Task, TaskContext, TaskFn};
pub use result::{Bench, ExecutionMeta, ExecutionResult, Settled, Stopwatch, Timer};
pub use schema::{Field, Schema};
pub use settings::{Deadline, RetryPolicy, Settings, Timeout};
pub use spec::{flow, KeyedEntry, KeyedSpec, Spec};
pub use value::Value;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
