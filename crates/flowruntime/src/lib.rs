//! Flow execution runtime
//!
//! This crate compiles flows into dependency graphs and runs them: the
//! executor schedules ready nodes in parallel, applies wait, timeout and
//! retry settings, and collects every node's result.

mod compiler;
mod executor;
pub mod logging;
mod runtime;
mod wrapper;

pub use executor::FlowExecutor;
pub use logging::init_logging;
pub use runtime::{execute, FlowRuntime, RuntimeConfig};
