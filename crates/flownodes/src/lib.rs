//! Standard adapter library
//!
//! Ready-made single-task flows for common operations: path extraction,
//! reshaping, validation and outbound HTTP.

mod http;
mod reach;
mod transform;
mod validate;

pub use http::{wreck, Wreck, WreckDefaults, WreckTask};
pub use reach::{reach, reach_value, ReachTask};
pub use transform::{transform, Template, TransformTask};
pub use validate::{validate, ValidateTask};
