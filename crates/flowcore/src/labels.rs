//! Labels of the bookkeeping nodes every compiled flow carries.

pub const META: &str = "_meta";
pub const WAIT: &str = "_wait";
pub const TIMEOUT: &str = "_timeout";
pub const INPUT: &str = "_input";
pub const FINAL: &str = "_final";

pub fn is_reserved(label: &str) -> bool {
    label.starts_with('_')
}

/// Label given to the `index`-th child when it has none.
pub fn generated(index: usize) -> String {
    format!("task_{}", index)
}
