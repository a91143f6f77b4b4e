use crate::{labels, Flow, Node, NodeTask};
use std::fmt::Write;

const INDENT: usize = 4;

impl Flow {
    /// Indented text rendering of the flow's structure.
    ///
    /// ```text
    /// root [auto]:
    ///     foo [series]:
    ///         [Function: ]
    ///     bar [series] (foo):
    ///         [Function: ]
    /// ```
    pub fn tree(&self) -> String {
        let mut out = String::new();
        render_flow("root", &[], self, 0, &mut out);
        out
    }
}

fn render_flow(label: &str, depends: &[String], flow: &Flow, level: usize, out: &mut String) {
    let depends = if depends.is_empty() {
        String::new()
    } else {
        format!(" ({})", depends.join(", "))
    };
    let _ = writeln!(out, "{:indent$}{} [{}]{}:", "", label, flow.style(), depends, indent = level);

    for (index, child) in flow.children().iter().enumerate() {
        render_node(child, index, level + INDENT, out);
    }
}

fn render_node(node: &Node, index: usize, level: usize, out: &mut String) {
    match &node.task {
        NodeTask::Task(task) => {
            let name = node.label.as_deref().unwrap_or_else(|| task.name());
            let _ = writeln!(out, "{:indent$}[Function: {}]", "", name, indent = level);
        }
        NodeTask::Flow(flow) => {
            let label = node.label.clone().unwrap_or_else(|| labels::generated(index));
            render_flow(&label, &node.depends, flow, level, out);
        }
    }
}
