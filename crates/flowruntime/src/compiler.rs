use flowcore::{labels, task_fn, BuildError, Flow, FlowKind, NodeTask, Style, Task, Timeout, Value};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What a compiled node does when it runs
pub(crate) enum Step {
    /// Marks the start of the run
    Meta,
    /// Sleeps before any child starts
    Wait(Duration),
    /// Arms the execution's timeout guard
    Guard(Timeout),
    /// Captures the caller's arguments
    Input,
    /// One of the flow's children
    Child(NodeTask),
    /// Aggregation. `children` is set for parallel/auto flows, whose reducer
    /// receives an object of every child result.
    Final {
        reducer: Arc<dyn Task>,
        children: Option<Vec<String>>,
    },
}

impl Step {
    /// Bookkeeping resolved by the scheduler itself, without a spawned task.
    pub(crate) fn is_inline(&self) -> bool {
        matches!(self, Step::Meta | Step::Guard(_) | Step::Input)
    }
}

pub(crate) struct CompiledNode {
    pub label: String,
    pub depends: Vec<String>,
    /// Labels whose results are passed to the task, in order
    pub inject: Vec<String>,
    pub step: Step,
}

/// Runnable graph for one execution of a flow. Never reused.
pub(crate) struct CompiledGraph {
    pub nodes: Vec<CompiledNode>,
    pub graph: DiGraph<usize, ()>,
}

impl CompiledGraph {
    pub(crate) fn compile(flow: &Flow) -> Result<Self, BuildError> {
        let settings = flow.settings();
        let mut nodes = Vec::with_capacity(flow.children().len() + 5);
        let mut pre = vec![labels::META.to_string()];

        nodes.push(bookkeeping(labels::META, Vec::new(), Step::Meta));

        let wait_needed = !settings.wait.is_zero()
            || flow
                .children()
                .iter()
                .any(|child| child.depends.iter().any(|d| d == labels::WAIT));
        if wait_needed {
            nodes.push(bookkeeping(labels::WAIT, pre.clone(), Step::Wait(settings.wait)));
            pre.push(labels::WAIT.to_string());
        }

        if let Some(timeout) = settings.timeout {
            nodes.push(bookkeeping(labels::TIMEOUT, pre.clone(), Step::Guard(timeout)));
            pre.push(labels::TIMEOUT.to_string());
        }

        nodes.push(bookkeeping(labels::INPUT, pre.clone(), Step::Input));
        pre.push(labels::INPUT.to_string());

        let series = flow.style() == Style::Series;
        let mut last = labels::INPUT.to_string();
        let mut children = Vec::with_capacity(flow.children().len());

        for (index, child) in flow.children().iter().enumerate() {
            let consumes_input = child.depends.is_empty()
                && matches!(child.task.as_flow().map(Flow::kind), Some(FlowKind::Input));
            let input: Vec<String> = if consumes_input {
                vec![labels::INPUT.to_string()]
            } else {
                Vec::new()
            };

            let label = child.label.clone().unwrap_or_else(|| labels::generated(index));
            let (depends, inject) = if series {
                (
                    unique(pre.iter().chain([&last])),
                    unique([&last].into_iter().chain(input.iter())),
                )
            } else {
                (
                    unique(pre.iter().chain(input.iter()).chain(child.depends.iter())),
                    unique(input.iter().chain(child.depends.iter())),
                )
            };

            nodes.push(CompiledNode {
                label: label.clone(),
                depends,
                inject,
                step: Step::Child(child.task.clone()),
            });
            children.push(label.clone());
            last = label;
        }

        let reducer = flow.reducer().cloned().unwrap_or_else(|| default_reducer(flow.style()));
        let last_node = if series {
            CompiledNode {
                label: labels::FINAL.to_string(),
                depends: unique(pre.iter().chain([&last])),
                inject: vec![last],
                step: Step::Final {
                    reducer,
                    children: None,
                },
            }
        } else {
            CompiledNode {
                label: labels::FINAL.to_string(),
                depends: nodes.iter().map(|node| node.label.clone()).collect(),
                inject: Vec::new(),
                step: Step::Final {
                    reducer,
                    children: Some(children),
                },
            }
        };
        nodes.push(last_node);

        let graph = build_graph(&nodes)?;
        Ok(Self { nodes, graph })
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

fn bookkeeping(label: &str, depends: Vec<String>, step: Step) -> CompiledNode {
    CompiledNode {
        label: label.to_string(),
        depends,
        inject: Vec::new(),
        step,
    }
}

fn unique<'a>(labels: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        if !out.contains(label) {
            out.push(label.clone());
        }
    }
    out
}

fn default_reducer(style: Style) -> Arc<dyn Task> {
    match style {
        Style::Series => Arc::new(task_fn(|args: Vec<Value>| async move {
            Ok(args.into_iter().next().unwrap_or_default())
        })),
        Style::Parallel | Style::Auto => Arc::new(task_fn(|_: Vec<Value>| async { Ok(Value::Null) })),
    }
}

fn build_graph(nodes: &[CompiledNode]) -> Result<DiGraph<usize, ()>, BuildError> {
    let mut graph = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for (position, node) in nodes.iter().enumerate() {
        if index.insert(node.label.as_str(), graph.add_node(position)).is_some() {
            return Err(BuildError::DuplicateLabel(node.label.clone()));
        }
    }

    for node in nodes {
        let to = index[node.label.as_str()];
        for dependency in &node.depends {
            let from = index
                .get(dependency.as_str())
                .ok_or_else(|| BuildError::UnknownDependency {
                    label: node.label.clone(),
                    dependency: dependency.clone(),
                })?;
            graph.add_edge(*from, to, ());
        }
    }

    if toposort(&graph, None).is_err() {
        return Err(BuildError::CyclicDependency);
    }

    Ok(graph)
}
