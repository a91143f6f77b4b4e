use crate::node::{task_fn, NodeTask};
use crate::{labels, BuildError, Flow, FlowKind, Node, NodeError, Style, Task, Value};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

/// Caller-supplied description of a flow, decided once at construction
#[derive(Clone, Default)]
pub enum Spec {
    #[default]
    Empty,
    Task(Arc<dyn Task>),
    Sequence(Vec<Spec>),
    Keyed(KeyedSpec),
    Flow(Flow),
}

impl Spec {
    pub fn task(task: impl Task + 'static) -> Self {
        Spec::Task(Arc::new(task))
    }

    /// Shorthand for `Spec::task(task_fn(f))`.
    pub fn func<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
    {
        Spec::task(task_fn(f))
    }

    pub fn keyed() -> KeyedSpec {
        KeyedSpec::default()
    }
}

impl From<Flow> for Spec {
    fn from(flow: Flow) -> Self {
        Spec::Flow(flow)
    }
}

impl From<Vec<Spec>> for Spec {
    fn from(items: Vec<Spec>) -> Self {
        Spec::Sequence(items)
    }
}

impl From<KeyedSpec> for Spec {
    fn from(keyed: KeyedSpec) -> Self {
        Spec::Keyed(keyed)
    }
}

impl From<Arc<dyn Task>> for Spec {
    fn from(task: Arc<dyn Task>) -> Self {
        Spec::Task(task)
    }
}

/// Keyed mapping of labels to tasks, with optional dependency lists.
///
/// Insertion order is kept; it only affects the order of the children.
#[derive(Clone, Default)]
pub struct KeyedSpec {
    entries: Vec<KeyedEntry>,
}

#[derive(Clone)]
pub struct KeyedEntry {
    pub key: String,
    pub depends: Vec<String>,
    pub spec: Spec,
}

impl KeyedSpec {
    pub fn entry(self, key: impl Into<String>, spec: impl Into<Spec>) -> Self {
        self.entry_after(key, Vec::<String>::new(), spec)
    }

    /// Add an entry that runs once every label in `depends` has settled and
    /// receives their results as arguments, in order.
    pub fn entry_after<I, S>(mut self, key: impl Into<String>, depends: I, spec: impl Into<Spec>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.push(KeyedEntry {
            key: key.into(),
            depends: depends.into_iter().map(Into::into).collect(),
            spec: spec.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a top-level flow.
///
/// A single-element sequence is unwrapped once. A lone, already built flow
/// is rejected: wrapping it would only add an empty layer.
pub fn flow(spec: impl Into<Spec>) -> Result<Flow, BuildError> {
    let spec = match spec.into() {
        Spec::Sequence(mut items) if items.len() == 1 => items.pop().unwrap_or_default(),
        other => other,
    };

    if let Spec::Flow(_) = spec {
        return Err(BuildError::DegenerateComposition);
    }

    Flow::build(spec)
}

impl Flow {
    /// Convert a `Spec` into a flow, recursively. An existing flow is
    /// returned as is.
    pub fn build(spec: impl Into<Spec>) -> Result<Flow, BuildError> {
        match spec.into() {
            Spec::Empty => Ok(Flow::empty()),
            Spec::Task(task) => Ok(Flow::from_parts(
                FlowKind::Flow,
                Style::Series,
                vec![Node::new(NodeTask::Task(task))],
            )),
            Spec::Flow(flow) => Ok(flow),
            Spec::Sequence(items) => {
                let children = items
                    .into_iter()
                    .map(|item| Ok(Node::new(NodeTask::Flow(Flow::build(item)?))))
                    .collect::<Result<Vec<_>, BuildError>>()?;

                Ok(Flow::from_parts(FlowKind::Flow, Style::Series, children))
            }
            Spec::Keyed(keyed) => build_keyed(keyed),
        }
    }

    /// Flow made of exactly one labeled task, used by adapters.
    pub fn adapter(kind: &'static str, task: impl Task + 'static) -> Flow {
        let node = Node::new(NodeTask::Task(Arc::new(task))).with_label(kind);
        Flow::from_parts(FlowKind::Adapter(kind), Style::Series, vec![node])
    }
}

fn build_keyed(keyed: KeyedSpec) -> Result<Flow, BuildError> {
    let mut keys = HashSet::new();
    for entry in &keyed.entries {
        if entry.key.is_empty() {
            return Err(BuildError::Invalid("task label must not be empty".to_string()));
        }
        if labels::is_reserved(&entry.key) {
            return Err(BuildError::ReservedLabel(entry.key.clone()));
        }
        if !keys.insert(entry.key.as_str()) {
            return Err(BuildError::DuplicateLabel(entry.key.clone()));
        }
    }

    let mut graph = DiGraph::<&str, ()>::new();
    let index: HashMap<&str, _> = keyed
        .entries
        .iter()
        .map(|entry| (entry.key.as_str(), graph.add_node(entry.key.as_str())))
        .collect();

    for entry in &keyed.entries {
        for dependency in &entry.depends {
            if dependency == labels::INPUT {
                continue;
            }
            let from = index.get(dependency.as_str()).ok_or_else(|| BuildError::UnknownDependency {
                label: entry.key.clone(),
                dependency: dependency.clone(),
            })?;
            graph.add_edge(*from, index[entry.key.as_str()], ());
        }
    }

    if toposort(&graph, None).is_err() {
        return Err(BuildError::CyclicDependency);
    }

    let mut style = Style::Parallel;
    let mut children = Vec::with_capacity(keyed.entries.len());

    for entry in keyed.entries {
        let mut depends: Vec<String> = Vec::with_capacity(entry.depends.len());
        for dependency in entry.depends {
            if !depends.contains(&dependency) {
                depends.push(dependency);
            }
        }
        if !depends.is_empty() {
            style = Style::Auto;
        }

        let task = NodeTask::Flow(Flow::build(entry.spec)?);
        children.push(Node::new(task).with_label(entry.key).with_depends(depends));
    }

    tracing::debug!(entries = children.len(), style = %style, "Built keyed flow");
    Ok(Flow::from_parts(FlowKind::Flow, style, children))
}
