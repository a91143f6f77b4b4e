use crate::{labels, BuildError, Deadline, Node, RetryPolicy, Settings, Spec, Task, Timeout};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the children of a flow are ordered at execution time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Strict chain, each child consumes its predecessor's result
    Series,
    /// No ordering between children
    Parallel,
    /// Ordering derived from declared dependencies
    Auto,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Series => "series",
            Style::Parallel => "parallel",
            Style::Auto => "auto",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag identifying what built a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Flow,
    Input,
    Wait,
    Adapter(&'static str),
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Flow => "flow",
            FlowKind::Input => "input",
            FlowKind::Wait => "wait",
            FlowKind::Adapter(name) => name,
        }
    }
}

/// Immutable, possibly nested task tree plus its settings.
///
/// Every configuration method returns a new `Flow`. Children are shared
/// between the copies, settings are copied.
#[derive(Clone)]
pub struct Flow {
    kind: FlowKind,
    style: Style,
    children: Arc<Vec<Node>>,
    reducer: Option<Arc<dyn Task>>,
    settings: Settings,
}

impl Flow {
    /// A flow with no children. Executes as a no-op.
    pub fn empty() -> Self {
        Self::from_parts(FlowKind::Flow, Style::Series, Vec::new())
    }

    pub(crate) fn from_parts(kind: FlowKind, style: Style, children: Vec<Node>) -> Self {
        Self {
            kind,
            style,
            children: Arc::new(children),
            reducer: None,
            settings: Settings::default(),
        }
    }

    pub(crate) fn with_wait(mut self, wait: Duration) -> Self {
        self.settings.wait = wait;
        self
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn reducer(&self) -> Option<&Arc<dyn Task>> {
        self.reducer.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// True when both values share the same children allocation.
    pub fn shares_children(&self, other: &Flow) -> bool {
        Arc::ptr_eq(&self.children, &other.children)
    }

    fn ensure_no_dependencies(&self, style: Style) -> Result<(), BuildError> {
        for (index, child) in self.children.iter().enumerate() {
            if !child.depends.is_empty() {
                return Err(BuildError::StyleConflict {
                    style: format!("{:?}", style),
                    label: child.label.clone().unwrap_or_else(|| labels::generated(index)),
                    depends: child.depends.join(", "),
                });
            }
        }
        Ok(())
    }

    // Flow style

    pub fn series(&self) -> Result<Flow, BuildError> {
        self.ensure_no_dependencies(Style::Series)?;

        let mut flow = self.clone();
        flow.style = Style::Series;
        Ok(flow)
    }

    pub fn parallel(&self) -> Result<Flow, BuildError> {
        self.ensure_no_dependencies(Style::Parallel)?;

        let mut flow = self.clone();
        flow.style = Style::Parallel;
        Ok(flow)
    }

    pub fn auto(&self) -> Flow {
        let mut flow = self.clone();
        flow.style = Style::Auto;
        flow
    }

    // Flow options

    pub fn skip(&self) -> Flow {
        let mut flow = self.clone();
        flow.settings.skip = true;
        flow
    }

    pub fn retry(&self, policy: RetryPolicy) -> Flow {
        let mut flow = self.clone();
        flow.settings.retry = Some(policy);
        flow
    }

    pub fn required(&self) -> Flow {
        let mut flow = self.clone();
        flow.settings.optional = false;
        flow
    }

    pub fn optional(&self) -> Flow {
        let mut flow = self.clone();
        flow.settings.optional = true;
        flow
    }

    /// Bound the execution time. Accepts a duration the flow owns or a
    /// deadline inherited from elsewhere.
    pub fn timeout(&self, timeout: impl Into<Timeout>) -> Result<Flow, BuildError> {
        let timeout = timeout.into();
        if let Timeout::Duration(d) = timeout {
            if d.is_zero() {
                return Err(BuildError::InvalidSetting {
                    setting: "timeout".to_string(),
                    reason: "must be a positive duration".to_string(),
                });
            }
        }

        let mut flow = self.clone();
        flow.settings.timeout = Some(timeout);
        Ok(flow)
    }

    /// Apply an ancestor's deadline. The flow's own timeout survives only if
    /// it ends no later than the ancestor's.
    pub fn inherit_deadline(&self, deadline: Option<Deadline>) -> Flow {
        let timeout = Timeout::reconcile(self.settings.timeout, deadline);
        if timeout == self.settings.timeout {
            return self.clone();
        }

        let mut flow = self.clone();
        flow.settings.timeout = timeout;
        flow
    }

    /// Delay the start of the children by `wait`.
    pub fn wait(&self, wait: Duration) -> Flow {
        self.clone().with_wait(wait)
    }

    /// Replace the reducer computing the flow's result.
    pub fn finalize(&self, reducer: impl Task + 'static) -> Flow {
        let mut flow = self.clone();
        flow.reducer = Some(Arc::new(reducer));
        flow
    }

    /// Rebuild the children from a new `Spec`, keeping style and settings.
    pub fn tasks(&self, spec: impl Into<Spec>) -> Result<Flow, BuildError> {
        let built = Flow::build(spec)?;

        let mut flow = self.clone();
        flow.children = built.children.clone();
        if flow.style != Style::Auto {
            flow.ensure_no_dependencies(flow.style)?;
        }
        Ok(flow)
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("kind", &self.kind)
            .field("style", &self.style)
            .field("children", &self.children)
            .field("reducer", &self.reducer.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for Flow {
    fn default() -> Self {
        Self::empty()
    }
}
