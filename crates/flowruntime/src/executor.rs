use crate::compiler::{CompiledGraph, CompiledNode, Step};
use crate::wrapper::{self, Invocation};
use chrono::Utc;
use flowcore::{
    labels, Deadline, EventBus, EventEmitter, ExecutionEvent, ExecutionId, ExecutionResult, Flow, NodeError,
    RetryPolicy, Settled, Stopwatch, TaskContext, Timeout, Value,
};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

type NodeOutcome = (usize, Result<Settled, NodeError>, Duration);

/// Executes flows as DAGs with parallel execution.
///
/// Cheap to clone; nested flows are executed by a clone of the executor
/// that started their parent.
#[derive(Clone)]
pub struct FlowExecutor {
    max_parallel: usize,
    events: Option<EventBus>,
}

impl FlowExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Run `flow` with `args`. Failures are reported in the returned
    /// result, never as a panic or a rejected future.
    pub fn execute(&self, flow: Flow, args: Vec<Value>) -> BoxFuture<'static, ExecutionResult> {
        self.execute_scoped(flow, args, None)
    }

    /// Like [`execute`](Self::execute), cancelled together with `parent`.
    pub(crate) fn execute_scoped(
        &self,
        flow: Flow,
        args: Vec<Value>,
        parent: Option<CancellationToken>,
    ) -> BoxFuture<'static, ExecutionResult> {
        let executor = self.clone();
        Box::pin(async move { executor.run(flow, args, parent).await })
    }

    async fn run(self, flow: Flow, args: Vec<Value>, parent: Option<CancellationToken>) -> ExecutionResult {
        let stopwatch = Stopwatch::start();
        let execution_id = ExecutionId::new_v4();
        let settings = flow.settings().clone();

        self.emit(ExecutionEvent::FlowStarted {
            execution_id,
            kind: flow.kind().as_str().to_string(),
            style: flow.style().to_string(),
            timestamp: Utc::now(),
        });
        debug!(%execution_id, kind = flow.kind().as_str(), style = %flow.style(), "Starting flow execution");

        if settings.skip {
            debug!(%execution_id, "Flow skipped");
            return self.finish(execution_id, stopwatch, &flow, 0, BTreeMap::new(), Ok(Value::Null));
        }

        let run = Arc::new(Run {
            id: execution_id,
            args,
            guard: Guard::new(),
            data: Mutex::new(BTreeMap::new()),
            attempts: AtomicU32::new(0),
            cancellation: parent.map(|token| token.child_token()).unwrap_or_default(),
        });

        let outcome = tokio::select! {
            outcome = self.attempts(&flow, &run) => outcome,
            millis = run.guard.expired(), if !settings.optional => {
                run.cancellation.cancel();
                warn!(%execution_id, timeout_ms = millis, "Flow timed out");
                self.emit(ExecutionEvent::TimeoutFired {
                    execution_id,
                    timeout_ms: millis,
                    timestamp: Utc::now(),
                });
                Err(NodeError::Timeout { millis })
            }
        };

        let data = run.data.lock().await.clone();
        let attempts = run.attempts.load(Ordering::SeqCst);
        let result = match outcome {
            Err(e) if settings.optional => {
                debug!(%execution_id, error = %e, "Optional flow failed");
                Ok(data.get(labels::FINAL).map(Settled::result).unwrap_or_default())
            }
            outcome => outcome,
        };

        self.finish(execution_id, stopwatch, &flow, attempts, data, result)
    }

    /// Run the graph until it succeeds or the retry policy is exhausted.
    /// Each attempt compiles a fresh graph and starts with empty data.
    async fn attempts(&self, flow: &Flow, run: &Arc<Run>) -> Result<Value, NodeError> {
        let policy = flow.settings().retry.clone();
        let limit = policy.as_ref().map(RetryPolicy::attempts).unwrap_or(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            run.attempts.store(attempt, Ordering::SeqCst);
            run.data.lock().await.clear();

            let graph = CompiledGraph::compile(flow).map_err(|e| NodeError::Configuration(e.to_string()))?;

            match self.run_graph(graph, run).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < limit => {
                    let delay = policy.as_ref().map(|p| p.delay_after(attempt)).unwrap_or_default();
                    warn!(execution_id = %run.id, attempt, error = %e, "Flow attempt failed, retrying");
                    self.emit(ExecutionEvent::RetryScheduled {
                        execution_id: run.id,
                        attempt: attempt + 1,
                        delay_ms: delay.as_millis() as u64,
                        timestamp: Utc::now(),
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute the DAG with parallelism
    async fn run_graph(&self, compiled: CompiledGraph, run: &Arc<Run>) -> Result<Value, NodeError> {
        let total = compiled.len();
        let CompiledGraph { nodes, graph } = compiled;
        let node_labels: Vec<String> = nodes.iter().map(|node| node.label.clone()).collect();
        let mut pending: Vec<Option<CompiledNode>> = nodes.into_iter().map(Some).collect();

        let mut settled: HashMap<String, Settled> = HashMap::new();
        let mut scheduled = HashSet::new();
        let mut completed = HashSet::new();
        let mut running = FuturesUnordered::new();

        loop {
            if run.cancellation.is_cancelled() {
                debug!(execution_id = %run.id, "Execution cancelled, scheduling stopped");
                return Err(NodeError::Cancelled);
            }
            let mut progressed = false;

            for idx in find_ready_nodes(&graph, &scheduled, &completed) {
                let inline = pending[idx].as_ref().is_some_and(|node| node.step.is_inline());
                if !inline && running.len() >= self.max_parallel {
                    continue;
                }
                let Some(node) = pending[idx].take() else {
                    continue;
                };
                scheduled.insert(idx);

                match self.start(idx, node, &settled, run) {
                    Started::Inline(value) => {
                        if let Some(value) = value {
                            record(run, &mut settled, &node_labels[idx], Settled::Value(value)).await;
                        }
                        completed.insert(idx);
                        progressed = true;
                    }
                    Started::Spawned(handle) => running.push(handle),
                }
            }

            if progressed {
                continue;
            }

            // Wait for next task to complete
            let joined = tokio::select! {
                joined = running.next() => joined,
                _ = run.cancellation.cancelled() => continue,
            };
            let Some(joined) = joined else {
                break;
            };
            let (idx, outcome, elapsed) =
                joined.map_err(|e| NodeError::failed(format!("Task join error: {}", e)))?;
            let label = &node_labels[idx];
            let duration_ms = elapsed.as_millis() as u64;

            match outcome {
                Ok(value) => {
                    debug!(execution_id = %run.id, label = %label, duration_ms, "Node completed");
                    self.emit(ExecutionEvent::NodeCompleted {
                        execution_id: run.id,
                        label: label.clone(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    record(run, &mut settled, label, value).await;
                    completed.insert(idx);
                }
                Err(e) => {
                    error!(execution_id = %run.id, label = %label, error = %e, "Node failed");
                    self.emit(ExecutionEvent::NodeFailed {
                        execution_id: run.id,
                        label: label.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(e);
                }
            }
        }

        if completed.len() != total {
            return Err(NodeError::failed(format!(
                "{} of {} nodes never became ready",
                total - completed.len(),
                total
            )));
        }

        Ok(settled.get(labels::FINAL).map(Settled::result).unwrap_or_default())
    }

    /// Resolve a bookkeeping node in place or spawn the node's work.
    fn start(&self, idx: usize, node: CompiledNode, settled: &HashMap<String, Settled>, run: &Run) -> Started {
        let CompiledNode { label, inject, step, .. } = node;

        match step {
            Step::Meta => Started::Inline(None),
            Step::Input => Started::Inline(Some(Value::Array(run.args.clone()))),
            Step::Guard(timeout) => {
                let deadline = run.guard.arm(timeout);
                debug!(execution_id = %run.id, remaining_ms = deadline.remaining().as_millis() as u64, "Timeout armed");
                Started::Inline(Some(Value::from(deadline.remaining())))
            }
            Step::Wait(duration) => Started::Spawned(tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                (idx, Ok(Settled::Value(Value::from(duration))), duration)
            })),
            Step::Final { reducer, children } => {
                let args = match children {
                    Some(children) => {
                        let results = children
                            .into_iter()
                            .map(|child| {
                                let value = settled.get(&child).map(Settled::result).unwrap_or_default();
                                (child, value)
                            })
                            .collect();
                        vec![Value::Object(results)]
                    }
                    None => wrapper::resolve_args(&inject, settled, &run.args),
                };
                let ctx = TaskContext {
                    events: self.emitter(run.id, &label),
                    label,
                    args,
                    deadline: run.guard.deadline(),
                    cancellation: run.cancellation.clone(),
                };

                Started::Spawned(tokio::spawn(async move {
                    let start = Instant::now();
                    let outcome = reducer.execute(ctx).await.map(Settled::Value);
                    (idx, outcome, start.elapsed())
                }))
            }
            Step::Child(task) => {
                self.emit(ExecutionEvent::NodeStarted {
                    execution_id: run.id,
                    label: label.clone(),
                    timestamp: Utc::now(),
                });

                let invocation = Invocation {
                    events: self.emitter(run.id, &label),
                    args: wrapper::resolve_args(&inject, settled, &run.args),
                    label,
                    task,
                    deadline: run.guard.deadline(),
                    cancellation: run.cancellation.clone(),
                    executor: self.clone(),
                };

                Started::Spawned(tokio::spawn(async move {
                    let start = Instant::now();
                    let outcome = wrapper::invoke(invocation).await;
                    (idx, outcome, start.elapsed())
                }))
            }
        }
    }

    fn finish(
        &self,
        id: ExecutionId,
        stopwatch: Stopwatch,
        flow: &Flow,
        attempts: u32,
        data: BTreeMap<String, Settled>,
        result: Result<Value, NodeError>,
    ) -> ExecutionResult {
        let meta = stopwatch.finish(flow.settings().clone(), attempts);
        let duration_ms = meta.bench.duration.as_millis() as u64;

        self.emit(ExecutionEvent::FlowCompleted {
            execution_id: id,
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });
        match &result {
            Ok(_) => debug!(execution_id = %id, duration_ms, "Flow completed"),
            Err(e) => debug!(execution_id = %id, duration_ms, error = %e, "Flow failed"),
        }

        ExecutionResult { id, meta, data, result }
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn emitter(&self, execution_id: ExecutionId, label: &str) -> EventEmitter {
        match &self.events {
            Some(events) => events.create_emitter(execution_id, label),
            None => EventEmitter::detached(),
        }
    }
}

impl Default for FlowExecutor {
    fn default() -> Self {
        Self::new(crate::RuntimeConfig::default().max_parallel_nodes)
    }
}

enum Started {
    Inline(Option<Value>),
    Spawned(JoinHandle<NodeOutcome>),
}

/// State shared by every attempt of one execution
struct Run {
    id: ExecutionId,
    args: Vec<Value>,
    guard: Guard,
    data: Mutex<BTreeMap<String, Settled>>,
    attempts: AtomicU32,
    cancellation: CancellationToken,
}

async fn record(run: &Run, settled: &mut HashMap<String, Settled>, label: &str, value: Settled) {
    run.data.lock().await.insert(label.to_string(), value.clone());
    settled.insert(label.to_string(), value);
}

/// Find nodes whose dependencies have all completed
fn find_ready_nodes(graph: &DiGraph<usize, ()>, scheduled: &HashSet<usize>, completed: &HashSet<usize>) -> Vec<usize> {
    let mut ready = Vec::new();

    for node in graph.node_indices() {
        let idx = graph[node];
        if scheduled.contains(&idx) {
            continue;
        }

        let dependencies_met = graph
            .neighbors_directed(node, Direction::Incoming)
            .all(|dependency: NodeIndex| completed.contains(&graph[dependency]));

        if dependencies_met {
            ready.push(idx);
        }
    }

    ready
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    deadline: Deadline,
    fires: bool,
    millis: u64,
}

/// Timeout of one execution. Armed at most once, however many attempts run.
struct Guard {
    state: watch::Sender<Option<Armed>>,
}

impl Guard {
    fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    fn arm(&self, timeout: Timeout) -> Deadline {
        self.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(match timeout {
                Timeout::Duration(duration) => Armed {
                    deadline: Deadline::after(duration),
                    fires: true,
                    millis: duration.as_millis() as u64,
                },
                Timeout::Deadline(deadline) => Armed {
                    deadline,
                    fires: false,
                    millis: deadline.remaining().as_millis() as u64,
                },
            });
            true
        });

        self.deadline().unwrap_or_else(|| Deadline::after(timeout.remaining()))
    }

    fn deadline(&self) -> Option<Deadline> {
        let armed = *self.state.borrow();
        armed.map(|armed| armed.deadline)
    }

    /// Resolves with the configured milliseconds once an owned timeout
    /// elapses. Inherited deadlines never resolve here.
    async fn expired(&self) -> u64 {
        let mut state = self.state.subscribe();
        let armed = state.wait_for(Option::is_some).await.ok().and_then(|armed| *armed);

        match armed {
            Some(armed) if armed.fires => {
                tokio::time::sleep_until(armed.deadline.at()).await;
                armed.millis
            }
            _ => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_arms_once() {
        let guard = Guard::new();
        let first = guard.arm(Timeout::Duration(Duration::from_millis(50)));
        let second = guard.arm(Timeout::Duration(Duration::from_secs(10)));

        assert_eq!(first, second);
        assert_eq!(guard.deadline(), Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn inherited_deadline_never_fires() {
        let guard = Guard::new();
        guard.arm(Timeout::Deadline(Deadline::after(Duration::from_millis(5))));

        let fired = tokio::time::timeout(Duration::from_millis(50), guard.expired()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn owned_timeout_fires_with_its_duration() {
        let guard = Guard::new();
        guard.arm(Timeout::Duration(Duration::from_millis(20)));

        assert_eq!(guard.expired().await, 20);
    }
}
