use crate::{events::ExecutionId, NodeError, Settings, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Monotonic measurement of an execution
#[derive(Debug, Clone, Copy)]
pub struct Bench {
    pub start: Instant,
    pub end: Instant,
    pub duration: Duration,
}

/// Wall-clock measurement of an execution
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct ExecutionMeta {
    pub bench: Bench,
    pub timer: Timer,
    /// Settings the execution ran with, after deadline reconciliation
    pub settings: Settings,
    /// Number of graph runs, retries included
    pub attempts: u32,
}

/// Started when an execution begins; turned into [`ExecutionMeta`] once.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    bench_start: Instant,
    timer_start: DateTime<Utc>,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            bench_start: Instant::now(),
            timer_start: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.bench_start.elapsed()
    }

    pub fn finish(self, settings: Settings, attempts: u32) -> ExecutionMeta {
        let bench_end = Instant::now();
        let timer_end = Utc::now();

        ExecutionMeta {
            bench: Bench {
                start: self.bench_start,
                end: bench_end,
                duration: bench_end.duration_since(self.bench_start),
            },
            timer: Timer {
                start: self.timer_start,
                end: timer_end,
                duration: timer_end - self.timer_start,
            },
            settings,
            attempts,
        }
    }
}

/// Terminal value of one node
#[derive(Debug, Clone)]
pub enum Settled {
    Value(Value),
    Flow(Box<ExecutionResult>),
}

impl Settled {
    /// The node's value; for a nested flow, that flow's result.
    pub fn result(&self) -> Value {
        match self {
            Settled::Value(value) => value.clone(),
            Settled::Flow(execution) => execution.result.clone().unwrap_or_default(),
        }
    }

    pub fn as_flow(&self) -> Option<&ExecutionResult> {
        match self {
            Settled::Flow(execution) => Some(execution),
            Settled::Value(_) => None,
        }
    }
}

/// Everything one execution produced.
///
/// `result` is `Err` only when the execution failed and the flow was not
/// optional; the error then doubles as the result.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub id: ExecutionId,
    pub meta: ExecutionMeta,
    pub data: BTreeMap<String, Settled>,
    pub result: Result<Value, NodeError>,
}

impl ExecutionResult {
    pub fn error(&self) -> Option<&NodeError> {
        self.result.as_ref().err()
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    /// Settled result of the node registered under `label`.
    pub fn get(&self, label: &str) -> Option<Value> {
        self.data.get(label).map(Settled::result)
    }

    pub fn into_result(self) -> Result<Value, NodeError> {
        self.result
    }
}
