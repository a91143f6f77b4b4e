use crate::executor::FlowExecutor;
use flowcore::{labels, Deadline, EventEmitter, NodeError, NodeTask, Settled, TaskContext, Value};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Everything a spawned child needs, detached from the scheduler's borrows.
pub(crate) struct Invocation {
    pub label: String,
    pub task: NodeTask,
    pub args: Vec<Value>,
    pub deadline: Option<Deadline>,
    pub cancellation: CancellationToken,
    pub events: EventEmitter,
    pub executor: FlowExecutor,
}

/// Positional arguments for a node, in `inject` order.
///
/// `_input` spreads the caller's arguments in place; an execution called
/// with none still passes a single `Null`.
pub(crate) fn resolve_args(inject: &[String], settled: &HashMap<String, Settled>, input: &[Value]) -> Vec<Value> {
    let mut args = Vec::with_capacity(inject.len());

    for label in inject {
        if label == labels::INPUT {
            if input.is_empty() {
                args.push(Value::Null);
            } else {
                args.extend(input.iter().cloned());
            }
        } else {
            args.push(settled.get(label).map(Settled::result).unwrap_or_default());
        }
    }

    args
}

/// Run a child. Nested flows inherit the enclosing deadline and their
/// failure becomes this node's failure.
pub(crate) async fn invoke(invocation: Invocation) -> Result<Settled, NodeError> {
    let Invocation {
        label,
        task,
        args,
        deadline,
        cancellation,
        events,
        executor,
    } = invocation;

    match task {
        NodeTask::Flow(flow) => {
            let flow = flow.inherit_deadline(deadline);
            let execution = executor.execute_scoped(flow, args, Some(cancellation)).await;
            match &execution.result {
                Ok(_) => Ok(Settled::Flow(Box::new(execution))),
                Err(e) => Err(e.clone()),
            }
        }
        NodeTask::Task(task) => {
            let ctx = TaskContext {
                label,
                args,
                deadline,
                cancellation,
                events,
            };
            task.execute(ctx).await.map(Settled::Value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_is_spread_in_place() {
        let mut settled = HashMap::new();
        settled.insert("foo".to_string(), Settled::Value(Value::from("f")));

        let inject = vec!["foo".to_string(), labels::INPUT.to_string()];
        let args = resolve_args(&inject, &settled, &[Value::from(1i64), Value::from(2i64)]);
        assert_eq!(args, vec![Value::from("f"), Value::from(1i64), Value::from(2i64)]);

        let args = resolve_args(&inject, &settled, &[]);
        assert_eq!(args, vec![Value::from("f"), Value::Null]);
    }
}
