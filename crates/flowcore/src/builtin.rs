use crate::node::{task_fn, NodeTask};
use crate::{labels, Flow, FlowKind, Node, NodeError, Schema, Style, Task, TaskContext, Value};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const INPUT_LABEL: &str = "input";
const WAIT_LABEL: &str = "wait";

/// Flow yielding the arguments it was given: one argument as is, several as
/// an array, none as `Null`.
pub fn input() -> Flow {
    input_flow(None)
}

/// Like [`input`], failing the node when the produced value does not match
/// `schema`.
pub fn input_with_schema(schema: Schema) -> Flow {
    input_flow(Some(schema))
}

/// Flow that sleeps for `duration`, then yields it in milliseconds.
pub fn wait(duration: Duration) -> Flow {
    let passthrough = task_fn(|args: Vec<Value>| async move { Ok(args.into_iter().next().unwrap_or_default()) });
    let node = Node::new(NodeTask::Task(Arc::new(passthrough.named(WAIT_LABEL))))
        .with_label(WAIT_LABEL)
        .with_depends(vec![labels::WAIT.to_string()]);

    Flow::from_parts(FlowKind::Wait, Style::Auto, vec![node])
        .with_wait(duration)
        .finalize(pick(WAIT_LABEL))
}

fn input_flow(schema: Option<Schema>) -> Flow {
    let node = Node::new(NodeTask::Task(Arc::new(InputTask { schema })))
        .with_label(INPUT_LABEL)
        .with_depends(vec![labels::INPUT.to_string()]);

    Flow::from_parts(FlowKind::Input, Style::Auto, vec![node]).finalize(pick(INPUT_LABEL))
}

/// Reducer returning one child's result out of the children object.
fn pick(label: &'static str) -> impl Task {
    task_fn(move |args: Vec<Value>| async move {
        Ok(args
            .first()
            .and_then(|children| children.get(label))
            .unwrap_or_default())
    })
}

struct InputTask {
    schema: Option<Schema>,
}

#[async_trait]
impl Task for InputTask {
    fn name(&self) -> &str {
        INPUT_LABEL
    }

    async fn execute(&self, ctx: TaskContext) -> Result<Value, NodeError> {
        let mut args = ctx.args;
        let value = match args.len() {
            0 => Value::Null,
            1 => args.pop().unwrap_or_default(),
            _ => Value::Array(args),
        };

        if let Some(schema) = &self.schema {
            schema.validate(&value)?;
        }

        Ok(value)
    }
}
