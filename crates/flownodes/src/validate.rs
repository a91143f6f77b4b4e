use async_trait::async_trait;
use flowcore::{Flow, NodeError, Schema, Task, TaskContext, Value};

pub struct ValidateTask {
    schema: Schema,
}

#[async_trait]
impl Task for ValidateTask {
    fn name(&self) -> &str {
        "validate"
    }

    async fn execute(&self, ctx: TaskContext) -> Result<Value, NodeError> {
        let value = ctx.last_arg();
        self.schema.validate(&value)?;
        Ok(value)
    }
}

/// Flow passing its input through when it matches `schema`.
pub fn validate(schema: Schema) -> Flow {
    Flow::adapter("validate", ValidateTask { schema })
}
