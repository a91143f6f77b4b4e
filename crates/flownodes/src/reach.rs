use async_trait::async_trait;
use flowcore::{Flow, NodeError, Task, TaskContext, Value};

/// Extract the value at a dotted path.
///
/// Numeric segments index arrays, negative ones from the end. Anything
/// missing along the way yields `Null`. An empty path returns the value.
pub fn reach_value(value: &Value, path: &str) -> Value {
    let mut current = match value {
        Value::Json(json) => Value::from_json(json.clone()),
        other => other.clone(),
    };

    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(mut map) => map.remove(segment).unwrap_or_default(),
            Value::Array(mut items) => match segment.parse::<i64>() {
                Ok(index) => {
                    let len = items.len() as i64;
                    let index = if index < 0 { len + index } else { index };
                    if (0..len).contains(&index) {
                        items.swap_remove(index as usize)
                    } else {
                        Value::Null
                    }
                }
                Err(_) => Value::Null,
            },
            _ => Value::Null,
        };

        if let Value::Json(json) = current {
            current = Value::from_json(json);
        }
    }

    current
}

/// Reach into the incoming value
pub struct ReachTask {
    path: String,
}

impl ReachTask {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Task for ReachTask {
    fn name(&self) -> &str {
        "reach"
    }

    async fn execute(&self, ctx: TaskContext) -> Result<Value, NodeError> {
        Ok(reach_value(&ctx.last_arg(), &self.path))
    }
}

/// Flow resolving to the value at `path` of its input.
pub fn reach(path: impl Into<String>) -> Flow {
    Flow::adapter("reach", ReachTask::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_objects_and_arrays() {
        let value: Value = json!({ "a": { "b": [1, 2, { "c": "deep" }] } }).into();

        assert_eq!(reach_value(&value, "a.b.0"), Value::Number(1.0));
        assert_eq!(reach_value(&value, "a.b.-1.c"), Value::from("deep"));
        assert_eq!(reach_value(&value, "a.b.9"), Value::Null);
        assert_eq!(reach_value(&value, "a.x.y"), Value::Null);
        assert_eq!(reach_value(&value, ""), Value::from_json(json!({ "a": { "b": [1, 2, { "c": "deep" }] } })));
    }
}
