use crate::reach::reach_value;
use async_trait::async_trait;
use flowcore::{Flow, NodeError, Task, TaskContext, Value};
use std::collections::HashMap;

/// Mapping of target paths to source paths
#[derive(Debug, Clone, Default)]
pub struct Template {
    pairs: Vec<(String, String)>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `target` to the value found at `source`.
    pub fn map(mut self, target: impl Into<String>, source: impl Into<String>) -> Self {
        self.pairs.push((target.into(), source.into()));
        self
    }

    /// Build a new object from `value`. Later pairs win on conflicting targets.
    pub fn apply(&self, value: &Value) -> Value {
        let mut root = HashMap::new();
        for (target, source) in &self.pairs {
            let segments: Vec<&str> = target.split('.').filter(|s| !s.is_empty()).collect();
            set_path(&mut root, &segments, reach_value(value, source));
        }
        Value::Object(root)
    }
}

impl<T: Into<String>, S: Into<String>> FromIterator<(T, S)> for Template {
    fn from_iter<I: IntoIterator<Item = (T, S)>>(iter: I) -> Self {
        iter.into_iter().fold(Template::new(), |template, (t, s)| template.map(t, s))
    }
}

fn set_path(map: &mut HashMap<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            map.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let slot = map.entry(head.to_string()).or_insert_with(|| Value::Object(HashMap::new()));
            if !matches!(slot, Value::Object(_)) {
                *slot = Value::Object(HashMap::new());
            }
            if let Value::Object(inner) = slot {
                set_path(inner, rest, value);
            }
        }
    }
}

pub struct TransformTask {
    template: Template,
}

#[async_trait]
impl Task for TransformTask {
    fn name(&self) -> &str {
        "transform"
    }

    async fn execute(&self, ctx: TaskContext) -> Result<Value, NodeError> {
        Ok(self.template.apply(&ctx.last_arg()))
    }
}

/// Flow reshaping its input according to `template`.
pub fn transform(template: Template) -> Flow {
    Flow::adapter("transform", TransformTask { template })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_nested_targets() {
        let source: Value = json!({ "user": { "first": "Ada", "last": "Lovelace" }, "id": 7 }).into();
        let template: Template = [("person.name.first", "user.first"), ("person.id", "id"), ("missing", "nope")]
            .into_iter()
            .collect();

        let out = template.apply(&source);
        assert_eq!(reach_value(&out, "person.name.first"), Value::from("Ada"));
        assert_eq!(reach_value(&out, "person.id"), Value::Number(7.0));
        assert_eq!(out.get("missing"), Some(Value::Null));
    }
}
