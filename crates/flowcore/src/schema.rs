use crate::{NodeError, Value};

/// Structural description of an accepted value.
///
/// Object schemas only check the fields they list; unknown fields pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Any,
    Null,
    Bool,
    Number,
    String,
    Array(Box<Schema>),
    Object(Vec<Field>),
    OneOf(Vec<Schema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

impl Schema {
    pub fn array(items: Schema) -> Self {
        Schema::Array(Box::new(items))
    }

    pub fn object() -> Self {
        Schema::Object(Vec::new())
    }

    /// Add a required field. No-op on non-object schemas.
    pub fn field(self, name: impl Into<String>, schema: Schema) -> Self {
        self.push_field(name.into(), schema, true)
    }

    pub fn optional_field(self, name: impl Into<String>, schema: Schema) -> Self {
        self.push_field(name.into(), schema, false)
    }

    fn push_field(mut self, name: String, schema: Schema, required: bool) -> Self {
        if let Schema::Object(fields) = &mut self {
            fields.push(Field { name, schema, required });
        }
        self
    }

    pub fn validate(&self, value: &Value) -> Result<(), NodeError> {
        self.check("value", value)
    }

    fn check(&self, path: &str, value: &Value) -> Result<(), NodeError> {
        if let Value::Json(json) = value {
            return self.check(path, &Value::from_json(json.clone()));
        }

        let matches = match (self, value) {
            (Schema::Any, _) => true,
            (Schema::Null, Value::Null) => true,
            (Schema::Bool, Value::Bool(_)) => true,
            (Schema::Number, Value::Number(_)) => true,
            (Schema::String, Value::String(_)) => true,
            (Schema::Array(items), Value::Array(values)) => {
                for (index, item) in values.iter().enumerate() {
                    items.check(&format!("{}.{}", path, index), item)?;
                }
                true
            }
            (Schema::Object(fields), Value::Object(map)) => {
                for field in fields {
                    let field_path = format!("{}.{}", path, field.name);
                    match map.get(&field.name) {
                        Some(item) => field.schema.check(&field_path, item)?,
                        None if field.required => return Err(NodeError::MissingInput(field_path)),
                        None => {}
                    }
                }
                true
            }
            (Schema::OneOf(alternatives), _) => alternatives.iter().any(|alt| alt.check(path, value).is_ok()),
            _ => false,
        };

        if matches {
            Ok(())
        } else {
            Err(NodeError::InvalidInputType {
                field: path.to_string(),
                expected: self.describe(),
                actual: value.kind().to_string(),
            })
        }
    }

    fn describe(&self) -> String {
        match self {
            Schema::Any => "any".to_string(),
            Schema::Null => "null".to_string(),
            Schema::Bool => "boolean".to_string(),
            Schema::Number => "number".to_string(),
            Schema::String => "string".to_string(),
            Schema::Array(items) => format!("array of {}", items.describe()),
            Schema::Object(_) => "object".to_string(),
            Schema::OneOf(alternatives) => alternatives
                .iter()
                .map(Schema::describe)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn person(name: Value) -> Value {
        let mut map = HashMap::new();
        map.insert("name".to_string(), name);
        Value::Object(map)
    }

    #[test]
    fn object_fields_are_checked_by_path() {
        let schema = Schema::object()
            .field("name", Schema::String)
            .optional_field("age", Schema::Number);

        assert!(schema.validate(&person("ada".into())).is_ok());

        let err = schema.validate(&person(Value::Number(1.0))).unwrap_err();
        assert_eq!(
            err,
            NodeError::InvalidInputType {
                field: "value.name".to_string(),
                expected: "string".to_string(),
                actual: "number".to_string(),
            }
        );

        let missing = schema.validate(&Value::Object(HashMap::new())).unwrap_err();
        assert_eq!(missing, NodeError::MissingInput("value.name".to_string()));
    }

    #[test]
    fn json_values_are_validated_natively() {
        let schema = Schema::array(Schema::OneOf(vec![Schema::Number, Schema::Null]));

        assert!(schema.validate(&serde_json::json!([1, null, 2]).into()).is_ok());
        assert!(schema.validate(&serde_json::json!([1, "x"]).into()).is_err());
    }
}
