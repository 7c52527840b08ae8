//! Params schemas.
//!
//! A schema checks, and may normalize, an operation's params before any other
//! `on_init` policy sees them. [`JsonSchema`] validates against a JSON Schema
//! document; anything else implements [`Schema`].

use std::fmt;

use serde_json::{Map, Value};

use super::error::OpError;
use super::params::Params;

pub trait Schema: fmt::Debug + Send + Sync {
    /// Validates `params` in place. Defaults may be filled in, values cast.
    fn validate(&self, params: &mut Params) -> Result<(), OpError>;
}

/// A compiled JSON Schema for the top-level params object.
///
/// Before validating, absent top-level properties get their schema `default`
/// and string values of `integer`, `number` and `boolean` properties are cast,
/// since form and query params arrive as strings.
pub struct JsonSchema {
    schema: Value,
    validator: jsonschema::Validator,
}

impl JsonSchema {
    pub fn new(schema: Value) -> Result<Self, OpError> {
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| OpError::definition(format!("Invalid params schema: {e}")))?;
        Ok(Self { schema, validator })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    fn properties(&self) -> Option<&Map<String, Value>> {
        self.schema.get("properties").and_then(Value::as_object)
    }

    fn normalize(&self, params: &mut Params) {
        let Some(properties) = self.properties() else {
            return;
        };
        for (name, property) in properties {
            match params.get(name) {
                None | Some(Value::Null) => {
                    if let Some(default) = property.get("default") {
                        params.insert(name.clone(), default.clone());
                    }
                }
                Some(Value::String(s)) => {
                    let ty = property.get("type").and_then(Value::as_str);
                    if let Some(cast) = ty.and_then(|ty| cast_string(ty, s)) {
                        params.insert(name.clone(), cast);
                    }
                }
                Some(_) => {}
            }
        }
    }
}

fn cast_string(ty: &str, s: &str) -> Option<Value> {
    match ty {
        "integer" => s.trim().parse::<i64>().ok().map(Value::from),
        "number" => s.trim().parse::<f64>().ok().map(Value::from),
        "boolean" => match s {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("schema", &self.schema)
            .finish()
    }
}

impl Schema for JsonSchema {
    fn validate(&self, params: &mut Params) -> Result<(), OpError> {
        self.normalize(params);

        let instance = params.to_value();
        let errors: Vec<String> = self
            .validator
            .iter_errors(&instance)
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("{path}: {e}")
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OpError::ParamsInvalid { errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        Params::try_from(value).unwrap()
    }

    fn id_schema() -> JsonSchema {
        JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "name": { "type": "string" },
                "notify": { "type": "boolean", "default": false }
            },
            "required": ["id"],
            "additionalProperties": false
        }))
        .unwrap()
    }

    #[test]
    fn casts_and_fills_defaults() {
        let mut p = params(json!({ "id": "42" }));

        id_schema().validate(&mut p).unwrap();

        assert_eq!(p.to_value(), json!({ "id": 42, "notify": false }));
    }

    #[test]
    fn collects_every_violation() {
        let mut p = params(json!({ "name": 3, "extra": true }));

        let err = id_schema().validate(&mut p).unwrap_err();

        let errors = match err {
            OpError::ParamsInvalid { errors } => errors,
            other => panic!("unexpected error {other:?}"),
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.starts_with("/: ") && e.contains("\"id\"")));
        assert!(errors.iter().any(|e| e.starts_with("/name: ")));
        assert!(errors.iter().any(|e| e.starts_with("/: ") && e.contains("extra")));
    }

    #[test]
    fn uncastable_strings_are_reported() {
        let mut p = params(json!({ "id": "forty-two" }));

        let err = id_schema().validate(&mut p).unwrap_err();

        assert!(matches!(err, OpError::ParamsInvalid { ref errors } if errors.len() == 1 && errors[0].starts_with("/id: ")));
    }

    #[test]
    fn invalid_schemas_are_rejected() {
        let err = JsonSchema::new(json!({ "type": 12 })).unwrap_err();
        assert!(matches!(err, OpError::Definition(_)));
    }
}
