//! Operation parameters.
//!
//! Params are an owned, string-keyed JSON object. Operations receive them at
//! construction time and never see the framework's reserved request keys.

use std::fmt;

use serde_json::{Map, Value};

use super::error::OpError;

/// Request bookkeeping keys stripped from every operation's params.
pub const RESERVED_PARAM_KEYS: [&str; 3] = ["authenticity_token", "_method", "utf8"];

const FILTERED_PLACEHOLDER: &str = "[FILTERED]";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn without_reserved(mut self) -> Self {
        for key in RESERVED_PARAM_KEYS {
            self.0.remove(key);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Numbers, or their string form as sent in query strings.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_u64(),
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Follows a key path through nested objects. A present `null` is `Some(Null)`.
    pub fn dig(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(*first)?;
        for key in rest {
            current = current.as_object()?.get(*key)?;
        }
        Some(current)
    }

    /// The object stored under `key`, or an empty object.
    pub fn object(&self, key: &str) -> Map<String, Value> {
        match self.0.get(key) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// A copy with the values of every matching key replaced, at any depth.
    pub fn filtered(&self, keys: &[String]) -> Params {
        Params(filter_map(&self.0, keys))
    }
}

fn filter_map(map: &Map<String, Value>, keys: &[String]) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let value = if keys.iter().any(|k| k == key) {
                Value::String(FILTERED_PLACEHOLDER.to_string())
            } else {
                filter_value(value, keys)
            };
            (key.clone(), value)
        })
        .collect()
}

fn filter_value(value: &Value, keys: &[String]) -> Value {
    match value {
        Value::Object(map) => Value::Object(filter_map(map, keys)),
        Value::Array(items) => Value::Array(items.iter().map(|v| filter_value(v, keys)).collect()),
        other => other.clone(),
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Params {
    type Error = OpError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(OpError::InvalidParams(other.to_string())),
        }
    }
}

/// Anything that can become operation params.
pub trait IntoParams {
    fn into_params(self) -> Result<Params, OpError>;
}

impl IntoParams for Params {
    fn into_params(self) -> Result<Params, OpError> {
        Ok(self)
    }
}

impl IntoParams for Value {
    fn into_params(self) -> Result<Params, OpError> {
        Params::try_from(self)
    }
}

impl IntoParams for Map<String, Value> {
    fn into_params(self) -> Result<Params, OpError> {
        Ok(Params(self))
    }
}

impl IntoParams for () {
    fn into_params(self) -> Result<Params, OpError> {
        Ok(Params::new())
    }
}
