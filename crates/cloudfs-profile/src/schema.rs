//! Structural validation of profile configuration documents.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// JSON value kinds a configuration key may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    /// A number without a fractional part.
    Integer,
    /// Any number, integer or not.
    Number,
    String,
    Array,
    Object,
    Any,
}

impl ValueKind {
    /// Whether `value` is of this kind.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ValueKind::Null => value.is_null(),
            ValueKind::Bool => value.is_boolean(),
            ValueKind::Integer => value.is_i64() || value.is_u64(),
            ValueKind::Number => value.is_number(),
            ValueKind::String => value.is_string(),
            ValueKind::Array => value.is_array(),
            ValueKind::Object => value.is_object(),
            ValueKind::Any => true,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// Configuration validation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("config must be an object, found {0}")]
    NotAnObject(String),

    #[error("missing required key '{0}'")]
    MissingKey(String),

    #[error("unknown key '{0}'")]
    UnknownKey(String),

    #[error("key '{key}' must be of type {expected}, found {found}")]
    WrongType {
        key: String,
        expected: ValueKind,
        found: String,
    },
}

#[derive(Debug, Clone)]
struct KeyRule {
    kind: ValueKind,
    required: bool,
}

/// Shape of a service's configuration object.
///
/// ```
/// use cloudfs_profile::{ConfigSchema, ValueKind};
/// use serde_json::json;
///
/// let schema = ConfigSchema::new()
///     .required("limit", ValueKind::Integer)
///     .optional("label", ValueKind::String);
///
/// assert!(schema.validate(&json!({"limit": 10})).is_ok());
/// assert!(schema.validate(&json!({"limit": "ten"})).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    keys: BTreeMap<String, KeyRule>,
    allow_extra: bool,
}

impl ConfigSchema {
    /// An empty schema that accepts only `{}`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a key that must be present.
    pub fn required(mut self, key: impl Into<String>, kind: ValueKind) -> Self {
        self.keys.insert(key.into(), KeyRule { kind, required: true });
        self
    }

    /// Declare a key that may be omitted.
    pub fn optional(mut self, key: impl Into<String>, kind: ValueKind) -> Self {
        self.keys.insert(key.into(), KeyRule { kind, required: false });
        self
    }

    /// Accept keys the schema does not declare.
    pub fn allow_extra(mut self, allow: bool) -> Self {
        self.allow_extra = allow;
        self
    }

    /// Check `config` against the schema.
    pub fn validate(&self, config: &Value) -> Result<(), SchemaError> {
        let object = match config {
            Value::Object(object) => object,
            other => return Err(SchemaError::NotAnObject(kind_of(other).to_string())),
        };

        for (key, rule) in &self.keys {
            match object.get(key) {
                Some(value) if !rule.kind.matches(value) => {
                    return Err(SchemaError::WrongType {
                        key: key.clone(),
                        expected: rule.kind,
                        found: kind_of(value).to_string(),
                    });
                }
                Some(_) => {}
                None if rule.required => return Err(SchemaError::MissingKey(key.clone())),
                None => {}
            }
        }

        if !self.allow_extra {
            if let Some(extra) = unknown_key(object, &self.keys) {
                return Err(SchemaError::UnknownKey(extra.clone()));
            }
        }
        Ok(())
    }
}

fn unknown_key<'a>(
    object: &'a Map<String, Value>,
    keys: &BTreeMap<String, KeyRule>,
) -> Option<&'a String> {
    object.keys().find(|key| !keys.contains_key(*key))
}

fn kind_of(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(n) if n.is_f64() => ValueKind::Number,
        Value::Number(_) => ValueKind::Integer,
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .required("limit", ValueKind::Integer)
            .optional("refresh_interval_secs", ValueKind::Integer)
    }

    #[test]
    fn accepts_required_and_optional_keys() {
        assert!(schema().validate(&json!({"limit": 10})).is_ok());
        assert!(schema()
            .validate(&json!({"limit": 10, "refresh_interval_secs": 5}))
            .is_ok());
    }

    #[test]
    fn rejects_missing_and_mistyped_keys() {
        assert_eq!(
            schema().validate(&json!({})),
            Err(SchemaError::MissingKey("limit".into()))
        );
        assert_eq!(
            schema().validate(&json!({"limit": 1.5})),
            Err(SchemaError::WrongType {
                key: "limit".into(),
                expected: ValueKind::Integer,
                found: "number".into(),
            })
        );
        assert!(matches!(
            schema().validate(&json!([1, 2])),
            Err(SchemaError::NotAnObject(_))
        ));
    }

    #[test]
    fn extra_keys_need_opt_in() {
        let config = json!({"limit": 1, "colour": "blue"});
        assert_eq!(
            schema().validate(&config),
            Err(SchemaError::UnknownKey("colour".into()))
        );
        assert!(schema().allow_extra(true).validate(&config).is_ok());
    }

    #[test]
    fn number_accepts_integers() {
        let schema = ConfigSchema::new().required("ratio", ValueKind::Number);
        assert!(schema.validate(&json!({"ratio": 2})).is_ok());
        assert!(schema.validate(&json!({"ratio": 0.5})).is_ok());
    }
}
