//! Per-path field schema and typed coercion
//!
//! Values read from the view layer are loosely typed (text inputs hand over
//! strings, checkboxes hand over booleans). Every declared field names a
//! semantic type, and a raw value must parse into that type before it may
//! enter the change queue.

use crate::error::ValidationError;
use crate::path::FieldPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Semantic type tag declared by a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    Boolean,
    String,
    /// One of a fixed set of string variants
    Enum(Vec<String>),
}

impl FieldType {
    /// Parse a raw value into this type
    pub fn coerce(&self, path: &FieldPath, raw: &Value) -> Result<Value, ValidationError> {
        let mismatch = || ValidationError::TypeMismatch {
            path: path.to_string(),
            expected: self.to_string(),
            found: describe(raw),
        };

        match self {
            Self::Integer => match raw {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(raw.clone()),
                // Same range as JSON numbers: i64, or u64 above i64::MAX
                Value::String(s) => {
                    let s = s.trim();
                    s.parse::<i64>()
                        .map(Value::from)
                        .or_else(|_| s.parse::<u64>().map(Value::from))
                        .map_err(|_| mismatch())
                }
                _ => Err(mismatch()),
            },
            Self::Float => {
                let parsed = match raw {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                parsed
                    .filter(|f| f.is_finite())
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(mismatch)
            }
            Self::Boolean => match raw {
                Value::Bool(_) => Ok(raw.clone()),
                Value::String(s) => parse_bool(s).map(Value::Bool).ok_or_else(mismatch),
                Value::Number(n) => match n.as_u64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            Self::String => match raw {
                Value::String(_) => Ok(raw.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(mismatch()),
            },
            Self::Enum(variants) => {
                let Value::String(s) = raw else {
                    return Err(mismatch());
                };
                if variants.iter().any(|v| v == s) {
                    Ok(raw.clone())
                } else {
                    Err(ValidationError::NotAllowed {
                        path: path.to_string(),
                        value: s.clone(),
                        allowed: variants.join(", "),
                    })
                }
            }
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::Boolean => f.write_str("boolean"),
            Self::String => f.write_str("string"),
            Self::Enum(variants) => write!(f, "one of [{}]", variants.join(", ")),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn describe(raw: &Value) -> String {
    match raw {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

/// Declared fields of one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<FieldPath, FieldType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field, replacing any earlier declaration for the path
    pub fn declare(&mut self, path: FieldPath, kind: FieldType) -> &mut Self {
        self.fields.insert(path, kind);
        self
    }

    /// Builder form of [`Schema::declare`] taking dotted notation
    pub fn field(mut self, path: &str, kind: FieldType) -> Result<Self, ValidationError> {
        self.declare(FieldPath::parse(path)?, kind);
        Ok(self)
    }

    pub fn get(&self, path: &FieldPath) -> Option<&FieldType> {
        self.fields.get(path)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &FieldType)> {
        self.fields.iter()
    }

    /// Coerce a raw value for a declared field
    pub fn coerce(&self, path: &FieldPath, raw: &Value) -> Result<Value, ValidationError> {
        let kind = self.get(path).ok_or_else(|| ValidationError::UnknownField {
            path: path.to_string(),
        })?;
        kind.coerce(path, raw)
    }
}
