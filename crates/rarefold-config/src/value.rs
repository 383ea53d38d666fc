use crate::shape::FeatureShape;
use serde::Serialize;
use std::collections::BTreeMap;
use strum::Display;

/// A node of the configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Shape(FeatureShape),
    Tree(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    List,
    Shape,
    Tree,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::List(_) => ValueKind::List,
            Value::Shape(_) => ValueKind::Shape,
            Value::Tree(_) => ValueKind::Tree,
        }
    }

    /// Convert `self` so it can be bound where a value of kind `target` lives.
    ///
    /// Integers widen to floats; every other pairing must match exactly.
    pub(crate) fn coerce_to(self, target: ValueKind) -> Option<Value> {
        match (self, target) {
            (Value::Int(v), ValueKind::Float) => Some(Value::Float(v as f64)),
            (value, target) if value.kind() == target => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<FeatureShape> for Value {
    fn from(v: FeatureShape) -> Self {
        Value::Shape(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Tree(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_widens_to_float() {
        assert_eq!(
            Value::Int(3).coerce_to(ValueKind::Float),
            Some(Value::Float(3.0))
        );
        assert_eq!(Value::Float(3.0).coerce_to(ValueKind::Int), None);
        assert_eq!(Value::Bool(true).coerce_to(ValueKind::Str), None);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ValueKind::Bool.to_string(), "bool");
        assert_eq!(Value::from("x").kind(), ValueKind::Str);
    }
}
