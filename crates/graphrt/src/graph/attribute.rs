use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Typed attribute payload attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
}

impl AttributeValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Float(_) => "float",
            AttributeValue::Int(_) => "int",
            AttributeValue::String(_) => "string",
            AttributeValue::Floats(_) => "floats",
            AttributeValue::Ints(_) => "ints",
            AttributeValue::Strings(_) => "strings",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::String(v) => write!(f, "{v:?}"),
            AttributeValue::Floats(v) => write!(f, "{v:?}"),
            AttributeValue::Ints(v) => write!(f, "{v:?}"),
            AttributeValue::Strings(v) => write!(f, "{v:?}"),
        }
    }
}

/// Attribute bag keyed by name. Ordered so snapshots are stable.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Conversion out of an [`AttributeValue`].
pub trait FromAttribute: Sized {
    /// Attribute kind expected, used in error messages.
    const KIND: &'static str;

    fn from_attribute(value: &AttributeValue) -> Option<Self>;
}

impl FromAttribute for f32 {
    const KIND: &'static str = "float";

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromAttribute for i64 {
    const KIND: &'static str = "int";

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromAttribute for bool {
    const KIND: &'static str = "int";

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl FromAttribute for String {
    const KIND: &'static str = "string";

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromAttribute for Vec<f32> {
    const KIND: &'static str = "floats";

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Floats(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromAttribute for Vec<i64> {
    const KIND: &'static str = "ints";

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Ints(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromAttribute for Vec<String> {
    const KIND: &'static str = "strings";

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Strings(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<Vec<f32>> for AttributeValue {
    fn from(value: Vec<f32>) -> Self {
        AttributeValue::Floats(value)
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(value: Vec<i64>) -> Self {
        AttributeValue::Ints(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::Strings(value)
    }
}
