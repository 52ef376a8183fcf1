//! Store values and their normalization to plain JSON
//!
//! Values coming out of a graph store are decoded into the tagged
//! [`GraphValue`] enum. [`GraphValue::normalize`] then reduces every variant to
//! a `serde_json::Value` so records can be handed to a language model or
//! returned to callers without any driver-specific wrapper left in them.

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use std::fmt;

/// One result row in store-native form, columns in statement order
pub type GraphRow = IndexMap<String, GraphValue>;

/// One result row after normalization
pub type QueryRecord = IndexMap<String, Value>;

/// Value returned by a graph store
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<GraphValue>),
    Map(IndexMap<String, GraphValue>),
    Node {
        id: i64,
        labels: Vec<String>,
        properties: IndexMap<String, GraphValue>,
    },
    Relationship {
        id: i64,
        start: i64,
        end: i64,
        rel_type: String,
        properties: IndexMap<String, GraphValue>,
    },
    /// Temporal, spatial and path values, kept in their textual form
    Opaque(String),
}

impl GraphValue {
    pub fn is_null(&self) -> bool {
        matches!(self, GraphValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GraphValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            GraphValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            GraphValue::Float(f) => Some(*f),
            GraphValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[GraphValue]> {
        match self {
            GraphValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Elements of a list of strings; `None` if any element is not a string
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        self.as_list()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            GraphValue::Null => "Null",
            GraphValue::Boolean(_) => "Boolean",
            GraphValue::Integer(_) => "Integer",
            GraphValue::Float(_) => "Float",
            GraphValue::String(_) => "String",
            GraphValue::Bytes(_) => "Bytes",
            GraphValue::List(_) => "List",
            GraphValue::Map(_) => "Map",
            GraphValue::Node { .. } => "Node",
            GraphValue::Relationship { .. } => "Relationship",
            GraphValue::Opaque(_) => "Opaque",
        }
    }

    /// Decode a value from a JSON wire payload.
    ///
    /// Objects consisting of exactly two 32-bit integer members `low` and
    /// `high` are the wire encoding of a 64-bit integer and decode to
    /// [`GraphValue::Integer`]. Every other object decodes to a map.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => GraphValue::Null,
            Value::Bool(b) => GraphValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => GraphValue::Integer(i),
                None => GraphValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => GraphValue::String(s),
            Value::Array(items) => {
                GraphValue::List(items.into_iter().map(GraphValue::from_json).collect())
            }
            Value::Object(map) => match wire_integer(&map) {
                Some(i) => GraphValue::Integer(i),
                None => GraphValue::Map(
                    map.into_iter()
                        .map(|(k, v)| (k, GraphValue::from_json(v)))
                        .collect(),
                ),
            },
        }
    }

    /// Reduce the value to plain JSON.
    ///
    /// Integers stay exact 64-bit integers. Non-finite floats have no JSON
    /// number form and become the strings `"NaN"`, `"Infinity"` and
    /// `"-Infinity"`.
    pub fn normalize(&self) -> Value {
        match self {
            GraphValue::Null => Value::Null,
            GraphValue::Boolean(b) => Value::Bool(*b),
            GraphValue::Integer(i) => Value::Number(Number::from(*i)),
            GraphValue::Float(f) => normalize_float(*f),
            GraphValue::String(s) => Value::String(s.clone()),
            GraphValue::Bytes(bytes) => {
                Value::Array(bytes.iter().map(|b| Value::Number(Number::from(*b))).collect())
            }
            GraphValue::List(items) => Value::Array(items.iter().map(GraphValue::normalize).collect()),
            GraphValue::Map(map) => Value::Object(normalize_map(map)),
            GraphValue::Node { id, labels, properties } => {
                let mut obj = Map::new();
                obj.insert("id".to_string(), Value::Number(Number::from(*id)));
                obj.insert(
                    "labels".to_string(),
                    Value::Array(labels.iter().cloned().map(Value::String).collect()),
                );
                obj.insert("properties".to_string(), Value::Object(normalize_map(properties)));
                Value::Object(obj)
            }
            GraphValue::Relationship { id, start, end, rel_type, properties } => {
                let mut obj = Map::new();
                obj.insert("id".to_string(), Value::Number(Number::from(*id)));
                obj.insert("type".to_string(), Value::String(rel_type.clone()));
                obj.insert("start".to_string(), Value::Number(Number::from(*start)));
                obj.insert("end".to_string(), Value::Number(Number::from(*end)));
                obj.insert("properties".to_string(), Value::Object(normalize_map(properties)));
                Value::Object(obj)
            }
            GraphValue::Opaque(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for GraphValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphValue::String(s) | GraphValue::Opaque(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.normalize()),
        }
    }
}

/// Normalize every field of a row
pub fn normalize_row(row: &GraphRow) -> QueryRecord {
    row.iter().map(|(k, v)| (k.clone(), v.normalize())).collect()
}

fn normalize_map(map: &IndexMap<String, GraphValue>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.normalize())).collect()
}

fn normalize_float(f: f64) -> Value {
    match Number::from_f64(f) {
        Some(n) => Value::Number(n),
        None if f.is_nan() => Value::String("NaN".to_string()),
        None if f > 0.0 => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}

fn wire_integer(map: &Map<String, Value>) -> Option<i64> {
    if map.len() != 2 {
        return None;
    }
    let low = i32::try_from(map.get("low")?.as_i64()?).ok()?;
    let high = i32::try_from(map.get("high")?.as_i64()?).ok()?;
    Some(((high as i64) << 32) | (low as u32 as i64))
}

impl From<&str> for GraphValue {
    fn from(s: &str) -> Self {
        GraphValue::String(s.to_string())
    }
}

impl From<String> for GraphValue {
    fn from(s: String) -> Self {
        GraphValue::String(s)
    }
}

impl From<i64> for GraphValue {
    fn from(i: i64) -> Self {
        GraphValue::Integer(i)
    }
}

impl From<f64> for GraphValue {
    fn from(f: f64) -> Self {
        GraphValue::Float(f)
    }
}

impl From<bool> for GraphValue {
    fn from(b: bool) -> Self {
        GraphValue::Boolean(b)
    }
}

impl<T: Into<GraphValue>> From<Vec<T>> for GraphValue {
    fn from(items: Vec<T>) -> Self {
        GraphValue::List(items.into_iter().map(Into::into).collect())
    }
}
