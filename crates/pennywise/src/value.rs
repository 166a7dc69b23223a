//! value representation
//!
//! A resolved attribute is one of
//! - string (utf-8)
//! - integer (signed, i64)
//! - boolean (true/false)
//! - list (ordered, elements share one kind when decoded from an expression)
//! - record (order-preserving "map", where the key is of type string)
//! - absent (not resolved yet, or failed to resolve)
//!
//! `Absent` is not `null`: it marks a value the engine could not produce. Callers must
//! treat it as "unresolved", never as "intentionally empty".
//!
//! Equality is structural. Lists compare element-wise in order, records compare as maps
//! (key order is ignored). This is the equality the resolver uses to detect a fixed point.
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

pub type Record = indexmap::IndexMap<String, Value>;

/// All possible value kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Boolean(bool),
    List(Vec<Value>),
    Record(Record),
    Absent,
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Convert into a value the expression evaluator understands
    ///
    /// `Absent` has no counterpart: record entries holding it are left out so that
    /// references to them stay unresolved. Inside lists it becomes `null` to keep indices.
    pub fn to_hcl(&self) -> Option<hcl::Value> {
        match self {
            Value::String(s) => Some(hcl::Value::String(s.clone())),
            Value::Integer(i) => Some(hcl::Value::Number(hcl::Number::from(*i))),
            Value::Boolean(b) => Some(hcl::Value::Bool(*b)),
            Value::List(list) => Some(hcl::Value::Array(
                list.iter()
                    .map(|value| value.to_hcl().unwrap_or(hcl::Value::Null))
                    .collect(),
            )),
            Value::Record(record) => Some(hcl::Value::Object(
                record
                    .iter()
                    .filter_map(|(key, value)| value.to_hcl().map(|value| (key.clone(), value)))
                    .collect(),
            )),
            Value::Absent => None,
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::List(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Record(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
            Value::Absent => serializer.serialize_none(),
        }
    }
}
