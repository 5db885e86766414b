use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{frame::Frame, numeric::Numeric};

/// Stable tag identifiers for the kinds a `Value` can hold.
///
/// The declaration order is also the cross-kind ordering used by `Value::cmp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    Integer,
    Double,
    Rational,
    String,
    Timestamp,
    Guid,
    List,
    Frame,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Rational => "rational",
            ValueType::String => "string",
            ValueType::Timestamp => "timestamp",
            ValueType::Guid => "guid",
            ValueType::List => "list",
            ValueType::Frame => "frame",
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload stored under a frame key.
///
/// Serialized adjacently tagged with the `ValueType` identifiers, e.g.
/// `{"type": "integer", "value": 5}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Integer(i64),
    Double(f64),
    Rational(Numeric),
    String(String),
    Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    Guid(Uuid),
    List(Vec<Value>),
    Frame(Frame),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Integer,
            Value::Double(_) => ValueType::Double,
            Value::Rational(_) => ValueType::Rational,
            Value::String(_) => ValueType::String,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Guid(_) => ValueType::Guid,
            Value::List(_) => ValueType::List,
            Value::Frame(_) => ValueType::Frame,
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, Value::Frame(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_numeric(&self) -> Option<Numeric> {
        match self {
            Value::Rational(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Value::Guid(g) => Some(*g),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Value::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_frame_mut(&mut self) -> Option<&mut Frame> {
        match self {
            Value::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Value::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn fmt_nested(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Rational(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Timestamp(t) => write!(f, "{}", t),
            Value::Guid(g) => write!(f, "{}", g.hyphenated()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_nested(f, depth)?;
                }
                f.write_str("]")
            }
            Value::Frame(frame) => frame.fmt_nested(f, depth),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_nested(f, 0)
    }
}

// Kinds order by tag first, then by payload. Doubles use the IEEE total
// order so the relation stays total (NaN equals NaN).
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Rational(a), Value::Rational(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Guid(a), Value::Guid(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Frame(a), Value::Frame(b)) => a.cmp(b),
            _ => self.value_type().cmp(&other.value_type()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<Numeric> for Value {
    fn from(value: Numeric) -> Self {
        Value::Rational(value)
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

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Guid(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Frame> for Value {
    fn from(value: Frame) -> Self {
        Value::Frame(value)
    }
}
