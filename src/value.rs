//! Scalar values exchanged between callers, property descriptors and the wire.
//!
//! [`Value`] is deliberately small: SCPI responses are single ASCII tokens that
//! decode to a number, a boolean or an enumerated word. Equality follows the
//! natural rules for each type, with the two numeric variants comparing by
//! numeric value so that a range table declared with integers (`10`) accepts a
//! float (`10.0`) and vice versa.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A scalar handled by the dispatch engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text token.
    Str(String),
}

impl Value {
    /// Numeric view of the value, if it is `Int` or `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of the value. Floats are accepted when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Boolean view of the value, only for `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Text view of the value, only for `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value is `Int` or `Float`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Truthiness: non-zero numbers, non-empty strings and `true`.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    /// Hashable form of the value, consistent with `PartialEq`.
    ///
    /// Integral floats collapse onto the integer key so `2.0` and `2` hash the
    /// same way they compare.
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int(i) => ValueKey::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 {
                    ValueKey::Int(*f as i64)
                } else {
                    ValueKey::Float(f.to_bits())
                }
            }
            Value::Str(s) => ValueKey::Str(s.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64() == b.as_f64(),
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// Hashable key for [`Value`], used by the forward/reverse map tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// Boolean key.
    Bool(bool),
    /// Integer key (also used for integral floats).
    Int(i64),
    /// Non-integral float, by bit pattern.
    Float(u64),
    /// Text key.
    Str(String),
}

/// Scalar type a query response is parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Floating point (the default for readings).
    #[default]
    Float,
    /// Integer; integral float text such as `1.000E+00` is accepted.
    Int,
    /// `1`/`0`, `ON`/`OFF`, `TRUE`/`FALSE`, case insensitive.
    Bool,
    /// Trimmed raw text.
    Str,
}

impl ValueKind {
    /// Parse one response token. Returns `None` when the text does not fit the kind.
    pub fn parse(self, raw: &str) -> Option<Value> {
        let text = raw.trim();
        match self {
            ValueKind::Float => text.parse::<f64>().ok().map(Value::Float),
            ValueKind::Int => text
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.is_finite())
                        .map(|f| f as i64)
                })
                .map(Value::Int),
            ValueKind::Bool => match text.to_ascii_uppercase().as_str() {
                "1" | "ON" | "TRUE" => Some(Value::Bool(true)),
                "0" | "OFF" | "FALSE" => Some(Value::Bool(false)),
                _ => None,
            },
            ValueKind::Str => Some(Value::Str(text.to_string())),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Float => "float",
            ValueKind::Int => "int",
            ValueKind::Bool => "bool",
            ValueKind::Str => "string",
        };
        f.write_str(name)
    }
}
