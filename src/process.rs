//! Value transforms applied after parsing a response (`get_process`) or
//! before formatting a command (`set_process`).
//!
//! Most command tables only need a handful of shapes: a boolean from a device
//! token, a device token from a boolean, a symbolic lookup, or a unit scale.
//! Those are plain data and load straight from a model file. Models written in
//! code can still plug in an arbitrary function through [`Process::custom`].

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type TransformFn = dyn Fn(Value) -> Result<Value, String> + Send + Sync;

/// A code-defined transform.
#[derive(Clone)]
pub struct CustomProcess {
    name: String,
    transform: Arc<TransformFn>,
}

impl fmt::Debug for CustomProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomProcess")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A pure value transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Process {
    /// `Bool` by truthiness: non-zero numbers, non-empty text, `true`.
    Truthy,
    /// `Bool(value == token)`.
    Equals {
        /// Token meaning `true`.
        token: Value,
    },
    /// One of two tokens, chosen by the truthiness of the value.
    Choose {
        /// Sent when the value is truthy.
        when_true: Value,
        /// Sent otherwise.
        when_false: Value,
    },
    /// Table entry keyed by the value's text.
    Lookup {
        /// Key text to replacement value.
        table: BTreeMap<String, Value>,
    },
    /// Multiply a numeric value.
    Scale {
        /// Multiplier.
        factor: f64,
    },
    /// Arbitrary function; only constructible from code.
    #[serde(skip)]
    Custom(CustomProcess),
}

impl Process {
    /// Wrap a function as a named transform.
    pub fn custom<F>(name: &str, transform: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Process::Custom(CustomProcess {
            name: name.to_string(),
            transform: Arc::new(transform),
        })
    }

    /// Lookup table from `(key, replacement)` pairs.
    pub fn lookup<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Process::Lookup {
            table: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// `true` when the value equals `token`.
    pub fn equals(token: impl Into<Value>) -> Self {
        Process::Equals {
            token: token.into(),
        }
    }

    /// `when_true` for truthy values, `when_false` otherwise.
    pub fn choose(when_true: impl Into<Value>, when_false: impl Into<Value>) -> Self {
        Process::Choose {
            when_true: when_true.into(),
            when_false: when_false.into(),
        }
    }

    /// Apply the transform.
    pub fn apply(&self, value: Value) -> Result<Value, String> {
        match self {
            Process::Truthy => Ok(Value::Bool(value.truthy())),
            Process::Equals { token } => Ok(Value::Bool(value == *token)),
            Process::Choose {
                when_true,
                when_false,
            } => Ok(if value.truthy() {
                when_true.clone()
            } else {
                when_false.clone()
            }),
            Process::Lookup { table } => {
                let key = value.to_string();
                table.get(&key).cloned().ok_or_else(|| {
                    format!(
                        "no entry for '{}' (known: {})",
                        key,
                        table.keys().cloned().collect::<Vec<_>>().join(", ")
                    )
                })
            }
            Process::Scale { factor } => value
                .as_f64()
                .map(|x| Value::Float(x * factor))
                .ok_or_else(|| format!("cannot scale non-numeric value {}", value)),
            Process::Custom(custom) => (custom.transform)(value),
        }
    }
}
