//! Value validators.
//!
//! Four policies cover every domain a SCPI command table declares: exact
//! membership in a discrete set, auto-ranging onto a discrete set, and strict
//! or clamping numeric ranges. All of them are pure functions; the truncating
//! policies never reject a numeric value.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Rejection raised by a strict validator (or by a type mismatch).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Value is not a member of a strict discrete set.
    #[error("{value} is not one of [{allowed}]")]
    NotInSet {
        /// Rejected value.
        value: Value,
        /// Comma-separated members of the set.
        allowed: String,
    },

    /// Value lies outside a strict range.
    #[error("{value} is outside the range [{low}, {high}]")]
    OutOfRange {
        /// Rejected value.
        value: Value,
        /// Lower bound.
        low: Value,
        /// Upper bound.
        high: Value,
    },

    /// A numeric policy was given a non-numeric value.
    #[error("{value} ({}) is not numeric", .value.type_name())]
    NotNumeric {
        /// Offending value.
        value: Value,
    },

    /// A numeric policy was given NaN or an infinity.
    #[error("{value} is not a finite number")]
    NotFinite {
        /// Offending value.
        value: Value,
    },

    /// The domain has no members to choose from.
    #[error("domain is empty")]
    EmptyDomain,
}

/// Validation policy attached to a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    /// Exact membership, see [`strict_discrete_set`].
    StrictDiscreteSet,
    /// Auto-range onto a set, see [`truncated_discrete_set`].
    TruncatedDiscreteSet,
    /// Inclusive bounds, see [`strict_range`].
    StrictRange,
    /// Clamp into bounds, see [`truncated_range`].
    TruncatedRange,
}

impl Validator {
    /// Apply the policy. Range policies read `domain` as `[low, high]`.
    pub fn apply(self, value: Value, domain: &[Value]) -> Result<Value, ValidationError> {
        match self {
            Validator::StrictDiscreteSet => strict_discrete_set(value, domain),
            Validator::TruncatedDiscreteSet => truncated_discrete_set(value, domain),
            Validator::StrictRange | Validator::TruncatedRange => {
                let [low, high] = domain else {
                    return Err(ValidationError::EmptyDomain);
                };
                if self == Validator::StrictRange {
                    strict_range(value, low, high)
                } else {
                    truncated_range(value, low, high)
                }
            }
        }
    }

    /// Whether the policy takes a `[low, high]` pair rather than a set.
    pub fn is_range(self) -> bool {
        matches!(self, Validator::StrictRange | Validator::TruncatedRange)
    }

    /// Whether every domain member must be numeric.
    pub fn requires_numeric(self) -> bool {
        !matches!(self, Validator::StrictDiscreteSet)
    }
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Validator::StrictDiscreteSet => "strict_discrete_set",
            Validator::TruncatedDiscreteSet => "truncated_discrete_set",
            Validator::StrictRange => "strict_range",
            Validator::TruncatedRange => "truncated_range",
        };
        f.write_str(name)
    }
}

/// Numeric policies only accept finite numbers.
fn finite(value: Value) -> Result<Value, ValidationError> {
    match value.as_f64() {
        None => Err(ValidationError::NotNumeric { value }),
        Some(x) if !x.is_finite() => Err(ValidationError::NotFinite { value }),
        Some(_) => Ok(value),
    }
}

/// Return `value` unchanged if it is a member of `values`.
pub fn strict_discrete_set(value: Value, values: &[Value]) -> Result<Value, ValidationError> {
    if values.iter().any(|v| *v == value) {
        Ok(value)
    } else {
        Err(ValidationError::NotInSet {
            value,
            allowed: values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Select the smallest member of `values` that is `>= value`, or the largest
/// member when `value` exceeds them all.
///
/// This is the auto-range rule: asking for 1.5 V on a meter with 0.2/2/20 V
/// ranges selects the 2 V range.
pub fn truncated_discrete_set(value: Value, values: &[Value]) -> Result<Value, ValidationError> {
    let value = finite(value)?;

    let mut fitting: Option<&Value> = None;
    let mut largest: Option<&Value> = None;
    for candidate in values {
        if !candidate.is_numeric() {
            return Err(ValidationError::NotNumeric {
                value: candidate.clone(),
            });
        }
        if *candidate >= value && fitting.map_or(true, |best| candidate < best) {
            fitting = Some(candidate);
        }
        if largest.map_or(true, |max| candidate > max) {
            largest = Some(candidate);
        }
    }

    fitting
        .or(largest)
        .cloned()
        .ok_or(ValidationError::EmptyDomain)
}

/// Return `value` unchanged if `low <= value <= high`.
pub fn strict_range(value: Value, low: &Value, high: &Value) -> Result<Value, ValidationError> {
    let value = finite(value)?;
    if *low <= value && value <= *high {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            value,
            low: low.clone(),
            high: high.clone(),
        })
    }
}

/// Clamp `value` into `[low, high]`.
pub fn truncated_range(value: Value, low: &Value, high: &Value) -> Result<Value, ValidationError> {
    let value = finite(value)?;
    if value > *high {
        Ok(high.clone())
    } else if value < *low {
        Ok(low.clone())
    } else {
        Ok(value)
    }
}
