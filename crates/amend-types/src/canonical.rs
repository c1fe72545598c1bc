//! Canonical baseline form of scalar values.
//!
//! Baselines are captured once and compared much later, possibly after the
//! live values went through several rounds of persistence. Primitive values
//! (strings, integers, booleans) are stored natively; decimals, dates,
//! datetimes and file references are stored as round-trippable strings.
//! Comparisons always decode the canonical form back into a [`Value`] first,
//! so `"100.0"` and `"100.00"` never differ.

use std::fmt;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::value::{FieldKind, Value};

/// A baseline value as captured in the correspondence ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CanonicalValue {
    Null,
    String(String),
    Integer(i64),
    Boolean(bool),
    Decimal(String),
    Date(String),
    #[serde(rename = "datetime")]
    DateTime(String),
    File(String),
}

impl CanonicalValue {
    /// Capture the canonical form of a live value.
    pub fn capture(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(s) => Self::String(s.clone()),
            Value::Integer(n) => Self::Integer(*n),
            Value::Boolean(b) => Self::Boolean(*b),
            Value::Decimal(d) => Self::Decimal(d.to_string()),
            Value::Date(d) => Self::Date(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Self::DateTime(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::File(name) => Self::File(name.clone()),
        }
    }

    /// Decode back into a live value.
    pub fn decode(&self) -> Result<Value, TypeError> {
        match self {
            Self::Null => Ok(Value::Null),
            Self::String(s) => Ok(Value::String(s.clone())),
            Self::Integer(n) => Ok(Value::Integer(*n)),
            Self::Boolean(b) => Ok(Value::Boolean(*b)),
            Self::Decimal(s) => Value::parse(FieldKind::Decimal, s),
            Self::Date(s) => Value::parse(FieldKind::Date, s),
            Self::DateTime(s) => Value::parse(FieldKind::DateTime, s),
            Self::File(s) => Ok(Value::File(s.clone())),
        }
    }

    /// Semantic comparison against a live value.
    pub fn matches(&self, value: &Value) -> Result<bool, TypeError> {
        Ok(self.decode()? == *value)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&Value> for CanonicalValue {
    fn from(value: &Value) -> Self {
        Self::capture(value)
    }
}

impl fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Decimal(s) | Self::Date(s) | Self::DateTime(s) | Self::File(s) => f.write_str(s),
        }
    }
}
