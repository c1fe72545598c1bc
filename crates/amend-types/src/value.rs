//! Typed scalar field values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The declared kind of a scalar field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    #[serde(rename = "datetime", alias = "date_time")]
    DateTime,
    File,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::File => "file",
        }
    }

    /// Whether values of this kind are stored in the baseline as strings.
    pub fn is_non_primitive(&self) -> bool {
        matches!(self, Self::Decimal | Self::Date | Self::DateTime | Self::File)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "decimal" => Ok(Self::Decimal),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "datetime" | "date_time" => Ok(Self::DateTime),
            "file" => Ok(Self::File),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

/// A scalar field value.
///
/// Equality is semantic rather than textual: decimals compare numerically
/// (`100.0 == 100.00`) and datetimes compare by instant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    #[serde(rename = "datetime")]
    DateTime(DateTime<Utc>),
    File(String),
}

impl Value {
    /// The kind of this value, or `None` for `Null`.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Null => None,
            Self::String(_) => Some(FieldKind::String),
            Self::Integer(_) => Some(FieldKind::Integer),
            Self::Decimal(_) => Some(FieldKind::Decimal),
            Self::Boolean(_) => Some(FieldKind::Boolean),
            Self::Date(_) => Some(FieldKind::Date),
            Self::DateTime(_) => Some(FieldKind::DateTime),
            Self::File(_) => Some(FieldKind::File),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value may be stored in a field of the given kind.
    /// `Null` fits every kind.
    pub fn fits(&self, kind: FieldKind) -> bool {
        self.kind().map_or(true, |k| k == kind)
    }

    /// Parse a textual literal as a value of the given kind.
    pub fn parse(kind: FieldKind, literal: &str) -> Result<Self, TypeError> {
        let invalid = |reason: String| TypeError::InvalidLiteral {
            kind,
            literal: literal.to_string(),
            reason,
        };
        match kind {
            FieldKind::String => Ok(Self::String(literal.to_string())),
            FieldKind::File => Ok(Self::File(literal.to_string())),
            FieldKind::Integer => literal
                .parse()
                .map(Self::Integer)
                .map_err(|e| invalid(e.to_string())),
            FieldKind::Decimal => Decimal::from_str_exact(literal)
                .map(Self::Decimal)
                .map_err(|e| invalid(e.to_string())),
            FieldKind::Boolean => literal
                .parse()
                .map(Self::Boolean)
                .map_err(|e| invalid(e.to_string())),
            FieldKind::Date => NaiveDate::parse_from_str(literal, "%Y-%m-%d")
                .map(Self::Date)
                .map_err(|e| invalid(e.to_string())),
            FieldKind::DateTime => DateTime::parse_from_rfc3339(literal)
                .map(|dt| Self::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| invalid(e.to_string())),
        }
    }

    /// Convenience constructor for decimal literals such as `"100.00"`.
    pub fn decimal(literal: &str) -> Result<Self, TypeError> {
        Self::parse(FieldKind::Decimal, literal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::String(s) | Self::File(s) => write!(f, "{s:?}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
