use thiserror::Error;

use crate::value::FieldKind;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid {kind} literal {literal:?}: {reason}")]
    InvalidLiteral {
        kind: FieldKind,
        literal: String,
        reason: String,
    },

    #[error("invalid identifier {0:?}")]
    InvalidId(String),

    #[error("unknown field kind {0:?}")]
    UnknownKind(String),
}
