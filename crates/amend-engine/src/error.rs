use std::fmt;

use amend_spec::ConfigurationError;
use amend_store::StoreError;
use amend_types::{EntityId, EntityType, FieldKind, TypeError};

use crate::conflict::ConflictReport;

/// Why a copy could not be made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CopyFailure {
    #[error("target {0} does not exist")]
    UnresolvedTarget(EntityId),

    #[error("not declared on the entity type")]
    Undeclared,

    #[error("expected a {expected} value, found {found}")]
    KindMismatch { expected: FieldKind, found: String },

    #[error("record {id} has type {found}, expected {expected}")]
    TypeMismatch {
        id: EntityId,
        expected: EntityType,
        found: EntityType,
    },

    #[error("one-to-one relation has {0} children")]
    TooManyChildren(usize),

    #[error("entity {0} reached twice")]
    Cycle(EntityId),

    #[error("nesting deeper than {0}")]
    TooDeep(usize),
}

/// A copy failed; nothing it wrote survives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot copy {entity_type}.{field_or_relation}: {reason}")]
pub struct CopyError {
    pub entity_type: EntityType,
    pub field_or_relation: String,
    pub reason: CopyFailure,
}

impl CopyError {
    pub(crate) fn new(entity_type: &EntityType, member: &str, reason: CopyFailure) -> Self {
        Self {
            entity_type: entity_type.clone(),
            field_or_relation: member.to_string(),
            reason,
        }
    }
}

/// Which subtree a merge error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Original,
    Copy,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => f.write_str("original"),
            Self::Copy => f.write_str("copy"),
        }
    }
}

/// A merge could not be planned for reasons other than conflicts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("{side} root {id} does not exist")]
    MissingRoot { side: Side, id: EntityId },

    #[error("{side} entity {id} has type {found}, ledger expects {expected}")]
    TypeMismatch {
        side: Side,
        id: EntityId,
        expected: EntityType,
        found: EntityType,
    },

    #[error("baseline of {entity_type}.{field} cannot be decoded: {source}")]
    CorruptBaseline {
        entity_type: EntityType,
        field: String,
        source: TypeError,
    },

    #[error("entity {0} reached twice during merge")]
    Cycle(EntityId),

    #[error("merge nesting deeper than {0}")]
    TooDeep(usize),
}

/// Every failure the engine reports.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error(transparent)]
    Conflict(#[from] ConflictReport),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// The conflict report, if this is a conflict.
    pub fn conflicts(&self) -> Option<&ConflictReport> {
        match self {
            Self::Conflict(report) => Some(report),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
