use amend_types::{EntityType, FieldKind};

/// Errors in entity schemas or relation specifications.
///
/// Always raised eagerly, before any entity is read or written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unknown entity type {0}")]
    UnknownEntityType(EntityType),

    #[error("entity type {0} registered twice")]
    DuplicateEntityType(EntityType),

    #[error("{entity_type} declares {name:?} more than once")]
    DuplicateMember { entity_type: EntityType, name: String },

    #[error("{entity_type} has no field {field:?}")]
    UnknownField { entity_type: EntityType, field: String },

    #[error("{entity_type} has no relation {relation:?}")]
    UnknownRelation {
        entity_type: EntityType,
        relation: String,
    },

    #[error("{entity_type}.{relation} targets unregistered type {target}")]
    UnknownTarget {
        entity_type: EntityType,
        relation: String,
        target: EntityType,
    },

    #[error("{entity_type}.{relation} needs a back-reference on its target")]
    MissingBackReference {
        entity_type: EntityType,
        relation: String,
    },

    #[error("{entity_type}.{relation}: back-reference {back_reference:?} {reason}")]
    InvalidBackReference {
        entity_type: EntityType,
        relation: String,
        back_reference: String,
        reason: String,
    },

    #[error("{entity_type}.{field}: default must be {expected}, found {found}")]
    DefaultKindMismatch {
        entity_type: EntityType,
        field: String,
        expected: FieldKind,
        found: String,
    },

    #[error("{entity_type}.{field}: copy defaults are only allowed on excluded fields")]
    DefaultOnMergedField { entity_type: EntityType, field: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigurationError>;
