use amend_types::EntityId;

/// Errors from entity store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested entity was not found.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// An entity with this id already exists.
    #[error("duplicate entity id: {0}")]
    Duplicate(EntityId),

    /// `begin` was called while a transaction was already open.
    #[error("a transaction is already open")]
    TransactionActive,

    /// `commit` or `rollback` was called with no open transaction.
    #[error("no open transaction")]
    NoTransaction,

    /// The backend failed (lock poisoning, I/O, driver error).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
