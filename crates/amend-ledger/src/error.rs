use amend_types::LedgerId;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger not found: {0}")]
    NotFound(LedgerId),

    #[error("ledger already stored: {0}")]
    Duplicate(LedgerId),

    #[error("ledger {0} was already consumed by a merge")]
    AlreadyConsumed(LedgerId),

    #[error("ledger {0} was discarded")]
    Discarded(LedgerId),

    #[error("seal mismatch for ledger {0}: contents changed after creation")]
    SealMismatch(LedgerId),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
