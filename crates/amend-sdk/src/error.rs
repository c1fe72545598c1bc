use thiserror::Error;

use amend_engine::{ConflictReport, EngineError};
use amend_types::AmendmentId;

use crate::amendment::AmendmentStatus;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("amendment not found: {0}")]
    AmendmentNotFound(AmendmentId),

    #[error("amendment {id} is {status}, not open")]
    NotOpen {
        id: AmendmentId,
        status: AmendmentStatus,
    },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("ledger error: {0}")]
    Ledger(#[from] amend_ledger::LedgerError),

    #[error("configuration error: {0}")]
    Configuration(#[from] amend_spec::ConfigurationError),

    #[error("store error: {0}")]
    Store(#[from] amend_store::StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SdkError {
    /// The conflict report, if finalizing hit conflicts.
    pub fn conflicts(&self) -> Option<&ConflictReport> {
        match self {
            Self::Engine(err) => err.conflicts(),
            _ => None,
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
