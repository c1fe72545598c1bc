//! High-level amendment workflow.
//!
//! [`Amendments`] wraps the engine's copy and merge primitives with the
//! bookkeeping an application needs:
//! - numbered [`Amendment`] records per original
//! - sealed ledgers stored through a [`amend_ledger::LedgerStore`]
//! - consume-once finalization, with conflicts leaving the amendment open
//!
//! ```ignore
//! let amendments = Amendments::new(&store, &ledgers, &schema, &spec, AmendmentConfig::default())?;
//! let amendment = amendments.create_amendment(&contract_id)?;
//! // edit entities under amendment.copy_id ...
//! let outcome = amendments.finalize_amendment(&amendment.id)?;
//! ```

mod amendment;
mod amendments;
mod error;

pub use amendment::{Amendment, AmendmentConfig, AmendmentStatus};
pub use amendments::Amendments;
pub use error::{SdkError, SdkResult};

pub use amend_engine::{
    AmendmentEngine, Conflict, ConflictKind, ConflictReport, ConflictValue, CopyOptions,
    EngineConfig, EngineError, MergeOptions, MergeOutcome,
};
pub use amend_ledger::{InMemoryLedgerStore, LedgerRecord, LedgerStatus, LedgerStore};
pub use amend_spec::{AmendmentSpec, RelationSpec, SchemaRegistry};
pub use amend_store::{EntityRecord, EntityStore, InMemoryEntityStore};
pub use amend_types::{AmendmentId, EntityId, EntityType, Value};
