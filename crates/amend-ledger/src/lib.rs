//! Correspondence ledgers for the amendment engine.
//!
//! A ledger is the only state the engine keeps between copy and merge. It
//! provides:
//! - [`LedgerEntry`] / [`RelationBaseline`] -- the per-entity mapping from
//!   original to copy identity plus the baseline captured at copy time
//! - [`Ledger`] -- a sealed, immutable ledger with a BLAKE3 integrity seal
//! - [`LedgerStore`] -- the storage boundary, enforcing that a ledger is
//!   consumed by at most one merge
//! - [`InMemoryLedgerStore`] -- implementation for tests, the CLI, and embedding

pub mod entry;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod traits;

pub use entry::{LedgerEntry, RelationBaseline};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, LedgerRecord, LedgerStatus};
pub use memory::InMemoryLedgerStore;
pub use traits::LedgerStore;
