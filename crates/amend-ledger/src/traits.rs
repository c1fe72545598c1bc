use amend_types::LedgerId;

use crate::error::LedgerResult;
use crate::ledger::{Ledger, LedgerRecord, LedgerStatus};

/// Storage boundary for correspondence ledgers.
///
/// Implementations enforce the ledger lifecycle: a ledger starts `Open`,
/// and moves exactly once to either `Consumed` (a successful merge) or
/// `Discarded` (a cancelled amendment). Consumed and discarded ledgers stay
/// readable for audit but can never be opened for merging again.
pub trait LedgerStore: Send + Sync {
    /// Store a freshly sealed ledger. Fails on a bad seal or a duplicate id.
    fn put(&self, ledger: Ledger) -> LedgerResult<LedgerId>;

    /// Read a ledger and its status.
    fn get(&self, id: &LedgerId) -> LedgerResult<Option<LedgerRecord>>;

    /// Read an `Open` ledger for merging, verifying its seal.
    fn open(&self, id: &LedgerId) -> LedgerResult<Ledger>;

    /// Mark an `Open` ledger as consumed by a successful merge.
    fn consume(&self, id: &LedgerId) -> LedgerResult<()>;

    /// Mark an `Open` ledger as discarded.
    fn discard(&self, id: &LedgerId) -> LedgerResult<()>;

    /// All stored ledgers with their status, oldest first.
    fn list(&self) -> LedgerResult<Vec<(LedgerId, LedgerStatus)>>;
}
