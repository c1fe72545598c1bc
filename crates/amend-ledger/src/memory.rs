use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::debug;

use amend_types::LedgerId;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{Ledger, LedgerRecord, LedgerStatus};
use crate::traits::LedgerStore;

/// In-memory ledger store for tests, the CLI, and embedding.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    records: RwLock<HashMap<LedgerId, LedgerRecord>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously dumped records.
    pub fn from_records(records: Vec<LedgerRecord>) -> LedgerResult<Self> {
        let store = Self::new();
        {
            let mut map = store.write_records()?;
            for record in records {
                record.ledger.verify()?;
                map.insert(record.ledger.id(), record);
            }
        }
        Ok(store)
    }

    /// Dump every record, oldest first.
    pub fn records(&self) -> LedgerResult<Vec<LedgerRecord>> {
        let map = self.read_records()?;
        let mut records: Vec<LedgerRecord> = map.values().cloned().collect();
        records.sort_by_key(|r| r.ledger.id());
        Ok(records)
    }

    fn read_records(&self) -> LedgerResult<RwLockReadGuard<'_, HashMap<LedgerId, LedgerRecord>>> {
        self.records
            .read()
            .map_err(|e| LedgerError::Backend(format!("lock poisoned: {e}")))
    }

    fn write_records(&self) -> LedgerResult<RwLockWriteGuard<'_, HashMap<LedgerId, LedgerRecord>>> {
        self.records
            .write()
            .map_err(|e| LedgerError::Backend(format!("lock poisoned: {e}")))
    }

    fn transition(&self, id: &LedgerId, next: LedgerStatus) -> LedgerResult<()> {
        let mut map = self.write_records()?;
        let record = map.get_mut(id).ok_or(LedgerError::NotFound(*id))?;
        ensure_open(id, &record.status)?;
        debug!(ledger = %id.short_id(), status = ?next, "ledger status changed");
        record.status = next;
        Ok(())
    }
}

fn ensure_open(id: &LedgerId, status: &LedgerStatus) -> LedgerResult<()> {
    match status {
        LedgerStatus::Open => Ok(()),
        LedgerStatus::Consumed { .. } => Err(LedgerError::AlreadyConsumed(*id)),
        LedgerStatus::Discarded { .. } => Err(LedgerError::Discarded(*id)),
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn put(&self, ledger: Ledger) -> LedgerResult<LedgerId> {
        ledger.verify()?;
        let id = ledger.id();
        let mut map = self.write_records()?;
        if map.contains_key(&id) {
            return Err(LedgerError::Duplicate(id));
        }
        map.insert(
            id,
            LedgerRecord {
                ledger,
                status: LedgerStatus::Open,
            },
        );
        Ok(id)
    }

    fn get(&self, id: &LedgerId) -> LedgerResult<Option<LedgerRecord>> {
        Ok(self.read_records()?.get(id).cloned())
    }

    fn open(&self, id: &LedgerId) -> LedgerResult<Ledger> {
        let map = self.read_records()?;
        let record = map.get(id).ok_or(LedgerError::NotFound(*id))?;
        ensure_open(id, &record.status)?;
        record.ledger.verify()?;
        Ok(record.ledger.clone())
    }

    fn consume(&self, id: &LedgerId) -> LedgerResult<()> {
        self.transition(id, LedgerStatus::Consumed { at: Utc::now() })
    }

    fn discard(&self, id: &LedgerId) -> LedgerResult<()> {
        self.transition(id, LedgerStatus::Discarded { at: Utc::now() })
    }

    fn list(&self) -> LedgerResult<Vec<(LedgerId, LedgerStatus)>> {
        Ok(self
            .records()?
            .into_iter()
            .map(|r| (r.ledger.id(), r.status))
            .collect())
    }
}
