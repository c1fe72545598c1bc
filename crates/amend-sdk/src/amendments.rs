use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{info, warn};

use amend_engine::{AmendmentEngine, CopyOptions, MergeOptions, MergeOutcome};
use amend_ledger::{Ledger, LedgerRecord, LedgerStore};
use amend_spec::{AmendmentSpec, SchemaRegistry};
use amend_store::EntityStore;
use amend_types::{AmendmentId, EntityId};

use crate::amendment::{Amendment, AmendmentConfig, AmendmentStatus};
use crate::error::{SdkError, SdkResult};

/// The amendment workflow over one entity store and one ledger store.
///
/// The engine only knows how to copy and merge. This service adds the
/// bookkeeping around it: amendment records and numbering, sealing and
/// storing ledgers, and making sure each ledger is merged at most once.
/// When an amendment may be created or finalized is the caller's decision.
pub struct Amendments<'a, S, L>
where
    S: EntityStore + ?Sized,
    L: LedgerStore + ?Sized,
{
    engine: AmendmentEngine<'a, S>,
    ledgers: &'a L,
    config: AmendmentConfig,
    records: RwLock<BTreeMap<AmendmentId, Amendment>>,
}

impl<'a, S, L> Amendments<'a, S, L>
where
    S: EntityStore + ?Sized,
    L: LedgerStore + ?Sized,
{
    pub fn new(
        store: &'a S,
        ledgers: &'a L,
        schema: &'a SchemaRegistry,
        spec: &'a AmendmentSpec,
        config: AmendmentConfig,
    ) -> SdkResult<Self> {
        let engine = AmendmentEngine::new(store, schema, spec, config.engine.clone())?;
        Ok(Self {
            engine,
            ledgers,
            config,
            records: RwLock::new(BTreeMap::new()),
        })
    }

    /// Restore previously recorded amendments.
    pub fn with_amendments(self, amendments: impl IntoIterator<Item = Amendment>) -> SdkResult<Self> {
        {
            let mut records = self.write_records()?;
            for amendment in amendments {
                records.insert(amendment.id, amendment);
            }
        }
        Ok(self)
    }

    pub fn engine(&self) -> &AmendmentEngine<'a, S> {
        &self.engine
    }

    pub fn config(&self) -> &AmendmentConfig {
        &self.config
    }

    /// Start an amendment of `original_id`.
    pub fn create_amendment(&self, original_id: &EntityId) -> SdkResult<Amendment> {
        self.create_amendment_with(original_id, &CopyOptions::new())
    }

    /// Start an amendment with extra copy defaults.
    pub fn create_amendment_with(
        &self,
        original_id: &EntityId,
        options: &CopyOptions,
    ) -> SdkResult<Amendment> {
        let copy = self.engine.copy(original_id, options)?;
        let entry = copy.entry.clone();

        let ledger_id = match Ledger::seal(copy.entry).and_then(|ledger| self.ledgers.put(ledger)) {
            Ok(id) => id,
            Err(err) => {
                // Without a stored ledger the copy can never be merged.
                warn!(original = %original_id.short_id(), error = %err, "ledger not stored, discarding copy");
                self.engine.discard_copy(&entry)?;
                return Err(err.into());
            }
        };

        let mut records = self.write_records()?;
        let number = next_number(
            records
                .values()
                .filter(|a| &a.original_id == original_id)
                .count(),
        )?;
        let amendment = Amendment {
            id: AmendmentId::new(),
            original_id: *original_id,
            copy_id: copy.copy_id,
            ledger_id,
            number,
            status: AmendmentStatus::Open,
            created_at: Utc::now(),
            closed_at: None,
        };
        records.insert(amendment.id, amendment.clone());

        info!(
            amendment = %amendment.id.short_id(),
            original = %original_id.short_id(),
            number,
            entities = copy.entities,
            "amendment created"
        );
        Ok(amendment)
    }

    /// Merge an open amendment back into its original.
    ///
    /// On conflict nothing changes: the amendment and its ledger stay open
    /// and the error carries the conflict report, so the caller can resolve
    /// the copy and try again. Once the merge has committed the amendment is
    /// `Merged`; a ledger store that then fails to record the consumption is
    /// logged, not reported, since the original has already changed.
    pub fn finalize_amendment(&self, id: &AmendmentId) -> SdkResult<MergeOutcome> {
        let amendment = self.require_open(id)?;
        let ledger = self.ledgers.open(&amendment.ledger_id)?;
        let options = MergeOptions {
            discard_copy: !self.config.retain_copy,
        };

        let outcome = match self.engine.merge(ledger.root(), &options) {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Some(report) = err.conflicts() {
                    warn!(
                        amendment = %id.short_id(),
                        conflicts = report.len(),
                        "finalize blocked by conflicts"
                    );
                }
                return Err(err.into());
            }
        };

        // The merge is committed at this point. The amendment is closed even
        // if the ledger cannot be marked, so it is never merged twice.
        self.close(id, AmendmentStatus::Merged)?;
        if let Err(err) = self.ledgers.consume(&amendment.ledger_id) {
            warn!(
                amendment = %id.short_id(),
                ledger = %amendment.ledger_id.short_id(),
                error = %err,
                "merge committed but ledger not marked consumed"
            );
        }
        info!(
            amendment = %id.short_id(),
            changes = outcome.changes(),
            "amendment finalized"
        );
        Ok(outcome)
    }

    /// Abandon an open amendment. The original is never touched.
    pub fn cancel_amendment(&self, id: &AmendmentId) -> SdkResult<Amendment> {
        let amendment = self.require_open(id)?;
        let ledger = self.ledgers.open(&amendment.ledger_id)?;
        let removed = self.engine.discard_copy(ledger.root())?;
        self.ledgers.discard(&amendment.ledger_id)?;
        let closed = self.close(id, AmendmentStatus::Cancelled)?;
        info!(amendment = %id.short_id(), removed, "amendment cancelled");
        Ok(closed)
    }

    pub fn get(&self, id: &AmendmentId) -> SdkResult<Option<Amendment>> {
        Ok(self.read_records()?.get(id).cloned())
    }

    /// Every recorded amendment, oldest first.
    pub fn list(&self) -> SdkResult<Vec<Amendment>> {
        let mut all: Vec<Amendment> = self.read_records()?.values().cloned().collect();
        all.sort_by_key(|a| (a.created_at, a.id));
        Ok(all)
    }

    /// Amendments of one original, by number.
    pub fn for_original(&self, original_id: &EntityId) -> SdkResult<Vec<Amendment>> {
        let mut found: Vec<Amendment> = self
            .read_records()?
            .values()
            .filter(|a| &a.original_id == original_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.number);
        Ok(found)
    }

    /// The ledger behind an amendment, with its status.
    pub fn ledger(&self, id: &AmendmentId) -> SdkResult<LedgerRecord> {
        let amendment = self.require(id)?;
        self.ledgers
            .get(&amendment.ledger_id)?
            .ok_or(SdkError::Ledger(amend_ledger::LedgerError::NotFound(amendment.ledger_id)))
    }

    fn require(&self, id: &AmendmentId) -> SdkResult<Amendment> {
        self.get(id)?.ok_or(SdkError::AmendmentNotFound(*id))
    }

    fn require_open(&self, id: &AmendmentId) -> SdkResult<Amendment> {
        let amendment = self.require(id)?;
        if !amendment.is_open() {
            return Err(SdkError::NotOpen {
                id: *id,
                status: amendment.status,
            });
        }
        Ok(amendment)
    }

    fn close(&self, id: &AmendmentId, status: AmendmentStatus) -> SdkResult<Amendment> {
        let mut records = self.write_records()?;
        let amendment = records.get_mut(id).ok_or(SdkError::AmendmentNotFound(*id))?;
        amendment.status = status;
        amendment.closed_at = Some(Utc::now());
        Ok(amendment.clone())
    }

    fn read_records(&self) -> SdkResult<RwLockReadGuard<'_, BTreeMap<AmendmentId, Amendment>>> {
        self.records
            .read()
            .map_err(|e| SdkError::Internal(format!("lock poisoned: {e}")))
    }

    fn write_records(&self) -> SdkResult<RwLockWriteGuard<'_, BTreeMap<AmendmentId, Amendment>>> {
        self.records
            .write()
            .map_err(|e| SdkError::Internal(format!("lock poisoned: {e}")))
    }
}

/// Number for the next amendment of an original with `existing` amendments.
fn next_number(existing: usize) -> SdkResult<u32> {
    u32::try_from(existing)
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| SdkError::Internal(format!("too many amendments: {existing}")))
}
