//! In-memory entity store for tests, the CLI, and embedding.
//!
//! [`InMemoryEntityStore`] keeps every record in a `HashMap` behind a
//! `RwLock`. Transactions are implemented with an undo journal: while a
//! transaction is open, the prior state of every written record is pushed
//! onto the journal, and rollback replays it in reverse.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use amend_types::{EntityId, EntityType};

use crate::error::{StoreError, StoreResult};
use crate::record::EntityRecord;
use crate::traits::EntityStore;

/// Serializable dump of an in-memory store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub entities: Vec<EntityRecord>,
}

#[derive(Default)]
struct StoreState {
    entities: HashMap<EntityId, EntityRecord>,
    journal: Option<Vec<(EntityId, Option<EntityRecord>)>>,
}

impl StoreState {
    fn remember(&mut self, id: EntityId) {
        let prior = self.entities.get(&id).cloned();
        if let Some(journal) = self.journal.as_mut() {
            journal.push((id, prior));
        }
    }
}

/// An in-memory implementation of [`EntityStore`].
pub struct InMemoryEntityStore {
    state: RwLock<StoreState>,
}

impl InMemoryEntityStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> StoreResult<Self> {
        let store = Self::new();
        for record in snapshot.entities {
            store.insert(record)?;
        }
        Ok(store)
    }

    /// Dump every record, sorted by id.
    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let state = self.read_state()?;
        let mut entities: Vec<EntityRecord> = state.entities.values().cloned().collect();
        entities.sort_by_key(|r| r.id);
        Ok(StoreSnapshot { entities })
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.read_state().map(|s| s.entities.len()).unwrap_or(0)
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.read_state().map(|s| s.journal.is_some()).unwrap_or(false)
    }

    fn read_state(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write_state(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get(&self, id: &EntityId) -> StoreResult<Option<EntityRecord>> {
        Ok(self.read_state()?.entities.get(id).cloned())
    }

    fn insert(&self, record: EntityRecord) -> StoreResult<EntityId> {
        let mut state = self.write_state()?;
        let id = record.id;
        if state.entities.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        state.remember(id);
        state.entities.insert(id, record);
        Ok(id)
    }

    fn update(&self, record: &EntityRecord) -> StoreResult<()> {
        let mut state = self.write_state()?;
        if !state.entities.contains_key(&record.id) {
            return Err(StoreError::NotFound(record.id));
        }
        state.remember(record.id);
        state.entities.insert(record.id, record.clone());
        Ok(())
    }

    fn delete(&self, id: &EntityId) -> StoreResult<bool> {
        let mut state = self.write_state()?;
        if !state.entities.contains_key(id) {
            return Ok(false);
        }
        state.remember(*id);
        state.entities.remove(id);
        Ok(true)
    }

    fn children(
        &self,
        child_type: &EntityType,
        back_reference: &str,
        parent: &EntityId,
    ) -> StoreResult<Vec<EntityRecord>> {
        let state = self.read_state()?;
        let mut found: Vec<EntityRecord> = state
            .entities
            .values()
            .filter(|r| {
                &r.entity_type == child_type && r.get_reference(back_reference) == Some(*parent)
            })
            .cloned()
            .collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    fn begin(&self) -> StoreResult<()> {
        let mut state = self.write_state()?;
        if state.journal.is_some() {
            return Err(StoreError::TransactionActive);
        }
        state.journal = Some(Vec::new());
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let mut state = self.write_state()?;
        let journal = state.journal.take().ok_or(StoreError::NoTransaction)?;
        debug!(writes = journal.len(), "committed transaction");
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        let mut state = self.write_state()?;
        let journal = state.journal.take().ok_or(StoreError::NoTransaction)?;
        debug!(writes = journal.len(), "rolling back transaction");
        for (id, prior) in journal.into_iter().rev() {
            match prior {
                Some(record) => {
                    state.entities.insert(id, record);
                }
                None => {
                    state.entities.remove(&id);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryEntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEntityStore")
            .field("entity_count", &self.len())
            .finish()
    }
}
