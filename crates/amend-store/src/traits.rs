use amend_types::{EntityId, EntityType};

use crate::error::StoreResult;
use crate::record::EntityRecord;

/// Persistence boundary consumed by the amendment engine.
///
/// All implementations must satisfy these invariants:
/// - Entity ids are unique; `insert` of an existing id fails.
/// - `children` returns records in ascending id order so traversals are
///   deterministic.
/// - Between `begin` and `commit`, every write is provisional; `rollback`
///   restores the state observed at `begin` for every record written since.
/// - All backend errors are propagated, never silently ignored.
pub trait EntityStore: Send + Sync {
    /// Read an entity by id.
    ///
    /// Returns `Ok(None)` if the entity does not exist.
    fn get(&self, id: &EntityId) -> StoreResult<Option<EntityRecord>>;

    /// Insert a new entity. Fails with `Duplicate` if the id is taken.
    fn insert(&self, record: EntityRecord) -> StoreResult<EntityId>;

    /// Replace an existing entity. Fails with `NotFound` if it is missing.
    fn update(&self, record: &EntityRecord) -> StoreResult<()>;

    /// Delete an entity by id. Returns `true` if the entity existed.
    fn delete(&self, id: &EntityId) -> StoreResult<bool>;

    /// All entities of `child_type` whose `back_reference` points at `parent`.
    fn children(
        &self,
        child_type: &EntityType,
        back_reference: &str,
        parent: &EntityId,
    ) -> StoreResult<Vec<EntityRecord>>;

    /// Open a transaction.
    fn begin(&self) -> StoreResult<()>;

    /// Make every write since `begin` permanent.
    fn commit(&self) -> StoreResult<()>;

    /// Undo every write since `begin`.
    fn rollback(&self) -> StoreResult<()>;

    /// Check whether an entity exists.
    fn exists(&self, id: &EntityId) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Read an entity that must exist.
    fn require(&self, id: &EntityId) -> StoreResult<EntityRecord> {
        self.get(id)?.ok_or(crate::error::StoreError::NotFound(*id))
    }
}
