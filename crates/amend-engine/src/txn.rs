use tracing::{debug, warn};

use amend_store::EntityStore;

use crate::error::EngineResult;

/// Run `body` inside one store transaction.
///
/// Commits when `body` succeeds; otherwise rolls back every write made since
/// `begin` and returns the original error.
pub(crate) fn atomically<S, T>(
    store: &S,
    operation: &'static str,
    body: impl FnOnce() -> EngineResult<T>,
) -> EngineResult<T>
where
    S: EntityStore + ?Sized,
{
    store.begin()?;
    let result = body().and_then(|value| {
        store.commit()?;
        Ok(value)
    });
    match result {
        Ok(value) => {
            debug!(operation, "transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = store.rollback() {
                warn!(operation, error = %rollback, "rollback failed");
            }
            warn!(operation, error = %err, "transaction rolled back");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use amend_store::{EntityRecord, InMemoryEntityStore, StoreError};
    use amend_types::EntityId;

    #[test]
    fn success_commits() {
        let store = InMemoryEntityStore::new();
        let id = atomically(&store, "test", || {
            Ok(store.insert(EntityRecord::new("Tag"))?)
        })
        .unwrap();
        assert!(store.exists(&id).unwrap());
        assert!(!store.in_transaction());
    }

    #[test]
    fn failure_rolls_back() {
        let store = InMemoryEntityStore::new();
        let missing = EntityId::new();
        let err = atomically(&store, "test", || {
            store.insert(EntityRecord::new("Tag"))?;
            store.require(&missing)?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::NotFound(id)) if id == missing));
        assert!(store.is_empty());
        assert!(!store.in_transaction());
    }
}
