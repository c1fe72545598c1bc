use tracing::{debug, info};

use amend_ledger::LedgerEntry;
use amend_spec::{AmendmentSpec, ConfigurationError, EntitySchema, RelationDescriptor, SchemaRegistry};
use amend_store::{EntityRecord, EntityStore};
use amend_types::{EntityId, EntityType};

use crate::config::EngineConfig;
use crate::error::{EngineResult, MergeError};
use crate::traversal::{Refusal, Traversal};
use crate::txn::atomically;

/// The copy and merge primitives over one entity store.
///
/// Construction validates the schema registry and the amendment spec, so
/// every configuration error surfaces before any entity is touched.
pub struct AmendmentEngine<'a, S: EntityStore + ?Sized> {
    pub(crate) store: &'a S,
    pub(crate) schema: &'a SchemaRegistry,
    pub(crate) spec: &'a AmendmentSpec,
    pub(crate) config: EngineConfig,
}

impl<'a, S: EntityStore + ?Sized> AmendmentEngine<'a, S> {
    pub fn new(
        store: &'a S,
        schema: &'a SchemaRegistry,
        spec: &'a AmendmentSpec,
        config: EngineConfig,
    ) -> Result<Self, ConfigurationError> {
        schema.validate()?;
        spec.validate(schema)?;
        debug!(
            types = schema.len(),
            max_depth = config.max_depth,
            "amendment engine ready"
        );
        Ok(Self {
            store,
            schema,
            spec,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaRegistry {
        self.schema
    }

    pub fn spec(&self) -> &AmendmentSpec {
        self.spec
    }

    /// Delete the copy subtree described by `entry`.
    ///
    /// Cancelling an amendment never touches the original. Returns the
    /// number of entities removed.
    pub fn discard_copy(&self, entry: &LedgerEntry) -> EngineResult<usize> {
        let removed = atomically(self.store, "discard", || self.delete_subtree(&entry.copy_id))?;
        info!(copy = %entry.copy_id.short_id(), removed, "copy discarded");
        Ok(removed)
    }

    /// Delete `root_id` and its included child subtree. A missing root
    /// deletes nothing.
    pub(crate) fn delete_subtree(&self, root_id: &EntityId) -> EngineResult<usize> {
        let Some(root) = self.store.get(root_id)? else {
            return Ok(0);
        };
        let ids = self.subtree_ids(&root)?;
        for id in &ids {
            self.store.delete(id)?;
        }
        Ok(ids.len())
    }

    /// Included child relations of `schema`, in declaration order.
    pub(crate) fn child_relations<'s>(
        &self,
        schema: &'s EntitySchema,
        spec: &AmendmentSpec,
    ) -> Vec<&'s RelationDescriptor> {
        let relation_spec = spec.for_type(&schema.entity_type);
        schema
            .relations
            .iter()
            .filter(|r| r.kind.is_child() && relation_spec.includes(&r.name))
            .collect()
    }

    pub(crate) fn children_of(
        &self,
        relation: &RelationDescriptor,
        parent: &EntityId,
    ) -> EngineResult<Vec<EntityRecord>> {
        match relation.back_reference.as_deref() {
            Some(back_reference) => Ok(self.store.children(&relation.target, back_reference, parent)?),
            None => Ok(Vec::new()),
        }
    }

    /// `root` and every entity reachable from it through included child
    /// relations, parents before children.
    pub(crate) fn subtree_ids(&self, root: &EntityRecord) -> EngineResult<Vec<EntityId>> {
        let mut walk = Traversal::new(self.config.max_depth);
        let mut ids = Vec::new();
        let mut pending = vec![(root.clone(), 0usize)];
        while let Some((record, depth)) = pending.pop() {
            walk.enter(record.id, depth).map_err(merge_refusal)?;
            ids.push(record.id);
            let Some(schema) = self.schema.get(&record.entity_type) else {
                continue;
            };
            for relation in self.child_relations(schema, self.spec) {
                for child in self.children_of(relation, &record.id)? {
                    pending.push((child, depth + 1));
                }
            }
        }
        Ok(ids)
    }

    pub(crate) fn require_schema(&self, entity_type: &EntityType) -> EngineResult<&'a EntitySchema> {
        Ok(self.schema.require(entity_type)?)
    }
}

pub(crate) fn merge_refusal(refusal: Refusal) -> MergeError {
    match refusal {
        Refusal::Cycle(id) => MergeError::Cycle(id),
        Refusal::TooDeep(max) => MergeError::TooDeep(max),
    }
}
