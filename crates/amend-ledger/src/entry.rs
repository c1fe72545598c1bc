use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use amend_types::{CanonicalValue, EntityId, EntityType};

/// Baseline of one relation, captured at copy time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "baseline", rename_all = "snake_case")]
pub enum RelationBaseline {
    /// Many-to-one: the referenced id (shared by original and copy).
    Reference(Option<EntityId>),
    /// One-to-one: the nested entry of the copied child, if one existed.
    Child(Option<Box<LedgerEntry>>),
    /// One-to-many: one nested entry per copied child, keyed by original id.
    Children(BTreeMap<EntityId, LedgerEntry>),
    /// Many-to-many: the membership set.
    Members(BTreeSet<EntityId>),
}

impl RelationBaseline {
    /// Nested entries of a child relation, keyed by original id.
    pub fn child_entries(&self) -> BTreeMap<EntityId, &LedgerEntry> {
        match self {
            Self::Child(Some(entry)) => BTreeMap::from([(entry.original_id, entry.as_ref())]),
            Self::Children(entries) => entries.iter().map(|(id, e)| (*id, e)).collect(),
            _ => BTreeMap::new(),
        }
    }
}

/// Correspondence entry for one copied entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entity_type: EntityType,
    pub original_id: EntityId,
    pub copy_id: EntityId,
    /// Canonical scalar values at copy time. Excluded fields never appear.
    #[serde(default)]
    pub baseline_fields: BTreeMap<String, CanonicalValue>,
    #[serde(default)]
    pub baseline_relations: BTreeMap<String, RelationBaseline>,
}

impl LedgerEntry {
    pub fn new(entity_type: EntityType, original_id: EntityId, copy_id: EntityId) -> Self {
        Self {
            entity_type,
            original_id,
            copy_id,
            baseline_fields: BTreeMap::new(),
            baseline_relations: BTreeMap::new(),
        }
    }

    pub fn baseline_field(&self, name: &str) -> Option<&CanonicalValue> {
        self.baseline_fields.get(name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationBaseline> {
        self.baseline_relations.get(name)
    }

    /// Number of entities covered by this entry and all nested entries.
    pub fn entity_count(&self) -> usize {
        1 + self
            .baseline_relations
            .values()
            .flat_map(|r| r.child_entries().into_values())
            .map(LedgerEntry::entity_count)
            .sum::<usize>()
    }

    /// Find the entry for an original id anywhere in this subtree.
    pub fn find_by_original(&self, original_id: &EntityId) -> Option<&LedgerEntry> {
        if &self.original_id == original_id {
            return Some(self);
        }
        self.baseline_relations
            .values()
            .flat_map(|r| r.child_entries().into_values())
            .find_map(|e| e.find_by_original(original_id))
    }
}
