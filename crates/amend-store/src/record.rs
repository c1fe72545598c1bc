use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use amend_types::{EntityId, EntityType, Value};

/// A stored entity: scalar fields plus the relation data the record owns.
///
/// Many-to-one references and many-to-many memberships live on the record.
/// One-to-one and one-to-many children are separate records that point back
/// at this one through a many-to-one back-reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub entity_type: EntityType,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub references: BTreeMap<String, Option<EntityId>>,
    #[serde(default)]
    pub members: BTreeMap<String, BTreeSet<EntityId>>,
}

impl EntityRecord {
    /// Create an empty record with a fresh id.
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self::with_id(EntityId::new(), entity_type)
    }

    pub fn with_id(id: EntityId, entity_type: impl Into<EntityType>) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            fields: BTreeMap::new(),
            references: BTreeMap::new(),
            members: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Builder-style reference setter.
    pub fn reference(mut self, relation: &str, target: EntityId) -> Self {
        self.set_reference(relation, Some(target));
        self
    }

    /// Builder-style membership setter.
    pub fn members_of(mut self, relation: &str, ids: impl IntoIterator<Item = EntityId>) -> Self {
        self.set_members(relation, ids.into_iter().collect());
        self
    }

    /// Read a field. Missing fields read as `Null`.
    pub fn get_field(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Read a many-to-one reference. Missing references read as `None`.
    pub fn get_reference(&self, relation: &str) -> Option<EntityId> {
        self.references.get(relation).copied().flatten()
    }

    pub fn set_reference(&mut self, relation: &str, target: Option<EntityId>) {
        self.references.insert(relation.to_string(), target);
    }

    /// Read a many-to-many membership set. Missing sets read as empty.
    pub fn get_members(&self, relation: &str) -> BTreeSet<EntityId> {
        self.members.get(relation).cloned().unwrap_or_default()
    }

    pub fn set_members(&mut self, relation: &str, ids: BTreeSet<EntityId>) {
        self.members.insert(relation.to_string(), ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_members_read_as_defaults() {
        let record = EntityRecord::new("Document");
        assert_eq!(record.get_field("title"), &Value::Null);
        assert_eq!(record.get_reference("owner"), None);
        assert!(record.get_members("tags").is_empty());
    }

    #[test]
    fn builder_sets_everything() {
        let owner = EntityId::new();
        let tag = EntityId::new();
        let record = EntityRecord::new("Document")
            .field("title", "Plan")
            .reference("owner", owner)
            .members_of("tags", [tag]);
        assert_eq!(record.get_field("title"), &Value::from("Plan"));
        assert_eq!(record.get_reference("owner"), Some(owner));
        assert!(record.get_members("tags").contains(&tag));
    }

    #[test]
    fn cleared_reference_reads_as_none() {
        let mut record = EntityRecord::new("Document").reference("owner", EntityId::new());
        record.set_reference("owner", None);
        assert_eq!(record.get_reference("owner"), None);
    }

    #[test]
    fn serde_roundtrip() {
        let record = EntityRecord::new("Budget").field("cash", Value::decimal("100.00").unwrap());
        let json = serde_json::to_string(&record).unwrap();
        let back: EntityRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
