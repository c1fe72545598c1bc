//! Entity schemas: the fixed introspection interface the engine walks.
//!
//! Every entity type exposes its scalar fields and tagged relation
//! descriptors through an [`EntitySchema`]. Schemas are registered once in a
//! [`SchemaRegistry`] and validated as a whole, so the engine never inspects
//! record shapes at call time.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use amend_types::{EntityType, FieldKind};

use crate::error::{ConfigResult, ConfigurationError};

/// The cardinality of a relation, seen from the owning type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The owner holds a single reference to a target it does not own.
    ManyToOne,
    /// The owner has at most one child that points back at it.
    OneToOne,
    /// The owner has any number of children that point back at it.
    OneToMany,
    /// The owner holds a set of references.
    ManyToMany,
}

impl RelationKind {
    /// Child relations are stored on the target, located by back-reference.
    pub fn is_child(&self) -> bool {
        matches!(self, Self::OneToOne | Self::OneToMany)
    }
}

/// A scalar field declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

/// A relation declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub name: String,
    pub kind: RelationKind,
    pub target: EntityType,
    /// For child relations: the many-to-one relation on `target` that points
    /// back at the owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_reference: Option<String>,
}

/// The declared shape of one entity type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub entity_type: EntityType,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub relations: Vec<RelationDescriptor>,
}

impl EntitySchema {
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn many_to_one(self, name: &str, target: &str) -> Self {
        self.relation(name, RelationKind::ManyToOne, target, None)
    }

    pub fn one_to_one(self, name: &str, target: &str, back_reference: &str) -> Self {
        self.relation(name, RelationKind::OneToOne, target, Some(back_reference))
    }

    pub fn one_to_many(self, name: &str, target: &str, back_reference: &str) -> Self {
        self.relation(name, RelationKind::OneToMany, target, Some(back_reference))
    }

    pub fn many_to_many(self, name: &str, target: &str) -> Self {
        self.relation(name, RelationKind::ManyToMany, target, None)
    }

    fn relation(
        mut self,
        name: &str,
        kind: RelationKind,
        target: &str,
        back_reference: Option<&str>,
    ) -> Self {
        self.relations.push(RelationDescriptor {
            name: name.to_string(),
            kind,
            target: EntityType::from(target),
            back_reference: back_reference.map(str::to_string),
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation_named(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }

    fn check_unique_members(&self) -> ConfigResult<()> {
        let mut seen = BTreeSet::new();
        let names = self
            .fields
            .iter()
            .map(|f| &f.name)
            .chain(self.relations.iter().map(|r| &r.name));
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(ConfigurationError::DuplicateMember {
                    entity_type: self.entity_type.clone(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// All entity schemas known to the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    schemas: BTreeMap<EntityType, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema. Each entity type may be registered once.
    pub fn register(&mut self, schema: EntitySchema) -> ConfigResult<()> {
        if self.schemas.contains_key(&schema.entity_type) {
            return Err(ConfigurationError::DuplicateEntityType(schema.entity_type));
        }
        self.schemas.insert(schema.entity_type.clone(), schema);
        Ok(())
    }

    pub fn get(&self, entity_type: &EntityType) -> Option<&EntitySchema> {
        self.schemas.get(entity_type)
    }

    pub fn require(&self, entity_type: &EntityType) -> ConfigResult<&EntitySchema> {
        self.get(entity_type)
            .ok_or_else(|| ConfigurationError::UnknownEntityType(entity_type.clone()))
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.schemas.keys()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Check the registry as a whole.
    ///
    /// Rejects duplicate member names, relations targeting unregistered
    /// types, child relations without a back-reference, and back-references
    /// that are not a many-to-one relation on the target pointing back at
    /// the owner.
    pub fn validate(&self) -> ConfigResult<()> {
        for schema in self.schemas.values() {
            schema.check_unique_members()?;
            for relation in &schema.relations {
                self.check_relation(schema, relation)?;
            }
        }
        Ok(())
    }

    fn check_relation(&self, owner: &EntitySchema, relation: &RelationDescriptor) -> ConfigResult<()> {
        let target = self
            .get(&relation.target)
            .ok_or_else(|| ConfigurationError::UnknownTarget {
                entity_type: owner.entity_type.clone(),
                relation: relation.name.clone(),
                target: relation.target.clone(),
            })?;

        if !relation.kind.is_child() {
            return Ok(());
        }

        let back_reference =
            relation
                .back_reference
                .as_deref()
                .ok_or_else(|| ConfigurationError::MissingBackReference {
                    entity_type: owner.entity_type.clone(),
                    relation: relation.name.clone(),
                })?;

        let invalid = |reason: &str| ConfigurationError::InvalidBackReference {
            entity_type: owner.entity_type.clone(),
            relation: relation.name.clone(),
            back_reference: back_reference.to_string(),
            reason: reason.to_string(),
        };

        let back = target
            .relation_named(back_reference)
            .ok_or_else(|| invalid("is not declared on the target"))?;
        if back.kind != RelationKind::ManyToOne {
            return Err(invalid("must be a many-to-one relation"));
        }
        if back.target != owner.entity_type {
            return Err(invalid("does not point back at the owner"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_schema() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntitySchema::new("Document")
                    .with_field("title", FieldKind::String)
                    .one_to_many("line_items", "LineItem", "document")
                    .one_to_one("budget", "Budget", "document")
                    .many_to_many("tags", "Tag"),
            )
            .unwrap();
        registry
            .register(
                EntitySchema::new("LineItem")
                    .with_field("amount", FieldKind::Decimal)
                    .many_to_one("document", "Document"),
            )
            .unwrap();
        registry
            .register(
                EntitySchema::new("Budget")
                    .with_field("cash", FieldKind::Decimal)
                    .many_to_one("document", "Document"),
            )
            .unwrap();
        registry
            .register(EntitySchema::new("Tag").with_field("label", FieldKind::String))
            .unwrap();
        registry
    }

    #[test]
    fn valid_registry_passes() {
        let registry = document_schema();
        registry.validate().unwrap();
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn lookup_members() {
        let registry = document_schema();
        let doc = registry.require(&"Document".into()).unwrap();
        assert_eq!(doc.field("title").unwrap().kind, FieldKind::String);
        assert_eq!(
            doc.relation_named("line_items").unwrap().kind,
            RelationKind::OneToMany
        );
        assert!(doc.field("line_items").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = document_schema();
        let err = registry.register(EntitySchema::new("Tag")).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateEntityType("Tag".into()));
    }

    #[test]
    fn unknown_type_lookup_fails() {
        let registry = document_schema();
        assert_eq!(
            registry.require(&"Invoice".into()).unwrap_err(),
            ConfigurationError::UnknownEntityType("Invoice".into())
        );
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntitySchema::new("Tag")
                    .with_field("label", FieldKind::String)
                    .many_to_one("label", "Tag"),
            )
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(ConfigurationError::DuplicateMember { name, .. }) if name == "label"
        ));
    }

    #[test]
    fn unregistered_target_is_rejected() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntitySchema::new("Document").many_to_one("owner", "User"))
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(ConfigurationError::UnknownTarget { target, .. }) if target == "User".into()
        ));
    }

    #[test]
    fn child_relation_needs_back_reference() {
        let mut registry = SchemaRegistry::new();
        let mut doc = EntitySchema::new("Document");
        doc.relations.push(RelationDescriptor {
            name: "risks".into(),
            kind: RelationKind::OneToMany,
            target: "Risk".into(),
            back_reference: None,
        });
        registry.register(doc).unwrap();
        registry.register(EntitySchema::new("Risk")).unwrap();
        assert!(matches!(
            registry.validate(),
            Err(ConfigurationError::MissingBackReference { relation, .. }) if relation == "risks"
        ));
    }

    #[test]
    fn back_reference_must_point_at_owner() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntitySchema::new("Document").one_to_many("risks", "Risk", "owner"))
            .unwrap();
        registry
            .register(EntitySchema::new("Risk").many_to_one("owner", "Risk"))
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(ConfigurationError::InvalidBackReference { reason, .. })
                if reason.contains("point back")
        ));
    }

    #[test]
    fn back_reference_must_be_many_to_one() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntitySchema::new("Document").one_to_many("risks", "Risk", "owner"))
            .unwrap();
        registry
            .register(EntitySchema::new("Risk").many_to_many("owner", "Document"))
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(ConfigurationError::InvalidBackReference { reason, .. })
                if reason.contains("many-to-one")
        ));
    }
}
