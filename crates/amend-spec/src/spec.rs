//! Relation specifications: which parts of an entity graph an amendment
//! copies and merges.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use amend_types::{EntityType, Value};

use crate::error::{ConfigResult, ConfigurationError};
use crate::schema::SchemaRegistry;

static EMPTY: RelationSpec = RelationSpec {
    included_relations: BTreeSet::new(),
    excluded_fields: BTreeSet::new(),
    copy_defaults: BTreeMap::new(),
};

/// Copy/merge configuration for one entity type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSpec {
    /// Relations that take part in copy and merge.
    #[serde(default)]
    pub included_relations: BTreeSet<String>,
    /// Scalar fields that are never baselined, compared, or merged.
    #[serde(default)]
    pub excluded_fields: BTreeSet<String>,
    /// Values forced onto every fresh copy.
    #[serde(default)]
    pub copy_defaults: BTreeMap<String, Value>,
}

impl RelationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, relation: &str) -> Self {
        self.included_relations.insert(relation.to_string());
        self
    }

    pub fn exclude(mut self, field: &str) -> Self {
        self.excluded_fields.insert(field.to_string());
        self
    }

    pub fn default_value(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.copy_defaults.insert(field.to_string(), value.into());
        self
    }

    pub fn includes(&self, relation: &str) -> bool {
        self.included_relations.contains(relation)
    }

    pub fn excludes(&self, field: &str) -> bool {
        self.excluded_fields.contains(field)
    }
}

/// Relation specs for every entity type an amendment may reach.
///
/// Types without an entry use the empty spec: no relations followed,
/// nothing excluded, no defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendmentSpec {
    types: BTreeMap<EntityType, RelationSpec>,
}

impl AmendmentSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entity_type: impl Into<EntityType>, spec: RelationSpec) -> Self {
        self.insert(entity_type, spec);
        self
    }

    pub fn insert(&mut self, entity_type: impl Into<EntityType>, spec: RelationSpec) {
        self.types.insert(entity_type.into(), spec);
    }

    pub fn for_type(&self, entity_type: &EntityType) -> &RelationSpec {
        self.types.get(entity_type).unwrap_or(&EMPTY)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.keys()
    }

    /// Check every spec against the schema registry.
    pub fn validate(&self, schema: &SchemaRegistry) -> ConfigResult<()> {
        for (entity_type, spec) in &self.types {
            let entity = schema.require(entity_type)?;

            for relation in &spec.included_relations {
                if entity.relation_named(relation).is_none() {
                    return Err(ConfigurationError::UnknownRelation {
                        entity_type: entity_type.clone(),
                        relation: relation.clone(),
                    });
                }
            }

            for field in &spec.excluded_fields {
                if entity.field(field).is_none() {
                    return Err(ConfigurationError::UnknownField {
                        entity_type: entity_type.clone(),
                        field: field.clone(),
                    });
                }
            }

            for (field, value) in &spec.copy_defaults {
                let declared = entity
                    .field(field)
                    .ok_or_else(|| ConfigurationError::UnknownField {
                        entity_type: entity_type.clone(),
                        field: field.clone(),
                    })?;
                if !value.fits(declared.kind) {
                    return Err(ConfigurationError::DefaultKindMismatch {
                        entity_type: entity_type.clone(),
                        field: field.clone(),
                        expected: declared.kind,
                        found: value
                            .kind()
                            .map_or_else(|| "null".to_string(), |k| k.to_string()),
                    });
                }
                // A default on a merged field differs from the baseline on
                // every copy and would be written back by the next merge.
                if !spec.excludes(field) {
                    return Err(ConfigurationError::DefaultOnMergedField {
                        entity_type: entity_type.clone(),
                        field: field.clone(),
                    });
                }
            }

            debug!(
                entity_type = %entity_type,
                relations = spec.included_relations.len(),
                excluded = spec.excluded_fields.len(),
                "validated relation spec"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntitySchema;
    use amend_types::FieldKind;

    fn schema() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntitySchema::new("Document")
                    .with_field("title", FieldKind::String)
                    .with_field("status", FieldKind::String)
                    .with_field("number", FieldKind::Integer)
                    .one_to_many("line_items", "LineItem", "document"),
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
    }

    fn document_spec() -> RelationSpec {
        RelationSpec::new()
            .include("line_items")
            .exclude("status")
            .exclude("number")
            .default_value("status", "draft")
    }

    #[test]
    fn valid_spec_passes() {
        let spec = AmendmentSpec::new().with("Document", document_spec());
        spec.validate(&schema()).unwrap();
    }

    #[test]
    fn unlisted_type_gets_empty_spec() {
        let spec = AmendmentSpec::new();
        let line_item = spec.for_type(&"LineItem".into());
        assert!(line_item.included_relations.is_empty());
        assert!(!line_item.excludes("amount"));
    }

    #[test]
    fn unknown_entity_type() {
        let spec = AmendmentSpec::new().with("Invoice", RelationSpec::new());
        assert_eq!(
            spec.validate(&schema()).unwrap_err(),
            ConfigurationError::UnknownEntityType("Invoice".into())
        );
    }

    #[test]
    fn unknown_relation() {
        let spec = AmendmentSpec::new().with("Document", RelationSpec::new().include("risks"));
        assert!(matches!(
            spec.validate(&schema()).unwrap_err(),
            ConfigurationError::UnknownRelation { relation, .. } if relation == "risks"
        ));
    }

    #[test]
    fn excluding_a_relation_name_is_unknown_field() {
        let spec = AmendmentSpec::new().with("Document", RelationSpec::new().exclude("line_items"));
        assert!(matches!(
            spec.validate(&schema()).unwrap_err(),
            ConfigurationError::UnknownField { field, .. } if field == "line_items"
        ));
    }

    #[test]
    fn default_kind_mismatch() {
        let spec = AmendmentSpec::new().with(
            "Document",
            RelationSpec::new().exclude("number").default_value("number", "one"),
        );
        assert!(matches!(
            spec.validate(&schema()).unwrap_err(),
            ConfigurationError::DefaultKindMismatch { expected: FieldKind::Integer, .. }
        ));
    }

    #[test]
    fn default_on_merged_field_is_rejected() {
        let spec = AmendmentSpec::new().with(
            "Document",
            RelationSpec::new().default_value("title", "Untitled"),
        );
        assert!(matches!(
            spec.validate(&schema()).unwrap_err(),
            ConfigurationError::DefaultOnMergedField { field, .. } if field == "title"
        ));
    }

    #[test]
    fn null_default_fits_any_kind() {
        let spec = AmendmentSpec::new().with(
            "Document",
            RelationSpec::new().exclude("number").default_value("number", Value::Null),
        );
        spec.validate(&schema()).unwrap();
    }
}
