//! Shared test fixtures: a small document model with every relation kind.

use amend_spec::{AmendmentSpec, EntitySchema, RelationSpec, SchemaRegistry};
use amend_store::{EntityRecord, EntityStore, InMemoryEntityStore};
use amend_types::{EntityId, FieldKind, Value};

use crate::config::EngineConfig;
use crate::engine::AmendmentEngine;

pub(crate) fn schema() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    let schemas = [
        EntitySchema::new("Document")
            .with_field("title", FieldKind::String)
            .with_field("status", FieldKind::String)
            .with_field("reference_number", FieldKind::Integer)
            .with_field("signed_on", FieldKind::Date)
            .many_to_one("owner", "User")
            .one_to_one("budget", "Budget", "document")
            .one_to_many("line_items", "LineItem", "document")
            .one_to_many("risks", "Risk", "document")
            .many_to_many("tags", "Tag"),
        EntitySchema::new("Budget")
            .with_field("cash", FieldKind::Decimal)
            .with_field("contribution", FieldKind::Decimal)
            .with_field("total", FieldKind::Decimal)
            .many_to_one("document", "Document"),
        EntitySchema::new("LineItem")
            .with_field("description", FieldKind::String)
            .with_field("amount", FieldKind::Decimal)
            .many_to_one("document", "Document")
            .one_to_many("notes", "Note", "line_item"),
        EntitySchema::new("Note")
            .with_field("text", FieldKind::String)
            .many_to_one("line_item", "LineItem"),
        EntitySchema::new("Risk")
            .with_field("summary", FieldKind::String)
            .many_to_one("document", "Document"),
        EntitySchema::new("User").with_field("name", FieldKind::String),
        EntitySchema::new("Tag").with_field("label", FieldKind::String),
    ];
    for schema in schemas {
        registry.register(schema).unwrap();
    }
    registry
}

pub(crate) fn spec() -> AmendmentSpec {
    AmendmentSpec::new()
        .with(
            "Document",
            RelationSpec::new()
                .include("owner")
                .include("budget")
                .include("line_items")
                .include("tags")
                .exclude("status")
                .exclude("reference_number")
                .default_value("status", "draft"),
        )
        .with("Budget", RelationSpec::new().exclude("total"))
        .with("LineItem", RelationSpec::new().include("notes"))
}

pub(crate) fn dec(literal: &str) -> Value {
    Value::decimal(literal).unwrap()
}

pub(crate) struct Seeded {
    pub document: EntityId,
    pub owner: EntityId,
    pub other_owner: EntityId,
    pub budget: EntityId,
    pub items: Vec<EntityId>,
    pub note: EntityId,
    pub risk: EntityId,
    pub tags: Vec<EntityId>,
}

pub(crate) fn seed(store: &InMemoryEntityStore) -> Seeded {
    let owner = store.insert(EntityRecord::new("User").field("name", "Ada")).unwrap();
    let other_owner = store.insert(EntityRecord::new("User").field("name", "Grace")).unwrap();
    let tags: Vec<EntityId> = ["A", "B", "C", "D"]
        .into_iter()
        .map(|label| store.insert(EntityRecord::new("Tag").field("label", label)).unwrap())
        .collect();

    let document = store
        .insert(
            EntityRecord::new("Document")
                .field("title", "Annual plan")
                .field("status", "approved")
                .field("reference_number", 42i64)
                .field("signed_on", Value::parse(FieldKind::Date, "2024-03-01").unwrap())
                .reference("owner", owner)
                .members_of("tags", [tags[0], tags[1]]),
        )
        .unwrap();

    let budget = store
        .insert(
            EntityRecord::new("Budget")
                .field("cash", dec("100.00"))
                .field("contribution", dec("50.00"))
                .field("total", dec("150.00"))
                .reference("document", document),
        )
        .unwrap();

    let items: Vec<EntityId> = [("Design", "10.00"), ("Build", "20.00")]
        .into_iter()
        .map(|(description, amount)| {
            store
                .insert(
                    EntityRecord::new("LineItem")
                        .field("description", description)
                        .field("amount", dec(amount))
                        .reference("document", document),
                )
                .unwrap()
        })
        .collect();

    let note = store
        .insert(
            EntityRecord::new("Note")
                .field("text", "check vendor")
                .reference("line_item", items[0]),
        )
        .unwrap();

    let risk = store
        .insert(
            EntityRecord::new("Risk")
                .field("summary", "late delivery")
                .reference("document", document),
        )
        .unwrap();

    Seeded {
        document,
        owner,
        other_owner,
        budget,
        items,
        note,
        risk,
        tags,
    }
}

/// Engine over borrowed fixtures. Schema and spec are leaked so tests can
/// hold the engine without juggling lifetimes.
pub(crate) fn engine(store: &InMemoryEntityStore) -> AmendmentEngine<'_, InMemoryEntityStore> {
    let schema: &'static SchemaRegistry = Box::leak(Box::new(schema()));
    let spec: &'static AmendmentSpec = Box::leak(Box::new(spec()));
    AmendmentEngine::new(store, schema, spec, EngineConfig::default()).unwrap()
}
