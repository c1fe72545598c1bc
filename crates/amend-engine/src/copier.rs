//! Entity graph copier.
//!
//! Produces an independent copy of an entity and its included child subtree
//! together with the correspondence entry the merge needs later. Each entity
//! is persisted before its children are copied, since children are linked to
//! the new parent through its stored id.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use amend_ledger::{LedgerEntry, RelationBaseline};
use amend_spec::{AmendmentSpec, EntitySchema, RelationDescriptor, RelationKind};
use amend_store::{EntityRecord, EntityStore};
use amend_types::{CanonicalValue, EntityId, EntityType, Value};

use crate::engine::AmendmentEngine;
use crate::error::{CopyError, CopyFailure, EngineResult};
use crate::traversal::{Refusal, Traversal};
use crate::txn::atomically;

/// Per-call copy options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOptions {
    /// Extra copy defaults per entity type, layered over the spec's own.
    /// They follow the same rules: declared, kind-correct, and excluded.
    #[serde(default)]
    pub defaults: BTreeMap<EntityType, BTreeMap<String, Value>>,
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_value(
        mut self,
        entity_type: impl Into<EntityType>,
        field: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.defaults
            .entry(entity_type.into())
            .or_default()
            .insert(field.to_string(), value.into());
        self
    }
}

/// A finished copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyOutcome {
    pub copy_id: EntityId,
    /// Root correspondence entry, ready to be sealed into a ledger.
    pub entry: LedgerEntry,
    /// Number of entities created.
    pub entities: usize,
}

struct Parent<'r> {
    back_reference: &'r str,
    copy_id: EntityId,
}

impl<'a, S: EntityStore + ?Sized> AmendmentEngine<'a, S> {
    /// Copy `original_id` and its included subtree in one transaction.
    pub fn copy(&self, original_id: &EntityId, options: &CopyOptions) -> EngineResult<CopyOutcome> {
        let spec = self.effective_spec(options)?;
        let entry = atomically(self.store, "copy", || {
            let source = self.store.require(original_id)?;
            let schema = self.require_schema(&source.entity_type)?;
            let mut walk = Traversal::new(self.config.max_depth);
            walk.enter(source.id, 0)
                .map_err(|r| copy_refusal(&source.entity_type, "", r))?;
            self.copy_entity(&source, schema, None, &spec, &mut walk, 0)
        })?;

        let entities = entry.entity_count();
        info!(
            original = %original_id.short_id(),
            copy = %entry.copy_id.short_id(),
            entities,
            "copy created"
        );
        Ok(CopyOutcome {
            copy_id: entry.copy_id,
            entry,
            entities,
        })
    }

    fn effective_spec(&self, options: &CopyOptions) -> EngineResult<Cow<'a, AmendmentSpec>> {
        if options.defaults.is_empty() {
            return Ok(Cow::Borrowed(self.spec));
        }
        let mut spec = self.spec.clone();
        for (entity_type, defaults) in &options.defaults {
            let mut relation_spec = spec.for_type(entity_type).clone();
            relation_spec
                .copy_defaults
                .extend(defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
            spec.insert(entity_type.clone(), relation_spec);
        }
        spec.validate(self.schema)?;
        Ok(Cow::Owned(spec))
    }

    fn copy_entity(
        &self,
        source: &EntityRecord,
        schema: &EntitySchema,
        parent: Option<Parent<'_>>,
        spec: &AmendmentSpec,
        walk: &mut Traversal,
        depth: usize,
    ) -> EngineResult<LedgerEntry> {
        let entity_type = &source.entity_type;
        let relation_spec = spec.for_type(entity_type);
        check_declared(source, schema)?;

        let mut copy = EntityRecord::new(entity_type.clone());
        let mut entry = LedgerEntry::new(entity_type.clone(), source.id, copy.id);

        for field in &schema.fields {
            let current = source.get_field(&field.name);
            let excluded = relation_spec.excludes(&field.name);
            // Excluded fields stay on the original; the copy only gets their defaults.
            let value = match relation_spec.copy_defaults.get(&field.name) {
                Some(default) => default,
                None if excluded => continue,
                None => current,
            };
            if !value.fits(field.kind) {
                let found = value.kind().map_or_else(|| "null".into(), |k| k.to_string());
                return Err(CopyError::new(
                    entity_type,
                    &field.name,
                    CopyFailure::KindMismatch {
                        expected: field.kind,
                        found,
                    },
                )
                .into());
            }
            if !value.is_null() {
                copy.set_field(&field.name, value.clone());
            }
            if !excluded {
                entry
                    .baseline_fields
                    .insert(field.name.clone(), CanonicalValue::capture(current));
            }
        }

        // The back-reference always follows the new parent and is never baselined.
        let back_reference = parent.as_ref().map(|p| p.back_reference);
        if let Some(parent) = &parent {
            copy.set_reference(parent.back_reference, Some(parent.copy_id));
        }

        for relation in &schema.relations {
            if !relation_spec.includes(&relation.name) || back_reference == Some(relation.name.as_str()) {
                continue;
            }
            match relation.kind {
                RelationKind::ManyToOne => {
                    let target = source.get_reference(&relation.name);
                    if let Some(id) = &target {
                        self.resolve(entity_type, relation, id)?;
                    }
                    copy.set_reference(&relation.name, target);
                    entry
                        .baseline_relations
                        .insert(relation.name.clone(), RelationBaseline::Reference(target));
                }
                RelationKind::ManyToMany => {
                    let members = source.get_members(&relation.name);
                    for id in &members {
                        self.resolve(entity_type, relation, id)?;
                    }
                    copy.set_members(&relation.name, members.clone());
                    entry
                        .baseline_relations
                        .insert(relation.name.clone(), RelationBaseline::Members(members));
                }
                RelationKind::OneToOne | RelationKind::OneToMany => {}
            }
        }

        let copy_id = self.store.insert(copy)?;
        debug!(
            entity_type = %entity_type,
            original = %source.id.short_id(),
            copy = %copy_id.short_id(),
            depth,
            "copied entity"
        );

        for relation in self.child_relations(schema, spec) {
            let Some(back_reference) = relation.back_reference.as_deref() else {
                continue;
            };
            let children = self.children_of(relation, &source.id)?;
            if relation.kind == RelationKind::OneToOne && children.len() > 1 {
                return Err(CopyError::new(
                    entity_type,
                    &relation.name,
                    CopyFailure::TooManyChildren(children.len()),
                )
                .into());
            }

            let child_schema = self.require_schema(&relation.target)?;
            let mut nested = BTreeMap::new();
            for child in &children {
                walk.enter(child.id, depth + 1)
                    .map_err(|r| copy_refusal(entity_type, &relation.name, r))?;
                let parent = Parent {
                    back_reference,
                    copy_id,
                };
                let child_entry =
                    self.copy_entity(child, child_schema, Some(parent), spec, walk, depth + 1)?;
                nested.insert(child.id, child_entry);
            }

            let baseline = match relation.kind {
                RelationKind::OneToOne => {
                    RelationBaseline::Child(nested.into_values().next().map(Box::new))
                }
                _ => RelationBaseline::Children(nested),
            };
            entry.baseline_relations.insert(relation.name.clone(), baseline);
        }

        Ok(entry)
    }

    /// A many-to-one or many-to-many target must exist with the declared type.
    fn resolve(
        &self,
        owner: &EntityType,
        relation: &RelationDescriptor,
        target: &EntityId,
    ) -> EngineResult<()> {
        let record = self
            .store
            .get(target)?
            .ok_or_else(|| CopyError::new(owner, &relation.name, CopyFailure::UnresolvedTarget(*target)))?;
        if record.entity_type != relation.target {
            return Err(CopyError::new(
                owner,
                &relation.name,
                CopyFailure::TypeMismatch {
                    id: *target,
                    expected: relation.target.clone(),
                    found: record.entity_type,
                },
            )
            .into());
        }
        Ok(())
    }
}

/// Every stored member of `record` must be declared on its type.
fn check_declared(record: &EntityRecord, schema: &EntitySchema) -> Result<(), CopyError> {
    let undeclared_field = record.fields.keys().find(|name| schema.field(name).is_none());
    let undeclared_relation = record
        .references
        .keys()
        .chain(record.members.keys())
        .find(|name| schema.relation_named(name).is_none());
    match undeclared_field.or(undeclared_relation) {
        Some(name) => Err(CopyError::new(&record.entity_type, name, CopyFailure::Undeclared)),
        None => Ok(()),
    }
}

fn copy_refusal(entity_type: &EntityType, relation: &str, refusal: Refusal) -> CopyError {
    let reason = match refusal {
        Refusal::Cycle(id) => CopyFailure::Cycle(id),
        Refusal::TooDeep(max) => CopyFailure::TooDeep(max),
    };
    CopyError::new(entity_type, relation, reason)
}
