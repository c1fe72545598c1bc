//! Three-way merge of a copy back into its original.
//!
//! A merge runs in two phases inside one store transaction. Planning walks
//! the ledger together with both live subtrees, classifies every baselined
//! field and relation, and collects every conflict it finds. Only a plan
//! with no conflicts is applied. For a scalar field or a many-to-one
//! reference with baseline `B`, original `O` and incoming copy value `C`:
//!
//! | condition              | action          |
//! |------------------------|-----------------|
//! | `C == B`               | nothing         |
//! | `C == O`               | already applied |
//! | `O != B`               | conflict        |
//! | otherwise              | `O := C`        |
//!
//! Many-to-many relations are merged as sets and never conflict:
//! `O := (O ∪ (C − B)) − (B − C)`. Concurrent edits on both sides are
//! combined rather than checked, which is a weaker guarantee than the one
//! fields and references get.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use amend_ledger::{LedgerEntry, RelationBaseline};
use amend_spec::{RelationDescriptor, RelationKind};
use amend_store::{EntityRecord, EntityStore};
use amend_types::{CanonicalValue, EntityId, Value};

use crate::conflict::{Conflict, ConflictKind, ConflictReport, ConflictValue};
use crate::engine::{merge_refusal, AmendmentEngine};
use crate::error::{EngineResult, MergeError, Side};
use crate::traversal::Traversal;
use crate::txn::atomically;

/// Per-call merge options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Delete what is left of the copy subtree in the same transaction.
    #[serde(default)]
    pub discard_copy: bool,
}

impl MergeOptions {
    pub fn discarding_copy() -> Self {
        Self { discard_copy: true }
    }
}

/// What a successful merge changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub fields_applied: usize,
    /// Fields the original already held the incoming value for.
    pub fields_already_applied: usize,
    pub references_applied: usize,
    pub children_inserted: usize,
    pub children_removed: usize,
    pub members_added: usize,
    pub members_removed: usize,
    pub copy_entities_discarded: usize,
}

impl MergeOutcome {
    /// Number of writes made to the original subtree.
    pub fn changes(&self) -> usize {
        self.fields_applied
            + self.references_applied
            + self.children_inserted
            + self.children_removed
            + self.members_added
            + self.members_removed
    }

    pub fn is_noop(&self) -> bool {
        self.changes() == 0
    }
}

#[derive(Debug)]
enum Step {
    SetField {
        id: EntityId,
        field: String,
        value: Value,
    },
    SetReference {
        id: EntityId,
        relation: String,
        target: Option<EntityId>,
    },
    SetMembers {
        id: EntityId,
        relation: String,
        members: BTreeSet<EntityId>,
    },
    /// Move a child created in the copy under the original parent.
    Reparent {
        child: EntityId,
        back_reference: String,
        parent: EntityId,
    },
    /// Delete a child and its subtree, parents first.
    Remove { ids: Vec<EntityId> },
}

struct Plan {
    walk: Traversal,
    steps: Vec<Step>,
    conflicts: ConflictReport,
    outcome: MergeOutcome,
}

impl Plan {
    fn new(max_depth: usize) -> Self {
        Self {
            walk: Traversal::new(max_depth),
            steps: Vec::new(),
            conflicts: ConflictReport::new(),
            outcome: MergeOutcome::default(),
        }
    }
}

enum Verdict {
    Unchanged,
    AlreadyApplied,
    Conflict,
    Apply,
}

fn classify<T: PartialEq>(baseline: &T, original: &T, incoming: &T) -> Verdict {
    if incoming == baseline {
        Verdict::Unchanged
    } else if incoming == original {
        Verdict::AlreadyApplied
    } else if original != baseline {
        Verdict::Conflict
    } else {
        Verdict::Apply
    }
}

fn side_id(entry: &LedgerEntry, side: Side) -> EntityId {
    match side {
        Side::Original => entry.original_id,
        Side::Copy => entry.copy_id,
    }
}

fn check_type(entry: &LedgerEntry, record: &EntityRecord, side: Side) -> Result<(), MergeError> {
    if record.entity_type != entry.entity_type {
        return Err(MergeError::TypeMismatch {
            side,
            id: record.id,
            expected: entry.entity_type.clone(),
            found: record.entity_type.clone(),
        });
    }
    Ok(())
}

fn decode(entry: &LedgerEntry, field: &str, baseline: &CanonicalValue) -> Result<Value, MergeError> {
    baseline.decode().map_err(|source| MergeError::CorruptBaseline {
        entity_type: entry.entity_type.clone(),
        field: field.to_string(),
        source,
    })
}

fn by_id(records: Vec<EntityRecord>) -> BTreeMap<EntityId, EntityRecord> {
    records.into_iter().map(|r| (r.id, r)).collect()
}

impl<'a, S: EntityStore + ?Sized> AmendmentEngine<'a, S> {
    /// Merge the copy described by `entry` back into its original.
    ///
    /// Either every change in the subtree is applied, or none is and the
    /// error carries the full [`ConflictReport`]. The ledger entry is only
    /// read, so an unchanged copy can be merged any number of times with
    /// the same result.
    pub fn merge(&self, entry: &LedgerEntry, options: &MergeOptions) -> EngineResult<MergeOutcome> {
        let outcome = atomically(self.store, "merge", || {
            let original = self.load_root(entry, Side::Original)?;
            let copy = self.load_root(entry, Side::Copy)?;

            let mut plan = Plan::new(self.config.max_depth);
            plan.walk.enter(original.id, 0).map_err(merge_refusal)?;
            self.plan_entity(entry, &original, &copy, &mut plan, 0)?;

            if !plan.conflicts.is_empty() {
                warn!(
                    original = %entry.original_id.short_id(),
                    conflicts = plan.conflicts.len(),
                    "merge aborted by conflicts"
                );
                return Err(plan.conflicts.into());
            }

            let mut outcome = self.apply(plan)?;
            if options.discard_copy {
                outcome.copy_entities_discarded = self.delete_subtree(&entry.copy_id)?;
            }
            Ok(outcome)
        })?;

        info!(
            original = %entry.original_id.short_id(),
            changes = outcome.changes(),
            already_applied = outcome.fields_already_applied,
            discarded = outcome.copy_entities_discarded,
            "merge applied"
        );
        Ok(outcome)
    }

    fn load_root(&self, entry: &LedgerEntry, side: Side) -> EngineResult<EntityRecord> {
        let id = side_id(entry, side);
        let record = self
            .store
            .get(&id)?
            .ok_or(MergeError::MissingRoot { side, id })?;
        check_type(entry, &record, side)?;
        Ok(record)
    }

    fn plan_entity(
        &self,
        entry: &LedgerEntry,
        original: &EntityRecord,
        copy: &EntityRecord,
        plan: &mut Plan,
        depth: usize,
    ) -> EngineResult<()> {
        check_type(entry, original, Side::Original)?;
        check_type(entry, copy, Side::Copy)?;
        let schema = self.require_schema(&entry.entity_type)?;
        let relation_spec = self.spec.for_type(&entry.entity_type);

        // Fields missing from the baseline were never copied and are never checked.
        for (name, baseline) in &entry.baseline_fields {
            if relation_spec.excludes(name) || schema.field(name).is_none() {
                continue;
            }
            let baseline = decode(entry, name, baseline)?;
            let current = original.get_field(name);
            let incoming = copy.get_field(name);
            match classify(&baseline, current, incoming) {
                Verdict::Unchanged => {}
                Verdict::AlreadyApplied => plan.outcome.fields_already_applied += 1,
                Verdict::Conflict => plan.conflicts.push(Conflict {
                    entity_type: entry.entity_type.clone(),
                    entity_id: original.id,
                    field: name.clone(),
                    kind: ConflictKind::Field,
                    baseline: baseline.into(),
                    original: current.clone().into(),
                    incoming: incoming.clone().into(),
                }),
                Verdict::Apply => {
                    plan.steps.push(Step::SetField {
                        id: original.id,
                        field: name.clone(),
                        value: incoming.clone(),
                    });
                    plan.outcome.fields_applied += 1;
                }
            }
        }

        for (name, baseline) in &entry.baseline_relations {
            let Some(relation) = schema.relation_named(name) else {
                continue;
            };
            if !relation_spec.includes(name) {
                continue;
            }
            match baseline {
                RelationBaseline::Reference(baseline) => {
                    let current = original.get_reference(name);
                    let incoming = copy.get_reference(name);
                    match classify(baseline, &current, &incoming) {
                        Verdict::Unchanged | Verdict::AlreadyApplied => {}
                        Verdict::Conflict => plan.conflicts.push(Conflict {
                            entity_type: entry.entity_type.clone(),
                            entity_id: original.id,
                            field: name.clone(),
                            kind: ConflictKind::Reference,
                            baseline: ConflictValue::Reference(*baseline),
                            original: ConflictValue::Reference(current),
                            incoming: ConflictValue::Reference(incoming),
                        }),
                        Verdict::Apply => {
                            plan.steps.push(Step::SetReference {
                                id: original.id,
                                relation: name.clone(),
                                target: incoming,
                            });
                            plan.outcome.references_applied += 1;
                        }
                    }
                }
                RelationBaseline::Members(baseline) => {
                    let incoming = copy.get_members(name);
                    let current = original.get_members(name);
                    let added: BTreeSet<EntityId> = incoming.difference(baseline).copied().collect();
                    let removed: BTreeSet<EntityId> = baseline.difference(&incoming).copied().collect();
                    let merged: BTreeSet<EntityId> = current
                        .union(&added)
                        .filter(|id| !removed.contains(id))
                        .copied()
                        .collect();
                    if merged != current {
                        plan.outcome.members_added += merged.difference(&current).count();
                        plan.outcome.members_removed += current.difference(&merged).count();
                        plan.steps.push(Step::SetMembers {
                            id: original.id,
                            relation: name.clone(),
                            members: merged,
                        });
                    }
                }
                RelationBaseline::Child(_) | RelationBaseline::Children(_) => {
                    self.plan_children(relation, baseline.child_entries(), original, copy, plan, depth)?;
                }
            }
        }

        debug!(
            entity_type = %entry.entity_type,
            original = %original.id.short_id(),
            depth,
            "planned entity"
        );
        Ok(())
    }

    /// Reconcile one child relation by correspondence entry.
    fn plan_children(
        &self,
        relation: &RelationDescriptor,
        baseline: BTreeMap<EntityId, &LedgerEntry>,
        original: &EntityRecord,
        copy: &EntityRecord,
        plan: &mut Plan,
        depth: usize,
    ) -> EngineResult<()> {
        let Some(back_reference) = relation.back_reference.as_deref() else {
            return Ok(());
        };
        let in_original = by_id(self.children_of(relation, &original.id)?);
        let in_copy = by_id(self.children_of(relation, &copy.id)?);
        let tracked: BTreeSet<EntityId> = baseline.values().map(|e| e.copy_id).collect();
        let mut removed = 0;

        for (original_id, child) in &baseline {
            match (in_original.get(original_id), in_copy.get(&child.copy_id)) {
                (Some(current), Some(incoming)) => {
                    plan.walk.enter(current.id, depth + 1).map_err(merge_refusal)?;
                    self.plan_entity(child, current, incoming, plan, depth + 1)?;
                }
                (Some(current), None) => {
                    // Deleted in the copy: only an untouched original may go.
                    if self.diverged(child, current, Side::Original, depth + 1)? {
                        plan.conflicts.push(Conflict {
                            entity_type: child.entity_type.clone(),
                            entity_id: *original_id,
                            field: relation.name.clone(),
                            kind: ConflictKind::DeletedWhileModified,
                            baseline: ConflictValue::Present(*original_id),
                            original: ConflictValue::Present(*original_id),
                            incoming: ConflictValue::Absent,
                        });
                    } else {
                        let ids = self.subtree_ids(current)?;
                        debug!(relation = %relation.name, removed = ids.len(), "child removed");
                        plan.steps.push(Step::Remove { ids });
                        plan.outcome.children_removed += 1;
                        removed += 1;
                    }
                }
                (None, Some(incoming)) => {
                    // Deleted in the original: edits made to the copy would be lost.
                    if self.diverged(child, incoming, Side::Copy, depth + 1)? {
                        plan.conflicts.push(Conflict {
                            entity_type: child.entity_type.clone(),
                            entity_id: *original_id,
                            field: relation.name.clone(),
                            kind: ConflictKind::DeletedWhileModified,
                            baseline: ConflictValue::Present(*original_id),
                            original: ConflictValue::Absent,
                            incoming: ConflictValue::Present(incoming.id),
                        });
                    }
                }
                (None, None) => {}
            }
        }

        // Children of the original that the ledger never saw are left alone.
        let created: Vec<&EntityRecord> = in_copy
            .values()
            .filter(|c| !tracked.contains(&c.id))
            .collect();

        if relation.kind == RelationKind::OneToOne
            && !created.is_empty()
            && in_original.len() - removed + created.len() > 1
        {
            let existing = in_original.keys().next().copied();
            plan.conflicts.push(Conflict {
                entity_type: original.entity_type.clone(),
                entity_id: original.id,
                field: relation.name.clone(),
                kind: ConflictKind::Cardinality,
                baseline: baseline
                    .keys()
                    .next()
                    .map_or(ConflictValue::Absent, |id| ConflictValue::Present(*id)),
                original: existing.map_or(ConflictValue::Absent, ConflictValue::Present),
                incoming: ConflictValue::Present(created[0].id),
            });
            return Ok(());
        }

        for child in created {
            debug!(relation = %relation.name, child = %child.id.short_id(), "child inserted");
            plan.steps.push(Step::Reparent {
                child: child.id,
                back_reference: back_reference.to_string(),
                parent: original.id,
            });
            plan.outcome.children_inserted += 1;
        }
        Ok(())
    }

    /// Whether `record` or anything under it differs from the baseline in
    /// `entry`. `side` says which identities the record's subtree carries.
    fn diverged(
        &self,
        entry: &LedgerEntry,
        record: &EntityRecord,
        side: Side,
        depth: usize,
    ) -> EngineResult<bool> {
        if depth > self.config.max_depth {
            return Err(MergeError::TooDeep(self.config.max_depth).into());
        }
        let schema = self.require_schema(&entry.entity_type)?;
        let relation_spec = self.spec.for_type(&entry.entity_type);

        for (name, baseline) in &entry.baseline_fields {
            if relation_spec.excludes(name) || schema.field(name).is_none() {
                continue;
            }
            if record.get_field(name) != &decode(entry, name, baseline)? {
                return Ok(true);
            }
        }

        for (name, baseline) in &entry.baseline_relations {
            let Some(relation) = schema.relation_named(name) else {
                continue;
            };
            if !relation_spec.includes(name) {
                continue;
            }
            let changed = match baseline {
                RelationBaseline::Reference(target) => record.get_reference(name) != *target,
                RelationBaseline::Members(members) => &record.get_members(name) != members,
                RelationBaseline::Child(_) | RelationBaseline::Children(_) => {
                    let expected = baseline.child_entries();
                    let present = by_id(self.children_of(relation, &record.id)?);
                    let expected_ids: BTreeSet<EntityId> =
                        expected.values().map(|e| side_id(e, side)).collect();
                    if present.keys().copied().collect::<BTreeSet<_>>() != expected_ids {
                        true
                    } else {
                        let mut any = false;
                        for child in expected.values() {
                            if let Some(found) = present.get(&side_id(child, side)) {
                                if self.diverged(child, found, side, depth + 1)? {
                                    any = true;
                                    break;
                                }
                            }
                        }
                        any
                    }
                }
            };
            if changed {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn apply(&self, plan: Plan) -> EngineResult<MergeOutcome> {
        for step in plan.steps {
            match step {
                Step::SetField { id, field, value } => {
                    self.rewrite(&id, |r| r.set_field(&field, value))?;
                }
                Step::SetReference {
                    id,
                    relation,
                    target,
                } => {
                    self.rewrite(&id, |r| r.set_reference(&relation, target))?;
                }
                Step::SetMembers {
                    id,
                    relation,
                    members,
                } => {
                    self.rewrite(&id, |r| r.set_members(&relation, members))?;
                }
                Step::Reparent {
                    child,
                    back_reference,
                    parent,
                } => {
                    self.rewrite(&child, |r| r.set_reference(&back_reference, Some(parent)))?;
                }
                Step::Remove { ids } => {
                    for id in &ids {
                        self.store.delete(id)?;
                    }
                }
            }
        }
        Ok(plan.outcome)
    }

    fn rewrite(&self, id: &EntityId, edit: impl FnOnce(&mut EntityRecord)) -> EngineResult<()> {
        let mut record = self.store.require(id)?;
        edit(&mut record);
        self.store.update(&record)?;
        Ok(())
    }
}
