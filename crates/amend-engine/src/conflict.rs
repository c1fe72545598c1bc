//! Conflict reporting.
//!
//! A merge never picks a winner. Every divergence it finds is recorded with
//! all three sides so a person or a higher-level policy can resolve it.

use std::fmt;

use serde::{Deserialize, Serialize};

use amend_types::{EntityId, EntityType, Value};

/// What kind of divergence a conflict describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// A scalar field changed on both sides to different values.
    Field,
    /// A many-to-one reference changed on both sides to different targets.
    Reference,
    /// A child was deleted on one side and modified on the other.
    DeletedWhileModified,
    /// Merging would leave a one-to-one relation with two children.
    Cardinality,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Field => "field",
            Self::Reference => "reference",
            Self::DeletedWhileModified => "deleted while modified",
            Self::Cardinality => "cardinality",
        };
        f.write_str(s)
    }
}

/// One side of a conflict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConflictValue {
    Value(Value),
    Reference(Option<EntityId>),
    /// The child entity exists on this side.
    Present(EntityId),
    /// The child entity is gone on this side.
    Absent,
}

impl fmt::Display for ConflictValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Reference(Some(id)) => write!(f, "-> {id}"),
            Self::Reference(None) => f.write_str("-> none"),
            Self::Present(id) => write!(f, "present ({})", id.short_id()),
            Self::Absent => f.write_str("absent"),
        }
    }
}

impl From<Value> for ConflictValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A single unresolved divergence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub entity_type: EntityType,
    /// Identity of the entity in the original subtree.
    pub entity_id: EntityId,
    /// Field or relation name.
    pub field: String,
    pub kind: ConflictKind,
    pub baseline: ConflictValue,
    pub original: ConflictValue,
    pub incoming: ConflictValue,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}).{} [{}]: baseline {}, original {}, incoming {}",
            self.entity_type,
            self.entity_id.short_id(),
            self.field,
            self.kind,
            self.baseline,
            self.original,
            self.incoming
        )
    }
}

/// All conflicts found in one merge, in traversal order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("merge aborted: {} conflict(s)", conflicts.len())]
pub struct ConflictReport {
    conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// The first conflict on `field` of entity `id`.
    pub fn find(&self, id: &EntityId, field: &str) -> Option<&Conflict> {
        self.conflicts
            .iter()
            .find(|c| &c.entity_id == id && c.field == field)
    }

    /// Number of conflicts of the given kind.
    pub fn count(&self, kind: ConflictKind) -> usize {
        self.conflicts.iter().filter(|c| c.kind == kind).count()
    }
}

impl IntoIterator for ConflictReport {
    type Item = Conflict;
    type IntoIter = std::vec::IntoIter<Conflict>;

    fn into_iter(self) -> Self::IntoIter {
        self.conflicts.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount_conflict(id: EntityId) -> Conflict {
        Conflict {
            entity_type: EntityType::from("LineItem"),
            entity_id: id,
            field: "amount".into(),
            kind: ConflictKind::Field,
            baseline: Value::Integer(100).into(),
            original: Value::Integer(150).into(),
            incoming: Value::Integer(120).into(),
        }
    }

    #[test]
    fn report_lookup_and_counts() {
        let id = EntityId::new();
        let mut report = ConflictReport::new();
        assert!(report.is_empty());
        report.push(amount_conflict(id));
        report.push(Conflict {
            field: "notes".into(),
            kind: ConflictKind::DeletedWhileModified,
            baseline: ConflictValue::Present(id),
            original: ConflictValue::Present(id),
            incoming: ConflictValue::Absent,
            ..amount_conflict(id)
        });

        assert_eq!(report.len(), 2);
        assert_eq!(report.count(ConflictKind::Field), 1);
        assert_eq!(report.find(&id, "amount").unwrap().original, Value::Integer(150).into());
        assert!(report.find(&EntityId::new(), "amount").is_none());
        assert_eq!(report.to_string(), "merge aborted: 2 conflict(s)");
    }

    #[test]
    fn conflict_display_shows_all_sides() {
        let text = amount_conflict(EntityId::new()).to_string();
        assert!(text.contains("amount [field]"));
        assert!(text.ends_with("baseline 100, original 150, incoming 120"));
    }

    #[test]
    fn report_serializes() {
        let mut report = ConflictReport::new();
        report.push(amount_conflict(EntityId::new()));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["conflicts"][0]["kind"], "field");
        assert_eq!(json["conflicts"][0]["incoming"]["value"]["value"], 120);
    }
}
