//! Traversal guard for entity graph walks.
//!
//! Copy and merge descend through child relations. Relation declarations may
//! be cyclic and stored data may be inconsistent, so every walk records the
//! entities it has entered and refuses to nest deeper than the configured
//! maximum.

use std::collections::HashSet;

use amend_types::EntityId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Refusal {
    Cycle(EntityId),
    TooDeep(usize),
}

#[derive(Debug)]
pub(crate) struct Traversal {
    visited: HashSet<EntityId>,
    max_depth: usize,
}

impl Traversal {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            visited: HashSet::new(),
            max_depth,
        }
    }

    /// Enter `id` at `depth`. Each entity may be entered once per walk.
    pub(crate) fn enter(&mut self, id: EntityId, depth: usize) -> Result<(), Refusal> {
        if depth > self.max_depth {
            return Err(Refusal::TooDeep(self.max_depth));
        }
        if !self.visited.insert(id) {
            return Err(Refusal::Cycle(id));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn visited(&self) -> usize {
        self.visited.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_visit_is_a_cycle() {
        let mut walk = Traversal::new(4);
        let id = EntityId::new();
        walk.enter(id, 0).unwrap();
        assert_eq!(walk.enter(id, 1), Err(Refusal::Cycle(id)));
        assert_eq!(walk.visited(), 1);
    }

    #[test]
    fn depth_limit_is_inclusive() {
        let mut walk = Traversal::new(2);
        walk.enter(EntityId::new(), 2).unwrap();
        assert_eq!(walk.enter(EntityId::new(), 3), Err(Refusal::TooDeep(2)));
    }
}
