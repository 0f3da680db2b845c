//! Version vector: the highest sequence incorporated from each actor.
//!
//! Because every actor's operations are applied in strict sequence order, the
//! vector is an exact summary of what a replica has seen: operation
//! `(actor, seq)` has been applied iff `seq <= vector[actor]`.

use crate::id::{ActorId, OperationId, Seq};
use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Map from actor to the highest contiguous sequence seen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<ActorId, Seq>,
}

impl VersionVector {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (ActorId, Seq)>) -> Self {
        let mut vv = Self::new();
        for (actor, seq) in entries {
            vv.set(actor, seq);
        }
        vv
    }

    /// Sequence seen for `actor` (0 if none).
    pub fn get(&self, actor: &ActorId) -> Seq {
        self.entries.get(actor).copied().unwrap_or(0)
    }

    /// Zero entries are not stored, so equal knowledge means equal vectors.
    pub fn set(&mut self, actor: ActorId, seq: Seq) {
        if seq > 0 {
            self.entries.insert(actor, seq);
        } else {
            self.entries.remove(&actor);
        }
    }

    /// Raise the entry for `actor` to at least `seq`.
    pub fn observe(&mut self, actor: &ActorId, seq: Seq) {
        if seq > self.get(actor) {
            self.entries.insert(actor.clone(), seq);
        }
    }

    /// Whether operation `id` is covered by this vector.
    pub fn contains(&self, id: &OperationId) -> bool {
        self.get(&id.actor) >= id.seq
    }

    /// True if for every actor, `self[a] >= other[a]`.
    pub fn dominates(&self, other: &VersionVector) -> bool {
        other
            .entries
            .iter()
            .all(|(actor, &seq)| self.get(actor) >= seq)
    }

    pub fn is_concurrent_with(&self, other: &VersionVector) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Component-wise max.
    pub fn merge(&mut self, other: &VersionVector) {
        for (actor, &seq) in &other.entries {
            self.observe(actor, seq);
        }
    }

    /// Copy of this vector without `actor`'s entry.
    pub fn without(&self, actor: &ActorId) -> VersionVector {
        let mut vv = self.clone();
        vv.entries.remove(actor);
        vv
    }

    /// Per-actor ranges `(actor, first, last)` seen by `self` but not `other`.
    pub fn diff(&self, other: &VersionVector) -> Vec<(ActorId, Seq, Seq)> {
        self.entries
            .iter()
            .filter_map(|(actor, &seq)| {
                let theirs = other.get(actor);
                (seq > theirs).then(|| (actor.clone(), theirs + 1, seq))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActorId, &Seq)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of operations summarized.
    pub fn total_operations(&self) -> u64 {
        self.entries.values().sum()
    }
}

impl Lattice for VersionVector {
    fn bottom() -> Self {
        Self::new()
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vv(entries: &[(&str, Seq)]) -> VersionVector {
        VersionVector::from_entries(entries.iter().map(|(a, s)| (ActorId::new(*a), *s)))
    }

    #[test]
    fn test_version_vector_basic() {
        let mut v = VersionVector::new();
        let a = ActorId::new("a");
        assert_eq!(v.get(&a), 0);

        v.set(a.clone(), 5);
        assert_eq!(v.get(&a), 5);

        v.observe(&a, 3);
        assert_eq!(v.get(&a), 5);
        v.observe(&a, 8);
        assert_eq!(v.get(&a), 8);
    }

    #[test]
    fn test_zero_entries_are_not_stored() {
        let mut v = vv(&[("a", 2)]);
        v.set(ActorId::new("a"), 0);
        assert!(v.is_empty());
        assert_eq!(v, VersionVector::new());
    }

    #[test]
    fn test_dominates_and_concurrency() {
        let v1 = vv(&[("a", 5), ("b", 3)]);
        let v2 = vv(&[("a", 3), ("b", 3)]);
        let v3 = vv(&[("a", 3), ("b", 5)]);

        assert!(v1.dominates(&v2));
        assert!(!v2.dominates(&v1));
        assert!(v1.is_concurrent_with(&v3));
        assert!(VersionVector::new().leq(&v1));
    }

    #[test]
    fn test_contains() {
        let v = vv(&[("a", 5)]);
        assert!(v.contains(&OperationId::new("a", 5)));
        assert!(!v.contains(&OperationId::new("a", 6)));
        assert!(!v.contains(&OperationId::new("b", 1)));
    }

    #[test]
    fn test_join_and_diff() {
        let v1 = vv(&[("a", 10), ("b", 5)]);
        let v2 = vv(&[("a", 7), ("b", 9)]);

        let joined = v1.join(&v2);
        assert_eq!(joined, vv(&[("a", 10), ("b", 9)]));

        let diff = v1.diff(&v2);
        assert_eq!(diff, vec![(ActorId::new("a"), 8, 10)]);
    }

    #[test]
    fn test_serialization() {
        let v = vv(&[("a", 5), ("b", 10)]);
        let json = serde_json::to_string(&v).unwrap();
        let back: VersionVector = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
