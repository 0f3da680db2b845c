//! Ordered list sequence.
//!
//! Each element records the neighbours it was inserted between (its left
//! and right origins) and the id of the inserting operation. Integration
//! follows the YATA rules: an element is placed between its origins, and
//! among concurrent elements competing for the same gap the one with the
//! smaller [`OperationId`] goes first. Deleted elements stay behind as
//! tombstones so later inserts anchored on them still find their place.
//!
//! Visible indexes are a derived view; nothing here stores a numeric
//! position.

use crate::error::{DocError, Result};
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use weft_core::OperationId;

/// The neighbours an insert was made between.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchors {
    /// Element immediately before the insert, `None` for the list head.
    pub left: Option<NodeId>,
    /// Element immediately after the insert, `None` for the list end.
    pub right: Option<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub node: NodeId,
    /// Id of the operation that inserted this element.
    pub position: OperationId,
    pub origin_left: Option<NodeId>,
    pub origin_right: Option<NodeId>,
    pub deleted: bool,
}

/// Children of a list node, tombstones included.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    entries: Vec<Entry>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of visible elements.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tombstone_count(&self) -> usize {
        self.entries.iter().filter(|e| e.deleted).count()
    }

    /// Visible element ids in order.
    pub fn visible(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().filter(|e| !e.deleted).map(|e| e.node)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.visible().nth(index)
    }

    /// Visible index of a live element.
    pub fn index_of(&self, node: &NodeId) -> Option<usize> {
        self.visible().position(|n| n == *node)
    }

    /// Whether `node` was ever integrated here (tombstones count).
    pub fn contains(&self, node: &NodeId) -> bool {
        self.slot_of(node).is_some()
    }

    fn slot_of(&self, node: &NodeId) -> Option<usize> {
        self.entries.iter().position(|e| e.node == *node)
    }

    fn visible_before(&self, slot: usize) -> usize {
        self.entries[..slot].iter().filter(|e| !e.deleted).count()
    }

    /// Anchors for inserting at visible `index` (`index == len` appends).
    pub fn anchors_at(&self, index: usize) -> Result<Anchors> {
        if index == 0 {
            return Ok(Anchors {
                left: None,
                right: self.entries.first().map(|e| e.node),
            });
        }
        let slot = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.deleted)
            .nth(index - 1)
            .map(|(slot, _)| slot)
            .ok_or(DocError::IndexOutOfBounds {
                index,
                length: self.len(),
            })?;
        Ok(Anchors {
            left: Some(self.entries[slot].node),
            right: self.entries.get(slot + 1).map(|e| e.node),
        })
    }

    /// Append during subtree creation, anchored on the current last entry.
    pub(crate) fn append(&mut self, node: NodeId, position: OperationId) {
        let origin_left = self.entries.last().map(|e| e.node);
        self.entries.push(Entry {
            node,
            position,
            origin_left,
            origin_right: None,
            deleted: false,
        });
    }

    /// Place a new element between its anchors. Returns its visible index.
    pub fn integrate(
        &mut self,
        node: NodeId,
        position: OperationId,
        anchors: &Anchors,
    ) -> Result<usize> {
        if self.contains(&node) {
            return Err(DocError::DuplicateNode(node));
        }
        let start = match anchors.left {
            None => 0,
            Some(left) => self.slot_of(&left).ok_or(DocError::MissingAnchor(left))? + 1,
        };
        let end = match anchors.right {
            None => self.entries.len(),
            Some(right) => self.slot_of(&right).ok_or(DocError::MissingAnchor(right))?,
        }
        .max(start);

        let mut dest = start;
        let mut before_origin: HashSet<NodeId> = HashSet::new();
        let mut conflicting: HashSet<NodeId> = HashSet::new();

        for slot in start..end {
            let other = &self.entries[slot];
            before_origin.insert(other.node);
            conflicting.insert(other.node);

            if other.origin_left == anchors.left {
                if other.position < position {
                    dest = slot + 1;
                    conflicting.clear();
                } else if other.origin_right == anchors.right {
                    break;
                }
            } else if let Some(origin) = other.origin_left.filter(|o| before_origin.contains(o)) {
                if !conflicting.contains(&origin) {
                    dest = slot + 1;
                    conflicting.clear();
                }
            } else {
                break;
            }
        }

        self.entries.insert(
            dest,
            Entry {
                node,
                position,
                origin_left: anchors.left,
                origin_right: anchors.right,
                deleted: false,
            },
        );
        Ok(self.visible_before(dest))
    }

    /// Turn a live element into a tombstone. Returns the visible index it
    /// had, or `None` if it was not live.
    pub fn tombstone(&mut self, node: &NodeId) -> Option<usize> {
        let slot = self.slot_of(node)?;
        if self.entries[slot].deleted {
            return None;
        }
        let index = self.visible_before(slot);
        self.entries[slot].deleted = true;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Insert {
        node: NodeId,
        position: OperationId,
        anchors: Anchors,
    }

    fn prepare(seq: &Sequence, index: usize, actor: &str, s: u64) -> Insert {
        Insert {
            node: NodeId::generate(),
            position: OperationId::new(actor, s),
            anchors: seq.anchors_at(index).unwrap(),
        }
    }

    fn apply(seq: &mut Sequence, ins: &Insert) {
        seq.integrate(ins.node, ins.position.clone(), &ins.anchors)
            .unwrap();
    }

    #[test]
    fn test_local_inserts_land_at_index() {
        let mut seq = Sequence::new();
        let a = prepare(&seq, 0, "a", 1);
        apply(&mut seq, &a);
        let c = prepare(&seq, 1, "a", 2);
        apply(&mut seq, &c);
        let b = prepare(&seq, 1, "a", 3);
        apply(&mut seq, &b);

        let order: Vec<_> = seq.visible().collect();
        assert_eq!(order, vec![a.node, b.node, c.node]);
        assert_eq!(seq.index_of(&b.node), Some(1));
    }

    #[test]
    fn test_concurrent_head_inserts_order_by_id() {
        let empty = Sequence::new();
        let milk = prepare(&empty, 0, "a", 1);
        let dog = prepare(&empty, 0, "b", 1);

        let mut r1 = Sequence::new();
        apply(&mut r1, &milk);
        apply(&mut r1, &dog);

        let mut r2 = Sequence::new();
        apply(&mut r2, &dog);
        apply(&mut r2, &milk);

        let expected = vec![milk.node, dog.node];
        assert_eq!(r1.visible().collect::<Vec<_>>(), expected);
        assert_eq!(r2.visible().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_lower_sequence_wins_tie() {
        let empty = Sequence::new();
        let late = prepare(&empty, 0, "a", 5);
        let early = prepare(&empty, 0, "b", 3);

        let mut seq = Sequence::new();
        apply(&mut seq, &late);
        apply(&mut seq, &early);
        assert_eq!(seq.visible().collect::<Vec<_>>(), vec![early.node, late.node]);
    }

    #[test]
    fn test_runs_do_not_interleave() {
        // A types x then y; B concurrently types z at the same spot.
        let empty = Sequence::new();
        let mut a_view = Sequence::new();
        let x = prepare(&a_view, 0, "a", 1);
        apply(&mut a_view, &x);
        let y = prepare(&a_view, 1, "a", 2);
        let z = prepare(&empty, 0, "b", 1);

        let mut r1 = Sequence::new();
        for ins in [&x, &y, &z] {
            apply(&mut r1, ins);
        }
        let mut r2 = Sequence::new();
        for ins in [&z, &x, &y] {
            apply(&mut r2, ins);
        }

        let expected = vec![x.node, y.node, z.node];
        assert_eq!(r1.visible().collect::<Vec<_>>(), expected);
        assert_eq!(r2.visible().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_insert_next_to_tombstone() {
        let mut seq = Sequence::new();
        let a = prepare(&seq, 0, "a", 1);
        apply(&mut seq, &a);
        let b = prepare(&seq, 1, "a", 2);
        apply(&mut seq, &b);

        // Concurrent: one side deletes a, the other inserts after it.
        let after_a = prepare(&seq, 1, "b", 1);
        assert_eq!(seq.tombstone(&a.node), Some(0));
        assert_eq!(seq.tombstone(&a.node), None);
        apply(&mut seq, &after_a);

        assert_eq!(seq.visible().collect::<Vec<_>>(), vec![after_a.node, b.node]);
        assert_eq!(seq.tombstone_count(), 1);
        assert!(seq.contains(&a.node));
        assert_eq!(seq.index_of(&a.node), None);
    }

    #[test]
    fn test_anchor_errors() {
        let mut seq = Sequence::new();
        assert!(matches!(
            seq.anchors_at(1),
            Err(DocError::IndexOutOfBounds { index: 1, length: 0 })
        ));

        let missing = NodeId::generate();
        let anchors = Anchors {
            left: Some(missing),
            right: None,
        };
        assert_eq!(
            seq.integrate(NodeId::generate(), OperationId::new("a", 1), &anchors),
            Err(DocError::MissingAnchor(missing))
        );
    }
}
