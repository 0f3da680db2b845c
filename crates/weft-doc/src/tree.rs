//! The document tree: an arena of nodes addressed by structural id.
//!
//! Every non-root node has exactly one parent link and is referenced by
//! exactly one slot of that parent. Deleting a node reclaims its whole
//! subtree from the arena; list positions survive as tombstones in the
//! parent's [`Sequence`].
//!
//! [`Tree::apply`] is the single entry point for mutation. It is
//! order-independent: concurrent operations applied in any causal order
//! produce the same tree.

use crate::delta::Delta;
use crate::error::{DocError, Result};
use crate::list::{Anchors, Sequence};
use crate::node::{Content, Node, NodeId, NodeSeed, ObjectSlot, SeedKind};
use crate::op::{OpKind, Operation, Slot};
use crate::path::{Path, PathSegment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use weft_core::{OperationId, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TreeRepr", into = "TreeRepr")]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
}

/// Serialized form: a flat node list, sorted by id.
#[derive(Serialize, Deserialize)]
struct TreeRepr {
    nodes: Vec<Node>,
}

impl From<Tree> for TreeRepr {
    fn from(tree: Tree) -> Self {
        let mut nodes: Vec<Node> = tree.nodes.into_values().collect();
        nodes.sort_by_key(|n| n.id);
        Self { nodes }
    }
}

impl TryFrom<TreeRepr> for Tree {
    type Error = DocError;

    fn try_from(repr: TreeRepr) -> Result<Self> {
        let mut nodes = HashMap::with_capacity(repr.nodes.len());
        for node in repr.nodes {
            let id = node.id;
            if nodes.insert(id, node).is_some() {
                return Err(DocError::DuplicateNode(id));
            }
        }
        let tree = Self { nodes };
        tree.object(NodeId::root())?;
        tree.check_structure()?;
        Ok(tree)
    }
}

impl Tree {
    /// An empty root object.
    pub fn new() -> Self {
        let root = Node {
            id: NodeId::root(),
            parent: None,
            content: Content::Object(BTreeMap::new()),
        };
        Self {
            nodes: HashMap::from([(root.id, root)]),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::root()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Tombstones held across every list.
    pub fn tombstone_count(&self) -> usize {
        self.nodes
            .values()
            .map(|n| match &n.content {
                Content::List(seq) => seq.tombstone_count(),
                _ => 0,
            })
            .sum()
    }

    /// Walk from the root and confirm every live child reference resolves
    /// to a node that names its container as parent, that no node is
    /// referenced twice, and that nothing sits outside the root's subtree.
    fn check_structure(&self) -> Result<()> {
        if self.existing(NodeId::root())?.parent.is_some() {
            return Err(DocError::InvalidSnapshot("root has a parent".to_string()));
        }
        let mut reached = HashSet::new();
        let mut stack = vec![NodeId::root()];
        while let Some(id) = stack.pop() {
            for child in self.existing(id)?.children() {
                let node = self.nodes.get(&child).ok_or_else(|| {
                    DocError::InvalidSnapshot(format!("{id} references missing node {child}"))
                })?;
                if node.parent != Some(id) {
                    return Err(DocError::InvalidSnapshot(format!(
                        "{child} is held by {id} but does not name it as parent"
                    )));
                }
                if !reached.insert(child) {
                    return Err(DocError::InvalidSnapshot(format!(
                        "{child} is referenced more than once"
                    )));
                }
                stack.push(child);
            }
        }
        let unreachable = self.nodes.len() - 1 - reached.len();
        if unreachable > 0 {
            return Err(DocError::InvalidSnapshot(format!(
                "{unreachable} nodes are unreachable from the root"
            )));
        }
        Ok(())
    }

    fn existing(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(DocError::DetachedTarget(id))
    }

    fn object(&self, id: NodeId) -> Result<&BTreeMap<String, ObjectSlot>> {
        match &self.existing(id)?.content {
            Content::Object(slots) => Ok(slots),
            other => Err(DocError::TypeMismatch {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    fn list(&self, id: NodeId) -> Result<&Sequence> {
        match &self.existing(id)?.content {
            Content::List(seq) => Ok(seq),
            other => Err(DocError::TypeMismatch {
                expected: "list",
                found: other.kind(),
            }),
        }
    }

    fn content_mut(&mut self, id: NodeId) -> Result<&mut Content> {
        self.nodes
            .get_mut(&id)
            .map(|n| &mut n.content)
            .ok_or(DocError::DetachedTarget(id))
    }

    // === Reads ===

    /// Materialize the value or subtree at `id`.
    pub fn get(&self, id: &NodeId) -> Result<Value> {
        let node = self.existing(*id)?;
        Ok(match &node.content {
            Content::Scalar(s) => Value::Scalar(s.clone()),
            Content::List(seq) => {
                Value::List(seq.visible().filter_map(|c| self.get(&c).ok()).collect())
            }
            Content::Object(slots) => Value::Object(
                slots
                    .iter()
                    .filter_map(|(k, slot)| {
                        let child = slot.child?;
                        Some((k.clone(), self.get(&child).ok()?))
                    })
                    .collect(),
            ),
        })
    }

    /// The whole document.
    pub fn to_value(&self) -> Value {
        self.get(&NodeId::root())
            .unwrap_or_else(|_| Value::empty_object())
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.to_value().to_json()
    }

    /// Current path of a live node.
    pub fn path_of(&self, id: &NodeId) -> Option<Path> {
        let mut segments = Vec::new();
        let mut current = *id;
        while let Some(parent) = self.nodes.get(&current)?.parent {
            let segment = match &self.nodes.get(&parent)?.content {
                Content::List(seq) => PathSegment::Index(seq.index_of(&current)?),
                Content::Object(slots) => {
                    let (key, _) = slots.iter().find(|(_, s)| s.child == Some(current))?;
                    PathSegment::Key(key.clone())
                }
                Content::Scalar(_) => return None,
            };
            segments.push(segment);
            current = parent;
        }
        segments.reverse();
        Some(Path::new(segments))
    }

    /// Resolve a path to the node it currently addresses.
    pub fn node_at(&self, path: &Path) -> Result<NodeId> {
        let mut current = NodeId::root();
        for segment in path.segments() {
            let node = self.existing(current)?;
            let next = match (segment, &node.content) {
                (PathSegment::Key(key), Content::Object(slots)) => {
                    slots.get(key).and_then(|s| s.child)
                }
                (PathSegment::Index(i), Content::List(seq)) => seq.get(*i),
                (PathSegment::Index(i), Content::Object(slots)) => {
                    slots.get(&i.to_string()).and_then(|s| s.child)
                }
                (PathSegment::Key(_), other) => {
                    return Err(DocError::TypeMismatch {
                        expected: "object",
                        found: other.kind(),
                    })
                }
                (PathSegment::Index(_), other) => {
                    return Err(DocError::TypeMismatch {
                        expected: "list",
                        found: other.kind(),
                    })
                }
            };
            current = next.ok_or_else(|| DocError::PathNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    pub fn get_path(&self, path: &Path) -> Result<Value> {
        self.get(&self.node_at(path)?)
    }

    /// Visible length of a list.
    pub fn list_len(&self, list: &NodeId) -> Result<usize> {
        Ok(self.list(*list)?.len())
    }

    /// Element at a visible list index.
    pub fn list_element(&self, list: &NodeId, index: usize) -> Result<NodeId> {
        let seq = self.list(*list)?;
        seq.get(index).ok_or(DocError::IndexOutOfBounds {
            index,
            length: seq.len(),
        })
    }

    /// Anchors for inserting at a visible list index.
    pub fn list_anchors(&self, list: &NodeId, index: usize) -> Result<Anchors> {
        self.list(*list)?.anchors_at(index)
    }

    // === Mutation ===

    /// Check that `kind` would apply cleanly, without changing anything.
    pub fn check(&self, kind: &OpKind) -> Result<()> {
        match kind {
            OpKind::Insert {
                parent,
                slot: Slot::Key(_),
                seed,
            } => {
                self.object(*parent)?;
                self.check_fresh(seed)
            }
            OpKind::Insert {
                parent,
                slot: Slot::Between(anchors),
                seed,
            } => {
                let seq = self.list(*parent)?;
                for anchor in [anchors.left, anchors.right].into_iter().flatten() {
                    if !seq.contains(&anchor) {
                        return Err(DocError::MissingAnchor(anchor));
                    }
                }
                self.check_fresh(seed)
            }
            OpKind::SetScalar { parent, node, .. } => {
                self.object(*parent)?;
                if self.contains(node) {
                    return Err(DocError::DuplicateNode(*node));
                }
                Ok(())
            }
            OpKind::Delete { target } => {
                if target.is_root() {
                    return Err(DocError::RootDeletion);
                }
                self.existing(*target).map(|_| ())
            }
        }
    }

    /// Every id in `seed` is new to the tree and used once.
    fn check_fresh(&self, seed: &NodeSeed) -> Result<()> {
        if let Some(id) = seed.repeated_id() {
            return Err(DocError::DuplicateNode(id));
        }
        match seed.ids().into_iter().find(|id| self.contains(id)) {
            Some(id) => Err(DocError::DuplicateNode(id)),
            None => Ok(()),
        }
    }

    /// Apply an operation and report what became observably different.
    ///
    /// An operation that loses last-writer-wins applies as a no-op and
    /// yields no deltas. Errors leave the tree unchanged.
    pub fn apply(&mut self, op: &Operation) -> Result<Vec<Delta>> {
        self.check(&op.kind)?;
        match &op.kind {
            OpKind::Insert {
                parent,
                slot: Slot::Key(key),
                seed,
            } => self.assign(*parent, key, seed, &op.id),
            OpKind::Insert {
                parent,
                slot: Slot::Between(anchors),
                seed,
            } => self.insert_into_list(*parent, anchors, seed, &op.id),
            OpKind::SetScalar {
                parent,
                key,
                value,
                node,
            } => {
                let seed = NodeSeed {
                    id: *node,
                    kind: SeedKind::Scalar(value.clone()),
                };
                self.assign(*parent, key, &seed, &op.id)
            }
            OpKind::Delete { target } => self.remove(*target),
        }
    }

    fn assign(
        &mut self,
        parent: NodeId,
        key: &str,
        seed: &NodeSeed,
        id: &OperationId,
    ) -> Result<Vec<Delta>> {
        let previous = match self.object(parent)?.get(key) {
            Some(slot) if slot.set_by >= *id => return Ok(Vec::new()),
            Some(slot) => slot.child,
            None => None,
        };
        let old_value = previous.and_then(|child| self.get(&child).ok());
        let path = self.path_of(&parent).map(|p| p.child_key(key));

        if let Some(child) = previous {
            self.reclaim(child);
        }
        self.materialize(seed, parent, id);
        if let Content::Object(slots) = self.content_mut(parent)? {
            slots.insert(
                key.to_string(),
                ObjectSlot {
                    child: Some(seed.id),
                    set_by: id.clone(),
                },
            );
        }

        let value = seed.to_value();
        Ok(match (path, old_value) {
            (None, _) => Vec::new(),
            (Some(_), Some(old)) if old == value => Vec::new(),
            (Some(path), Some(_)) => vec![Delta::updated(path, value)],
            (Some(path), None) => vec![Delta::created(path, value)],
        })
    }

    fn insert_into_list(
        &mut self,
        parent: NodeId,
        anchors: &Anchors,
        seed: &NodeSeed,
        id: &OperationId,
    ) -> Result<Vec<Delta>> {
        let index = match self.content_mut(parent)? {
            Content::List(seq) => seq.integrate(seed.id, id.clone(), anchors)?,
            other => {
                return Err(DocError::TypeMismatch {
                    expected: "list",
                    found: other.kind(),
                })
            }
        };
        self.materialize(seed, parent, id);

        Ok(self
            .path_of(&parent)
            .map(|p| Delta::created(p.child_index(index), seed.to_value()))
            .into_iter()
            .collect())
    }

    fn remove(&mut self, target: NodeId) -> Result<Vec<Delta>> {
        let parent = self
            .existing(target)?
            .parent
            .ok_or(DocError::RootDeletion)?;
        let path = self.path_of(&target);

        match self.content_mut(parent)? {
            Content::List(seq) => {
                seq.tombstone(&target);
            }
            Content::Object(slots) => {
                for slot in slots.values_mut().filter(|s| s.child == Some(target)) {
                    slot.child = None;
                }
            }
            Content::Scalar(_) => {}
        }
        self.reclaim(target);

        Ok(path.map(Delta::deleted).into_iter().collect())
    }

    /// Create the seeded subtree under `parent`. Seeded children inherit the
    /// creating operation's id.
    fn materialize(&mut self, seed: &NodeSeed, parent: NodeId, id: &OperationId) {
        let content = match &seed.kind {
            SeedKind::Scalar(s) => Content::Scalar(s.clone()),
            SeedKind::List(items) => {
                let mut seq = Sequence::new();
                for item in items {
                    seq.append(item.id, id.clone());
                    self.materialize(item, seed.id, id);
                }
                Content::List(seq)
            }
            SeedKind::Object(map) => {
                let mut slots = BTreeMap::new();
                for (key, child) in map {
                    slots.insert(
                        key.clone(),
                        ObjectSlot {
                            child: Some(child.id),
                            set_by: id.clone(),
                        },
                    );
                    self.materialize(child, seed.id, id);
                }
                Content::Object(slots)
            }
        };
        self.nodes.insert(
            seed.id,
            Node {
                id: seed.id,
                parent: Some(parent),
                content,
            },
        );
    }

    /// Remove a subtree from the arena. Returns the number of nodes freed.
    fn reclaim(&mut self, id: NodeId) -> usize {
        let mut freed = 0;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                stack.extend(node.children());
                freed += 1;
            }
        }
        freed
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
