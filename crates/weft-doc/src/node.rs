//! Arena nodes and the seeds operations carry to create them.

use crate::list::Sequence;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use ulid::Ulid;
use weft_core::{OperationId, Scalar, Value};

/// Structural id of a node in the tree.
///
/// Assigned once at creation and carried inside the creating operation, so
/// every replica addresses the node by the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(Ulid);

impl NodeId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// The fixed id of the root object.
    pub fn root() -> Self {
        Self(Ulid::nil())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_nil()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// An object key binding. Kept after the child is deleted so an older
/// concurrent set cannot resurrect the key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectSlot {
    pub child: Option<NodeId>,
    pub set_by: OperationId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Content {
    Scalar(Scalar),
    List(Sequence),
    Object(BTreeMap<String, ObjectSlot>),
}

impl Content {
    pub fn kind(&self) -> &'static str {
        match self {
            Content::Scalar(_) => "scalar",
            Content::List(_) => "list",
            Content::Object(_) => "object",
        }
    }
}

/// A node in the arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// None only for the root.
    pub parent: Option<NodeId>,
    pub content: Content,
}

impl Node {
    pub fn kind(&self) -> &'static str {
        self.content.kind()
    }

    /// Ids of live children in document order.
    pub fn children(&self) -> Vec<NodeId> {
        match &self.content {
            Content::Scalar(_) => Vec::new(),
            Content::List(seq) => seq.visible().collect(),
            Content::Object(slots) => slots.values().filter_map(|s| s.child).collect(),
        }
    }
}

/// A subtree to be created by an insert, with ids already assigned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSeed {
    pub id: NodeId,
    pub kind: SeedKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SeedKind {
    Scalar(Scalar),
    List(Vec<NodeSeed>),
    Object(BTreeMap<String, NodeSeed>),
}

impl NodeSeed {
    /// Assign fresh ids to every node of `value`.
    pub fn from_value(value: &Value) -> Self {
        Self::with_id(NodeId::generate(), value)
    }

    /// Like [`from_value`](Self::from_value) but with a pre-allocated root id.
    pub fn with_id(id: NodeId, value: &Value) -> Self {
        let kind = match value {
            Value::Scalar(s) => SeedKind::Scalar(s.clone()),
            Value::List(items) => SeedKind::List(items.iter().map(NodeSeed::from_value).collect()),
            Value::Object(map) => SeedKind::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), NodeSeed::from_value(v)))
                    .collect(),
            ),
        };
        Self { id, kind }
    }

    pub fn to_value(&self) -> Value {
        match &self.kind {
            SeedKind::Scalar(s) => Value::Scalar(s.clone()),
            SeedKind::List(items) => Value::List(items.iter().map(NodeSeed::to_value).collect()),
            SeedKind::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
            }
        }
    }

    /// Every id in the subtree, root first.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(seed) = stack.pop() {
            out.push(seed.id);
            match &seed.kind {
                SeedKind::Scalar(_) => {}
                SeedKind::List(items) => stack.extend(items.iter().rev()),
                SeedKind::Object(map) => stack.extend(map.values().rev()),
            }
        }
        out
    }

    /// The first id that occurs more than once in the subtree.
    pub fn repeated_id(&self) -> Option<NodeId> {
        let mut seen = HashSet::new();
        self.ids().into_iter().find(|id| !seen.insert(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_id_is_fixed() {
        assert_eq!(NodeId::root(), NodeId::root());
        assert!(NodeId::root().is_root());
        assert!(!NodeId::generate().is_root());
        assert_eq!(NodeId::root().to_string(), "root");
    }

    #[test]
    fn test_seed_assigns_distinct_ids() {
        let value = Value::object([
            ("title", Value::from("groceries")),
            ("items", Value::list([Value::from("milk"), Value::from("eggs")])),
        ]);
        let seed = NodeSeed::from_value(&value);

        let ids = seed.ids();
        assert_eq!(ids.len(), 5);
        assert_eq!(ids[0], seed.id);
        let unique: std::collections::BTreeSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 5);

        assert_eq!(seed.to_value(), value);
    }

    #[test]
    fn test_repeated_id_is_found() {
        let item = NodeSeed::from_value(&Value::from("x"));
        let seed = NodeSeed {
            id: NodeId::generate(),
            kind: SeedKind::List(vec![item.clone(), item.clone()]),
        };
        assert_eq!(seed.repeated_id(), Some(item.id));

        let fresh = NodeSeed::from_value(&Value::list([Value::from("x"), Value::from("x")]));
        assert_eq!(fresh.repeated_id(), None);
    }
}
