//! Replicated operations.
//!
//! Operations address nodes by structural id, never by path or index, so
//! they mean the same thing on every replica regardless of what else has
//! been applied. Move is not an operation; callers delete and re-insert.

use crate::list::Anchors;
use crate::node::{NodeId, NodeSeed};
use serde::{Deserialize, Serialize};
use weft_causal::CausalEvent;
use weft_core::{OperationId, Scalar, VersionVector};

/// Where an inserted subtree goes inside its parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Slot {
    /// Bind an object key.
    Key(String),
    /// Place in a list between two neighbours.
    Between(Anchors),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    Insert {
        parent: NodeId,
        slot: Slot,
        seed: NodeSeed,
    },
    Delete {
        target: NodeId,
    },
    SetScalar {
        parent: NodeId,
        key: String,
        value: Scalar,
        /// Id of the scalar node the set creates.
        node: NodeId,
    },
}

/// An immutable, uniquely identified mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    /// What the issuing actor had applied when it created this operation.
    pub deps: VersionVector,
    pub kind: OpKind,
}

impl Operation {
    pub fn new(id: OperationId, deps: VersionVector, kind: OpKind) -> Self {
        Self { id, deps, kind }
    }

    /// The node this operation mutates: the parent for inserts and sets,
    /// the target for deletes.
    pub fn subject(&self) -> NodeId {
        match &self.kind {
            OpKind::Insert { parent, .. } | OpKind::SetScalar { parent, .. } => *parent,
            OpKind::Delete { target } => *target,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            OpKind::Insert { .. } => "insert",
            OpKind::Delete { .. } => "delete",
            OpKind::SetScalar { .. } => "set",
        }
    }
}

impl CausalEvent for Operation {
    fn id(&self) -> &OperationId {
        &self.id
    }

    fn deps(&self) -> &VersionVector {
        &self.deps
    }
}
