//! Actor identity and operation ids.
//!
//! Every mutation is stamped with an [`OperationId`]: the issuing actor and
//! that actor's next sequence number. Ids are totally ordered by sequence
//! first and actor second, which is the order every conflict rule in the
//! engine resolves against.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use ulid::Ulid;

/// Per-actor sequence number.
pub type Seq = u64;

/// Opaque identifier of one connected participant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, globally unique actor id.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Globally unique id of one operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId {
    /// Position in the issuing actor's history, starting at 1.
    pub seq: Seq,
    /// The issuing actor.
    pub actor: ActorId,
}

impl OperationId {
    pub fn new(actor: impl Into<ActorId>, seq: Seq) -> Self {
        Self {
            seq,
            actor: actor.into(),
        }
    }
}

impl PartialOrd for OperationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OperationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.actor.cmp(&other.actor))
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.seq, self.actor)
    }
}

/// Monotonic operation counter owned by the local actor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    actor: ActorId,
    seq: Seq,
}

impl Clock {
    /// A clock that has issued nothing yet.
    pub fn new(actor: ActorId) -> Self {
        Self { actor, seq: 0 }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// Last issued sequence (0 if none).
    pub fn current(&self) -> Seq {
        self.seq
    }

    /// Issue the next operation id.
    pub fn tick(&mut self) -> OperationId {
        self.seq += 1;
        OperationId {
            seq: self.seq,
            actor: self.actor.clone(),
        }
    }

    /// Never issue a sequence at or below `seq` again.
    pub fn advance_to(&mut self, seq: Seq) {
        self.seq = self.seq.max(seq);
    }
}
