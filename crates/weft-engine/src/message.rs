//! Wire messages.
//!
//! Frames are JSON. Every message is tagged with the actor it concerns;
//! operations carry their own id and causal dependencies.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use weft_core::{ActorId, Seq};
use weft_doc::{OpKind, Operation, PresenceRecord};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A document operation.
    Op(Operation),
    /// The sender's full presence record.
    Presence {
        actor: ActorId,
        record: PresenceRecord,
    },
    /// The sender disconnected; `version` is its last presence version.
    Leave { actor: ActorId, version: u64 },
    /// The ordering authority committed `actor`'s operations through `seq`.
    Ack { actor: ActorId, seq: Seq },
    /// `requester` asks `actor` to resend its operations from `from`.
    Resync {
        requester: ActorId,
        actor: ActorId,
        from: Seq,
    },
}

impl Message {
    /// The actor this message concerns.
    pub fn actor(&self) -> &ActorId {
        match self {
            Message::Op(op) => &op.id.actor,
            Message::Presence { actor, .. }
            | Message::Leave { actor, .. }
            | Message::Ack { actor, .. }
            | Message::Resync { actor, .. } => actor,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Op(_) => "op",
            Message::Presence { .. } => "presence",
            Message::Leave { .. } => "leave",
            Message::Ack { .. } => "ack",
            Message::Resync { .. } => "resync",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        let message: Message = serde_json::from_slice(raw)
            .map_err(|e| EngineError::MalformedOperation(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    /// Structural checks serde cannot express.
    fn validate(&self) -> Result<()> {
        match self {
            Message::Op(op) if op.id.seq == 0 => Err(EngineError::MalformedOperation(format!(
                "operation {} has sequence 0",
                op.id
            ))),
            Message::Op(op) if op.deps.get(&op.id.actor) >= op.id.seq => {
                Err(EngineError::MalformedOperation(format!(
                    "operation {} depends on itself",
                    op.id
                )))
            }
            Message::Op(Operation {
                id,
                kind: OpKind::Insert { seed, .. },
                ..
            }) => match seed.repeated_id() {
                Some(node) => Err(EngineError::MalformedOperation(format!(
                    "operation {id} creates node {node} twice"
                ))),
                None => Ok(()),
            },
            Message::Resync { from: 0, .. } => Err(EngineError::MalformedOperation(
                "resync from sequence 0".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
