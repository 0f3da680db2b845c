//! Local mutation requests.
//!
//! A [`Command`] is what a caller (or a subscription callback, via
//! [`Deferred`](crate::subscription::Deferred)) asks the engine to do. The
//! engine turns it into an [`Operation`](weft_doc::Operation) only after it
//! validates against the current tree.

use std::collections::BTreeMap;
use weft_core::{Scalar, Value};
use weft_doc::NodeId;

/// Where to insert inside a parent container.
#[derive(Clone, Debug, PartialEq)]
pub enum Position {
    /// Visible list index; `len` appends.
    Index(usize),
    /// Object key.
    Key(String),
}

impl From<usize> for Position {
    fn from(index: usize) -> Self {
        Position::Index(index)
    }
}

impl From<&str> for Position {
    fn from(key: &str) -> Self {
        Position::Key(key.to_string())
    }
}

impl From<String> for Position {
    fn from(key: String) -> Self {
        Position::Key(key)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Insert {
        parent: NodeId,
        at: Position,
        value: Value,
        /// Id the inserted subtree's root will have.
        node: NodeId,
    },
    Set {
        parent: NodeId,
        key: String,
        value: Value,
        node: NodeId,
    },
    Delete {
        target: NodeId,
    },
    SetPresence(BTreeMap<String, Scalar>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Insert { .. } => "insert",
            Command::Set { .. } => "set",
            Command::Delete { .. } => "delete",
            Command::SetPresence(_) => "set_presence",
        }
    }
}
