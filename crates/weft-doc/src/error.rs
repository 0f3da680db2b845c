//! Error types for the document layer.

use crate::node::NodeId;
use thiserror::Error;

/// Errors that can occur when mutating or reading the document tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocError {
    /// The addressed parent or target is not in the tree. On the remote
    /// path this is a benign merge race.
    #[error("Detached target: {0}")]
    DetachedTarget(NodeId),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid index: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Invalid path segment: {0}")]
    InvalidPath(String),

    #[error("Node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("List anchor {0} not found")]
    MissingAnchor(NodeId),

    #[error("The root object cannot be deleted")]
    RootDeletion,

    /// A loaded tree whose child references and parent links disagree.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DocError {
    /// Whether this error is an expected outcome of concurrent editing
    /// rather than a malformed request.
    pub fn is_benign(&self) -> bool {
        matches!(self, DocError::DetachedTarget(_))
    }
}

impl From<serde_json::Error> for DocError {
    fn from(err: serde_json::Error) -> Self {
        DocError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocError>;
