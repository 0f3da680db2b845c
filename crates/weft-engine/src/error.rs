//! Error types for the engine.

use thiserror::Error;
use weft_causal::CausalityGap;
use weft_core::{ActorId, Seq};
use weft_doc::DocError;

/// Errors surfaced by engine calls. None of them leave the engine in an
/// unusable state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A local mutation failed validation, or a document read failed.
    #[error("Document error: {0}")]
    Document(#[from] DocError),

    /// An inbound frame failed structural validation and was dropped.
    #[error("Malformed operation: {0}")]
    MalformedOperation(String),

    /// Buffered operations from `actor` waited too long for `expected`.
    #[error("Causality gap timeout: {actor} never delivered seq {expected}")]
    CausalityGapTimeout { actor: ActorId, expected: Seq },

    /// The outbound stream has already been handed out.
    #[error("Outbound stream already taken")]
    OutboundTaken,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Benign merge outcomes that callers may ignore.
    pub fn is_benign(&self) -> bool {
        matches!(self, EngineError::Document(e) if e.is_benign())
    }
}

impl From<CausalityGap> for EngineError {
    fn from(gap: CausalityGap) -> Self {
        EngineError::CausalityGapTimeout {
            actor: gap.actor,
            expected: gap.expected,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
