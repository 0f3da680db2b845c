//! # weft-engine
//!
//! The client-side engine of Weft: a replicated document, presence and
//! subscriptions behind one synchronous facade, with a transport boundary
//! for moving frames between peers.
//!
//! # Quick Start
//!
//! ```rust
//! use weft_engine::prelude::*;
//!
//! let mut engine = Engine::with_actor("alice");
//! let root = engine.root();
//! let todos = engine.insert(root, "todos", Value::empty_list()).unwrap();
//! engine.insert(todos, 0usize, Value::from("buy milk")).unwrap();
//!
//! engine.subscribe(Scope::Path(Path::parse("todos").unwrap()), |note, _deferred| {
//!     println!("{note:?}");
//! });
//!
//! assert_eq!(engine.to_json(), serde_json::json!({"todos": ["buy milk"]}));
//! ```
//!
//! # Architecture
//!
//! - [`engine`] - the [`Engine`] facade and turn machinery
//! - [`reconcile`] - causal admission and tree application
//! - [`subscription`] - scoped callbacks and deferred turns
//! - [`message`] - wire messages and their JSON codec
//! - [`outbound`] - the single-consumer outbound stream
//! - [`network`] / [`session`] - transport abstraction and the pump tasks
//! - [`config`] / [`error`] - configuration and error types

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod network;
pub mod outbound;
pub mod reconcile;
pub mod session;
pub mod subscription;

pub use command::{Command, Position};
pub use config::{EngineConfig, EngineConfigBuilder, OverflowPolicy};
pub use engine::{Engine, EngineStats};
pub use error::{EngineError, Result};
pub use message::Message;
pub use network::{
    create_network, Frame, MemoryTransport, NetworkError, NetworkTransport, Peer, PeerId,
    PeerState,
};
pub use outbound::Outbound;
pub use reconcile::{Reconciler, Reconciliation, Snapshot};
pub use session::{Session, SessionHandle};
pub use subscription::{Deferred, Notification, Scope, Unsubscribe};

pub use weft_core::{ActorId, OperationId, Scalar, Value, VersionVector};
pub use weft_doc::{Delta, DeltaKind, NodeId, Path, PresenceChange, PresenceRecord};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{EngineConfig, EngineConfigBuilder};
    pub use crate::engine::Engine;
    pub use crate::error::EngineError;
    pub use crate::subscription::{Deferred, Notification, Scope};
    pub use weft_core::{ActorId, Scalar, Value};
    pub use weft_doc::{Delta, DeltaKind, NodeId, Path, PresenceChange};
}
