//! # weft-doc
//!
//! The replicated document of the Weft engine.
//!
//! This crate provides:
//! - An arena [`Tree`] of objects, lists and scalars addressed by [`NodeId`]
//! - List ordering by insert anchors with deterministic tie-breaks
//! - Last-writer-wins object keys on [`weft_core::OperationId`] order
//! - [`Operation`]s and the path-scoped [`Delta`]s they produce
//! - The ephemeral [`PresenceStore`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use weft_doc::{NodeSeed, OpKind, Operation, Slot, Tree};
//!
//! let mut tree = Tree::new();
//! let op = Operation::new(id, deps, OpKind::Insert {
//!     parent: tree.root(),
//!     slot: Slot::Key("todos".into()),
//!     seed: NodeSeed::from_value(&Value::empty_list()),
//! });
//! let deltas = tree.apply(&op)?;
//! ```

pub mod delta;
pub mod error;
pub mod list;
pub mod node;
pub mod op;
pub mod path;
pub mod presence;
pub mod tree;

pub use delta::{Delta, DeltaKind};
pub use error::{DocError, Result};
pub use list::{Anchors, Sequence};
pub use node::{Content, Node, NodeId, NodeSeed, ObjectSlot, SeedKind};
pub use op::{OpKind, Operation, Slot};
pub use path::{Path, PathSegment};
pub use presence::{PresenceChange, PresenceRecord, PresenceStore};
pub use tree::Tree;
