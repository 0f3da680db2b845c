//! Weft core - identity, clock and value model shared by every Weft crate.
//!
//! - [`id`] - actor ids, totally ordered operation ids and the per-actor clock
//! - [`value`] - the closed scalar/value model stored in documents and presence
//! - [`version_vector`] - last-seen sequence per actor
//! - [`lattice`] - join-semilattice trait used for state merges

pub mod id;
pub mod lattice;
pub mod value;
pub mod version_vector;

pub use id::{ActorId, Clock, OperationId, Seq};
pub use lattice::Lattice;
pub use value::{Scalar, Value};
pub use version_vector::VersionVector;
