//! Weft Causal - per-actor ordering and operation history
//!
//! This crate decides *when* a remote operation may be applied; it never
//! looks inside the operation. Anything that implements [`CausalEvent`] can be
//! tracked.
//!
//! # Delivery rule
//!
//! ```text
//! On receive op (actor a, seq s, deps D):
//!   s <= seen[a]                      -> Duplicate (drop)
//!   s == seen[a] + 1 and seen >= D    -> Apply, seen[a] := s, drain buffer
//!   otherwise                         -> Buffer until the gap fills
//! ```
//!
//! `deps` is the sender's version vector at the moment it created the
//! operation, so an operation is never applied before anything it could have
//! observed.
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_causal::{Acceptance, CausalityTracker};
//!
//! let mut tracker = CausalityTracker::new(BufferPolicy::default());
//! match tracker.accept(&op, Instant::now()) {
//!     Acceptance::Apply => apply(op),
//!     Acceptance::Duplicate | Acceptance::Buffer => {}
//!     Acceptance::Overflow => request_resync(),
//! }
//! while let Some(ready) = tracker.pop_ready() {
//!     apply(ready);
//! }
//! ```

pub mod log;
pub mod tracker;

use weft_core::{OperationId, VersionVector};

pub use log::{LogEntry, OperationLog, OpStatus};
pub use tracker::{Acceptance, BufferPolicy, CausalityGap, CausalityTracker};

/// An event with a position in its actor's history and causal dependencies.
pub trait CausalEvent: Clone {
    fn id(&self) -> &OperationId;

    /// Version vector the event's creator had observed, excluding itself.
    fn deps(&self) -> &VersionVector;
}
