//! Join-semilattice trait for state that merges by least upper bound.
//!
//! A join-semilattice (S, ⊔) satisfies:
//! - Commutativity: a ⊔ b = b ⊔ a
//! - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//! - Idempotence:  a ⊔ a = a
//!
//! Version vectors and presence stores merge this way, so replicas that have
//! observed the same updates agree no matter the order they arrived in.

/// State that can be merged with a commutative, associative, idempotent join.
pub trait Lattice: Clone + PartialEq {
    /// The bottom element (identity for join).
    fn bottom() -> Self;

    /// Least upper bound of `self` and `other`.
    fn join(&self, other: &Self) -> Self;

    /// `self ≤ other` in the lattice order, i.e. `self ⊔ other == other`.
    fn leq(&self, other: &Self) -> bool {
        &self.join(other) == other
    }

    /// Join-assign: `self = self ⊔ other`.
    fn join_assign(&mut self, other: &Self) {
        *self = self.join(other);
    }
}
