//! Causality tracker: per-actor sequencing with buffer-and-drain.
//!
//! The tracker owns the replica's version vector. Remote operations that
//! arrive ahead of their predecessors wait in a per-actor buffer, ordered by
//! sequence, and are released by [`CausalityTracker::pop_ready`] once the
//! gap closes.

use crate::CausalEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use weft_core::{ActorId, Seq, VersionVector};

/// Outcome of offering an operation to the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acceptance {
    /// Next in sequence with all dependencies met. The tracker has advanced;
    /// the caller must apply the operation now.
    Apply,
    /// Already incorporated or already buffered. Drop it.
    Duplicate,
    /// Held until missing predecessors arrive.
    Buffer,
    /// Would have been buffered, but the buffer policy refused it.
    Overflow,
}

/// Bounds on how much out-of-order input is held.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPolicy {
    /// Max buffered operations for one actor.
    pub max_per_actor: usize,
    /// Max buffered operations across all actors.
    pub max_total: usize,
    /// How long a gap may stay open before it is reported.
    pub gap_timeout: Duration,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            max_per_actor: 1_000,
            max_total: 10_000,
            gap_timeout: Duration::from_secs(30),
        }
    }
}

/// A gap that did not fill within the policy's timeout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CausalityGap {
    pub actor: ActorId,
    /// The sequence the tracker is waiting for.
    pub expected: Seq,
    /// Operations dropped from the buffer when the gap was reported.
    pub dropped: usize,
    pub waited: Duration,
}

#[derive(Clone, Debug)]
struct Parked<E> {
    event: E,
    received_at: Instant,
}

/// Tracks the highest sequence incorporated per actor.
#[derive(Clone, Debug)]
pub struct CausalityTracker<E: CausalEvent> {
    seen: VersionVector,
    parked: BTreeMap<ActorId, BTreeMap<Seq, Parked<E>>>,
    parked_total: usize,
    policy: BufferPolicy,
}

impl<E: CausalEvent> CausalityTracker<E> {
    pub fn new(policy: BufferPolicy) -> Self {
        Self {
            seen: VersionVector::new(),
            parked: BTreeMap::new(),
            parked_total: 0,
            policy,
        }
    }

    /// Start from a known vector (e.g. a loaded snapshot).
    pub fn with_vector(policy: BufferPolicy, seen: VersionVector) -> Self {
        Self {
            seen,
            ..Self::new(policy)
        }
    }

    pub fn policy(&self) -> &BufferPolicy {
        &self.policy
    }

    /// The local version vector.
    pub fn seen(&self) -> &VersionVector {
        &self.seen
    }

    /// Highest sequence incorporated for `actor`.
    pub fn seen_for(&self, actor: &ActorId) -> Seq {
        self.seen.get(actor)
    }

    /// Record an operation this replica generated itself.
    pub fn record_local(&mut self, event: &E) {
        let id = event.id();
        self.seen.observe(&id.actor, id.seq);
    }

    fn is_ready(&self, event: &E) -> bool {
        let id = event.id();
        id.seq == self.seen.get(&id.actor) + 1 && self.seen.dominates(event.deps())
    }

    /// Classify without changing anything.
    pub fn classify(&self, event: &E) -> Acceptance {
        let id = event.id();
        if id.seq <= self.seen.get(&id.actor) {
            return Acceptance::Duplicate;
        }
        if self.is_ready(event) {
            return Acceptance::Apply;
        }
        let already_parked = self
            .parked
            .get(&id.actor)
            .is_some_and(|queue| queue.contains_key(&id.seq));
        if already_parked {
            Acceptance::Duplicate
        } else if self.parked_total >= self.policy.max_total
            || self.parked_count_for(&id.actor) >= self.policy.max_per_actor
        {
            Acceptance::Overflow
        } else {
            Acceptance::Buffer
        }
    }

    /// Offer a remote operation.
    ///
    /// On [`Acceptance::Apply`] the vector already includes the operation.
    /// Follow every `Apply` with [`pop_ready`](Self::pop_ready) until it
    /// returns `None`.
    pub fn accept(&mut self, event: &E, now: Instant) -> Acceptance {
        let acceptance = self.classify(event);
        let id = event.id();
        match acceptance {
            Acceptance::Apply => self.seen.observe(&id.actor, id.seq),
            Acceptance::Buffer => {
                self.parked.entry(id.actor.clone()).or_default().insert(
                    id.seq,
                    Parked {
                        event: event.clone(),
                        received_at: now,
                    },
                );
                self.parked_total += 1;
            }
            Acceptance::Duplicate | Acceptance::Overflow => {}
        }
        acceptance
    }

    /// Release the next buffered operation whose gap has closed, advancing
    /// the vector. Stale buffered duplicates are discarded along the way.
    pub fn pop_ready(&mut self) -> Option<E> {
        let mut found: Option<ActorId> = None;
        let mut emptied = Vec::new();

        for (actor, queue) in self.parked.iter_mut() {
            let seen = self.seen.get(actor);
            while let Some(entry) = queue.first_entry() {
                if *entry.key() <= seen {
                    entry.remove();
                    self.parked_total -= 1;
                } else {
                    break;
                }
            }
            match queue.first_key_value() {
                None => emptied.push(actor.clone()),
                Some((_, parked)) => {
                    let ready = parked.event.id().seq == seen + 1
                        && self.seen.dominates(parked.event.deps());
                    if found.is_none() && ready {
                        found = Some(actor.clone());
                    }
                }
            }
        }

        for actor in emptied {
            self.parked.remove(&actor);
        }

        let actor = found?;
        let queue = self.parked.get_mut(&actor)?;
        let (_, parked) = queue.pop_first()?;
        if queue.is_empty() {
            self.parked.remove(&actor);
        }
        self.parked_total -= 1;

        let id = parked.event.id();
        self.seen.observe(&id.actor, id.seq);
        Some(parked.event)
    }

    /// Report and drop every actor buffer whose oldest entry has waited
    /// longer than the gap timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<CausalityGap> {
        let timeout = self.policy.gap_timeout;
        let expired: Vec<(ActorId, Duration)> = self
            .parked
            .iter()
            .filter_map(|(actor, queue)| {
                let oldest = queue.values().map(|p| p.received_at).min()?;
                let waited = now.saturating_duration_since(oldest);
                (waited > timeout).then(|| (actor.clone(), waited))
            })
            .collect();

        expired
            .into_iter()
            .filter_map(|(actor, waited)| {
                let queue = self.parked.remove(&actor)?;
                self.parked_total -= queue.len();
                Some(CausalityGap {
                    expected: self.seen.get(&actor) + 1,
                    dropped: queue.len(),
                    actor,
                    waited,
                })
            })
            .collect()
    }

    /// Replace the vector (snapshot load). Buffered operations now covered
    /// are dropped on the next drain.
    pub fn reset(&mut self, seen: VersionVector) {
        self.seen = seen;
    }

    /// Forget everything buffered for `actor`.
    pub fn discard(&mut self, actor: &ActorId) -> usize {
        let dropped = self.parked.remove(actor).map(|q| q.len()).unwrap_or(0);
        self.parked_total -= dropped;
        dropped
    }

    pub fn parked_count(&self) -> usize {
        self.parked_total
    }

    pub fn parked_count_for(&self, actor: &ActorId) -> usize {
        self.parked.get(actor).map(|q| q.len()).unwrap_or(0)
    }
}

impl<E: CausalEvent> Default for CausalityTracker<E> {
    fn default() -> Self {
        Self::new(BufferPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::OperationId;

    #[derive(Clone, Debug, PartialEq)]
    struct Ev {
        id: OperationId,
        deps: VersionVector,
    }

    impl CausalEvent for Ev {
        fn id(&self) -> &OperationId {
            &self.id
        }

        fn deps(&self) -> &VersionVector {
            &self.deps
        }
    }

    fn ev(actor: &str, seq: Seq) -> Ev {
        Ev {
            id: OperationId::new(actor, seq),
            deps: VersionVector::new(),
        }
    }

    fn ev_after(actor: &str, seq: Seq, dep_actor: &str, dep_seq: Seq) -> Ev {
        Ev {
            id: OperationId::new(actor, seq),
            deps: VersionVector::from_entries([(ActorId::new(dep_actor), dep_seq)]),
        }
    }

    #[test]
    fn test_in_order_applies() {
        let mut tracker = CausalityTracker::default();
        let now = Instant::now();

        assert_eq!(tracker.accept(&ev("a", 1), now), Acceptance::Apply);
        assert_eq!(tracker.accept(&ev("a", 2), now), Acceptance::Apply);
        assert_eq!(tracker.seen_for(&ActorId::new("a")), 2);
    }

    #[test]
    fn test_duplicate_is_dropped() {
        let mut tracker = CausalityTracker::default();
        let now = Instant::now();

        tracker.accept(&ev("a", 1), now);
        assert_eq!(tracker.accept(&ev("a", 1), now), Acceptance::Duplicate);
        assert_eq!(tracker.seen_for(&ActorId::new("a")), 1);
    }

    #[test]
    fn test_gap_buffers_then_drains_in_order() {
        let mut tracker = CausalityTracker::default();
        let now = Instant::now();

        assert_eq!(tracker.accept(&ev("a", 3), now), Acceptance::Buffer);
        assert_eq!(tracker.accept(&ev("a", 2), now), Acceptance::Buffer);
        assert_eq!(tracker.accept(&ev("a", 3), now), Acceptance::Duplicate);
        assert_eq!(tracker.parked_count(), 2);
        assert!(tracker.pop_ready().is_none());

        assert_eq!(tracker.accept(&ev("a", 1), now), Acceptance::Apply);
        assert_eq!(tracker.pop_ready().map(|e| e.id.seq), Some(2));
        assert_eq!(tracker.pop_ready().map(|e| e.id.seq), Some(3));
        assert!(tracker.pop_ready().is_none());
        assert_eq!(tracker.parked_count(), 0);
    }

    #[test]
    fn test_cross_actor_dependency_holds_op() {
        let mut tracker = CausalityTracker::default();
        let now = Instant::now();

        // b's first op was created after seeing a:1
        assert_eq!(tracker.accept(&ev_after("b", 1, "a", 1), now), Acceptance::Buffer);
        assert_eq!(tracker.accept(&ev("a", 1), now), Acceptance::Apply);

        let ready = tracker.pop_ready().unwrap();
        assert_eq!(ready.id, OperationId::new("b", 1));
    }

    #[test]
    fn test_overflow_policy() {
        let policy = BufferPolicy {
            max_per_actor: 1,
            ..BufferPolicy::default()
        };
        let mut tracker = CausalityTracker::new(policy);
        let now = Instant::now();

        assert_eq!(tracker.accept(&ev("a", 5), now), Acceptance::Buffer);
        assert_eq!(tracker.accept(&ev("a", 6), now), Acceptance::Overflow);
        assert_eq!(tracker.accept(&ev("b", 6), now), Acceptance::Buffer);
    }

    #[test]
    fn test_expire_reports_gap() {
        let policy = BufferPolicy {
            gap_timeout: Duration::from_secs(5),
            ..BufferPolicy::default()
        };
        let mut tracker = CausalityTracker::new(policy);
        let start = Instant::now();

        tracker.accept(&ev("a", 4), start);
        tracker.accept(&ev("a", 5), start);
        assert!(tracker.expire(start + Duration::from_secs(1)).is_empty());

        let gaps = tracker.expire(start + Duration::from_secs(10));
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].actor, ActorId::new("a"));
        assert_eq!(gaps[0].expected, 1);
        assert_eq!(gaps[0].dropped, 2);
        assert_eq!(tracker.parked_count(), 0);
    }

    #[test]
    fn test_reset_discards_covered_parked() {
        let mut tracker = CausalityTracker::default();
        let now = Instant::now();

        tracker.accept(&ev("a", 2), now);
        tracker.accept(&ev("a", 4), now);
        tracker.reset(VersionVector::from_entries([(ActorId::new("a"), 3)]));

        assert_eq!(tracker.pop_ready().map(|e| e.id.seq), Some(4));
        assert_eq!(tracker.parked_count(), 0);
    }
}
