//! Reconciliation: causal admission plus tree application.
//!
//! The [`Reconciler`] owns the document tree, the causality tracker and the
//! operation log, and keeps them in step. Remote operations are offered to
//! the tracker; whatever it releases is applied to the tree in release order
//! and appended to the log. Local operations skip the tracker's buffer but
//! advance its vector so later local operations carry them as dependencies.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};
use weft_causal::{
    Acceptance, BufferPolicy, CausalityGap, CausalityTracker, LogEntry, OpStatus, OperationLog,
};
use weft_core::{ActorId, Clock, OperationId, Seq, VersionVector};
use weft_doc::{Delta, OpKind, Operation, Tree};

/// What one inbound operation did.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciliation {
    pub acceptance: Acceptance,
    /// Operations applied, in order: the offered one plus anything it
    /// released from the buffer.
    pub applied: Vec<OperationId>,
    pub deltas: Vec<Delta>,
    /// Applied operations whose target had already been deleted.
    pub detached: usize,
}

impl Reconciliation {
    fn new(acceptance: Acceptance) -> Self {
        Self {
            acceptance,
            applied: Vec::new(),
            deltas: Vec::new(),
            detached: 0,
        }
    }
}

/// A document tree together with the version vector it reflects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tree: Tree,
    pub version: VersionVector,
}

impl Snapshot {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

#[derive(Clone, Debug)]
pub struct Reconciler {
    tree: Tree,
    tracker: CausalityTracker<Operation>,
    log: OperationLog<Operation>,
}

impl Reconciler {
    pub fn new(policy: BufferPolicy) -> Self {
        Self {
            tree: Tree::new(),
            tracker: CausalityTracker::new(policy),
            log: OperationLog::new(),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tracker(&self) -> &CausalityTracker<Operation> {
        &self.tracker
    }

    pub fn log(&self) -> &OperationLog<Operation> {
        &self.log
    }

    pub fn version(&self) -> &VersionVector {
        self.tracker.seen()
    }

    /// Validate a local mutation against the current tree.
    pub fn check(&self, kind: &OpKind) -> Result<()> {
        Ok(self.tree.check(kind)?)
    }

    /// Apply a local mutation. The clock only advances if the operation
    /// applied, so a rejected mutation never opens a sequence gap.
    pub fn commit_local(&mut self, clock: &mut Clock, kind: OpKind) -> Result<(Operation, Vec<Delta>)> {
        let id = OperationId::new(clock.actor().clone(), clock.current() + 1);
        let op = Operation::new(id, self.tracker.seen().clone(), kind);
        let deltas = self.tree.apply(&op)?;
        clock.tick();

        self.tracker.record_local(&op);
        self.log.append(op.clone(), OpStatus::Pending);
        debug!(op = %op.id, kind = op.name(), deltas = deltas.len(), "applied local operation");
        Ok((op, deltas))
    }

    /// Offer a remote operation and apply everything that becomes ready.
    pub fn reconcile(&mut self, op: Operation, now: Instant) -> Reconciliation {
        let acceptance = self.tracker.accept(&op, now);
        let mut outcome = Reconciliation::new(acceptance);
        match acceptance {
            Acceptance::Apply => {
                self.apply_remote(op, &mut outcome);
                self.drain_into(&mut outcome);
            }
            Acceptance::Buffer => {
                debug!(op = %op.id, waiting_for = self.tracker.seen_for(&op.id.actor) + 1, "buffered out-of-order operation");
            }
            Acceptance::Duplicate => debug!(op = %op.id, "dropped duplicate operation"),
            Acceptance::Overflow => warn!(op = %op.id, "causal buffer full, refused operation"),
        }
        outcome
    }

    /// Apply whatever buffered operations are ready now.
    pub fn drain(&mut self) -> Reconciliation {
        let mut outcome = Reconciliation::new(Acceptance::Apply);
        self.drain_into(&mut outcome);
        outcome
    }

    fn drain_into(&mut self, outcome: &mut Reconciliation) {
        while let Some(ready) = self.tracker.pop_ready() {
            self.apply_remote(ready, outcome);
        }
    }

    fn apply_remote(&mut self, op: Operation, outcome: &mut Reconciliation) {
        match self.tree.apply(&op) {
            Ok(deltas) => outcome.deltas.extend(deltas),
            Err(err) if err.is_benign() => {
                debug!(op = %op.id, error = %err, "operation target already deleted");
                outcome.detached += 1;
            }
            Err(err) => {
                warn!(op = %op.id, kind = op.name(), error = %err, "remote operation rejected by tree");
            }
        }
        outcome.applied.push(op.id.clone());
        self.log.append(op, OpStatus::Committed);
    }

    /// Drop buffers whose gap outlived the timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<CausalityGap> {
        let gaps = self.tracker.expire(now);
        for gap in &gaps {
            warn!(
                actor = %gap.actor,
                expected = gap.expected,
                dropped = gap.dropped,
                waited_ms = gap.waited.as_millis() as u64,
                "causality gap timed out"
            );
        }
        gaps
    }

    /// Mark `actor`'s operations through `seq` as acknowledged.
    pub fn acknowledge(&mut self, actor: &ActorId, seq: Seq) -> usize {
        self.log.commit_through(actor, seq)
    }

    pub fn pending(&self) -> Vec<Operation> {
        self.log.pending().cloned().collect()
    }

    /// `actor`'s logged operations from `from` on, in sequence order.
    pub fn history_from(&self, actor: &ActorId, from: Seq) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self
            .log
            .entries()
            .iter()
            .map(|e| &e.event)
            .filter(|op| &op.id.actor == actor && op.id.seq >= from)
            .cloned()
            .collect();
        ops.sort_by_key(|op| op.id.seq);
        ops
    }

    pub fn compact(&mut self) -> usize {
        self.log.compact()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tree: self.tree.clone(),
            version: self.tracker.seen().clone(),
        }
    }

    /// Replace the tree and vector.
    ///
    /// `local`'s own logged operations above the snapshot's entry for it are
    /// replayed on top of the loaded tree and stay in the log with their
    /// status, so unacknowledged edits survive and can still be resent or
    /// served on resync. Everything else in the log is dropped. Buffered
    /// operations the snapshot already covers are discarded and the rest
    /// drain normally.
    pub fn load(&mut self, snapshot: Snapshot, local: &ActorId) -> Reconciliation {
        let covered = snapshot.version.get(local);
        let mut retained: Vec<LogEntry<Operation>> = self
            .log
            .entries()
            .iter()
            .filter(|e| &e.event.id.actor == local && e.event.id.seq > covered)
            .cloned()
            .collect();
        retained.sort_by_key(|e| e.event.id.seq);

        self.tree = snapshot.tree;
        self.tracker.reset(snapshot.version);
        self.log = OperationLog::new();

        let mut outcome = Reconciliation::new(Acceptance::Apply);
        for entry in retained {
            let op = entry.event;
            match self.tree.apply(&op) {
                Ok(deltas) => outcome.deltas.extend(deltas),
                Err(err) if err.is_benign() => {
                    debug!(op = %op.id, error = %err, "replayed local operation target not in snapshot");
                    outcome.detached += 1;
                }
                Err(err) => {
                    warn!(op = %op.id, kind = op.name(), error = %err, "replayed local operation rejected by snapshot tree");
                }
            }
            self.tracker.record_local(&op);
            self.log.append(op, entry.status);
        }
        if outcome.detached > 0 || !outcome.deltas.is_empty() {
            debug!(actor = %local, retained = self.log.len(), "replayed local operations over snapshot");
        }
        self.drain_into(&mut outcome);
        outcome
    }

    /// Forget buffered operations from `actor`.
    pub fn discard(&mut self, actor: &ActorId) -> usize {
        self.tracker.discard(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use weft_core::{Scalar, Value};
    use weft_doc::{DeltaKind, NodeId, NodeSeed, Path, Slot};

    fn set(key: &str, value: &str) -> OpKind {
        OpKind::SetScalar {
            parent: NodeId::root(),
            key: key.to_string(),
            value: Scalar::from(value),
            node: NodeId::generate(),
        }
    }

    fn remote(actor: &str, seq: Seq, deps: VersionVector, kind: OpKind) -> Operation {
        Operation::new(OperationId::new(actor, seq), deps, kind)
    }

    #[test]
    fn test_rejected_local_does_not_tick() {
        let mut rec = Reconciler::new(BufferPolicy::default());
        let mut clock = Clock::new(ActorId::new("a"));

        let bad = OpKind::Delete {
            target: NodeId::generate(),
        };
        assert!(rec.commit_local(&mut clock, bad).is_err());
        assert_eq!(clock.current(), 0);

        let (op, deltas) = rec.commit_local(&mut clock, set("color", "red")).unwrap();
        assert_eq!(op.id, OperationId::new("a", 1));
        assert_eq!(deltas[0].kind, DeltaKind::Created);
        assert_eq!(rec.version().get(&ActorId::new("a")), 1);
        assert_eq!(rec.pending().len(), 1);
    }

    #[test]
    fn test_out_of_order_drains() {
        let mut rec = Reconciler::new(BufferPolicy::default());
        let now = Instant::now();
        let first = remote("b", 1, VersionVector::new(), set("x", "1"));
        let second = remote(
            "b",
            2,
            VersionVector::from_entries([(ActorId::new("b"), 1)]),
            set("y", "2"),
        );

        let outcome = rec.reconcile(second, now);
        assert_eq!(outcome.acceptance, Acceptance::Buffer);
        assert!(outcome.deltas.is_empty());

        let outcome = rec.reconcile(first.clone(), now);
        assert_eq!(outcome.acceptance, Acceptance::Apply);
        assert_eq!(outcome.applied.len(), 2);
        assert_eq!(outcome.deltas.len(), 2);

        let outcome = rec.reconcile(first, now);
        assert_eq!(outcome.acceptance, Acceptance::Duplicate);
        assert!(outcome.deltas.is_empty());
    }

    #[test]
    fn test_detached_remote_is_counted() {
        let mut rec = Reconciler::new(BufferPolicy::default());
        let op = remote(
            "b",
            1,
            VersionVector::new(),
            OpKind::SetScalar {
                parent: NodeId::generate(),
                key: "k".to_string(),
                value: Scalar::Null,
                node: NodeId::generate(),
            },
        );
        let outcome = rec.reconcile(op, Instant::now());
        assert_eq!(outcome.detached, 1);
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(rec.log().len(), 1);
    }

    #[test]
    fn test_expire_reports_gap() {
        let policy = BufferPolicy {
            gap_timeout: Duration::from_millis(10),
            ..BufferPolicy::default()
        };
        let mut rec = Reconciler::new(policy);
        let start = Instant::now();
        let op = remote(
            "b",
            3,
            VersionVector::from_entries([(ActorId::new("b"), 2)]),
            set("x", "1"),
        );
        rec.reconcile(op, start);

        assert!(rec.expire(start).is_empty());
        let gaps = rec.expire(start + Duration::from_millis(50));
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].expected, 1);
        assert_eq!(rec.tracker().parked_count(), 0);
    }

    #[test]
    fn test_history_and_ack() {
        let mut rec = Reconciler::new(BufferPolicy::default());
        let mut clock = Clock::new(ActorId::new("a"));
        for i in 0..3 {
            rec.commit_local(&mut clock, set(&format!("k{i}"), "v")).unwrap();
        }
        let actor = ActorId::new("a");

        let tail: Vec<Seq> = rec.history_from(&actor, 2).iter().map(|op| op.id.seq).collect();
        assert_eq!(tail, vec![2, 3]);

        assert_eq!(rec.acknowledge(&actor, 2), 2);
        assert_eq!(rec.pending().len(), 1);
        assert_eq!(rec.compact(), 2);
        assert_eq!(rec.log().len(), 1);
    }

    #[test]
    fn test_snapshot_load_drains_covered_buffer() {
        let mut source = Reconciler::new(BufferPolicy::default());
        let mut clock = Clock::new(ActorId::new("b"));
        let (first, _) = source
            .commit_local(
                &mut clock,
                OpKind::Insert {
                    parent: NodeId::root(),
                    slot: Slot::Key("items".to_string()),
                    seed: NodeSeed::from_value(&Value::empty_list()),
                },
            )
            .unwrap();
        let (second, _) = source.commit_local(&mut clock, set("color", "red")).unwrap();

        let mut fresh = Reconciler::new(BufferPolicy::default());
        fresh.reconcile(second, Instant::now());
        assert_eq!(fresh.tracker().parked_count(), 1);

        let mut snap = source.snapshot();
        snap.version = VersionVector::from_entries([(ActorId::new("b"), first.id.seq)]);
        snap.tree = {
            let mut only_first = Tree::new();
            only_first.apply(&first).unwrap();
            only_first
        };
        let decoded = Snapshot::decode(&snap.encode().unwrap()).unwrap();

        let outcome = fresh.load(decoded, &ActorId::new("fresh"));
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(fresh.tree().to_value(), source.tree().to_value());
        assert!(fresh
            .tree()
            .get_path(&Path::parse("color").unwrap())
            .is_ok());
    }

    #[test]
    fn test_snapshot_load_keeps_uncovered_local_operations() {
        let mut rec = Reconciler::new(BufferPolicy::default());
        let mut clock = Clock::new(ActorId::new("a"));
        let actor = ActorId::new("a");
        rec.commit_local(&mut clock, set("early", "1")).unwrap();
        rec.commit_local(&mut clock, set("draft", "unsent")).unwrap();
        rec.commit_local(&mut clock, set("later", "2")).unwrap();
        rec.acknowledge(&actor, 1);

        // The snapshot covers a's first operation only.
        let mut covered = Reconciler::new(BufferPolicy::default());
        let first = rec.history_from(&actor, 1).remove(0);
        covered.reconcile(first, Instant::now());
        let mut snap = covered.snapshot();
        snap.tree
            .apply(&remote("b", 1, VersionVector::new(), set("remote", "b")))
            .unwrap();
        snap.version.set(ActorId::new("b"), 1);

        let outcome = rec.load(snap, &actor);
        assert_eq!(outcome.deltas.len(), 2);
        assert_eq!(
            rec.tree().to_json(),
            serde_json::json!({"early": "1", "draft": "unsent", "later": "2", "remote": "b"})
        );
        assert_eq!(rec.version().get(&actor), 3);
        assert_eq!(rec.version().get(&ActorId::new("b")), 1);

        let pending: Vec<Seq> = rec.pending().iter().map(|op| op.id.seq).collect();
        assert_eq!(pending, vec![2, 3]);
        let served: Vec<Seq> = rec.history_from(&actor, 2).iter().map(|op| op.id.seq).collect();
        assert_eq!(served, vec![2, 3]);
    }

    #[test]
    fn test_snapshot_load_drops_covered_local_operations() {
        let mut rec = Reconciler::new(BufferPolicy::default());
        let mut clock = Clock::new(ActorId::new("a"));
        rec.commit_local(&mut clock, set("k", "v")).unwrap();

        let snap = rec.snapshot();
        let outcome = rec.load(snap, &ActorId::new("a"));
        assert!(outcome.deltas.is_empty());
        assert!(rec.log().is_empty());
        assert_eq!(rec.tree().to_json(), serde_json::json!({"k": "v"}));
    }
}
