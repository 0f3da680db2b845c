//! The engine facade.
//!
//! One [`Engine`] is one client's replica: the document, its causal state,
//! presence, subscriptions and the outbound stream. It is single-owner and
//! synchronous. Every public call runs to completion, delivers the
//! notifications it produced, then runs deferred turns.

use crate::command::{Command, Position};
use crate::config::{EngineConfig, OverflowPolicy};
use crate::error::{EngineError, Result};
use crate::message::Message;
use crate::outbound::{Outbound, OutboundSink};
use crate::reconcile::{Reconciler, Snapshot};
use crate::subscription::{Deferred, Notification, Scope, Subscriptions, Unsubscribe};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, info, warn};
use weft_causal::Acceptance;
use weft_core::{ActorId, Clock, Scalar, Seq, Value, VersionVector};
use weft_doc::{
    Delta, NodeId, NodeSeed, OpKind, Operation, Path, PresenceChange, PresenceStore, Slot, Tree,
};

/// Counters and sizes for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub local_ops: u64,
    pub remote_applied: u64,
    pub duplicates: u64,
    pub buffered: usize,
    pub overflows: u64,
    pub detached: u64,
    pub malformed: u64,
    pub resyncs_requested: u64,
    pub nodes: usize,
    pub tombstones: usize,
    pub log_len: usize,
    pub pending: usize,
    pub peers: usize,
    pub subscribers: usize,
    pub outbound_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    local_ops: u64,
    remote_applied: u64,
    duplicates: u64,
    overflows: u64,
    detached: u64,
    malformed: u64,
    resyncs_requested: u64,
}

pub struct Engine {
    config: EngineConfig,
    clock: Clock,
    reconciler: Reconciler,
    presence: PresenceStore,
    subscriptions: Subscriptions,
    deferred: Deferred,
    outbound: OutboundSink,
    /// Actors with an outstanding resync request, to avoid asking twice for
    /// the same gap.
    awaiting_resync: BTreeMap<ActorId, Seq>,
    counters: Counters,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let actor = config.actor.clone().unwrap_or_else(ActorId::generate);
        info!(actor = %actor, "engine started");
        Self {
            clock: Clock::new(actor.clone()),
            reconciler: Reconciler::new(config.buffer.clone()),
            presence: PresenceStore::new(actor),
            subscriptions: Subscriptions::default(),
            deferred: Deferred::default(),
            outbound: OutboundSink::new(),
            awaiting_resync: BTreeMap::new(),
            counters: Counters::default(),
            config,
        }
    }

    /// Engine with default configuration and the given actor id.
    pub fn with_actor(actor: impl Into<ActorId>) -> Self {
        Self::new(EngineConfig {
            actor: Some(actor.into()),
            ..EngineConfig::default()
        })
    }

    pub fn actor(&self) -> &ActorId {
        self.clock.actor()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn version(&self) -> &VersionVector {
        self.reconciler.version()
    }

    // === Document reads ===

    pub fn root(&self) -> NodeId {
        self.reconciler.tree().root()
    }

    pub fn tree(&self) -> &Tree {
        self.reconciler.tree()
    }

    pub fn get(&self, node: &NodeId) -> Result<Value> {
        Ok(self.tree().get(node)?)
    }

    pub fn get_path(&self, path: &Path) -> Result<Value> {
        Ok(self.tree().get_path(path)?)
    }

    pub fn node_at(&self, path: &Path) -> Result<NodeId> {
        Ok(self.tree().node_at(path)?)
    }

    pub fn path_of(&self, node: &NodeId) -> Option<Path> {
        self.tree().path_of(node)
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.tree().to_json()
    }

    // === Local mutations ===

    /// Insert `value` into a list (by visible index) or an object (by key).
    /// Returns the id of the new subtree's root.
    pub fn insert(&mut self, parent: NodeId, at: impl Into<Position>, value: Value) -> Result<NodeId> {
        let node = NodeId::generate();
        self.run(Command::Insert {
            parent,
            at: at.into(),
            value,
            node,
        })?;
        Ok(node)
    }

    /// Bind `key` on an object to `value`, replacing whatever it held.
    pub fn set(&mut self, parent: NodeId, key: impl Into<String>, value: Value) -> Result<NodeId> {
        let node = NodeId::generate();
        self.run(Command::Set {
            parent,
            key: key.into(),
            value,
            node,
        })?;
        Ok(node)
    }

    pub fn delete(&mut self, target: NodeId) -> Result<()> {
        self.run(Command::Delete { target })
    }

    // === Presence ===

    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    /// Merge `patch` into the local presence record and broadcast it.
    pub fn set_presence<K, V>(&mut self, patch: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<String>,
        V: Into<Scalar>,
    {
        let patch = patch.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.run(Command::SetPresence(patch))
    }

    /// Re-broadcast the local record under a new version, e.g. after
    /// reconnecting.
    pub fn announce_presence(&mut self) {
        let notes = self.local_presence(BTreeMap::new());
        self.finish(notes);
    }

    /// This client is disconnecting: tell peers and forget their presence.
    pub fn leave(&mut self) {
        let version = self.presence.local().version;
        self.outbound.emit(Message::Leave {
            actor: self.actor().clone(),
            version,
        });
        let notes = self
            .presence
            .clear_peers()
            .into_iter()
            .map(Notification::Presence)
            .collect();
        info!(actor = %self.actor(), version, "left session");
        self.finish(notes);
    }

    /// The transport lost `actor` without a leave message. Its presence
    /// packets are ignored until [`peer_connected`](Self::peer_connected).
    pub fn peer_disconnected(&mut self, actor: &ActorId) {
        debug!(actor = %actor, "peer disconnected");
        let notes = self
            .presence
            .disconnect(actor)
            .map(Notification::Presence)
            .into_iter()
            .collect();
        self.finish(notes);
    }

    /// The transport reached `actor` again.
    pub fn peer_connected(&mut self, actor: &ActorId) {
        debug!(actor = %actor, "peer connected");
        self.presence.reconnect(actor);
    }

    // === Subscriptions ===

    pub fn subscribe<F>(&mut self, scope: Scope, callback: F) -> Unsubscribe
    where
        F: FnMut(&Notification, &mut Deferred) + Send + 'static,
    {
        self.subscriptions.add(scope, Box::new(callback))
    }

    pub fn unsubscribe(&mut self, handle: &Unsubscribe) {
        handle.cancel();
    }

    /// Run deferred turns left over from earlier calls.
    pub fn process_deferred(&mut self) -> usize {
        let mut turns = 0;
        while turns < self.config.max_deferred_turns && !self.deferred.is_empty() {
            turns += 1;
            for command in self.deferred.take() {
                let name = command.name();
                match self.execute(command) {
                    Ok(notes) => self.subscriptions.dispatch(&notes, &mut self.deferred),
                    Err(err) => warn!(command = name, error = %err, "deferred command failed"),
                }
            }
        }
        if !self.deferred.is_empty() {
            debug!(queued = self.deferred.len(), "deferred commands carried to next call");
        }
        turns
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    // === Outbound ===

    /// Take the outbound stream. It can be taken once.
    pub fn outbound(&mut self) -> Result<Outbound> {
        self.outbound.subscribe()
    }

    /// Local operations not yet acknowledged, in application order.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.reconciler.pending()
    }

    /// Put every pending operation back on the outbound stream.
    pub fn resend_pending(&mut self) -> usize {
        let pending = self.reconciler.pending();
        let count = pending.len();
        for op in pending {
            self.outbound.emit(Message::Op(op));
        }
        debug!(count, "resent pending operations");
        count
    }

    /// Drop acknowledged entries from the log.
    pub fn compact_log(&mut self) -> usize {
        self.reconciler.compact()
    }

    // === Inbound ===

    /// Decode and process one inbound frame. Malformed frames are dropped
    /// and reported; they never change state.
    pub fn ingest(&mut self, raw: &[u8]) -> Result<Vec<Notification>> {
        let message = Message::decode(raw).map_err(|err| {
            self.counters.malformed += 1;
            warn!(error = %err, bytes = raw.len(), "dropped malformed frame");
            err
        })?;
        self.ingest_message(message)
    }

    pub fn ingest_message(&mut self, message: Message) -> Result<Vec<Notification>> {
        self.ingest_at(message, Instant::now())
    }

    /// Process one message as if received at `now`.
    pub fn ingest_at(&mut self, message: Message, now: Instant) -> Result<Vec<Notification>> {
        let notes = match message {
            Message::Op(op) => self.receive_op(op, now),
            Message::Presence { actor, record } => self
                .presence
                .apply_remote(&actor, record)
                .map(Notification::Presence)
                .into_iter()
                .collect(),
            Message::Leave { actor, version } => {
                debug!(actor = %actor, version, "peer left");
                self.presence
                    .leave(&actor, version)
                    .map(Notification::Presence)
                    .into_iter()
                    .collect()
            }
            Message::Ack { actor, seq } => {
                let committed = self.reconciler.acknowledge(&actor, seq);
                debug!(actor = %actor, seq, committed, "operations acknowledged");
                Vec::new()
            }
            Message::Resync {
                requester,
                actor,
                from,
            } => {
                if &actor == self.actor() {
                    self.serve_resync(&requester, from);
                }
                Vec::new()
            }
        };
        self.finish(notes.clone());
        Ok(notes)
    }

    fn receive_op(&mut self, op: Operation, now: Instant) -> Vec<Notification> {
        let actor = op.id.actor.clone();
        let outcome = self.reconciler.reconcile(op, now);
        match outcome.acceptance {
            Acceptance::Apply => {}
            Acceptance::Duplicate => self.counters.duplicates += 1,
            Acceptance::Buffer => {}
            Acceptance::Overflow => {
                self.counters.overflows += 1;
                if self.config.on_overflow == OverflowPolicy::Resync {
                    let from = self.reconciler.tracker().seen_for(&actor) + 1;
                    self.request_resync(actor, from);
                }
            }
        }
        for id in &outcome.applied {
            if self
                .awaiting_resync
                .get(&id.actor)
                .is_some_and(|&from| id.seq >= from)
            {
                self.awaiting_resync.remove(&id.actor);
            }
        }
        self.counters.remote_applied += outcome.applied.len() as u64;
        self.counters.detached += outcome.detached as u64;
        self.clock_catch_up();
        outcome.deltas.into_iter().map(Notification::Document).collect()
    }

    /// Ask `actor` to resend from `from`, unless already asked.
    fn request_resync(&mut self, actor: ActorId, from: Seq) {
        if self.awaiting_resync.get(&actor) == Some(&from) {
            return;
        }
        info!(actor = %actor, from, "requesting resync");
        self.awaiting_resync.insert(actor.clone(), from);
        self.counters.resyncs_requested += 1;
        self.outbound.emit(Message::Resync {
            requester: self.actor().clone(),
            actor,
            from,
        });
    }

    fn serve_resync(&mut self, requester: &ActorId, from: Seq) {
        let history = self.reconciler.history_from(self.actor(), from);
        if history.first().map(|op| op.id.seq) != Some(from) {
            warn!(requester = %requester, from, "resync requested for compacted history");
        }
        info!(requester = %requester, from, count = history.len(), "serving resync");
        for op in history {
            self.outbound.emit(Message::Op(op));
        }
    }

    /// Our own operations can come back in a snapshot or resync; never reuse
    /// their sequences.
    fn clock_catch_up(&mut self) {
        let seen = self.reconciler.version().get(self.clock.actor());
        self.clock.advance_to(seen);
    }

    /// Report and drop gaps older than the timeout, requesting a resend of
    /// each. Returns one [`EngineError::CausalityGapTimeout`] per gap.
    pub fn expire_gaps(&mut self, now: Instant) -> Vec<EngineError> {
        let gaps = self.reconciler.expire(now);
        let mut errors = Vec::with_capacity(gaps.len());
        for gap in gaps {
            self.awaiting_resync.remove(&gap.actor);
            self.request_resync(gap.actor.clone(), gap.expected);
            errors.push(EngineError::from(gap));
        }
        self.process_deferred();
        errors
    }

    // === Bootstrap ===

    pub fn snapshot(&self) -> Snapshot {
        self.reconciler.snapshot()
    }

    /// Replace local state with `snapshot`. Subscribers see one root update
    /// followed by whatever buffered operations it unblocked.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        info!(
            nodes = snapshot.tree.node_count(),
            actors = snapshot.version.len(),
            "loading snapshot"
        );
        let outcome = self.reconciler.load(snapshot, self.clock.actor());
        self.awaiting_resync.clear();
        self.clock_catch_up();

        let mut notes = vec![Notification::Document(Delta::updated(
            Path::root(),
            self.tree().to_value(),
        ))];
        notes.extend(outcome.deltas.into_iter().map(Notification::Document));
        self.counters.remote_applied += outcome.applied.len() as u64;
        self.finish(notes);
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        let tracker = self.reconciler.tracker();
        EngineStats {
            local_ops: self.counters.local_ops,
            remote_applied: self.counters.remote_applied,
            duplicates: self.counters.duplicates,
            buffered: tracker.parked_count(),
            overflows: self.counters.overflows,
            detached: self.counters.detached,
            malformed: self.counters.malformed,
            resyncs_requested: self.counters.resyncs_requested,
            nodes: self.tree().node_count(),
            tombstones: self.tree().tombstone_count(),
            log_len: self.reconciler.log().len(),
            pending: self.reconciler.log().pending_count(),
            peers: self.presence.peer_count(),
            subscribers: self.subscriptions.len(),
            outbound_dropped: self.outbound.dropped(),
        }
    }

    /// Actors asked to resend that have not delivered the gap yet.
    pub fn awaiting_resync(&self) -> BTreeSet<ActorId> {
        self.awaiting_resync.keys().cloned().collect()
    }

    // === Turn machinery ===

    fn run(&mut self, command: Command) -> Result<()> {
        let notes = self.execute(command)?;
        self.finish(notes);
        Ok(())
    }

    fn finish(&mut self, notes: Vec<Notification>) {
        self.subscriptions.dispatch(&notes, &mut self.deferred);
        self.process_deferred();
    }

    /// Apply one local command. Nothing is dispatched here.
    fn execute(&mut self, command: Command) -> Result<Vec<Notification>> {
        let kind = match command {
            Command::SetPresence(patch) => return Ok(self.local_presence(patch)),
            Command::Delete { target } => OpKind::Delete { target },
            Command::Insert {
                parent,
                at: Position::Index(index),
                value,
                node,
            } => OpKind::Insert {
                parent,
                slot: Slot::Between(self.tree().list_anchors(&parent, index)?),
                seed: NodeSeed::with_id(node, &value),
            },
            Command::Insert {
                parent,
                at: Position::Key(key),
                value,
                node,
            }
            | Command::Set {
                parent,
                key,
                value,
                node,
            } => match value {
                Value::Scalar(value) => OpKind::SetScalar {
                    parent,
                    key,
                    value,
                    node,
                },
                value => OpKind::Insert {
                    parent,
                    slot: Slot::Key(key),
                    seed: NodeSeed::with_id(node, &value),
                },
            },
        };

        let (op, deltas) = self.reconciler.commit_local(&mut self.clock, kind)?;
        self.counters.local_ops += 1;
        self.outbound.emit(Message::Op(op));
        Ok(deltas.into_iter().map(Notification::Document).collect())
    }

    fn local_presence(&mut self, patch: BTreeMap<String, Scalar>) -> Vec<Notification> {
        let record = self.presence.set_local(patch).clone();
        let actor = self.actor().clone();
        debug!(actor = %actor, version = record.version, "presence updated");
        self.outbound.emit(Message::Presence {
            actor: actor.clone(),
            record: record.clone(),
        });
        vec![Notification::Presence(PresenceChange::Updated { actor, record })]
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("actor", self.actor())
            .field("version", self.version())
            .field("nodes", &self.tree().node_count())
            .field("subscribers", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfigBuilder;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn test_local_mutations_and_reads() {
        let mut engine = Engine::with_actor("a");
        let root = engine.root();
        let todos = engine.insert(root, "todos", Value::empty_list()).unwrap();
        let first = engine.insert(todos, 0usize, Value::from("buy milk")).unwrap();
        engine.insert(todos, 1usize, Value::from("walk dog")).unwrap();

        assert_eq!(engine.get(&first).unwrap(), Value::from("buy milk"));
        assert!(engine.node_at(&path("todos.1")).is_ok());
        assert_eq!(
            engine.to_json(),
            serde_json::json!({"todos": ["buy milk", "walk dog"]})
        );

        engine.delete(first).unwrap();
        assert_eq!(engine.to_json(), serde_json::json!({"todos": ["walk dog"]}));
        assert_eq!(engine.stats().local_ops, 4);
        assert_eq!(engine.pending_operations().len(), 4);
    }

    #[test]
    fn test_validation_failures_do_not_consume_sequence() {
        let mut engine = Engine::with_actor("a");
        let root = engine.root();
        let list = engine.insert(root, "l", Value::empty_list()).unwrap();

        assert!(matches!(
            engine.insert(list, 5usize, Value::from(1i64)),
            Err(EngineError::Document(weft_doc::DocError::IndexOutOfBounds { .. }))
        ));
        assert!(engine.set(list, "k", Value::from(1i64)).is_err());
        assert!(engine.delete(root).is_err());
        assert!(engine.delete(NodeId::generate()).is_err());

        engine.insert(list, 0usize, Value::from(1i64)).unwrap();
        let seqs: Vec<Seq> = engine.pending_operations().iter().map(|op| op.id.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn test_set_with_container_value() {
        let mut engine = Engine::with_actor("a");
        let root = engine.root();
        let meta = engine
            .set(root, "meta", Value::object([("title", Value::from("Plan"))]))
            .unwrap();
        engine.set(meta, "done", Value::from(false)).unwrap();
        assert_eq!(
            engine.to_json(),
            serde_json::json!({"meta": {"title": "Plan", "done": false}})
        );
    }

    #[test]
    fn test_subscriber_sees_scoped_deltas() {
        let mut engine = Engine::with_actor("a");
        let root = engine.root();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine.subscribe(Scope::Path(path("color")), move |note, _| {
            if let Notification::Document(delta) = note {
                sink.lock().unwrap().push(delta.clone());
            }
        });

        engine.set(root, "size", Value::from(3i64)).unwrap();
        engine.set(root, "color", Value::from("red")).unwrap();
        engine.set(root, "color", Value::from("red")).unwrap();
        engine.set(root, "color", Value::from("blue")).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].value, Some(Value::from("blue")));
    }

    #[test]
    fn test_numeric_key_scope() {
        let mut engine = Engine::with_actor("a");
        let root = engine.root();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        engine.subscribe(Scope::Path(path("2024")), move |_, _| *sink.lock().unwrap() += 1);

        let year = engine.set(root, "2024", Value::empty_object()).unwrap();
        engine.set(year, "total", Value::from(3i64)).unwrap();
        engine.set(root, "2025", Value::empty_object()).unwrap();

        assert_eq!(*seen.lock().unwrap(), 2);
        assert_eq!(engine.node_at(&path("2024")).unwrap(), year);
        assert_eq!(engine.get_path(&path("2024.total")).unwrap(), Value::from(3i64));
    }

    #[test]
    fn test_deferred_turns_are_bounded() {
        let config = EngineConfigBuilder::new()
            .actor("a")
            .max_deferred_turns(3)
            .build();
        let mut engine = Engine::new(config);
        let root = engine.root();
        engine.set(root, "n", Value::from(0i64)).unwrap();

        // Every change to `n` schedules another one: an unbounded chain.
        engine.subscribe(Scope::Path(path("n")), move |note, deferred| {
            if let Notification::Document(Delta {
                value: Some(Value::Scalar(Scalar::Int(n))),
                ..
            }) = note
            {
                deferred.set(NodeId::root(), "n", Value::from(n + 1));
            }
        });

        engine.set(root, "n", Value::from(1i64)).unwrap();
        assert_eq!(engine.get_path(&path("n")).unwrap(), Value::from(4i64));
        assert_eq!(engine.deferred_len(), 1);

        engine.process_deferred();
        assert_eq!(engine.get_path(&path("n")).unwrap(), Value::from(7i64));
    }

    #[test]
    fn test_local_presence_notifies() {
        let mut engine = Engine::with_actor("a");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine.subscribe(Scope::Presence, move |note, _| {
            sink.lock().unwrap().push(note.clone());
        });

        engine.set_presence([("cursor", 4i64)]).unwrap();
        assert_eq!(engine.presence().local().version, 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_gap_expiry_requests_resync_once() {
        let config = EngineConfigBuilder::new()
            .actor("a")
            .gap_timeout(Duration::from_millis(5))
            .build();
        let mut engine = Engine::new(config);
        let mut out = engine.outbound().unwrap();

        let mut peer = Engine::with_actor("b");
        let root = peer.root();
        peer.set(root, "x", Value::from(1i64)).unwrap();
        peer.set(root, "y", Value::from(2i64)).unwrap();
        let second = peer.pending_operations().remove(1);

        let start = Instant::now();
        engine.ingest_at(Message::Op(second), start).unwrap();
        assert_eq!(engine.stats().buffered, 1);

        let errors = engine.expire_gaps(start + Duration::from_millis(20));
        assert_eq!(
            errors,
            vec![EngineError::CausalityGapTimeout {
                actor: ActorId::new("b"),
                expected: 1
            }]
        );
        assert_eq!(
            out.drain(),
            vec![Message::Resync {
                requester: ActorId::new("a"),
                actor: ActorId::new("b"),
                from: 1
            }]
        );
        assert_eq!(engine.stats().buffered, 0);
    }

    #[test]
    fn test_serves_resync_from_log() {
        let mut engine = Engine::with_actor("b");
        let mut out = engine.outbound().unwrap();
        let root = engine.root();
        for i in 0..3i64 {
            engine.set(root, format!("k{i}"), Value::from(i)).unwrap();
        }
        out.drain();

        engine
            .ingest_message(Message::Resync {
                requester: ActorId::new("a"),
                actor: ActorId::new("b"),
                from: 2,
            })
            .unwrap();
        let resent: Vec<Seq> = out
            .drain()
            .into_iter()
            .filter_map(|m| match m {
                Message::Op(op) => Some(op.id.seq),
                _ => None,
            })
            .collect();
        assert_eq!(resent, vec![2, 3]);
    }

    #[test]
    fn test_ack_commits_pending() {
        let mut engine = Engine::with_actor("a");
        let root = engine.root();
        engine.set(root, "x", Value::from(1i64)).unwrap();
        engine.set(root, "y", Value::from(2i64)).unwrap();

        engine
            .ingest_message(Message::Ack {
                actor: ActorId::new("a"),
                seq: 1,
            })
            .unwrap();
        assert_eq!(engine.pending_operations().len(), 1);
        assert_eq!(engine.compact_log(), 1);
        assert_eq!(engine.resend_pending(), 1);
    }

    #[test]
    fn test_snapshot_bootstrap() {
        let mut source = Engine::with_actor("a");
        let root = source.root();
        source.set(root, "title", Value::from("Plan")).unwrap();
        let raw = source.snapshot().encode().unwrap();

        let mut fresh = Engine::with_actor("b");
        let updates = Arc::new(Mutex::new(0));
        let counter = updates.clone();
        fresh.subscribe(Scope::Path(path("title")), move |_, _| {
            *counter.lock().unwrap() += 1;
        });
        fresh.load_snapshot(Snapshot::decode(&raw).unwrap()).unwrap();

        assert_eq!(fresh.to_json(), source.to_json());
        assert_eq!(*updates.lock().unwrap(), 1);
        assert_eq!(fresh.version().get(&ActorId::new("a")), 1);
    }

    #[test]
    fn test_snapshot_of_own_ops_advances_clock() {
        let mut a = Engine::with_actor("a");
        let root = a.root();
        a.set(root, "x", Value::from(1i64)).unwrap();
        a.set(root, "y", Value::from(1i64)).unwrap();
        let snap = a.snapshot();

        let mut restored = Engine::with_actor("a");
        restored.load_snapshot(snap).unwrap();
        restored.set(root, "z", Value::from(1i64)).unwrap();
        assert_eq!(restored.pending_operations()[0].id.seq, 3);
    }
}
