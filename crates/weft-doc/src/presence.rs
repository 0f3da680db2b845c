//! Presence - ephemeral per-actor key/value state.
//!
//! Presence is not part of the document and never enters the operation
//! log. Each actor owns one record; every update bumps the record's version
//! and is broadcast with the full record, so a lost or reordered packet is
//! repaired by the next one. Receivers keep, per actor, only the highest
//! version seen.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use weft_core::{ActorId, Lattice, Scalar};

/// One actor's presence state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub version: u64,
    pub data: BTreeMap<String, Scalar>,
}

impl PresenceRecord {
    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.data.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Lattice for PresenceRecord {
    fn bottom() -> Self {
        Self::default()
    }

    /// The newer version's keys win; keys only the older one has survive.
    fn join(&self, other: &Self) -> Self {
        let (older, newer) = if other.version > self.version {
            (self, other)
        } else {
            (other, self)
        };
        let mut data = older.data.clone();
        data.extend(newer.data.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            version: newer.version,
            data,
        }
    }
}

/// A change to a remote actor's presence.
#[derive(Clone, Debug, PartialEq)]
pub enum PresenceChange {
    Updated {
        actor: ActorId,
        record: PresenceRecord,
    },
    Left {
        actor: ActorId,
    },
}

impl PresenceChange {
    pub fn actor(&self) -> &ActorId {
        match self {
            PresenceChange::Updated { actor, .. } | PresenceChange::Left { actor } => actor,
        }
    }
}

/// Local record plus the last known record of every connected peer.
#[derive(Clone, Debug)]
pub struct PresenceStore {
    actor: ActorId,
    local: PresenceRecord,
    peers: BTreeMap<ActorId, PresenceRecord>,
    /// Version each departed actor left at; older packets are stale.
    departed: BTreeMap<ActorId, u64>,
    /// Actors the transport dropped; nothing from them applies until they
    /// reconnect.
    disconnected: BTreeSet<ActorId>,
}

impl PresenceStore {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            local: PresenceRecord::default(),
            peers: BTreeMap::new(),
            departed: BTreeMap::new(),
            disconnected: BTreeSet::new(),
        }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn local(&self) -> &PresenceRecord {
        &self.local
    }

    /// Merge `patch` into the local record and bump its version. Returns the
    /// record to broadcast.
    pub fn set_local(&mut self, patch: BTreeMap<String, Scalar>) -> &PresenceRecord {
        self.local.version += 1;
        self.local.data.extend(patch);
        &self.local
    }

    /// Apply a peer's record. Returns `None` for stale or self-addressed
    /// packets.
    pub fn apply_remote(&mut self, actor: &ActorId, record: PresenceRecord) -> Option<PresenceChange> {
        if actor == &self.actor || self.disconnected.contains(actor) {
            return None;
        }
        if self.departed.get(actor).is_some_and(|&v| record.version <= v) {
            return None;
        }
        let known = self.peers.entry(actor.clone()).or_default();
        if record.version <= known.version {
            return None;
        }
        known.join_assign(&record);
        let record = known.clone();
        self.departed.remove(actor);
        Some(PresenceChange::Updated {
            actor: actor.clone(),
            record,
        })
    }

    /// Remove a peer that disconnected at `version`. Returns `None` if the
    /// peer was unknown and already gone.
    pub fn leave(&mut self, actor: &ActorId, version: u64) -> Option<PresenceChange> {
        let removed = self.peers.remove(actor);
        let last = removed.as_ref().map(|r| r.version).unwrap_or(0).max(version);
        let entry = self.departed.entry(actor.clone()).or_insert(0);
        *entry = (*entry).max(last);
        removed.map(|_| PresenceChange::Left {
            actor: actor.clone(),
        })
    }

    /// The transport lost `actor` without a leave message, so its last
    /// version is unknown. Every packet from it is stale until
    /// [`reconnect`](Self::reconnect), whatever version it carries.
    pub fn disconnect(&mut self, actor: &ActorId) -> Option<PresenceChange> {
        self.disconnected.insert(actor.clone());
        self.leave(actor, 0)
    }

    /// The transport has `actor` again. Packets above its departure version
    /// apply as usual.
    pub fn reconnect(&mut self, actor: &ActorId) {
        self.disconnected.remove(actor);
    }

    pub fn get(&self, actor: &ActorId) -> Option<&PresenceRecord> {
        if actor == &self.actor {
            Some(&self.local)
        } else {
            self.peers.get(actor)
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = (&ActorId, &PresenceRecord)> {
        self.peers.iter()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Forget every peer, e.g. when this client's connection drops.
    pub fn clear_peers(&mut self) -> Vec<PresenceChange> {
        let peers = std::mem::take(&mut self.peers);
        peers
            .into_iter()
            .map(|(actor, record)| {
                self.departed.insert(actor.clone(), record.version);
                PresenceChange::Left { actor }
            })
            .collect()
    }
}
