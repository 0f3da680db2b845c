//! Append-only history of applied operations.
//!
//! Local operations enter as [`OpStatus::Pending`] and become
//! [`OpStatus::Committed`] when the ordering authority acknowledges them.
//! Pending entries are what a reconnecting transport resends.

use crate::CausalEvent;
use serde::{Deserialize, Serialize};
use weft_core::{ActorId, Seq};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpStatus {
    /// Applied locally, not yet acknowledged.
    Pending,
    /// Acknowledged by the ordering authority.
    Committed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry<E> {
    pub event: E,
    pub status: OpStatus,
}

/// Operation history in application order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationLog<E> {
    entries: Vec<LogEntry<E>>,
}

impl<E: CausalEvent> OperationLog<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, event: E, status: OpStatus) {
        self.entries.push(LogEntry { event, status });
    }

    /// Commit every pending entry of `actor` with sequence `<= seq`.
    /// Returns how many entries changed status.
    pub fn commit_through(&mut self, actor: &ActorId, seq: Seq) -> usize {
        let mut committed = 0;
        for entry in &mut self.entries {
            let id = entry.event.id();
            if entry.status == OpStatus::Pending && &id.actor == actor && id.seq <= seq {
                entry.status = OpStatus::Committed;
                committed += 1;
            }
        }
        committed
    }

    /// Pending entries in application order.
    pub fn pending(&self) -> impl Iterator<Item = &E> {
        self.entries
            .iter()
            .filter(|e| e.status == OpStatus::Pending)
            .map(|e| &e.event)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// Drop committed entries, keeping pending ones. Returns how many were
    /// dropped.
    pub fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.status == OpStatus::Pending);
        before - self.entries.len()
    }

    pub fn entries(&self) -> &[LogEntry<E>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E: CausalEvent> Default for OperationLog<E> {
    fn default() -> Self {
        Self::new()
    }
}
