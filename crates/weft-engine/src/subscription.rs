//! Subscriptions and deferred turns.
//!
//! Callbacks run synchronously, in registration order, inside the engine
//! call that produced the change. They never get the engine itself: a
//! callback that wants to mutate queues a command on [`Deferred`], and the
//! engine runs the queue as the next turn once every callback of the current
//! turn has returned.

use crate::command::{Command, Position};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weft_core::{Scalar, Value};
use weft_doc::{Delta, NodeId, Path, PresenceChange};

/// What a subscriber wants to hear about.
#[derive(Clone, Debug, PartialEq)]
pub enum Scope {
    /// Document changes at, below, or above `path`. Subscribing to the root
    /// path sees every document change.
    Path(Path),
    /// Presence changes of any actor, local included.
    Presence,
}

impl Scope {
    pub fn path(path: Path) -> Self {
        Scope::Path(path)
    }

    fn matches(&self, notification: &Notification) -> bool {
        match (self, notification) {
            (Scope::Path(path), Notification::Document(delta)) => path.overlaps(&delta.path),
            (Scope::Presence, Notification::Presence(_)) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Document(Delta),
    Presence(PresenceChange),
}

/// Handle returned by `subscribe`. Cancelling takes effect before the next
/// notification is delivered, including from inside a callback.
#[derive(Clone, Debug)]
pub struct Unsubscribe {
    cancelled: Arc<AtomicBool>,
}

impl Unsubscribe {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

type Callback = Box<dyn FnMut(&Notification, &mut Deferred) + Send>;

struct Subscriber {
    scope: Scope,
    callback: Callback,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
pub(crate) struct Subscriptions {
    subscribers: Vec<Subscriber>,
}

impl Subscriptions {
    pub(crate) fn add(&mut self, scope: Scope, callback: Callback) -> Unsubscribe {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.subscribers.push(Subscriber {
            scope,
            callback,
            cancelled: cancelled.clone(),
        });
        Unsubscribe { cancelled }
    }

    /// Deliver each notification to every matching live subscriber.
    pub(crate) fn dispatch(&mut self, notifications: &[Notification], deferred: &mut Deferred) {
        for notification in notifications {
            for sub in &mut self.subscribers {
                if sub.cancelled.load(Ordering::Acquire) || !sub.scope.matches(notification) {
                    continue;
                }
                (sub.callback)(notification, deferred);
            }
        }
        self.subscribers
            .retain(|s| !s.cancelled.load(Ordering::Acquire));
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|s| !s.cancelled.load(Ordering::Acquire))
            .count()
    }
}

/// Mutations requested from inside a callback.
#[derive(Debug, Default)]
pub struct Deferred {
    queue: VecDeque<Command>,
}

impl Deferred {
    /// Queue an insert. The returned id is the id the new node will have
    /// if the insert validates when its turn runs.
    pub fn insert(&mut self, parent: NodeId, at: impl Into<Position>, value: Value) -> NodeId {
        let node = NodeId::generate();
        self.queue.push_back(Command::Insert {
            parent,
            at: at.into(),
            value,
            node,
        });
        node
    }

    pub fn set(&mut self, parent: NodeId, key: impl Into<String>, value: Value) -> NodeId {
        let node = NodeId::generate();
        self.queue.push_back(Command::Set {
            parent,
            key: key.into(),
            value,
            node,
        });
        node
    }

    pub fn delete(&mut self, target: NodeId) {
        self.queue.push_back(Command::Delete { target });
    }

    pub fn set_presence<K, V>(&mut self, patch: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Scalar>,
    {
        let patch: BTreeMap<String, Scalar> =
            patch.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.queue.push_back(Command::SetPresence(patch));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<Command> {
        self.queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn delta_at(path: &str) -> Notification {
        Notification::Document(Delta::deleted(Path::parse(path).unwrap()))
    }

    #[test]
    fn test_scope_matching() {
        let items = Scope::Path(Path::parse("items").unwrap());
        assert!(items.matches(&delta_at("items.0")));
        assert!(items.matches(&delta_at("items")));
        assert!(!items.matches(&delta_at("color")));
        assert!(Scope::Path(Path::root()).matches(&delta_at("color")));
        assert!(!Scope::Presence.matches(&delta_at("items")));
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscriptions::default();
        for name in ["first", "second"] {
            let log = log.clone();
            subs.add(
                Scope::Path(Path::root()),
                Box::new(move |_, _| log.lock().unwrap().push(name)),
            );
        }

        let mut deferred = Deferred::default();
        subs.dispatch(&[delta_at("a")], &mut deferred);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let hits = Arc::new(Mutex::new(0));
        let mut subs = Subscriptions::default();
        let counter = hits.clone();
        let handle = subs.add(
            Scope::Path(Path::root()),
            Box::new(move |_, _| *counter.lock().unwrap() += 1),
        );

        let mut deferred = Deferred::default();
        subs.dispatch(&[delta_at("a")], &mut deferred);
        handle.cancel();
        subs.dispatch(&[delta_at("b")], &mut deferred);

        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(subs.len(), 0);
    }

    #[test]
    fn test_callbacks_queue_commands() {
        let mut subs = Subscriptions::default();
        subs.add(
            Scope::Path(Path::root()),
            Box::new(|_, deferred| {
                deferred.set(NodeId::root(), "seen", Value::from(true));
            }),
        );

        let mut deferred = Deferred::default();
        subs.dispatch(&[delta_at("a"), delta_at("b")], &mut deferred);
        assert_eq!(deferred.len(), 2);
        assert!(matches!(deferred.take()[0], Command::Set { .. }));
        assert!(deferred.is_empty());
    }
}
