//! Transport abstraction for carrying engine frames between peers.
//!
//! The engine never touches a transport itself; a
//! [`Session`](crate::session::Session) pumps frames between the two.
//! [`MemoryTransport`] connects peers in-process for tests and simulation.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Unique identifier for a peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Peer connection state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connected,
}

#[derive(Clone, Debug)]
pub struct Peer {
    pub id: PeerId,
    pub state: PeerState,
}

/// An encoded engine message.
pub type Frame = Vec<u8>;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Peer not found: {0}")]
    PeerNotFound(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Inbound channel already taken")]
    AlreadySubscribed,
}

#[async_trait]
pub trait NetworkTransport: Send + Sync + 'static {
    async fn connect(&self, peer_id: &PeerId) -> Result<(), NetworkError>;

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError>;

    async fn send(&self, peer_id: &PeerId, frame: Frame) -> Result<(), NetworkError>;

    /// Send to every connected peer.
    async fn broadcast(&self, frame: Frame) -> Result<(), NetworkError>;

    async fn connected_peers(&self) -> Vec<Peer>;

    /// Take the inbound channel. Only one receiver exists.
    fn subscribe(&self) -> Result<mpsc::Receiver<(PeerId, Frame)>, NetworkError>;
}

type SharedReceiver = Arc<RwLock<Option<mpsc::Receiver<(PeerId, Frame)>>>>;
type SharedOutgoing = Arc<RwLock<HashMap<PeerId, mpsc::Sender<(PeerId, Frame)>>>>;

const CHANNEL_CAPACITY: usize = 1024;

/// In-memory transport for tests and simulation.
pub struct MemoryTransport {
    local_id: PeerId,
    peers: Arc<RwLock<HashMap<PeerId, Peer>>>,
    inbound_tx: mpsc::Sender<(PeerId, Frame)>,
    inbound_rx: SharedReceiver,
    outgoing: SharedOutgoing,
}

impl MemoryTransport {
    pub fn new(local_id: PeerId) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            local_id,
            peers: Arc::new(RwLock::new(HashMap::new())),
            inbound_tx: tx,
            inbound_rx: Arc::new(RwLock::new(Some(rx))),
            outgoing: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Link two transports in both directions.
    pub fn connect_to(&self, other: &MemoryTransport) {
        self.link(other);
        other.link(self);
    }

    fn link(&self, other: &MemoryTransport) {
        self.peers.write().insert(
            other.local_id.clone(),
            Peer {
                id: other.local_id.clone(),
                state: PeerState::Connected,
            },
        );
        self.outgoing
            .write()
            .insert(other.local_id.clone(), other.inbound_tx.clone());
    }
}

#[async_trait]
impl NetworkTransport for MemoryTransport {
    async fn connect(&self, peer_id: &PeerId) -> Result<(), NetworkError> {
        if !self.outgoing.read().contains_key(peer_id) {
            return Err(NetworkError::ConnectionFailed(format!(
                "no route to {peer_id}"
            )));
        }
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.state = PeerState::Connected;
        }
        Ok(())
    }

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError> {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.state = PeerState::Disconnected;
        }
        self.outgoing.write().remove(peer_id);
        Ok(())
    }

    async fn send(&self, peer_id: &PeerId, frame: Frame) -> Result<(), NetworkError> {
        let tx = self.outgoing.read().get(peer_id).cloned();
        let tx = tx.ok_or_else(|| NetworkError::PeerNotFound(peer_id.to_string()))?;
        tx.send((self.local_id.clone(), frame))
            .await
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    }

    async fn broadcast(&self, frame: Frame) -> Result<(), NetworkError> {
        let senders: Vec<_> = self.outgoing.read().values().cloned().collect();
        for tx in senders {
            // A peer that went away is not an error for the others.
            let _ = tx.send((self.local_id.clone(), frame.clone())).await;
        }
        Ok(())
    }

    async fn connected_peers(&self) -> Vec<Peer> {
        self.peers
            .read()
            .values()
            .filter(|p| p.state == PeerState::Connected)
            .cloned()
            .collect()
    }

    fn subscribe(&self) -> Result<mpsc::Receiver<(PeerId, Frame)>, NetworkError> {
        self.inbound_rx
            .write()
            .take()
            .ok_or(NetworkError::AlreadySubscribed)
    }
}

/// Create a fully connected mesh of memory transports.
pub fn create_network(count: usize) -> Vec<MemoryTransport> {
    let transports: Vec<_> = (0..count)
        .map(|i| MemoryTransport::new(PeerId::new(format!("peer-{}", i))))
        .collect();

    for i in 0..count {
        for j in (i + 1)..count {
            transports[i].connect_to(&transports[j]);
        }
    }

    transports
}
