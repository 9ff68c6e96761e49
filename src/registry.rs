//! The peer manager registry: a map from remote peer id to that peer's
//! connection state, kept behind a single lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::connection::ConnectionState;
use crate::codec::Packet;
use crate::PeerId;

/// Maps remote peer id to connection state. Every HAVE broadcast, every
/// termination check, and every choking-loop iteration walks this map,
/// so iteration must stay safe under concurrent connection shutdown —
/// we hand out owned `Arc` clones from a snapshot rather than holding
/// the lock across any `.await`.
#[derive(Default)]
pub struct Registry {
    connections: RwLock<HashMap<PeerId, Arc<ConnectionState>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, peer_id: PeerId, state: Arc<ConnectionState>) {
        self.connections.write().await.insert(peer_id, state);
    }

    pub async fn remove(&self, peer_id: PeerId) {
        self.connections.write().await.remove(&peer_id);
    }

    pub async fn get(&self, peer_id: PeerId) -> Option<Arc<ConnectionState>> {
        self.connections.read().await.get(&peer_id).cloned()
    }

    /// A point-in-time snapshot of every connection, safe to iterate
    /// (and `.await` over) without holding the registry lock.
    pub async fn snapshot(&self) -> Vec<Arc<ConnectionState>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Sends HAVE(index) to every connection other than `exclude` that
    /// has already sent its own bitfield.
    pub async fn broadcast_have(&self, index: crate::PieceIndex, exclude: PeerId) {
        for conn in self.snapshot().await {
            if conn.remote_id() == exclude {
                continue;
            }
            if conn.sent_bitfield().await {
                conn.enqueue(Packet::Have(index)).await;
            }
        }
    }

    /// Whether the registry has no connections at all (used only in
    /// tests; a running swarm always has at least the peers listed
    /// before or after the local id).
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}
