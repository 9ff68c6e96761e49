//! The local peer manager: owns the local piece array and is the only
//! writer of it, choosing request targets and deciding when the swarm
//! has finished.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::codec::Packet;
use crate::piece::{LocalPieces, PieceLayout, PieceStatus};
use crate::registry::Registry;
use crate::{Bitfield, PeerId, PieceIndex};

pub struct LocalPeerManager {
    local_id: PeerId,
    pieces: Mutex<LocalPieces>,
}

impl LocalPeerManager {
    pub fn new(local_id: PeerId, layout: PieceLayout, have_all: bool, content: Option<Vec<u8>>) -> Self {
        Self {
            local_id,
            pieces: Mutex::new(LocalPieces::new(layout, have_all, content)),
        }
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub async fn piece_count(&self) -> usize {
        self.pieces.lock().await.layout().piece_count()
    }

    pub async fn has_any_piece(&self) -> bool {
        self.pieces.lock().await.has_any()
    }

    pub async fn to_bitfield(&self) -> Bitfield {
        self.pieces.lock().await.to_bitfield()
    }

    pub async fn have_count(&self) -> usize {
        self.pieces.lock().await.have_count()
    }

    pub async fn all_have(&self) -> bool {
        self.pieces.lock().await.all_have()
    }

    pub async fn is_interested_in(&self, remote: &Bitfield) -> bool {
        self.pieces.lock().await.is_interested_in(remote)
    }

    pub async fn piece_content(&self, index: PieceIndex) -> Option<Vec<u8>> {
        self.pieces.lock().await.content(index).map(|c| c.to_vec())
    }

    /// Selects a piece to request from a remote view and marks it
    /// `Requested` under the same lock.
    pub async fn choose_piece_to_request(&self, remote: &Bitfield) -> Option<PieceIndex> {
        self.pieces.lock().await.choose_piece_to_request(remote)
    }

    /// Reverts a piece's `Requested` mark back to `NotHave` so another
    /// connection can serve it, used when the peer we requested it from
    /// chokes us first.
    pub async fn release_requested(&self, index: PieceIndex) {
        self.pieces.lock().await.release_requested(index);
    }

    /// Writes a downloaded piece's content into the local array and
    /// broadcasts HAVE to every other connection that has already sent
    /// its bitfield.
    pub async fn record_piece(
        &self,
        index: PieceIndex,
        content: Vec<u8>,
        registry: &Arc<Registry>,
        from: PeerId,
    ) {
        {
            let mut pieces = self.pieces.lock().await;
            pieces.set_local_piece(index, PieceStatus::Have, Some(content));
        }
        registry.broadcast_have(index, from).await;
    }

    /// If every local piece is held and every connection's remote view
    /// is entirely held too, shuts every connection down. Persisting
    /// the assembled file to disk is the caller's responsibility once
    /// this returns `true`.
    pub async fn attempt_terminate(&self, registry: &Arc<Registry>) -> bool {
        if !self.all_have().await {
            return false;
        }

        let connections = registry.snapshot().await;
        for conn in &connections {
            let remote_view = conn.remote_pieces().await;
            if !remote_view_all_have(&remote_view) {
                return false;
            }
        }

        for conn in &connections {
            conn.set_active(false);
        }
        true
    }

    pub async fn assemble_file(&self) -> Vec<u8> {
        self.pieces.lock().await.assemble_file()
    }

    /// Enqueues our own BITFIELD packet on a freshly handshaken
    /// connection, if we have at least one piece.
    pub async fn bitfield_packet(&self) -> Option<Packet> {
        if self.has_any_piece().await {
            Some(Packet::Bitfield(self.to_bitfield().await))
        } else {
            None
        }
    }
}

fn remote_view_all_have(remote: &Bitfield) -> bool {
    remote.iter().all(|bit| *bit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manager(have_all: bool) -> LocalPeerManager {
        let layout = PieceLayout::new(32, 16);
        let content = if have_all { Some(vec![7u8; 32]) } else { None };
        LocalPeerManager::new(1, layout, have_all, content)
    }

    #[tokio::test]
    async fn record_piece_broadcasts_to_bitfielded_peers_only() {
        let manager = manager(false);
        let registry = Arc::new(Registry::new());

        manager.record_piece(0, vec![1; 16], &registry, 2).await;
        assert_eq!(manager.have_count().await, 1);
    }

    #[tokio::test]
    async fn attempt_terminate_requires_local_and_all_remote_completion() {
        let manager = manager(true);
        let registry = Arc::new(Registry::new());
        assert!(manager.attempt_terminate(&registry).await);
    }

    #[tokio::test]
    async fn attempt_terminate_is_false_when_local_incomplete() {
        let manager = manager(false);
        let registry = Arc::new(Registry::new());
        assert!(!manager.attempt_terminate(&registry).await);
    }

    #[tokio::test]
    async fn attempt_terminate_is_false_while_a_remote_view_is_incomplete() {
        use crate::connection::ConnectionState;
        use tokio::sync::mpsc;

        let manager = manager(true);
        let registry = Arc::new(Registry::new());

        let (tx, _rx) = mpsc::channel(8);
        let conn = Arc::new(ConnectionState::new(1, 2, 2, tx));
        conn.set_remote_have(0).await;
        registry.insert(2, conn).await;

        assert!(!manager.attempt_terminate(&registry).await);
    }
}
