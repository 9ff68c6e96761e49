//! The choking scheduler: two periodic loops that decide which
//! connections may pull pieces from us.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::time::{interval, Duration};

use crate::codec::Packet;
use crate::connection::ConnectionState;
use crate::event_log::EventLog;
use crate::local_peer::LocalPeerManager;
use crate::registry::Registry;
use crate::PeerId;

/// Runs the preferred-neighbor loop until the process exits. Every
/// `unchoking_interval` seconds: among currently-interested peers, pick
/// the top `preferred_count` by download rate (or at random once we're
/// complete), unchoke them, choke everyone else except the current
/// optimistic pick, and reset every rate counter.
pub async fn run_preferred_neighbor_loop(
    local_id: PeerId,
    preferred_count: usize,
    unchoking_interval: u64,
    local_peer: Arc<LocalPeerManager>,
    registry: Arc<Registry>,
    event_log: Arc<EventLog>,
) {
    let mut ticker = interval(Duration::from_secs(unchoking_interval.max(1)));
    loop {
        ticker.tick().await;

        let connections = registry.snapshot().await;
        let mut interested = Vec::new();
        for conn in &connections {
            // Every connection's counter resets every interval, interested
            // or not, so a peer that drops interest doesn't carry a stale
            // multi-interval total into its next ranking.
            let rate = conn.take_downloaded_bytes().await;
            if conn.is_interested().await {
                interested.push((conn.clone(), rate));
            }
        }

        let complete = local_peer.all_have().await;
        let preferred: Vec<Arc<ConnectionState>> = if complete {
            let mut candidates: Vec<_> = interested.iter().map(|(c, _)| c.clone()).collect();
            candidates.shuffle(&mut rand::thread_rng());
            candidates.into_iter().take(preferred_count).collect()
        } else {
            let mut ranked = interested;
            // Shuffle first so ties in download rate break randomly,
            // not by registry iteration order, then do a stable sort by
            // rate descending.
            ranked.shuffle(&mut rand::thread_rng());
            ranked.sort_by(|a, b| b.1.cmp(&a.1));
            ranked.into_iter().take(preferred_count).map(|(c, _)| c).collect()
        };

        let preferred_ids: Vec<PeerId> = preferred.iter().map(|c| c.remote_id()).collect();
        if !preferred_ids.is_empty() {
            event_log.preferred_neighbors_changed(local_id, &preferred_ids);
        }

        for conn in &connections {
            let is_preferred = preferred.iter().any(|p| p.remote_id() == conn.remote_id());
            let is_optimistic = conn.is_optimistic_unchoke().await;
            if !conn.is_interested().await {
                continue;
            }
            if is_preferred {
                if conn.local_choke().await {
                    conn.set_local_choke(false).await;
                    conn.enqueue(Packet::Unchoke).await;
                }
            } else if !is_optimistic && !conn.local_choke().await {
                conn.set_local_choke(true).await;
                conn.enqueue(Packet::Choke).await;
            }
        }
    }
}

/// Runs the optimistic-unchoke loop until the process exits. Every
/// `optimistic_unchoking_interval` seconds, picks one currently-choked,
/// currently-interested peer uniformly at random and unchokes it,
/// clearing the previous optimistic pick's exemption.
pub async fn run_optimistic_unchoke_loop(
    local_id: PeerId,
    optimistic_unchoking_interval: u64,
    registry: Arc<Registry>,
    event_log: Arc<EventLog>,
) {
    let mut ticker = interval(Duration::from_secs(optimistic_unchoking_interval.max(1)));
    let mut current_optimistic: Option<PeerId> = None;

    loop {
        ticker.tick().await;

        let connections = registry.snapshot().await;

        if let Some(previous) = current_optimistic.take() {
            if let Some(conn) = connections.iter().find(|c| c.remote_id() == previous) {
                conn.set_optimistic_unchoke(false).await;
            }
        }

        let mut candidates = Vec::new();
        for conn in &connections {
            if conn.is_interested().await && conn.local_choke().await {
                candidates.push(conn.clone());
            }
        }

        if let Some(chosen) = candidates.choose(&mut rand::thread_rng()) {
            chosen.set_local_choke(false).await;
            chosen.set_optimistic_unchoke(true).await;
            chosen.enqueue(Packet::Unchoke).await;
            current_optimistic = Some(chosen.remote_id());
            event_log.optimistic_unchoke_changed(local_id, chosen.remote_id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connection(remote_id: PeerId) -> (Arc<ConnectionState>, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ConnectionState::new(1, remote_id, 4, tx)), rx)
    }

    #[tokio::test]
    async fn optimistic_loop_unchokes_a_choked_interested_peer() {
        let registry = Arc::new(Registry::new());
        let (conn, mut rx) = connection(2);
        conn.set_interested(true).await;
        registry.insert(2, conn.clone()).await;

        let dir = std::env::temp_dir().join(format!(
            "p2p-swarm-scheduler-test-{}-{}",
            std::process::id(),
            line!()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let event_log = Arc::new(EventLog::open_in(&dir, 1).unwrap());

        let registry_clone = registry.clone();
        let handle = tokio::spawn(run_optimistic_unchoke_loop(1, 1, registry_clone, event_log));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        handle.abort();

        assert!(!conn.local_choke().await);
        assert_eq!(rx.try_recv().unwrap(), Packet::Unchoke);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
