//! Packet dispatch: the single place that reacts to an inbound packet,
//! mutates connection state, and enqueues replies.

use std::sync::Arc;

use crate::codec::Packet;
use crate::error::ConnectionError;
use crate::event_log::EventLog;
use crate::local_peer::LocalPeerManager;
use crate::registry::Registry;

use super::ConnectionState;

pub(super) async fn handle(
    state: &Arc<ConnectionState>,
    local_peer: &Arc<LocalPeerManager>,
    registry: &Arc<Registry>,
    event_log: &Arc<EventLog>,
    packet: Packet,
) -> Result<(), ConnectionError> {
    let local_id = state.local_id();
    let remote_id = state.remote_id();

    match packet {
        Packet::Choke => {
            state.set_remote_choke(true).await;
            if let Some(index) = state.outstanding_request().await {
                local_peer.release_requested(index).await;
                state.set_outstanding_request(None).await;
            }
            event_log.choking(local_id, remote_id);
        }
        Packet::Unchoke => {
            state.set_remote_choke(false).await;
            event_log.unchoking(local_id, remote_id);
            request_next_piece(state, local_peer).await;
        }
        Packet::Interested => {
            state.set_interested(true).await;
            event_log.interested(local_id, remote_id);
        }
        Packet::NotInterested => {
            state.set_interested(false).await;
            event_log.not_interested(local_id, remote_id);
        }
        Packet::Bitfield(bits) => {
            state.set_remote_pieces(bits).await;
            send_interest_update(state, local_peer).await;
        }
        Packet::Have(index) => {
            state.set_remote_have(index).await;
            event_log.have_received(local_id, remote_id, index);
            send_interest_update(state, local_peer).await;
            local_peer.attempt_terminate(registry).await;
        }
        Packet::Request(index) => {
            if !state.local_choke().await {
                match local_peer.piece_content(index).await {
                    Some(content) => state.enqueue(Packet::Piece { index, content }).await,
                    None => log::warn!(
                        "peer {}: peer {} requested piece {} we do not hold, skipping",
                        local_id, remote_id, index
                    ),
                }
            }
        }
        Packet::Piece { index, content } => {
            let len = content.len() as u64;
            local_peer
                .record_piece(index, content, registry, remote_id)
                .await;
            state.add_downloaded_bytes(len).await;
            state.set_outstanding_request(None).await;

            let have_count = local_peer.have_count().await;
            event_log.piece_downloaded(local_id, remote_id, index, have_count);

            if local_peer.all_have().await {
                event_log.download_complete(local_id);
            }

            if !state.remote_choke().await {
                request_next_piece(state, local_peer).await;
            }
            local_peer.attempt_terminate(registry).await;
        }
        Packet::Unknown => {
            log::warn!(
                "peer {}: dropping unrecognized packet from peer {}",
                local_id, remote_id
            );
        }
    }

    Ok(())
}

async fn send_interest_update(state: &Arc<ConnectionState>, local_peer: &Arc<LocalPeerManager>) {
    let remote_view = state.remote_pieces().await;
    let packet = if local_peer.is_interested_in(&remote_view).await {
        Packet::Interested
    } else {
        Packet::NotInterested
    };
    state.enqueue(packet).await;
}

async fn request_next_piece(state: &Arc<ConnectionState>, local_peer: &Arc<LocalPeerManager>) {
    let remote_view = state.remote_pieces().await;
    if let Some(index) = local_peer.choose_piece_to_request(&remote_view).await {
        state.set_outstanding_request(Some(index)).await;
        state.enqueue(Packet::Request(index)).await;
    }
}
