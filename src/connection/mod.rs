//! Per-peer connection state, plus the listener/sender/handler trio that
//! drives it.
//!
//! Every connection here is symmetric: both sides upload and download
//! over the same socket, so there's no single owning task that can just
//! loop until it runs out of work. [`spawn`] performs the handshake,
//! then hands the split `Framed` halves to [`sender::run`] (a dedicated
//! task) and drives the read side itself, dispatching each inbound
//! packet to [`handler::handle`] inline.

mod handler;
mod sender;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::codec::{Framed, FramedParts};

use crate::codec::{Handshake, HandshakeCodec, Packet, PacketCodec};
use crate::error::ConnectionError;
use crate::event_log::EventLog;
use crate::local_peer::LocalPeerManager;
use crate::registry::Registry;
use crate::{Bitfield, PeerId, PieceIndex};

/// Outbound queue depth: a bounded FIFO with blocking put/take. A small
/// fixed capacity gives backpressure without needing a configuration
/// knob for it.
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

struct Inner {
    remote_pieces: Bitfield,
    local_choke: bool,
    remote_choke: bool,
    /// Whether the remote has declared interest in our pieces.
    interested: bool,
    sent_bitfield: bool,
    downloaded_bytes: u64,
    /// At most one outstanding REQUEST per connection at a time.
    outstanding_request: Option<PieceIndex>,
    is_optimistic_unchoke: bool,
}

/// The authoritative state for one remote peer, shared between that
/// peer's listener (read loop, in [`spawn`]), sender ([`sender::run`]),
/// handler ([`handler::handle`]), and the choking scheduler.
pub struct ConnectionState {
    local_id: PeerId,
    remote_id: PeerId,
    piece_count: usize,
    active: AtomicBool,
    /// Wakes the sender task (parked on the outbound queue) when
    /// `connectionActive` flips, mirroring the interruptible queue-take
    /// a thread-per-connection sender would use.
    shutdown_notify: Notify,
    outbound: mpsc::Sender<Packet>,
    inner: Mutex<Inner>,
}

impl ConnectionState {
    pub fn new(
        local_id: PeerId,
        remote_id: PeerId,
        piece_count: usize,
        outbound: mpsc::Sender<Packet>,
    ) -> Self {
        Self {
            local_id,
            remote_id,
            piece_count,
            active: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            outbound,
            inner: Mutex::new(Inner {
                remote_pieces: Bitfield::repeat(false, piece_count),
                local_choke: true,
                remote_choke: true,
                interested: false,
                sent_bitfield: false,
                downloaded_bytes: 0,
                outstanding_request: None,
                is_optimistic_unchoke: false,
            }),
        }
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub fn remote_id(&self) -> PeerId {
        self.remote_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }

    async fn wait_for_shutdown(&self) {
        while self.is_active() {
            self.shutdown_notify.notified().await;
        }
    }

    /// Enqueues a packet for the sender task. The sole blocking point a
    /// handler may hit: a full queue makes this wait rather than drop
    /// the packet. Silently does nothing if the connection has already
    /// torn down its sender.
    pub async fn enqueue(&self, packet: Packet) {
        let _ = self.outbound.send(packet).await;
    }

    pub async fn sent_bitfield(&self) -> bool {
        self.inner.lock().await.sent_bitfield
    }

    pub async fn mark_bitfield_sent(&self) {
        self.inner.lock().await.sent_bitfield = true;
    }

    pub async fn remote_pieces(&self) -> Bitfield {
        self.inner.lock().await.remote_pieces.clone()
    }

    pub async fn set_remote_pieces(&self, mut bits: Bitfield) {
        bits.resize(self.piece_count, false);
        self.inner.lock().await.remote_pieces = bits;
    }

    pub async fn set_remote_have(&self, index: PieceIndex) {
        let mut inner = self.inner.lock().await;
        if index < inner.remote_pieces.len() {
            inner.remote_pieces.set(index, true);
        }
    }

    pub async fn local_choke(&self) -> bool {
        self.inner.lock().await.local_choke
    }

    pub async fn set_local_choke(&self, choke: bool) {
        self.inner.lock().await.local_choke = choke;
    }

    pub async fn remote_choke(&self) -> bool {
        self.inner.lock().await.remote_choke
    }

    pub async fn set_remote_choke(&self, choke: bool) {
        self.inner.lock().await.remote_choke = choke;
    }

    pub async fn is_interested(&self) -> bool {
        self.inner.lock().await.interested
    }

    pub async fn set_interested(&self, interested: bool) {
        self.inner.lock().await.interested = interested;
    }

    pub async fn add_downloaded_bytes(&self, n: u64) {
        self.inner.lock().await.downloaded_bytes += n;
    }

    /// Reads and resets the downloaded-byte counter in one step, as the
    /// preferred-neighbor loop does once per interval.
    pub async fn take_downloaded_bytes(&self) -> u64 {
        let mut inner = self.inner.lock().await;
        std::mem::take(&mut inner.downloaded_bytes)
    }

    pub async fn outstanding_request(&self) -> Option<PieceIndex> {
        self.inner.lock().await.outstanding_request
    }

    pub async fn set_outstanding_request(&self, request: Option<PieceIndex>) {
        self.inner.lock().await.outstanding_request = request;
    }

    pub async fn is_optimistic_unchoke(&self) -> bool {
        self.inner.lock().await.is_optimistic_unchoke
    }

    pub async fn set_optimistic_unchoke(&self, value: bool) {
        self.inner.lock().await.is_optimistic_unchoke = value;
    }
}

/// Runs one connection end to end: handshake, then the read loop that
/// dispatches inbound packets to the handler until the connection is
/// torn down. `initiated_locally` distinguishes a dialed connection
/// (handshake sent first) from an accepted one (handshake sent in
/// reply); `expected_remote_id` is `Some` only when we dialed, since we
/// chose who to connect to from `PeerInfo.cfg`.
pub async fn spawn(
    local_id: PeerId,
    expected_remote_id: Option<PeerId>,
    socket: TcpStream,
    initiated_locally: bool,
    local_peer: Arc<LocalPeerManager>,
    registry: Arc<Registry>,
    event_log: Arc<EventLog>,
) -> Result<(), ConnectionError> {
    let mut handshake_framed = Framed::new(socket, HandshakeCodec);

    if initiated_locally {
        handshake_framed.send(Handshake::new(local_id)).await?;
    }

    let their_handshake = handshake_framed
        .next()
        .await
        .ok_or(ConnectionError::HandshakeIncomplete)??;

    if !their_handshake.has_valid_header() {
        return Err(ConnectionError::InvalidHandshakeHeader);
    }
    if let Some(expected) = expected_remote_id {
        if their_handshake.peer_id != expected {
            return Err(ConnectionError::UnexpectedPeerId {
                expected,
                actual: their_handshake.peer_id,
            });
        }
    }
    let remote_id = their_handshake.peer_id;

    event_log.tcp_connection(local_id, remote_id, initiated_locally);

    if !initiated_locally {
        handshake_framed.send(Handshake::new(local_id)).await?;
    }

    event_log.handshake_received(local_id, remote_id);

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let piece_count = local_peer.piece_count().await;
    let state = Arc::new(ConnectionState::new(
        local_id,
        remote_id,
        piece_count,
        outbound_tx,
    ));
    state.set_active(true);
    registry.insert(remote_id, state.clone()).await;

    let parts = handshake_framed.into_parts();
    let mut new_parts = FramedParts::new(parts.io, PacketCodec);
    new_parts.read_buf = parts.read_buf;
    new_parts.write_buf = parts.write_buf;
    let framed = Framed::from_parts(new_parts);
    let (write_half, mut read_half) = framed.split();

    let sender_handle = tokio::spawn(sender::run(write_half, outbound_rx, state.clone()));

    if let Some(bitfield) = local_peer.bitfield_packet().await {
        state.enqueue(bitfield).await;
    }
    state.mark_bitfield_sent().await;

    let result = loop {
        if !state.is_active() {
            break Ok(());
        }
        match read_half.next().await {
            Some(Ok(packet)) => {
                if let Err(e) =
                    handler::handle(&state, &local_peer, &registry, &event_log, packet).await
                {
                    break Err(e);
                }
            }
            Some(Err(e)) => break Err(ConnectionError::Io(e)),
            None => break Ok(()),
        }
    };

    state.set_active(false);
    registry.remove(remote_id).await;
    let _ = sender_handle.await;

    result
}
