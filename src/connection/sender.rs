//! The sender task: drains the outbound queue and writes framed packets
//! to the socket, one at a time, atomically.

use std::sync::Arc;

use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use super::ConnectionState;
use crate::codec::{Packet, PacketCodec};

pub(super) async fn run(
    mut sink: SplitSink<Framed<TcpStream, PacketCodec>, Packet>,
    mut outbound: mpsc::Receiver<Packet>,
    state: Arc<ConnectionState>,
) {
    loop {
        tokio::select! {
            packet = outbound.recv() => {
                match packet {
                    Some(packet) => {
                        let name = packet.name();
                        if let Err(e) = sink.send(packet).await {
                            // `Framed::send` fuses encode and write into one
                            // `Result`; `PacketCodec::encode` reports a build
                            // error (an index too wide for the wire, or an
                            // UNKNOWN packet) as `ErrorKind::InvalidInput`,
                            // which a real socket write never produces. Drop
                            // just that packet; only an actual write error
                            // tears down the connection.
                            if e.kind() == std::io::ErrorKind::InvalidInput {
                                log::warn!(
                                    "peer {}: dropping {} for peer {}: {}",
                                    state.local_id(), name, state.remote_id(), e
                                );
                                continue;
                            }
                            log::warn!(
                                "peer {}: write error sending {} to peer {}: {}",
                                state.local_id(), name, state.remote_id(), e
                            );
                            state.set_active(false);
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = state.wait_for_shutdown() => break,
        }
    }
    let _ = sink.close().await;
}
