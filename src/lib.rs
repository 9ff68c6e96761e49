//! A peer-to-peer file distribution client for a statically-configured
//! swarm: every participant is named up front in `PeerInfo.cfg`, there is
//! no tracker or peer discovery, and the swarm terminates once every peer
//! holds every piece of the shared file.

mod codec;
mod config;
mod connection;
mod disk;
mod engine;
mod error;
mod event_log;
mod local_peer;
mod piece;
mod registry;
mod scheduler;

pub use config::{CommonConfig, Config, PeerEntry};
pub use engine::Engine;
pub use error::Error;
pub use piece::PieceStatus;

use bitvec::prelude::{BitVec, Msb0};

/// The type of a peer's id, as assigned in `PeerInfo.cfg`.
///
/// The wire handshake encodes this as a 4-byte big-endian integer (see
/// `codec::Handshake`), but in the source we use `u32` throughout to be
/// consistent with other numeric config values.
pub type PeerId = u32;

/// The type of a piece's index.
///
/// On the wire all integers are sent as 4-byte big endian integers, but in
/// the source code we use `usize` to be consistent with other index types
/// in Rust.
pub type PieceIndex = usize;

/// A peer's piece availability, or our own. A truthy bit at position `i`
/// means the piece at index `i` is held in full.
///
/// This is a compact bool vector from most significant to least
/// significant bit, i.e. the first (highest) bit of the first byte
/// represents piece 0, matching the wire format of the bitfield
/// message: a bitset, MSB-first within each byte.
pub type Bitfield = BitVec<Msb0, u8>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Runs a peer process to completion: loads configuration, joins the
/// swarm, and blocks until swarm termination fires.
pub async fn run(local_id: PeerId, config: Config) -> Result<()> {
    engine::Engine::new(local_id, config)?.run().await
}
