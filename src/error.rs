//! Crate-wide error types.
//!
//! Each concern gets its own leaf error enum (`ConfigError`,
//! `ConnectionError`), composed into the top-level `Error` the binary
//! matches on to choose its process exit code.

use thiserror::Error;

/// The top-level error type returned by [`crate::run`] and [`crate::Engine`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer {peer_id} is not listed in PeerInfo.cfg")]
    UnknownPeer { peer_id: crate::PeerId },
}

/// Errors encountered while parsing `Common.cfg` or `PeerInfo.cfg`.
///
/// A configuration error is always fatal at startup: the binary logs it
/// and exits with a nonzero code without attempting to join the swarm.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{file}:{line}: malformed line: {text:?}")]
    Malformed {
        file: String,
        line: usize,
        text: String,
    },

    #[error("{file}: missing required key {key:?}")]
    MissingKey { file: String, key: &'static str },

    #[error("{file}:{line}: invalid integer {text:?}: {source}")]
    InvalidInt {
        file: String,
        line: usize,
        text: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("I/O error reading {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that terminate a single connection without affecting the rest
/// of the swarm: socket I/O errors and handshake mismatches are isolated
/// to the connection that raised them.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake protocol string mismatch")]
    InvalidHandshakeHeader,

    #[error("expected handshake from peer {expected}, got peer {actual}")]
    UnexpectedPeerId {
        expected: crate::PeerId,
        actual: crate::PeerId,
    },

    #[error("peer closed the connection before completing the handshake")]
    HandshakeIncomplete,
}
