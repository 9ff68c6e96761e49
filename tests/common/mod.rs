//! Shared scaffolding for the end-to-end swarm tests: build an in-memory
//! `Config` for a handful of loopback peers, seed the file for whichever
//! entry has it, and clean up the directories a run leaves behind.

use std::path::PathBuf;

use p2p_file_swarm::{CommonConfig, Config, PeerEntry};

/// Picks a port range that's unlikely to collide between test binaries
/// running concurrently, by salting with the current process id.
pub fn base_port(salt: u16) -> u16 {
    20000 + (std::process::id() as u16 % 5000) + salt
}

pub fn build_config(
    file_name: &str,
    file_size: u64,
    piece_size: u64,
    preferred_neighbors: usize,
    peers: Vec<PeerEntry>,
) -> Config {
    Config {
        common: CommonConfig {
            number_of_preferred_neighbors: preferred_neighbors,
            unchoking_interval: 1,
            optimistic_unchoking_interval: 1,
            file_name: file_name.to_string(),
            file_size,
            piece_size,
        },
        peers,
    }
}

pub fn peer(peer_id: u32, port: u16, has_file: bool) -> PeerEntry {
    PeerEntry {
        peer_id,
        hostname: "127.0.0.1".to_string(),
        port,
        has_file,
    }
}

/// Writes the seed peer's source file into the process's working
/// directory, where `Engine::new` reads it for any peer with `has_file`.
pub fn seed_file(file_name: &str, content: &[u8]) {
    std::fs::write(file_name, content).unwrap();
}

pub fn downloaded_path(peer_id: u32, file_name: &str) -> PathBuf {
    PathBuf::from(format!("peer_{}", peer_id)).join(file_name)
}

/// Removes everything a test run left in the crate's working directory:
/// the seed file, every peer's download directory, and every peer's
/// event log.
pub fn cleanup(file_name: &str, peer_ids: &[u32]) {
    let _ = std::fs::remove_file(file_name);
    for id in peer_ids {
        let _ = std::fs::remove_dir_all(format!("peer_{}", id));
        let _ = std::fs::remove_file(format!("log_peer_{}.log", id));
    }
}
