//! The human-readable per-peer log file: a durable, human-facing record
//! of what a peer did, kept alongside the process's structured log
//! stream.
//!
//! This sits alongside the structured `log` crate stream rather than
//! replacing it: `log::info!` goes wherever the process's logger sends
//! it (console, via `env_logger`, in the binary); [`EventLog`] always
//! appends the same narration to a durable `log_peer_<id>.log` file
//! next to the binary's working directory, one line per event,
//! timestamped.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::PeerId;

pub struct EventLog {
    file: Mutex<std::fs::File>,
}

impl EventLog {
    pub fn open(local_id: PeerId) -> std::io::Result<Self> {
        Self::open_in(".", local_id)
    }

    /// As [`EventLog::open`], but rooted at an explicit directory
    /// rather than the process's working directory. Lets tests avoid
    /// depending on (and racing over) `std::env::set_current_dir`.
    pub fn open_in(dir: impl AsRef<Path>, local_id: PeerId) -> std::io::Result<Self> {
        let path = dir.as_ref().join(format!("log_peer_{}.log", local_id));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn write(&self, line: &str) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut file = self.file.lock().unwrap();
        if let Err(e) = writeln!(file, "[{}] {}", timestamp, line) {
            log::warn!("failed to write event log entry: {}", e);
        }
    }

    pub fn tcp_connection(&self, local_id: PeerId, remote_id: PeerId, we_dialed: bool) {
        if we_dialed {
            self.write(&format!(
                "Peer {} makes a connection to Peer {}.",
                local_id, remote_id
            ));
        } else {
            self.write(&format!(
                "Peer {} is connected from Peer {}.",
                local_id, remote_id
            ));
        }
    }

    pub fn handshake_received(&self, local_id: PeerId, remote_id: PeerId) {
        self.write(&format!(
            "Peer {} receives a completed handshake with Peer {}.",
            local_id, remote_id
        ));
    }

    pub fn preferred_neighbors_changed(&self, local_id: PeerId, neighbors: &[PeerId]) {
        let list = neighbors
            .iter()
            .map(PeerId::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        self.write(&format!(
            "Peer {} has the preferred neighbors {}.",
            local_id, list
        ));
    }

    pub fn optimistic_unchoke_changed(&self, local_id: PeerId, neighbor: PeerId) {
        self.write(&format!(
            "Peer {} has the optimistically unchoked neighbor {}.",
            local_id, neighbor
        ));
    }

    pub fn unchoking(&self, local_id: PeerId, remote_id: PeerId) {
        self.write(&format!(
            "Peer {} is unchoked by {}.",
            local_id, remote_id
        ));
    }

    pub fn choking(&self, local_id: PeerId, remote_id: PeerId) {
        self.write(&format!("Peer {} is choked by {}.", local_id, remote_id));
    }

    pub fn have_received(&self, local_id: PeerId, remote_id: PeerId, piece_index: usize) {
        self.write(&format!(
            "Peer {} received the 'have' message from {} for the piece {}.",
            local_id, remote_id, piece_index
        ));
    }

    pub fn interested(&self, local_id: PeerId, remote_id: PeerId) {
        self.write(&format!(
            "Peer {} received the 'interested' message from {}.",
            local_id, remote_id
        ));
    }

    pub fn not_interested(&self, local_id: PeerId, remote_id: PeerId) {
        self.write(&format!(
            "Peer {} received the 'not interested' message from {}.",
            local_id, remote_id
        ));
    }

    pub fn piece_downloaded(
        &self,
        local_id: PeerId,
        remote_id: PeerId,
        piece_index: usize,
        have_count: usize,
    ) {
        self.write(&format!(
            "Peer {} has downloaded the piece {} from {}. Now the number of pieces it has is {}.",
            local_id, piece_index, remote_id, have_count
        ));
    }

    pub fn download_complete(&self, local_id: PeerId) {
        self.write(&format!(
            "Peer {} has downloaded the complete file.",
            local_id
        ));
    }
}
