//! Parsing for the two static configuration files.
//!
//! `Common.cfg` and `PeerInfo.cfg` are bespoke whitespace-delimited line
//! formats, not a generic serialization format, so we hand-parse them
//! line by line with `split_whitespace` and typed `parse()` calls rather
//! than reaching for a schema-driven deserializer.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::PeerId;

/// The contents of `Common.cfg`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommonConfig {
    pub number_of_preferred_neighbors: usize,
    pub unchoking_interval: u64,
    pub optimistic_unchoking_interval: u64,
    pub file_name: String,
    pub file_size: u64,
    pub piece_size: u64,
}

impl CommonConfig {
    /// Parses a `Common.cfg` file from its path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            file: name.clone(),
            source,
        })?;
        Self::from_str(&text, &name)
    }

    fn from_str(text: &str, file: &str) -> Result<Self, ConfigError> {
        let mut number_of_preferred_neighbors = None;
        let mut unchoking_interval = None;
        let mut optimistic_unchoking_interval = None;
        let mut file_name = None;
        let mut file_size = None;
        let mut piece_size = None;

        for (line_no, line) in text.lines().enumerate() {
            let line_no = line_no + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let key = parts.next().ok_or_else(|| ConfigError::Malformed {
                file: file.to_string(),
                line: line_no,
                text: line.to_string(),
            })?;
            let value = parts.next().ok_or_else(|| ConfigError::Malformed {
                file: file.to_string(),
                line: line_no,
                text: line.to_string(),
            })?;
            if parts.next().is_some() {
                return Err(ConfigError::Malformed {
                    file: file.to_string(),
                    line: line_no,
                    text: line.to_string(),
                });
            }

            let parse_int = |value: &str| -> Result<u64, ConfigError> {
                value.parse::<u64>().map_err(|source| ConfigError::InvalidInt {
                    file: file.to_string(),
                    line: line_no,
                    text: value.to_string(),
                    source,
                })
            };

            match key {
                "NumberOfPreferredNeighbors" => {
                    number_of_preferred_neighbors = Some(parse_int(value)? as usize);
                }
                "UnchokingInterval" => unchoking_interval = Some(parse_int(value)?),
                "OptimisticUnchokingInterval" => {
                    optimistic_unchoking_interval = Some(parse_int(value)?);
                }
                "FileName" => file_name = Some(value.to_string()),
                "FileSize" => file_size = Some(parse_int(value)?),
                "PieceSize" => piece_size = Some(parse_int(value)?),
                _ => {
                    log::warn!("{}:{}: ignoring unknown key {:?}", file, line_no, key);
                }
            }
        }

        macro_rules! require {
            ($field:ident, $key:expr) => {
                $field.ok_or_else(|| ConfigError::MissingKey {
                    file: file.to_string(),
                    key: $key,
                })?
            };
        }

        Ok(Self {
            number_of_preferred_neighbors: require!(
                number_of_preferred_neighbors,
                "NumberOfPreferredNeighbors"
            ),
            unchoking_interval: require!(unchoking_interval, "UnchokingInterval"),
            optimistic_unchoking_interval: require!(
                optimistic_unchoking_interval,
                "OptimisticUnchokingInterval"
            ),
            file_name: require!(file_name, "FileName"),
            file_size: require!(file_size, "FileSize"),
            piece_size: require!(piece_size, "PieceSize"),
        })
    }
}

/// One line of `PeerInfo.cfg`: `<peerId> <hostname> <port> <hasFile>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerEntry {
    pub peer_id: PeerId,
    pub hostname: String,
    pub port: u16,
    pub has_file: bool,
}

impl PeerEntry {
    /// Lines are ordered; a peer dials every peer listed before it.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Parses `PeerInfo.cfg` into its ordered list of peer entries.
pub fn parse_peer_info(path: impl AsRef<Path>) -> Result<Vec<PeerEntry>, ConfigError> {
    let path = path.as_ref();
    let file = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        file: file.clone(),
        source,
    })?;

    let mut entries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let malformed = || ConfigError::Malformed {
            file: file.clone(),
            line: line_no,
            text: line.to_string(),
        };

        let mut parts = line.split_whitespace();
        let peer_id = parts.next().ok_or_else(malformed)?;
        let hostname = parts.next().ok_or_else(malformed)?;
        let port = parts.next().ok_or_else(malformed)?;
        let has_file = parts.next().ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }

        let peer_id: PeerId = peer_id.parse().map_err(|source| ConfigError::InvalidInt {
            file: file.clone(),
            line: line_no,
            text: peer_id.to_string(),
            source,
        })?;
        let port: u16 = port.parse().map_err(|source| ConfigError::InvalidInt {
            file: file.clone(),
            line: line_no,
            text: port.to_string(),
            source,
        })?;
        let has_file = match has_file {
            "0" => false,
            "1" => true,
            _ => return Err(malformed()),
        };

        entries.push(PeerEntry {
            peer_id,
            hostname: hostname.to_string(),
            port,
            has_file,
        });
    }

    Ok(entries)
}

/// The full configuration for a single peer process: the common swarm
/// parameters plus the ordered peer roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub common: CommonConfig,
    pub peers: Vec<PeerEntry>,
}

impl Config {
    /// Loads both configuration files and validates that every peer-info
    /// entry is well-formed. Fatal at startup on any error.
    pub fn load(
        common_cfg: impl AsRef<Path>,
        peer_info_cfg: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let common = CommonConfig::from_file(common_cfg)?;
        let peers = parse_peer_info(peer_info_cfg)?;
        Ok(Self { common, peers })
    }

    /// Returns the local peer's own entry, if it exists.
    pub fn local_entry(&self, local_id: PeerId) -> Option<&PeerEntry> {
        self.peers.iter().find(|p| p.peer_id == local_id)
    }

    /// Peers listed *before* the given id in `PeerInfo.cfg` — the local
    /// peer must dial each of them.
    pub fn peers_to_dial(&self, local_id: PeerId) -> Vec<&PeerEntry> {
        self.peers
            .iter()
            .take_while(|p| p.peer_id != local_id)
            .collect()
    }
}
