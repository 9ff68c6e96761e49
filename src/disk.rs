//! Final single-file persistence: writes the assembled file to
//! `peer_<id>/<FileName>` once, at swarm termination.

use std::path::PathBuf;

use tokio::fs;

use crate::PeerId;

/// Writes `content` to `<download_dir>/peer_<id>/<file_name>`, creating
/// the peer's directory if necessary.
pub async fn persist(
    download_dir: impl Into<PathBuf>,
    local_id: PeerId,
    file_name: &str,
    content: &[u8],
) -> std::io::Result<PathBuf> {
    let dir = download_dir.into().join(format!("peer_{}", local_id));
    fs::create_dir_all(&dir).await?;
    let path = dir.join(file_name);
    fs::write(&path, content).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_writes_under_a_per_peer_directory() {
        let dir = std::env::temp_dir().join(format!("p2p-swarm-disk-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let path = persist(&dir, 7, "thefile.dat", b"hello world").await.unwrap();
        assert_eq!(path, dir.join("peer_7").join("thefile.dat"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
