//! Piece layout arithmetic and the local piece table.
//!
//! `PieceLayout` handles piece-count/length math, including the
//! last-piece-is-shorter case, for the single-file case (there are no
//! multi-file archives here). `LocalPieces` is the local peer manager's
//! piece array plus its mutating operations: `set_local_piece` and
//! `choose_piece_to_request`.

use rand::seq::SliceRandom;

use crate::{Bitfield, PieceIndex};

/// The status of one local piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PieceStatus {
    Have,
    NotHave,
    Requested,
}

/// Piece-count/length math for a single file of `file_size` bytes split
/// into pieces of (nominal) `piece_size` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PieceLayout {
    file_size: u64,
    piece_size: u64,
    piece_count: usize,
}

impl PieceLayout {
    /// `numberOfPieces = ceil(fileSize / pieceSize)`.
    pub fn new(file_size: u64, piece_size: u64) -> Self {
        assert!(piece_size > 0, "piece size must be positive");
        let piece_count = ((file_size + piece_size - 1) / piece_size) as usize;
        let piece_count = piece_count.max(1);
        Self {
            file_size,
            piece_size,
            piece_count,
        }
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The length of the piece at `index`. The final piece may be
    /// shorter: `fileSize - (numberOfPieces-1)*pieceSize`.
    pub fn piece_len(&self, index: PieceIndex) -> u64 {
        assert!(index < self.piece_count, "piece index out of range");
        if index + 1 == self.piece_count {
            self.file_size - self.piece_size * (self.piece_count - 1) as u64
        } else {
            self.piece_size
        }
    }
}

/// The local peer manager's piece array.
///
/// Mutable only through [`LocalPieces::set_local_piece`] and
/// [`LocalPieces::choose_piece_to_request`]. This type holds no lock
/// itself — callers (`local_peer::LocalPeerManager`) wrap it in a
/// `tokio::sync::Mutex`.
pub struct LocalPieces {
    layout: PieceLayout,
    statuses: Vec<PieceStatus>,
    content: Vec<Option<Vec<u8>>>,
}

impl LocalPieces {
    /// Creates a fresh piece table. `have_all` seeds every piece as
    /// already held, with `content` filled in by the caller (used when
    /// this peer starts out owning the complete file).
    pub fn new(layout: PieceLayout, have_all: bool, content: Option<Vec<u8>>) -> Self {
        let piece_count = layout.piece_count();
        if have_all {
            let content = content.expect("have_all requires the full file content");
            let mut statuses = Vec::with_capacity(piece_count);
            let mut pieces = Vec::with_capacity(piece_count);
            let mut offset = 0usize;
            for i in 0..piece_count {
                let len = layout.piece_len(i) as usize;
                let end = (offset + len).min(content.len());
                pieces.push(Some(content[offset..end].to_vec()));
                statuses.push(PieceStatus::Have);
                offset = end;
            }
            Self {
                layout,
                statuses,
                content: pieces,
            }
        } else {
            Self {
                layout,
                statuses: vec![PieceStatus::NotHave; piece_count],
                content: vec![None; piece_count],
            }
        }
    }

    pub fn layout(&self) -> &PieceLayout {
        &self.layout
    }

    pub fn status(&self, index: PieceIndex) -> PieceStatus {
        self.statuses[index]
    }

    /// A piece's status is `Have` if and only if its content is present
    /// — upheld by construction: this is the only write path for piece
    /// content.
    pub fn set_local_piece(&mut self, index: PieceIndex, status: PieceStatus, content: Option<Vec<u8>>) {
        debug_assert_eq!(
            status == PieceStatus::Have,
            content.is_some(),
            "HAVE iff content is present"
        );
        self.statuses[index] = status;
        self.content[index] = content;
    }

    pub fn content(&self, index: PieceIndex) -> Option<&[u8]> {
        self.content[index].as_deref()
    }

    /// Our own bitfield, for sending BITFIELD/HAVE and for exposing to
    /// the interest/termination checks of other connections.
    pub fn to_bitfield(&self) -> Bitfield {
        self.statuses.iter().map(|s| *s == PieceStatus::Have).collect()
    }

    pub fn have_count(&self) -> usize {
        self.statuses.iter().filter(|s| **s == PieceStatus::Have).count()
    }

    /// Every local piece is held.
    pub fn all_have(&self) -> bool {
        self.statuses.iter().all(|s| *s == PieceStatus::Have)
    }

    /// We have at least one piece, which gates whether we send a
    /// bitfield at all after the handshake.
    pub fn has_any(&self) -> bool {
        self.statuses.iter().any(|s| *s == PieceStatus::Have)
    }

    /// Returns an index `i` such that the local status is `NotHave` and
    /// the remote bitfield has it, chosen uniformly at random among
    /// candidates, or `None` if there is no such piece. On returning a
    /// valid index it marks the local status `Requested`.
    pub fn choose_piece_to_request(&mut self, remote: &Bitfield) -> Option<PieceIndex> {
        let candidates: Vec<PieceIndex> = self
            .statuses
            .iter()
            .enumerate()
            .filter(|(i, status)| {
                **status == PieceStatus::NotHave && remote.get(*i).map(|b| *b).unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();

        let chosen = *candidates.choose(&mut rand::thread_rng())?;
        self.statuses[chosen] = PieceStatus::Requested;
        Some(chosen)
    }

    /// Clears a piece back to `NotHave` so it can be requested again
    /// from a different peer. Used when a connection that was serving
    /// this piece chokes us before fulfilling the request (see
    /// DESIGN.md's Open Question decision on the requested-marker
    /// note).
    pub fn release_requested(&mut self, index: PieceIndex) {
        if self.statuses[index] == PieceStatus::Requested {
            self.statuses[index] = PieceStatus::NotHave;
        }
    }

    /// Whether this remote view has any piece we lack.
    pub fn is_interested_in(&self, remote: &Bitfield) -> bool {
        self.statuses
            .iter()
            .enumerate()
            .any(|(i, status)| *status != PieceStatus::Have && remote.get(i).map(|b| *b).unwrap_or(false))
    }

    /// Concatenates every piece's content, truncated to the file size.
    /// Panics if any piece is missing; callers must only invoke this
    /// once `all_have()` is true.
    pub fn assemble_file(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.layout.file_size() as usize);
        for piece in &self.content {
            buf.extend_from_slice(piece.as_deref().expect("all_have() was not checked"));
        }
        buf.truncate(self.layout.file_size() as usize);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn piece_count_rounds_up() {
        let layout = PieceLayout::new(64, 16);
        assert_eq!(layout.piece_count(), 4);
        let layout = PieceLayout::new(65, 16);
        assert_eq!(layout.piece_count(), 5);
    }

    #[test]
    fn last_piece_is_shorter_when_not_a_multiple() {
        let layout = PieceLayout::new(65, 16);
        assert_eq!(layout.piece_len(0), 16);
        assert_eq!(layout.piece_len(3), 16);
        assert_eq!(layout.piece_len(4), 1);
    }

    #[test]
    fn have_all_seeds_every_piece_with_content() {
        let layout = PieceLayout::new(64, 16);
        let content: Vec<u8> = (0..64).collect();
        let pieces = LocalPieces::new(layout, true, Some(content.clone()));
        assert!(pieces.all_have());
        assert_eq!(pieces.assemble_file(), content);
    }

    #[test]
    fn set_local_piece_upholds_have_iff_content() {
        let layout = PieceLayout::new(64, 16);
        let mut pieces = LocalPieces::new(layout, false, None);
        assert_eq!(pieces.status(0), PieceStatus::NotHave);
        assert!(pieces.content(0).is_none());

        pieces.set_local_piece(0, PieceStatus::Have, Some(vec![1; 16]));
        assert_eq!(pieces.status(0), PieceStatus::Have);
        assert_eq!(pieces.content(0), Some(&[1u8; 16][..]));
    }

    #[test]
    fn choose_piece_to_request_only_picks_wanted_pieces() {
        let layout = PieceLayout::new(48, 16);
        let mut pieces = LocalPieces::new(layout, false, None);
        pieces.set_local_piece(0, PieceStatus::Have, Some(vec![0; 16]));

        let mut remote = Bitfield::repeat(false, 3);
        remote.set(1, true);

        let chosen = pieces.choose_piece_to_request(&remote);
        assert_eq!(chosen, Some(1));
        assert_eq!(pieces.status(1), PieceStatus::Requested);

        // Piece 1 is now REQUESTED, not NOT_HAVE, and piece 2 isn't
        // held by the remote, so nothing further can be picked.
        assert_eq!(pieces.choose_piece_to_request(&remote), None);
    }

    #[test]
    fn release_requested_makes_the_piece_requestable_again() {
        let layout = PieceLayout::new(32, 16);
        let mut pieces = LocalPieces::new(layout, false, None);
        let remote = Bitfield::repeat(true, 2);

        let chosen = pieces.choose_piece_to_request(&remote).unwrap();
        assert_eq!(pieces.status(chosen), PieceStatus::Requested);

        pieces.release_requested(chosen);
        assert_eq!(pieces.status(chosen), PieceStatus::NotHave);
    }

    #[test]
    fn is_interested_in_detects_a_wanted_piece() {
        let layout = PieceLayout::new(32, 16);
        let pieces = LocalPieces::new(layout, false, None);
        let mut remote = Bitfield::repeat(false, 2);
        assert!(!pieces.is_interested_in(&remote));
        remote.set(0, true);
        assert!(pieces.is_interested_in(&remote));
    }
}
