//! The wire packet codec.
//!
//! A connection starts out framed with [`HandshakeCodec`] for the single
//! fixed-size handshake record, then gets rebuilt around [`PacketCodec`]
//! for every frame after: `Framed<TcpStream, HandshakeCodec>` is taken
//! apart via `into_parts`, a new `Framed` is assembled around
//! `PacketCodec` from the same `io` handle with the leftover read/write
//! buffers carried over, and decoding continues from there without
//! losing any bytes already buffered during the handshake.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{Bitfield, PeerId, PieceIndex};

/// The literal header every handshake record starts with.
pub const PROTOCOL_HEADER: &[u8; 18] = b"P2PFILESHARINGPROJ";

/// The fixed 32-byte handshake record: 18-byte header, 10 zero bytes,
/// 4-byte big-endian peer id.
///
/// Decoding never fails — the listener's job is only to read the 32
/// bytes and hand them to the handler, which performs the header
/// literal check and peer-id cross-check and decides whether the
/// connection survives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handshake {
    pub header: [u8; 18],
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            header: *PROTOCOL_HEADER,
            peer_id,
        }
    }

    pub fn has_valid_header(&self) -> bool {
        &self.header == PROTOCOL_HEADER
    }
}

pub const HANDSHAKE_LEN: usize = 18 + 10 + 4;

/// Codec used for exactly the first frame on a connection.
pub struct HandshakeCodec;

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Handshake>, Self::Error> {
        if src.len() < HANDSHAKE_LEN {
            return Ok(None);
        }
        let frame = src.split_to(HANDSHAKE_LEN);
        let mut header = [0u8; 18];
        header.copy_from_slice(&frame[0..18]);
        // bytes 18..28 are the 10 zero-padding bytes; we don't need to
        // keep them around, only the header and the peer id.
        let peer_id = u32::from_be_bytes([frame[28], frame[29], frame[30], frame[31]]);
        Ok(Some(Handshake { header, peer_id }))
    }
}

impl Encoder<Handshake> for HandshakeCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Handshake, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(HANDSHAKE_LEN);
        dst.put_slice(&item.header);
        dst.put_bytes(0, 10);
        dst.put_u32(item.peer_id);
        Ok(())
    }
}

/// One post-handshake wire message. `Unknown` stands in for a
/// frame the parse contract couldn't make sense of: a length header
/// less than 1, an unrecognized type id, or a payload of the wrong
/// shape for its type id. The handler silently drops `Unknown` packets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(PieceIndex),
    Bitfield(Bitfield),
    Request(PieceIndex),
    Piece { index: PieceIndex, content: Vec<u8> },
    Unknown,
}

impl Packet {
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Choke => "choke",
            Packet::Unchoke => "unchoke",
            Packet::Interested => "interested",
            Packet::NotInterested => "not_interested",
            Packet::Have(_) => "have",
            Packet::Bitfield(_) => "bitfield",
            Packet::Request(_) => "request",
            Packet::Piece { .. } => "piece",
            Packet::Unknown => "unknown",
        }
    }
}

const TYPE_CHOKE: u8 = 0;
const TYPE_UNCHOKE: u8 = 1;
const TYPE_INTERESTED: u8 = 2;
const TYPE_NOT_INTERESTED: u8 = 3;
const TYPE_HAVE: u8 = 4;
const TYPE_BITFIELD: u8 = 5;
const TYPE_REQUEST: u8 = 6;
const TYPE_PIECE: u8 = 7;

/// An index that doesn't fit in the 4-byte wire representation. A
/// piece index here is always a valid `usize` produced by
/// [`crate::piece::LocalPieces::choose_piece_to_request`] (which
/// returns `Option`, not a sentinel value), so the only way `Have` or
/// `Request` can fail to build is an index too large for the wire's
/// 4-byte field.
#[derive(Debug, thiserror::Error)]
#[error("piece index {0} does not fit in a 4-byte wire field")]
pub struct IndexOutOfRange(pub PieceIndex);

/// Codec used for every frame after the handshake.
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as i64;
        // A length header of 0 can't hold a type id; treat it as a
        // distinguished unknown frame rather than stalling forever.
        if len < 1 {
            src.advance(4);
            return Ok(Some(Packet::Unknown));
        }
        let len = len as usize;
        if src.len() < 4 + len {
            // wait for the rest of the frame; don't consume anything yet
            return Ok(None);
        }
        src.advance(4);
        let frame = src.split_to(len);
        let type_id = frame[0];
        let payload = &frame[1..];
        Ok(Some(decode_payload(type_id, payload)))
    }
}

fn decode_payload(type_id: u8, payload: &[u8]) -> Packet {
    match type_id {
        TYPE_CHOKE => Packet::Choke,
        TYPE_UNCHOKE => Packet::Unchoke,
        TYPE_INTERESTED => Packet::Interested,
        TYPE_NOT_INTERESTED => Packet::NotInterested,
        TYPE_HAVE => match payload.try_into() {
            Ok(bytes) => Packet::Have(u32::from_be_bytes(bytes) as PieceIndex),
            Err(_) => Packet::Unknown,
        },
        TYPE_BITFIELD => Packet::Bitfield(Bitfield::from_vec(payload.to_vec())),
        TYPE_REQUEST => match payload.try_into() {
            Ok(bytes) => Packet::Request(u32::from_be_bytes(bytes) as PieceIndex),
            Err(_) => Packet::Unknown,
        },
        TYPE_PIECE => {
            if payload.len() < 4 {
                Packet::Unknown
            } else {
                let index = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Packet::Piece {
                    index: index as PieceIndex,
                    content: payload[4..].to_vec(),
                }
            }
        }
        _ => Packet::Unknown,
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        fn index_to_u32(index: PieceIndex) -> Result<u32, std::io::Error> {
            u32::try_from(index).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, IndexOutOfRange(index))
            })
        }

        let (type_id, payload): (u8, Vec<u8>) = match item {
            Packet::Choke => (TYPE_CHOKE, Vec::new()),
            Packet::Unchoke => (TYPE_UNCHOKE, Vec::new()),
            Packet::Interested => (TYPE_INTERESTED, Vec::new()),
            Packet::NotInterested => (TYPE_NOT_INTERESTED, Vec::new()),
            Packet::Have(index) => (TYPE_HAVE, index_to_u32(index)?.to_be_bytes().to_vec()),
            Packet::Bitfield(bits) => (TYPE_BITFIELD, bits.into_vec()),
            Packet::Request(index) => (TYPE_REQUEST, index_to_u32(index)?.to_be_bytes().to_vec()),
            Packet::Piece { index, content } => {
                let mut payload = index_to_u32(index)?.to_be_bytes().to_vec();
                payload.extend_from_slice(&content);
                (TYPE_PIECE, payload)
            }
            Packet::Unknown => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "cannot encode an UNKNOWN packet",
                ))
            }
        };

        let len = 1 + payload.len();
        dst.reserve(4 + len);
        dst.put_u32(len as u32);
        dst.put_u8(type_id);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(packet: Packet) -> Packet {
        let mut buf = BytesMut::new();
        PacketCodec.encode(packet, &mut buf).unwrap();
        PacketCodec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn round_trips_every_empty_payload_kind() {
        assert_eq!(round_trip(Packet::Choke), Packet::Choke);
        assert_eq!(round_trip(Packet::Unchoke), Packet::Unchoke);
        assert_eq!(round_trip(Packet::Interested), Packet::Interested);
        assert_eq!(round_trip(Packet::NotInterested), Packet::NotInterested);
    }

    #[test]
    fn round_trips_have_and_request() {
        assert_eq!(round_trip(Packet::Have(42)), Packet::Have(42));
        assert_eq!(round_trip(Packet::Request(7)), Packet::Request(7));
    }

    #[test]
    fn round_trips_piece_with_content() {
        let packet = Packet::Piece {
            index: 3,
            content: vec![1, 2, 3, 4, 5],
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn round_trips_bitfield_with_trailing_padding() {
        // 5 bits of logical content, padded up to a full byte on the wire.
        let mut bits = Bitfield::repeat(false, 8);
        bits.set(0, true);
        bits.set(4, true);
        let packet = Packet::Bitfield(bits.clone());
        assert_eq!(round_trip(packet), Packet::Bitfield(bits));
    }

    #[test]
    fn zero_length_frame_decodes_as_unknown() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        let packet = PacketCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet, Packet::Unknown);
        assert!(buf.is_empty());
    }

    #[test]
    fn unrecognized_type_id_decodes_as_unknown() {
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_u8(255);
        let packet = PacketCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet, Packet::Unknown);
    }

    #[test]
    fn truncated_have_payload_decodes_as_unknown() {
        let mut buf = BytesMut::new();
        buf.put_u32(2); // type + 1 byte, not the 4 a HAVE index needs
        buf.put_u8(TYPE_HAVE);
        buf.put_u8(0);
        let packet = PacketCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet, Packet::Unknown);
    }

    #[test]
    fn short_read_does_not_abandon_the_frame() {
        let mut buf = BytesMut::new();
        PacketCodec.encode(Packet::Have(9), &mut buf).unwrap();
        let full = buf.clone();
        let mut partial = BytesMut::from(&full[..3]);
        assert_eq!(PacketCodec.decode(&mut partial).unwrap(), None);
        partial.extend_from_slice(&full[3..]);
        assert_eq!(PacketCodec.decode(&mut partial).unwrap(), Some(Packet::Have(9)));
    }

    #[test]
    fn handshake_round_trips() {
        let handshake = Handshake::new(1002);
        let mut buf = BytesMut::new();
        HandshakeCodec.encode(handshake, &mut buf).unwrap();
        assert_eq!(buf.len(), HANDSHAKE_LEN);
        let decoded = HandshakeCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, handshake);
        assert!(decoded.has_valid_header());
    }

    #[test]
    fn index_too_large_fails_to_build() {
        let mut buf = BytesMut::new();
        let bad_index = u32::MAX as usize + 1;
        let err = PacketCodec.encode(Packet::Have(bad_index), &mut buf);
        assert!(err.is_err());
    }
}
