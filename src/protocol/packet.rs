use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Largest payload a single packet can carry
pub const MAX_PAYLOAD_LENGTH: usize = 0xFF_FFFF;

/// MySQL packet header (zero-copy)
///
/// Layout matches MySQL wire protocol:
/// - length: 3 bytes (little-endian, payload length)
/// - sequence_id: 1 byte
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct PacketHeader {
    pub length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(length: usize, sequence_id: u8) -> Self {
        let len = u32::to_le_bytes(length as u32);
        Self {
            length: [len[0], len[1], len[2]],
            sequence_id,
        }
    }

    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }
}

/// Frame `payload` into one or more packets starting at `sequence_id`.
///
/// Payloads of `MAX_PAYLOAD_LENGTH` bytes or more are split; a payload whose
/// last chunk is exactly `MAX_PAYLOAD_LENGTH` long is terminated by an empty
/// packet. Returns the next sequence id.
pub fn write_packets(out: &mut Vec<u8>, mut sequence_id: u8, payload: &[u8]) -> u8 {
    let mut remaining = payload;
    loop {
        let chunk_size = remaining.len().min(MAX_PAYLOAD_LENGTH);
        let (chunk, rest) = remaining.split_at(chunk_size);
        out.extend_from_slice(PacketHeader::encode(chunk_size, sequence_id).as_bytes());
        out.extend_from_slice(chunk);
        sequence_id = sequence_id.wrapping_add(1);
        remaining = rest;
        if chunk_size < MAX_PAYLOAD_LENGTH {
            return sequence_id;
        }
    }
}

/// Split one complete packet off the front of `data`.
///
/// Returns `None` when `data` does not hold a complete packet yet.
pub fn split_packet(data: &[u8]) -> Option<(&PacketHeader, &[u8], &[u8])> {
    let (header, rest) = PacketHeader::ref_from_prefix(data).ok()?;
    let (payload, rest) = rest.split_at_checked(header.length())?;
    Some((header, payload, rest))
}

/// OK packet payload (minimal header only)
///
/// Layout: 0x00 (or 0xFE when it terminates a result set) followed by:
/// - affected_rows: length-encoded integer
/// - last_insert_id: length-encoded integer
/// - status_flags: 2 bytes
/// - warnings: 2 bytes
/// - info: variable-length string
#[derive(Debug, Clone, Copy)]
pub struct OkPayloadBytes<'a>(pub &'a [u8]);

impl<'a> OkPayloadBytes<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }
}

/// ERR packet payload, starting with 0xFF
#[derive(Debug, Clone, Copy)]
pub struct ErrPayloadBytes<'a>(pub &'a [u8]);

/// Whether `payload` is an EOF packet (0xFE header, shorter than 9 bytes)
pub fn is_eof_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&0xFE) && payload.len() < 9
}

/// Reject an empty payload up front so callers can index the header byte.
pub fn header_byte(payload: &[u8]) -> Result<u8> {
    payload
        .first()
        .copied()
        .ok_or_else(|| Error::malformed("empty packet"))
}
