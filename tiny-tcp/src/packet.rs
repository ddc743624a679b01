//! Wire-format definitions for protocol segments.
//!
//! Every segment exchanged between peers starts with a [`SegmentHeader`].
//! This module is responsible for:
//! - Defining the fixed 20-byte header layout and its flag bits.
//! - Serialising a header (and optional payload) into bytes.
//! - Deserialising raw bytes back into a header, rejecting layouts this
//!   crate does not speak (options, reserved bits).
//! - Wrap-around comparisons in the 32-bit sequence space.
//!
//! No I/O happens here — this is pure data transformation.  The checksum
//! field is carried through verbatim; it is never computed or verified.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Offset| Rsvd  |     Flags     |          Window Size          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |        Urgent Pointer         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 20 bytes, never any options.

use std::fmt;

use thiserror::Error;

/// Bit-flag constants for the `flags` header field.
///
/// This bit assignment is private to this crate and does **not** match the
/// flag byte of real TCP; do not expect interoperability with a kernel stack.
pub mod flags {
    /// Finish — sender has no more data to send.
    pub const FIN: u8 = 0b0000_0001;
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u8 = 0b0000_0010;
    /// Reset the connection.
    pub const RST: u8 = 0b0000_0100;
    /// Push buffered data to the application.
    pub const PSH: u8 = 0b0000_1000;
    /// Acknowledgement field is valid.
    pub const ACK: u8 = 0b0001_0000;
    /// Urgent pointer field is valid.
    pub const URG: u8 = 0b0010_0000;

    /// Every defined flag, lowest bit first, paired with its display name.
    pub const ALL: [(u8, &str); 6] = [
        (FIN, "FIN"),
        (SYN, "SYN"),
        (RST, "RST"),
        (PSH, "PSH"),
        (ACK, "ACK"),
        (URG, "URG"),
    ];
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 20;

/// Header length in 32-bit words.  Options are never present.
pub const DATA_OFFSET: u8 = 5;

/// Receive window advertised by a freshly constructed header.
pub const DEFAULT_WINDOW: u16 = 65_535;

// Byte offsets of each field within the serialised header.
const OFF_SRC_PORT: usize = 0;
const OFF_DST_PORT: usize = 2;
const OFF_SEQ: usize = 4;
const OFF_ACK: usize = 8;
const OFF_DATA_OFFSET: usize = 12;
const OFF_FLAGS: usize = 13;
const OFF_WINDOW: usize = 14;
const OFF_CHECKSUM: usize = 16;
const OFF_URGENT: usize = 18;

// ---------------------------------------------------------------------------
// Sequence space
// ---------------------------------------------------------------------------

/// Returns `true` when sequence number `a` is ≤ `b` in wrap-around space.
///
/// The comparison works correctly as long as the two values are less than
/// `u32::MAX / 2` apart.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) <= (u32::MAX / 2)
}

/// Strict variant of [`seq_le`].
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    a != b && seq_le(a, b)
}

// ---------------------------------------------------------------------------
// SegmentHeader
// ---------------------------------------------------------------------------

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`SegmentHeader::encode`] converts to
/// big-endian on the wire and [`SegmentHeader::decode`] converts back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentHeader {
    pub source_port: u16,
    pub destination_port: u16,
    /// Sequence number of the first payload byte (or of the SYN/FIN itself).
    pub sequence_number: u32,
    /// Next sequence number expected from the peer.  Meaningful only with ACK.
    pub ack_number: u32,
    /// Header length in 32-bit words; always [`DATA_OFFSET`].
    pub data_offset: u8,
    /// Always zero.
    pub reserved: u8,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    /// Advertised receive-window size in bytes.
    pub window_size: u16,
    /// Carried, never computed.
    pub checksum: u16,
    pub urgent_pointer: u16,
}

impl SegmentHeader {
    /// A header between the two ports with no flags set, zeroed sequence
    /// space and the full [`DEFAULT_WINDOW`].
    pub fn new(source_port: u16, destination_port: u16) -> Self {
        Self {
            source_port,
            destination_port,
            sequence_number: 0,
            ack_number: 0,
            data_offset: DATA_OFFSET,
            reserved: 0,
            flags: 0,
            window_size: DEFAULT_WINDOW,
            checksum: 0,
            urgent_pointer: 0,
        }
    }

    /// OR `mask` into the flag byte.
    pub fn set_flags(&mut self, mask: u8) {
        self.flags |= mask;
    }

    /// Clear every bit of `mask` from the flag byte.
    pub fn clear_flags(&mut self, mask: u8) {
        self.flags &= !mask;
    }

    /// `true` only if **every** bit in `mask` is set.
    ///
    /// `has_flags(SYN | ACK)` is false for a bare SYN.
    pub fn has_flags(&self, mask: u8) -> bool {
        self.flags & mask == mask
    }

    /// Header length in bytes (`data_offset * 4`).
    pub fn header_len(&self) -> usize {
        usize::from(self.data_offset) * 4
    }

    /// Amount of sequence space a segment with this header and a payload of
    /// `payload_len` bytes occupies.  SYN and FIN each consume one number.
    pub fn sequence_len(&self, payload_len: usize) -> u32 {
        let mut len = payload_len as u32;
        if self.flags & flags::SYN != 0 {
            len = len.wrapping_add(1);
        }
        if self.flags & flags::FIN != 0 {
            len = len.wrapping_add(1);
        }
        len
    }

    /// Names of the set flags, lowest bit first.
    pub fn flag_names(&self) -> Vec<&'static str> {
        flags::ALL
            .iter()
            .filter(|(bit, _)| self.flags & bit != 0)
            .map(|&(_, name)| name)
            .collect()
    }

    /// Serialise into the 20-byte wire layout.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];

        buf[OFF_SRC_PORT..OFF_SRC_PORT + 2].copy_from_slice(&self.source_port.to_be_bytes());
        buf[OFF_DST_PORT..OFF_DST_PORT + 2].copy_from_slice(&self.destination_port.to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack_number.to_be_bytes());
        buf[OFF_DATA_OFFSET] = (self.data_offset << 4) | (self.reserved & 0x0f);
        buf[OFF_FLAGS] = self.flags;
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&self.window_size.to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&self.checksum.to_be_bytes());
        buf[OFF_URGENT..OFF_URGENT + 2].copy_from_slice(&self.urgent_pointer.to_be_bytes());

        buf
    }

    /// Parse a header from the front of `buf`.  Trailing bytes are ignored.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the data offset is not [`DATA_OFFSET`] (options are unsupported), or
    /// - the reserved bits are not zero.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }

        let data_offset = buf[OFF_DATA_OFFSET] >> 4;
        let reserved = buf[OFF_DATA_OFFSET] & 0x0f;
        if data_offset != DATA_OFFSET {
            return Err(PacketError::UnsupportedDataOffset(data_offset));
        }
        if reserved != 0 {
            return Err(PacketError::NonZeroReserved(reserved));
        }

        Ok(Self {
            source_port: be_u16(buf, OFF_SRC_PORT),
            destination_port: be_u16(buf, OFF_DST_PORT),
            sequence_number: be_u32(buf, OFF_SEQ),
            ack_number: be_u32(buf, OFF_ACK),
            data_offset,
            reserved,
            flags: buf[OFF_FLAGS],
            window_size: be_u16(buf, OFF_WINDOW),
            checksum: be_u16(buf, OFF_CHECKSUM),
            urgent_pointer: be_u16(buf, OFF_URGENT),
        })
    }
}

impl Default for SegmentHeader {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl fmt::Display for SegmentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TCP[{}->{} seq={} ack={} flags=",
            self.source_port, self.destination_port, self.sequence_number, self.ack_number
        )?;
        for name in self.flag_names() {
            write!(f, "{name} ")?;
        }
        write!(f, "win={}]", self.window_size)
    }
}

fn be_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn be_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A complete segment: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: SegmentHeader,
    pub payload: Vec<u8>,
}

impl Segment {
    /// Serialise header followed by payload into a new byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a header and treat every remaining byte as payload.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let header = SegmentHeader::decode(buf)?;
        Ok(Self {
            payload: buf[header.header_len()..].to_vec(),
            header,
        })
    }
}

/// Errors that can arise when parsing raw bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),
    #[error("data offset {0} unsupported (options are not implemented)")]
    UnsupportedDataOffset(u8),
    #[error("reserved bits must be zero, got {0:#x}")]
    NonZeroReserved(u8),
}
