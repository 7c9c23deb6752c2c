//! Packet views for both directions.
//!
//! - [`Packet`] owns the bytes of one complete packet (header included)
//! - [`PacketReader`] walks a packet's payload, starting past the header
//! - [`PacketWriter`] builds outbound packets and patches the dynamic length
//!   field when serialized
//!
//! # Example
//!
//! ```
//! use shardwire::protocol::{Packet, PacketWriter};
//!
//! let mut writer = PacketWriter::dynamic(0xA8);
//! writer.write_u16(0xBEEF);
//! writer.write_bytes(b"ok");
//! let bytes = writer.to_bytes().unwrap();
//! assert_eq!(&bytes[..], &[0xA8, 0x00, 0x07, 0xBE, 0xEF, b'o', b'k']);
//!
//! let packet = Packet::from_slice(&bytes, true);
//! let mut reader = packet.reader();
//! assert_eq!(reader.read_u16(), Some(0xBEEF));
//! assert_eq!(reader.read_bytes(2), Some(&b"ok"[..]));
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::packet_table::{PacketLength, PacketLengths};
use super::wire_format::{write_length_field, DYNAMIC_HEADER_SIZE, EMPTY_ID_SENTINEL, ID_SIZE};
use crate::error::{Result, TransportError};
use crate::pool::PooledSegment;

/// One complete packet, header included.
#[derive(Debug)]
pub struct Packet {
    data: PooledSegment,
    dynamic: bool,
    filtered: bool,
}

impl Packet {
    /// Wrap a segment holding exactly one packet.
    pub fn from_segment(data: PooledSegment, dynamic: bool) -> Self {
        Self {
            data,
            dynamic,
            filtered: false,
        }
    }

    /// Build a packet from a copy of `data`.
    pub fn from_slice(data: &[u8], dynamic: bool) -> Self {
        Self::from_segment(PooledSegment::from_slice(data), dynamic)
    }

    /// Build a packet from a copy of `data`, resolving its header layout via `lengths`.
    pub fn from_slice_with(data: &[u8], lengths: &dyn PacketLengths) -> Self {
        let dynamic = data
            .first()
            .map(|&id| lengths.packet_length(id) == PacketLength::Dynamic)
            .unwrap_or(false);
        Self::from_slice(data, dynamic)
    }

    /// Packet id (first byte), or `0xFF` for an empty packet.
    #[inline]
    pub fn id(&self) -> u8 {
        self.data.first().copied().unwrap_or(EMPTY_ID_SENTINEL)
    }

    /// Total length in bytes, header included.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the packet holds no bytes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the packet carries a length field.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Bytes occupied by the id and optional length field.
    #[inline]
    pub fn header_len(&self) -> usize {
        let header = if self.dynamic {
            DYNAMIC_HEADER_SIZE
        } else {
            ID_SIZE
        };
        header.min(self.data.len())
    }

    /// Whole packet.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes after the header.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[self.header_len()..]
    }

    /// A reader positioned at the first payload byte.
    #[inline]
    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader::new(self.payload())
    }

    /// Mark the packet as consumed: a filtered outbound packet is not transmitted.
    #[inline]
    pub fn filter(&mut self) {
        self.filtered = true;
    }

    /// Whether a handler filtered this packet.
    #[inline]
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }
}

/// Sequential big-endian reader over a packet payload.
///
/// Reads past the end return `None` and leave the position unchanged.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Reader over `data`, starting at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset into the payload.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The unread tail.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Read `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    /// Advance `n` bytes. Returns false (and stays put) if fewer remain.
    pub fn skip(&mut self, n: usize) -> bool {
        self.read_bytes(n).is_some()
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a big-endian u16.
    pub fn read_u16(&mut self) -> Option<u16> {
        self.read_bytes(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_bytes(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Builder for outbound packets.
///
/// Dynamic writers reserve the two length bytes after the id; the field is
/// filled in by [`to_bytes`](Self::to_bytes). Fixed writers emit exactly
/// what was written, so callers write the full declared length.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    buf: BytesMut,
    dynamic: bool,
}

impl PacketWriter {
    /// Writer for a fixed-length packet.
    pub fn fixed(id: u8) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(id);
        Self {
            buf,
            dynamic: false,
        }
    }

    /// Writer for a dynamic-length packet.
    pub fn dynamic(id: u8) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(id);
        buf.put_u16(0);
        Self { buf, dynamic: true }
    }

    /// Writer whose layout follows the length table entry for `id`.
    pub fn for_id(id: u8, lengths: &dyn PacketLengths) -> Self {
        match lengths.packet_length(id) {
            PacketLength::Dynamic => Self::dynamic(id),
            PacketLength::Fixed(n) => {
                let mut writer = Self::fixed(id);
                writer.buf.reserve(n as usize);
                writer
            }
        }
    }

    /// Packet id.
    #[inline]
    pub fn id(&self) -> u8 {
        self.buf[0]
    }

    /// Whether the length field is patched on serialization.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Bytes written so far, header included.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether only the header has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        let header = if self.dynamic {
            DYNAMIC_HEADER_SIZE
        } else {
            ID_SIZE
        };
        self.buf.len() <= header
    }

    /// Append one byte.
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Append a big-endian u16.
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    /// Append a big-endian u32.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    /// Append `n` zero bytes.
    pub fn write_zeros(&mut self, n: usize) -> &mut Self {
        self.buf.put_bytes(0, n);
        self
    }

    /// Serialize, patching the length field of dynamic packets.
    ///
    /// # Errors
    ///
    /// `Protocol` when a dynamic packet grew past the u16 length limit.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut out = self.buf.clone();
        if self.dynamic {
            let length = u16::try_from(out.len()).map_err(|_| {
                TransportError::Protocol(format!(
                    "packet 0x{:02X} is {} bytes, over the u16 length limit",
                    self.id(),
                    out.len()
                ))
            })?;
            write_length_field(&mut out, length);
        }
        Ok(out.freeze())
    }
}
