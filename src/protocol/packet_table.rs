//! Packet id → length lookup.
//!
//! The protocol assigns every packet id either a fixed total length or marks
//! it dynamic (length carried in the packet). The concrete table belongs to
//! the game protocol and is supplied by the caller through [`PacketLengths`].

use std::fmt;

use crate::error::{Result, TransportError};

/// Declared length of a packet id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLength {
    /// Packet is always this many bytes, id included.
    Fixed(u16),
    /// Packet carries its total length as a u16 after the id.
    Dynamic,
}

impl PacketLength {
    /// Table encoding used by classic length tables: negative is dynamic.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a fixed length that does not fit in a u16.
    pub fn from_raw(raw: i32) -> Result<Self> {
        if raw < 0 {
            return Ok(Self::Dynamic);
        }
        u16::try_from(raw).map(Self::Fixed).map_err(|_| {
            TransportError::InvalidArgument(format!("fixed packet length {} exceeds u16", raw))
        })
    }

    /// Whether the length is carried in the packet.
    #[inline]
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

/// Lookup contract for packet lengths.
pub trait PacketLengths: Send + Sync {
    /// Declared length for `id`.
    fn packet_length(&self, id: u8) -> PacketLength;
}

/// A 256-entry length table. Every id starts out dynamic.
///
/// # Example
///
/// ```
/// use shardwire::protocol::{PacketLength, PacketLengthTable, PacketLengths};
///
/// let table = PacketLengthTable::new().with_fixed(0x73, 10);
/// assert_eq!(table.packet_length(0x73), PacketLength::Fixed(10));
/// assert_eq!(table.packet_length(0xA8), PacketLength::Dynamic);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct PacketLengthTable {
    entries: [PacketLength; 256],
}

impl PacketLengthTable {
    /// A table with every id dynamic.
    pub fn new() -> Self {
        Self {
            entries: [PacketLength::Dynamic; 256],
        }
    }

    /// Build from raw `i32` entries (`-1` or any negative means dynamic).
    ///
    /// Ids beyond `raw.len()` stay dynamic; entries past 256 are ignored.
    /// A fixed entry above `u16::MAX` is an `InvalidArgument` error.
    pub fn from_raw(raw: &[i32]) -> Result<Self> {
        let mut table = Self::new();
        for (id, &value) in raw.iter().take(256).enumerate() {
            table.entries[id] = PacketLength::from_raw(value)?;
        }
        Ok(table)
    }

    /// Builder-style [`set`](Self::set) for a fixed length.
    pub fn with_fixed(mut self, id: u8, length: u16) -> Self {
        self.set(id, PacketLength::Fixed(length));
        self
    }

    /// Builder-style [`set`](Self::set) for a dynamic id.
    pub fn with_dynamic(mut self, id: u8) -> Self {
        self.set(id, PacketLength::Dynamic);
        self
    }

    /// Overwrite the entry for `id`.
    #[inline]
    pub fn set(&mut self, id: u8, length: PacketLength) {
        self.entries[id as usize] = length;
    }

    /// Number of ids with a fixed length.
    pub fn fixed_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_dynamic()).count()
    }
}

impl PacketLengths for PacketLengthTable {
    #[inline]
    fn packet_length(&self, id: u8) -> PacketLength {
        self.entries[id as usize]
    }
}

impl Default for PacketLengthTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PacketLengthTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketLengthTable")
            .field("fixed", &self.fixed_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_all_dynamic() {
        let table = PacketLengthTable::new();
        assert_eq!(table.fixed_count(), 0);
        assert!(table.packet_length(0).is_dynamic());
        assert!(table.packet_length(0xFF).is_dynamic());
    }

    #[test]
    fn test_from_raw() {
        let table = PacketLengthTable::from_raw(&[0x68, 0x05, -1, 0x02]).unwrap();

        assert_eq!(table.packet_length(0x00), PacketLength::Fixed(0x68));
        assert_eq!(table.packet_length(0x01), PacketLength::Fixed(5));
        assert_eq!(table.packet_length(0x02), PacketLength::Dynamic);
        assert_eq!(table.packet_length(0x03), PacketLength::Fixed(2));
        assert_eq!(table.packet_length(0x04), PacketLength::Dynamic);
        assert_eq!(table.fixed_count(), 3);
    }

    #[test]
    fn test_raw_negative_is_dynamic() {
        assert_eq!(PacketLength::from_raw(-1).unwrap(), PacketLength::Dynamic);
        assert_eq!(PacketLength::from_raw(-42).unwrap(), PacketLength::Dynamic);
        assert_eq!(
            PacketLength::from_raw(u16::MAX as i32).unwrap(),
            PacketLength::Fixed(u16::MAX)
        );
    }

    #[test]
    fn test_raw_oversized_fixed_rejected() {
        assert!(matches!(
            PacketLength::from_raw(70_000),
            Err(TransportError::InvalidArgument(_))
        ));
        assert!(PacketLengthTable::from_raw(&[0x05, 70_000]).is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let table = PacketLengthTable::new()
            .with_fixed(0x73, 10)
            .with_fixed(0x22, 3)
            .with_dynamic(0x22);

        assert_eq!(table.packet_length(0x73), PacketLength::Fixed(10));
        assert_eq!(table.packet_length(0x22), PacketLength::Dynamic);
    }
}
