//! Protocol module - wire format, receive ring, and packet framing.
//!
//! This module implements the inbound half of the data path:
//! - growable circular buffer for raw inbound bytes
//! - packet id → length table
//! - framer slicing complete packets out of the ring
//! - packet, reader and writer types

mod framer;
mod packet;
mod packet_table;
mod ring_buffer;
mod wire_format;

pub use framer::PacketFramer;
pub use packet::{Packet, PacketReader, PacketWriter};
pub use packet_table::{PacketLength, PacketLengthTable, PacketLengths};
pub use ring_buffer::{RingBuffer, GROWTH_STEP};
pub use wire_format::{
    hex_dump, read_u16_be, write_length_field, CREDENTIAL_PACKET_IDS, DYNAMIC_HEADER_SIZE,
    EMPTY_ID_SENTINEL, ID_SIZE, LENGTH_OFFSET,
};
