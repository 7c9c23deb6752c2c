//! Wire format constants and helpers.
//!
//! Every packet starts with a one-byte id. Fixed-length packets carry no
//! other header; dynamic-length packets follow the id with a big-endian
//! u16 holding the total packet length (id and length field included):
//!
//! ```text
//! fixed:    ┌────┬──────────────────┐
//!           │ id │ payload          │
//!           └────┴──────────────────┘
//! dynamic:  ┌────┬──────────┬───────┐
//!           │ id │ len u16BE│payload│
//!           └────┴──────────┴───────┘
//! ```

use std::fmt::Write;

/// Size of the id byte.
pub const ID_SIZE: usize = 1;

/// Header size of a dynamic packet: id + u16 length.
pub const DYNAMIC_HEADER_SIZE: usize = 3;

/// Byte offset of the u16 length field in a dynamic packet.
pub const LENGTH_OFFSET: usize = 1;

/// Returned by [`RingBuffer::peek_byte`](super::RingBuffer::peek_byte) when empty.
pub const EMPTY_ID_SENTINEL: u8 = 0xFF;

/// Packet ids carrying account credentials; their bodies are never dumped.
pub const CREDENTIAL_PACKET_IDS: [u8; 2] = [0x80, 0x91];

/// Read a big-endian u16 from two bytes.
#[inline]
pub fn read_u16_be(hi: u8, lo: u8) -> u16 {
    u16::from_be_bytes([hi, lo])
}

/// Patch the length field of a dynamic packet in place.
///
/// Does nothing when `packet` is shorter than a dynamic header.
#[inline]
pub fn write_length_field(packet: &mut [u8], length: u16) {
    if packet.len() >= DYNAMIC_HEADER_SIZE {
        packet[LENGTH_OFFSET..DYNAMIC_HEADER_SIZE].copy_from_slice(&length.to_be_bytes());
    }
}

/// Render a packet as a 16-bytes-per-row hex dump with an ASCII column.
///
/// ```text
/// Server -> Client   -   ID 0x73   Length: 2
///         0  1  2  3  4  5  6  7   8  9  A  B  C  D  E  F
///        -- -- -- -- -- -- -- --  -- -- -- -- -- -- -- --
/// 0000   73 01                                             s.
/// ```
///
/// Packets listed in [`CREDENTIAL_PACKET_IDS`] only get the header line.
pub fn hex_dump(data: &[u8], outbound: bool) -> String {
    let direction = if outbound {
        "Client -> Server"
    } else {
        "Server -> Client"
    };
    let id = data.first().copied().unwrap_or(EMPTY_ID_SENTINEL);

    let mut out = String::with_capacity(128 + data.len() * 4);
    let _ = writeln!(
        out,
        "{}   -   ID 0x{:02X}   Length: {}",
        direction,
        id,
        data.len()
    );
    if CREDENTIAL_PACKET_IDS.contains(&id) {
        out.push_str("[ACCOUNT CREDENTIALS HIDDEN]\n");
        return out;
    }
    out.push_str("        0  1  2  3  4  5  6  7   8  9  A  B  C  D  E  F\n");
    out.push_str("       -- -- -- -- -- -- -- --  -- -- -- -- -- -- -- --\n");

    for (row, chunk) in data.chunks(16).enumerate() {
        let mut bytes = String::with_capacity(49);
        let mut chars = String::with_capacity(16);

        for col in 0..16 {
            match chunk.get(col) {
                Some(&b) => {
                    let _ = write!(bytes, "{:02X}", b);
                    chars.push(if (0x20..0x80).contains(&b) {
                        b as char
                    } else {
                        '.'
                    });
                }
                None => bytes.push_str("  "),
            }
            bytes.push_str(if col == 7 { "  " } else { " " });
        }

        let _ = writeln!(out, "{:04X}   {} {}", row * 16, bytes, chars);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u16_be() {
        assert_eq!(read_u16_be(0x00, 0x07), 7);
        assert_eq!(read_u16_be(0x12, 0x34), 0x1234);
    }

    #[test]
    fn test_write_length_field() {
        let mut packet = [0xA8, 0, 0, 1, 2];
        write_length_field(&mut packet, 5);
        assert_eq!(packet, [0xA8, 0x00, 0x05, 1, 2]);
    }

    #[test]
    fn test_write_length_field_short_packet_untouched() {
        let mut packet = [0xA8, 0];
        write_length_field(&mut packet, 5);
        assert_eq!(packet, [0xA8, 0]);
    }

    #[test]
    fn test_hex_dump_layout() {
        let dump = hex_dump(b"\x73Hello", false);
        let lines: Vec<&str> = dump.lines().collect();

        assert!(lines[0].starts_with("Server -> Client"));
        assert!(lines[0].contains("ID 0x73"));
        assert!(lines[0].contains("Length: 6"));
        assert!(lines[3].starts_with("0000   73 48 65 6C 6C 6F"));
        assert!(lines[3].ends_with("sHello"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_hex_dump_multiple_rows() {
        let data: Vec<u8> = (0u8..20).collect();
        let dump = hex_dump(&data, true);

        assert!(dump.starts_with("Client -> Server"));
        assert!(dump.contains("0010   10 11 12 13"));
        assert_eq!(dump.lines().count(), 5);
    }

    #[test]
    fn test_hex_dump_hides_credentials() {
        let dump = hex_dump(&[0x80, b'u', b's', b'e', b'r'], true);
        assert!(dump.contains("[ACCOUNT CREDENTIALS HIDDEN]"));
        assert!(!dump.contains("75 73"));
        assert_eq!(dump.lines().count(), 2);
    }
}
