//! # Band Packets
//!
//! Every band is sent to the engine as a sequence of 4-byte packets. A packet
//! carries 24 payload bits (three bytes `a`, `b`, `c`) plus a run flag, spread
//! six bits at a time over four transmitted bytes.
//!
//! ## Packet Kinds
//!
//! | Kind | Flag | Decodes to |
//! |------|------|------------|
//! | Literal | 0 | `a b c` |
//! | Run | 1 | `b` repeated `a + 1` times, then `c` |
//!
//! A run packet therefore covers between 2 and 257 bitmap bytes.
//!
//! ## Wire Layout
//!
//! ```text
//!          bit 7   bit 6     bits 5..0
//! byte 1 │  0    │ run     │ a[5:0]                  │
//! byte 2 │  1    │ P       │ b[3:0]  a[7:6]          │
//! byte 3 │  0    │ !P      │ c[1:0]  b[7:4]          │
//! byte 4 │  1    │ P       │ c[7:2]                  │
//! ```
//!
//! Bit 7 alternates so the receiver can find packet boundaries. `P` is the
//! parity of the low six bits of its own byte (set when the count of ones is
//! odd, giving even parity over seven bits); byte 3 carries the inverse. The
//! engine checks every byte, so parity is always recomputed from the payload.

use crate::error::LbpError;

/// Longest repetition a single run packet can express
pub const MAX_RUN: u16 = 256;

/// Size of one encoded packet in bytes
pub const PACKET_BYTES: usize = 4;

/// `Run(256, 0x00, 0x00)`: 257 white bytes
pub const WHITE_PACKET: [u8; 4] = [0x7f, 0x83, 0x40, 0x80];

/// How many [`WHITE_PACKET`]s make up a white band
pub const WHITE_PACKET_REPEAT: usize = 242;

/// Closing bytes of a white band (first three bytes of `Run(206, 0x00, _)`)
pub const WHITE_TAIL: [u8; 3] = [0x4d, 0x83, 0x40];

/// A decoded band packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    /// Three bitmap bytes sent as they are
    Literal { a: u8, b: u8, c: u8 },
    /// `count` copies of `value` followed by one `trailer` byte
    Run { count: u16, value: u8, trailer: u8 },
}

/// Parity of the low six bits of `byte` (1 when the number of ones is odd)
#[inline]
pub fn parity6(byte: u8) -> u8 {
    ((byte & 0x3f).count_ones() & 1) as u8
}

impl Packet {
    #[inline]
    pub fn literal(a: u8, b: u8, c: u8) -> Self {
        Self::Literal { a, b, c }
    }

    /// Build a run packet.
    ///
    /// `count` must be in `1..=256`.
    #[inline]
    pub fn run(count: u16, value: u8, trailer: u8) -> Self {
        debug_assert!(
            (1..=MAX_RUN).contains(&count),
            "run count {} out of range",
            count
        );
        Self::Run {
            count,
            value,
            trailer,
        }
    }

    /// Number of bitmap bytes this packet stands for
    #[inline]
    pub fn decoded_len(&self) -> usize {
        match self {
            Self::Literal { .. } => 3,
            Self::Run { count, .. } => *count as usize + 1,
        }
    }

    /// Append the bitmap bytes this packet stands for.
    pub fn expand_into(&self, out: &mut Vec<u8>) {
        match *self {
            Self::Literal { a, b, c } => out.extend_from_slice(&[a, b, c]),
            Self::Run {
                count,
                value,
                trailer,
            } => {
                out.extend(std::iter::repeat_n(value, count as usize));
                out.push(trailer);
            }
        }
    }

    /// Serialize to the four wire bytes.
    pub fn encode(&self) -> [u8; 4] {
        let (rle, a, b, c) = match *self {
            Self::Literal { a, b, c } => (0u8, a, b, c),
            Self::Run {
                count,
                value,
                trailer,
            } => (1u8, (count - 1) as u8, value, trailer),
        };

        let b1 = (a & 0x3f) | (rle << 6);

        let mut b2 = ((a >> 6) & 0x03) | ((b & 0x0f) << 2);
        b2 |= 0x80 | (parity6(b2) << 6);

        let mut b3 = ((b >> 4) & 0x0f) | ((c & 0x03) << 4);
        b3 |= (parity6(b3) ^ 1) << 6;

        let mut b4 = (c >> 2) & 0x3f;
        b4 |= 0x80 | (parity6(b4) << 6);

        [b1, b2, b3, b4]
    }

    /// Parse four wire bytes, checking position tags and parity.
    pub fn decode(bytes: [u8; 4]) -> Result<Self, LbpError> {
        let [b1, b2, b3, b4] = bytes;

        let tags = [b1 & 0x80, b2 & 0x80, b3 & 0x80, b4 & 0x80];
        if tags != [0, 0x80, 0, 0x80] {
            return Err(LbpError::Store(format!("Bad packet tags in {:02X?}", bytes)));
        }

        let parity_ok = (b2 >> 6) & 1 == parity6(b2)
            && (b3 >> 6) & 1 == parity6(b3) ^ 1
            && (b4 >> 6) & 1 == parity6(b4);
        if !parity_ok {
            return Err(LbpError::Store(format!("Parity error in {:02X?}", bytes)));
        }

        let a = (b1 & 0x3f) | ((b2 & 0x03) << 6);
        let b = ((b2 >> 2) & 0x0f) | ((b3 & 0x0f) << 4);
        let c = ((b3 >> 4) & 0x03) | ((b4 & 0x3f) << 2);

        if b1 & 0x40 != 0 {
            Ok(Self::run(a as u16 + 1, b, c))
        } else {
            Ok(Self::literal(a, b, c))
        }
    }
}

/// Decode a record payload back into packets.
pub fn decode_packets(payload: &[u8]) -> Result<Vec<Packet>, LbpError> {
    if payload.len() % PACKET_BYTES != 0 {
        return Err(LbpError::Store(format!(
            "Payload of {} bytes is not a whole number of packets",
            payload.len()
        )));
    }
    payload
        .chunks_exact(PACKET_BYTES)
        .map(|chunk| Packet::decode([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Decode a record payload all the way back to bitmap bytes.
pub fn decode_payload(payload: &[u8]) -> Result<Vec<u8>, LbpError> {
    let mut out = Vec::with_capacity(payload.len());
    for packet in decode_packets(payload)? {
        packet.expand_into(&mut out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parity6() {
        assert_eq!(parity6(0x00), 0);
        assert_eq!(parity6(0x01), 1);
        assert_eq!(parity6(0x03), 0);
        assert_eq!(parity6(0x3f), 0);
        // bits 6 and 7 are not part of the payload
        assert_eq!(parity6(0xc0), 0);
        assert_eq!(parity6(0x7f), 0);
    }

    #[test]
    fn test_white_packet_is_max_run_of_zero() {
        assert_eq!(Packet::run(256, 0, 0).encode(), WHITE_PACKET);
        assert_eq!(
            Packet::decode(WHITE_PACKET).unwrap(),
            Packet::run(256, 0, 0)
        );
    }

    #[test]
    fn test_white_tail_prefix() {
        let encoded = Packet::run(206, 0, 0).encode();
        assert_eq!(&encoded[..3], &WHITE_TAIL);
    }

    #[test]
    fn test_literal_layout() {
        // a=0xFF b=0x00 c=0x00
        assert_eq!(Packet::literal(0xff, 0, 0).encode(), [0x3f, 0x83, 0x40, 0x80]);
        // c lands in bytes 3 and 4
        assert_eq!(Packet::literal(0, 0, 0xff).encode(), [0x00, 0x80, 0x70, 0xbf]);
    }

    #[test]
    fn test_parity_bits_match_payload() {
        for value in 0..=255u8 {
            for packet in [
                Packet::literal(value, value.wrapping_mul(7), !value),
                Packet::run(value as u16 + 1, value, value ^ 0x5a),
            ] {
                let [b1, b2, b3, b4] = packet.encode();
                assert_eq!(b1 & 0x80, 0);
                assert_eq!((b2 >> 6) & 1, parity6(b2), "byte 2 of {:?}", packet);
                assert_eq!((b3 >> 6) & 1, parity6(b3) ^ 1, "byte 3 of {:?}", packet);
                assert_eq!((b4 >> 6) & 1, parity6(b4), "byte 4 of {:?}", packet);
            }
        }
    }

    #[test]
    fn test_decode_rejects_flipped_bit() {
        let mut bytes = Packet::literal(0x12, 0x34, 0x56).encode();
        bytes[3] ^= 0x01;
        assert!(Packet::decode(bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_tags() {
        let mut bytes = Packet::literal(1, 2, 3).encode();
        bytes.rotate_left(1);
        assert!(Packet::decode(bytes).is_err());
    }

    #[test]
    fn test_run_expands() {
        let mut out = Vec::new();
        Packet::run(3, 0xAA, 0x01).expand_into(&mut out);
        assert_eq!(out, vec![0xAA, 0xAA, 0xAA, 0x01]);
        assert_eq!(Packet::run(3, 0xAA, 0x01).decoded_len(), 4);
    }

    #[test]
    fn test_decode_payload() {
        let mut payload = Vec::new();
        payload.extend(Packet::literal(1, 2, 3).encode());
        payload.extend(Packet::run(2, 9, 8).encode());
        assert_eq!(decode_payload(&payload).unwrap(), vec![1, 2, 3, 9, 9, 8]);
    }

    #[test]
    fn test_decode_payload_partial_packet() {
        assert!(decode_payload(&[0x00, 0x80, 0x40]).is_err());
    }
}
