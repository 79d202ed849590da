//! Fixed-width integer fields
//!
//! Protocol messages carry integers of 1 to 4 bytes. Everything is
//! little-endian except the chip ID reply, which is big-endian.

/// Byte order of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

/// Largest supported field width in bytes
pub const MAX_WIDTH: usize = 4;

/// Write `value` into `out`, using `out.len()` as the field width
///
/// Bits of `value` beyond the field width are dropped.
pub fn encode_into(out: &mut [u8], value: u32, endian: Endian) {
    debug_assert!(out.len() <= MAX_WIDTH, "field wider than 4 bytes");
    let width = out.len();
    for (i, byte) in out.iter_mut().enumerate() {
        let shift = match endian {
            Endian::Little => i,
            Endian::Big => width - 1 - i,
        } * 8;
        *byte = (value >> shift) as u8;
    }
}

/// Encode `value` as a `width`-byte field
pub fn encode(value: u32, width: usize, endian: Endian) -> Vec<u8> {
    let mut out = vec![0u8; width];
    encode_into(&mut out, value, endian);
    out
}

/// Decode a field, using `bytes.len()` as the field width
pub fn decode(bytes: &[u8], endian: Endian) -> u32 {
    debug_assert!(bytes.len() <= MAX_WIDTH, "field wider than 4 bytes");
    let width = bytes.len();
    bytes.iter().enumerate().fold(0u32, |acc, (i, &byte)| {
        let shift = match endian {
            Endian::Little => i,
            Endian::Big => width - 1 - i,
        } * 8;
        acc | (byte as u32) << shift
    })
}
