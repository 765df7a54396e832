//! Little-endian encode/decode of integers, floats, and characters.
//!
//! All multi-byte values on the wire and in [`crate::memory::Memory`] are
//! little-endian, regardless of host endianness.

use byteorder::{ByteOrder, LittleEndian};

use crate::types::Width;

/// Reads a signed, width-wide integer starting at `bytes[0]`.
///
/// # Panics
/// Panics if `bytes` is shorter than `width.bytes()`.
pub fn read_int(bytes: &[u8], width: Width) -> i64 {
    match width {
        Width::W32 => i64::from(LittleEndian::read_i32(bytes)),
        Width::W64 => LittleEndian::read_i64(bytes),
    }
}

/// Writes a signed integer, truncated to `width` bytes, at `bytes[0]`.
pub fn write_int(bytes: &mut [u8], width: Width, value: i64) {
    match width {
        Width::W32 => LittleEndian::write_i32(bytes, value as i32),
        Width::W64 => LittleEndian::write_i64(bytes, value),
    }
}

/// Reads an unsigned, width-wide address/raw value.
pub fn read_uint(bytes: &[u8], width: Width) -> u64 {
    match width {
        Width::W32 => u64::from(LittleEndian::read_u32(bytes)),
        Width::W64 => LittleEndian::read_u64(bytes),
    }
}

/// Writes an unsigned, width-wide address/raw value.
pub fn write_uint(bytes: &mut [u8], width: Width, value: u64) {
    match width {
        Width::W32 => LittleEndian::write_u32(bytes, value as u32),
        Width::W64 => LittleEndian::write_u64(bytes, value),
    }
}

/// Reads a width-wide float (`f32` for `W32`, `f64` for `W64`), widened to `f64`.
pub fn read_float(bytes: &[u8], width: Width) -> f64 {
    match width {
        Width::W32 => f64::from(LittleEndian::read_f32(bytes)),
        Width::W64 => LittleEndian::read_f64(bytes),
    }
}

/// Writes an `f64`, narrowed to the register width.
pub fn write_float(bytes: &mut [u8], width: Width, value: f64) {
    match width {
        Width::W32 => LittleEndian::write_f32(bytes, value as f32),
        Width::W64 => LittleEndian::write_f64(bytes, value),
    }
}

/// Reads a 2-byte character (always 2 bytes, independent of `Width`).
pub fn read_char(bytes: &[u8]) -> u16 {
    LittleEndian::read_u16(bytes)
}

/// Writes a 2-byte character.
pub fn write_char(bytes: &mut [u8], value: u16) {
    LittleEndian::write_u16(bytes, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn int_roundtrip_w64(v: i64) {
            let mut buf = [0u8; 8];
            write_int(&mut buf, Width::W64, v);
            prop_assert_eq!(read_int(&buf, Width::W64), v);
        }

        #[test]
        fn int_roundtrip_w32(v: i32) {
            let mut buf = [0u8; 4];
            write_int(&mut buf, Width::W32, i64::from(v));
            prop_assert_eq!(read_int(&buf, Width::W32) as i32, v);
        }

        #[test]
        fn char_roundtrip(v: u16) {
            let mut buf = [0u8; 2];
            write_char(&mut buf, v);
            prop_assert_eq!(read_char(&buf), v);
        }
    }
}
