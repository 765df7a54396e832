//! Image loader (spec.md §4.1, §6): parses the fixed header, validates
//! signature and bit width, lays out segments by prefix-sum, and copies
//! the payload into memory.

use tracing::debug;

use crate::codec;
use crate::config::VmConfig;
use crate::error::LoadError;
use crate::memory::Memory;
use crate::types::Width;

const SIGNATURE: &[u8; 4] = b"TPC_";
const HEADER_LEN: usize = 16;

/// Parses `bytes` as a TPC image and produces a fully laid-out [`Memory`].
///
/// # Errors
/// Returns [`LoadError::BadSignature`] if the file doesn't start with
/// `"TPC_"`, [`LoadError::BadWidth`] if the declared bit width doesn't
/// match `config.width`, or [`LoadError::MemoryOut`] if the payload does
/// not fit in `config.memory_size`.
pub fn load(bytes: &[u8], config: VmConfig) -> Result<Memory, LoadError> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != SIGNATURE {
        return Err(LoadError::BadSignature);
    }

    let declared_width = Width::from_bits(bytes[4]).ok_or(LoadError::BadWidth)?;
    if declared_width != config.width {
        return Err(LoadError::BadWidth);
    }
    let width = declared_width;
    let w = width.bytes();

    if bytes.len() < HEADER_LEN + 4 * w + w {
        return Err(LoadError::BadSignature);
    }

    let stack_len = codec::read_uint(&bytes[HEADER_LEN..], width) as usize;
    let global_len = codec::read_uint(&bytes[HEADER_LEN + w..], width) as usize;
    let literal_len = codec::read_uint(&bytes[HEADER_LEN + 2 * w..], width) as usize;
    let class_header_len = codec::read_uint(&bytes[HEADER_LEN + 3 * w..], width) as usize;
    let entry_len = codec::read_uint(&bytes[bytes.len() - w..], width) as usize;

    let stack_end = stack_len;
    let global_end = stack_end + global_len;
    let literal_end = global_end + literal_len;
    let class_header_end = literal_end + class_header_len;

    let header_overhead = HEADER_LEN + 4 * w + w;
    let payload_len = bytes
        .len()
        .checked_sub(header_overhead)
        .ok_or(LoadError::MemoryOut)?;

    let mut mem = Memory::new(config.memory_size, width);
    if global_end + payload_len > mem.len() {
        return Err(LoadError::MemoryOut);
    }

    let payload_start = HEADER_LEN + 4 * w;
    let payload_end = bytes.len() - w;
    mem.slice_mut(global_end, payload_len)
        .copy_from_slice(&bytes[payload_start..payload_end]);

    let entry_end = global_end + payload_len;
    let functions_end = entry_end - entry_len;

    mem.stack_end = stack_end;
    mem.global_end = global_end;
    mem.literal_end = literal_end;
    mem.class_header_end = class_header_end;
    mem.functions_end = functions_end;
    mem.entry_end = entry_end;
    mem.heap_start = width.align_up(entry_end);
    mem.heap_counter = mem.heap_start;

    debug!(
        stack_end,
        global_end,
        literal_end,
        class_header_end,
        functions_end,
        entry_end,
        heap_start = mem.heap_start,
        "loaded image"
    );

    Ok(mem)
}

/// Program counter the dispatch loop should start at after a successful
/// load: the first byte of the entry segment.
#[must_use]
pub fn entry_pc(mem: &Memory) -> usize {
    mem.functions_end
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal valid image: no globals/literals/class headers/
    /// functions, just an entry segment, with a given stack reservation.
    fn build_image(width: Width, stack_len: usize, entry: &[u8]) -> Vec<u8> {
        let w = width.bytes();
        let mut out = Vec::new();
        out.extend_from_slice(SIGNATURE);
        out.push(width.bits());
        out.extend(std::iter::repeat(0u8).take(11));

        let mut word = vec![0u8; w];
        codec::write_uint(&mut word, width, stack_len as u64);
        out.extend_from_slice(&word);
        codec::write_uint(&mut word, width, 0);
        out.extend_from_slice(&word); // global_len
        out.extend_from_slice(&word); // literal_len
        out.extend_from_slice(&word); // class_header_len

        out.extend_from_slice(entry);

        codec::write_uint(&mut word, width, entry.len() as u64);
        out.extend_from_slice(&word);
        out
    }

    #[test]
    fn rejects_bad_signature() {
        let mut img = build_image(Width::W64, 16, &[0u8; 8]);
        img[0] = b'X';
        let config = VmConfig::new(Width::W64);
        assert_eq!(load(&img, config), Err(LoadError::BadSignature));
    }

    #[test]
    fn rejects_width_mismatch() {
        let img = build_image(Width::W32, 16, &[0u8; 8]);
        let config = VmConfig::new(Width::W64);
        assert_eq!(load(&img, config), Err(LoadError::BadWidth));
    }

    #[test]
    fn computes_segments_and_pc() {
        let entry = vec![18u8]; // a single `exit` opcode
        let img = build_image(Width::W64, 16, &entry);
        let config = VmConfig::new(Width::W64);
        let mem = load(&img, config).unwrap();
        assert_eq!(mem.stack_end, 16);
        assert_eq!(mem.global_end, 16);
        assert_eq!(mem.functions_end, mem.entry_end - 1);
        assert_eq!(entry_pc(&mem), mem.functions_end);
        assert_eq!(mem.heap_start, Width::W64.align_up(mem.entry_end));
        assert_eq!(mem.heap_counter, mem.heap_start);
    }

    #[test]
    fn rejects_oversize_payload() {
        let entry = vec![0u8; 64];
        let img = build_image(Width::W64, 16, &entry);
        let config = VmConfig::new(Width::W64).with_memory_size(32);
        assert_eq!(load(&img, config), Err(LoadError::MemoryOut));
    }
}
