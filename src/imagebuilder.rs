//! Test fixture tooling: assembles raw TPC image bytes instruction by
//! instruction. Synthesizing bytecode by hand is not the bytecode
//! producer spec.md excludes as a non-goal (that exclusion names a
//! source-language compiler) — it's fixture machinery, the same kind of
//! thing the teacher's own tests build by emitting encoded instructions
//! directly rather than running a real compiler.

use crate::codec;
use crate::types::Width;

/// Appends a `width`-wide word to `buf`, independent of any builder
/// instance so it can be called while a builder field is already borrowed.
pub fn push_word(buf: &mut Vec<u8>, width: Width, value: i64) {
    let mut word = vec![0u8; width.bytes()];
    codec::write_int(&mut word, width, value);
    buf.extend_from_slice(&word);
}

/// Accumulates the five payload segments plus a declared stack
/// reservation, then assembles them into a loadable TPC image.
pub struct ImageBuilder {
    pub width: Width,
    pub stack_len: usize,
    pub global: Vec<u8>,
    pub literal: Vec<u8>,
    pub class_header: Vec<u8>,
    pub functions: Vec<u8>,
    pub entry: Vec<u8>,
}

impl ImageBuilder {
    #[must_use]
    pub fn new(width: Width) -> Self {
        Self {
            width,
            stack_len: 256,
            global: Vec::new(),
            literal: Vec::new(),
            class_header: Vec::new(),
            functions: Vec::new(),
            entry: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_stack_len(mut self, n: usize) -> Self {
        self.stack_len = n;
        self
    }

    /// The absolute address a literal word at `literal[offset]` will have
    /// once loaded (segments are laid out stack, global, literal, ...).
    #[must_use]
    pub fn literal_addr(&self, offset: usize) -> usize {
        self.stack_len + self.global.len() + offset
    }

    /// The absolute address a class-header byte at `offset` will have once
    /// loaded.
    #[must_use]
    pub fn class_header_addr(&self, offset: usize) -> usize {
        self.stack_len + self.global.len() + self.literal.len() + offset
    }

    /// The absolute address a functions-segment byte at `offset` will have
    /// once loaded.
    #[must_use]
    pub fn function_addr(&self, offset: usize) -> usize {
        self.stack_len + self.global.len() + self.literal.len() + self.class_header.len() + offset
    }

    /// Assembles the full image byte vector (spec.md §6 file format).
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let w = self.width.bytes();
        let mut out = Vec::new();
        out.extend_from_slice(b"TPC_");
        out.push(self.width.bits());
        out.extend(std::iter::repeat(0u8).take(11));

        let mut word = |v: u64| -> Vec<u8> {
            let mut b = vec![0u8; w];
            codec::write_uint(&mut b, self.width, v);
            b
        };
        out.extend(word(self.stack_len as u64));
        out.extend(word(self.global.len() as u64));
        out.extend(word(self.literal.len() as u64));
        out.extend(word(self.class_header.len() as u64));

        out.extend_from_slice(&self.global);
        out.extend_from_slice(&self.literal);
        out.extend_from_slice(&self.class_header);
        out.extend_from_slice(&self.functions);
        out.extend_from_slice(&self.entry);

        out.extend(word(self.entry.len() as u64));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::image;

    #[test]
    fn builds_a_loadable_empty_image() {
        let mut b = ImageBuilder::new(Width::W64);
        b.entry.push(crate::opcode::EXIT);
        let bytes = b.build();
        let config = VmConfig::new(Width::W64);
        let mem = image::load(&bytes, config).unwrap();
        assert_eq!(mem.read_byte(mem.functions_end), crate::opcode::EXIT);
    }
}
