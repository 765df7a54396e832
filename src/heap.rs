//! Bump-pointer heap allocator (spec.md §4.4): `allocate(len)` aligns `len`
//! up to `W`, tries the bump pointer, and on exhaustion runs the garbage
//! collector once before failing.

use crate::error::VmError;
use crate::vm::Vm;

impl Vm {
    /// Allocates `len` bytes from the heap, zeroed. Aligns `len` up to `W`
    /// first. If the bump pointer would cross the memory bound, runs GC
    /// and retries exactly once before failing with `MemoryOut`.
    pub fn allocate(&mut self, len: usize) -> Result<usize, VmError> {
        let aligned = self.mem.width().align_up(len);

        if let Some(addr) = self.try_bump(aligned) {
            return Ok(addr);
        }

        self.collect();

        self.try_bump(aligned).ok_or(VmError::MemoryOut)
    }

    fn try_bump(&mut self, aligned_len: usize) -> Option<usize> {
        let addr = self.mem.heap_counter;
        let end = addr.checked_add(aligned_len)?;
        if end > self.mem.len() {
            return None;
        }
        self.mem.heap_counter = end;
        self.mem.zero(addr, aligned_len);
        Some(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::memory::Memory;
    use crate::types::Width;

    fn vm_with_heap(total: usize, heap_start: usize) -> Vm {
        let mut mem = Memory::new(total, Width::W64);
        mem.stack_end = heap_start;
        mem.global_end = heap_start;
        mem.literal_end = heap_start;
        mem.class_header_end = heap_start;
        mem.functions_end = heap_start;
        mem.entry_end = heap_start;
        mem.heap_start = heap_start;
        mem.heap_counter = heap_start;
        Vm::new(mem, VmConfig::new(Width::W64).with_memory_size(total), Vec::new())
    }

    #[test]
    fn allocate_advances_bump_pointer_and_zeroes() {
        let mut vm = vm_with_heap(256, 64);
        vm.mem.write_byte(64, 0xAB);
        let addr = vm.allocate(16).unwrap();
        assert_eq!(addr, 64);
        assert_eq!(vm.mem.heap_counter, 80);
        assert_eq!(vm.mem.read_byte(64), 0);
    }

    #[test]
    fn exact_remaining_bytes_succeeds_one_more_fails_after_gc() {
        let mut vm = vm_with_heap(128, 64);
        let remaining = vm.mem.len() - vm.mem.heap_start;
        assert!(vm.allocate(remaining).is_ok());
        let mut vm2 = vm_with_heap(128, 64);
        let remaining2 = vm2.mem.len() - vm2.mem.heap_start;
        assert_eq!(vm2.allocate(remaining2 + 8), Err(VmError::MemoryOut));
    }
}
