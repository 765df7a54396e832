// SPDX-License-Identifier: GPL-3.0-or-later

//! Native call table (spec.md §4.3): fixed numeric dispatch from `invoke`
//! to host-provided operations. Every native follows the same scoped
//! calling convention — push_fp, reserve `k` locals, read arguments at
//! frame-relative offsets, optionally post a return value, pull_fp — which
//! is enforced here by a single RAII guard (spec.md §9 "Scoped native
//! calling convention") rather than left to each native to get right.

use crate::error::VmError;
use crate::platform::Platform;
use crate::types::{array_header_len, TypeCode, Width};
use crate::vm::Vm;

const PRINT_INT: i64 = 1;
const PRINTLN_INT: i64 = 2;
const CLOCK: i64 = 3;
const PRINT_CHAR: i64 = 4;
const PRINTLN_CHAR: i64 = 5;
const PRINT_FLOAT: i64 = 6;
const PRINTLN_FLOAT: i64 = 7;
const PRINT_STR: i64 = 8;
const PRINTLN_STR: i64 = 9;
const MALLOC: i64 = 10;
const FREE: i64 = 11;
const HEAP_ARRAY: i64 = 12;

/// Guards one native invocation's stack frame: constructing it performs
/// `push_fp` plus reserving `locals` words, and dropping it performs
/// `pull_fp`, symmetrically on every exit path (including `?`-propagated
/// errors raised while it's alive).
struct NativeFrame<'a> {
    vm: &'a mut Vm,
}

impl<'a> NativeFrame<'a> {
    fn enter(vm: &'a mut Vm, locals: usize) -> Result<Self, VmError> {
        vm.frames.push_call(vm.fp)?;
        vm.fp = vm.sp;
        let w = vm.mem.w() as i64;
        let candidate = vm.fp as i64 + locals as i64 * w;
        if candidate < 0 || candidate as usize >= vm.mem.stack_end {
            return Err(VmError::StackOverflow);
        }
        vm.sp = candidate as usize;
        Ok(Self { vm })
    }

    fn arg_addr(&self, index: usize) -> usize {
        self.vm.fp + index * self.vm.mem.w()
    }
}

impl Drop for NativeFrame<'_> {
    fn drop(&mut self) {
        self.vm.sp = self.vm.fp;
        self.vm.fp = self
            .vm
            .frames
            .pop_call()
            .expect("native frame's pull_fp did not match its push_fp");
    }
}

fn print_text(platform: &mut dyn Platform, text: &str) {
    let units: Vec<u16> = text.encode_utf16().collect();
    platform.print_str(&units);
}

fn println_text(platform: &mut dyn Platform, text: &str) {
    let units: Vec<u16> = text.encode_utf16().collect();
    platform.println_str(&units);
}

impl Vm {
    /// Dispatches native id `id`. Fails with `NativeInvoke` for any id not
    /// in the §4.3 table.
    pub(crate) fn invoke_native(&mut self, id: i64, platform: &mut dyn Platform) -> Result<(), VmError> {
        match id {
            PRINT_INT | PRINTLN_INT => {
                let frame = NativeFrame::enter(self, 1)?;
                let val = frame.vm.mem.read_int(frame.arg_addr(0));
                if id == PRINT_INT {
                    print_text(platform, &val.to_string());
                } else {
                    println_text(platform, &val.to_string());
                }
                Ok(())
            }
            CLOCK => {
                let frame = NativeFrame::enter(self, 0)?;
                let val = platform.clock();
                let ret_addr = frame.vm.frames.pop_ret()?;
                frame.vm.mem.write_int(ret_addr, val);
                Ok(())
            }
            PRINT_CHAR | PRINTLN_CHAR => {
                let frame = NativeFrame::enter(self, 1)?;
                let ch = frame.vm.mem.read_char(frame.arg_addr(0));
                let text = String::from_utf16_lossy(&[ch]);
                if id == PRINT_CHAR {
                    print_text(platform, &text);
                } else {
                    println_text(platform, &text);
                }
                Ok(())
            }
            PRINT_FLOAT | PRINTLN_FLOAT => {
                let frame = NativeFrame::enter(self, 1)?;
                let val = frame.vm.mem.read_float(frame.arg_addr(0));
                if id == PRINT_FLOAT {
                    print_text(platform, &val.to_string());
                } else {
                    println_text(platform, &val.to_string());
                }
                Ok(())
            }
            PRINT_STR | PRINTLN_STR => {
                let frame = NativeFrame::enter(self, 1)?;
                let ptr = frame.vm.mem.read_int(frame.arg_addr(0));
                if ptr == 0 {
                    return Err(VmError::NullPointer);
                }
                let chars = frame.vm.read_char_array(ptr as usize);
                if id == PRINT_STR {
                    platform.print_str(&chars);
                } else {
                    platform.println_str(&chars);
                }
                Ok(())
            }
            MALLOC => {
                let frame = NativeFrame::enter(self, 1)?;
                let len = frame.vm.mem.read_int(frame.arg_addr(0));
                if len < 0 {
                    return Err(VmError::NativeInvoke);
                }
                let addr = frame.vm.allocate(len as usize)?;
                let ret_addr = frame.vm.frames.pop_ret()?;
                frame.vm.mem.write_addr(ret_addr, addr);
                Ok(())
            }
            FREE => {
                let _frame = NativeFrame::enter(self, 1)?;
                Ok(())
            }
            HEAP_ARRAY => {
                let frame = NativeFrame::enter(self, 2)?;
                let atom_size = frame.vm.mem.read_int(frame.arg_addr(0));
                let dim_ptr = frame.vm.mem.read_int(frame.arg_addr(1));
                if atom_size <= 0 || dim_ptr == 0 {
                    return Err(VmError::NativeInvoke);
                }
                let dims = frame.vm.read_int_array(dim_ptr as usize);
                let addr = frame.vm.heap_array(atom_size as usize, &dims)?;
                let ret_addr = frame.vm.frames.pop_ret()?;
                frame.vm.mem.write_addr(ret_addr, addr);
                Ok(())
            }
            _ => Err(VmError::NativeInvoke),
        }
    }

    /// Reads a heap-resident ARRAY-of-char into UTF-16 code units.
    fn read_char_array(&self, ptr: usize) -> Vec<u16> {
        let header = array_header_len(self.mem.width());
        let count = self.mem.read_uint(ptr) as usize;
        (0..count).map(|i| self.mem.read_char(ptr + header + i * 2)).collect()
    }

    /// Reads a heap-resident ARRAY-of-int into signed words.
    fn read_int_array(&self, ptr: usize) -> Vec<i64> {
        let w = self.mem.w();
        let header = array_header_len(self.mem.width());
        let count = self.mem.read_uint(ptr) as usize;
        (0..count).map(|i| self.mem.read_int(ptr + header + i * w)).collect()
    }

    /// Native id 12, `heap_array`: allocates nested arrays for dimensions
    /// `dims`, with `-1` marking a deferred dimension (spec.md §4.3), as a
    /// single contiguous block sized for the whole structure up front —
    /// the same discipline `Vm::main_args` uses — so the collector never
    /// observes a partially-built tree.
    fn heap_array(&mut self, atom_size: usize, dims: &[i64]) -> Result<usize, VmError> {
        if dims.is_empty() || dims[0] == -1 {
            return Err(VmError::NativeInvoke);
        }
        let total = self.array_level_total(dims, 0, atom_size)?;
        let addr = self.allocate(total)?;
        self.write_array_level(addr, dims, 0, atom_size)?;
        Ok(addr)
    }

    /// Computes the byte size of the subtree rooted at `dims[depth]`,
    /// without allocating, so the whole nested structure can be sized
    /// before a single `allocate` call.
    fn array_level_total(&self, dims: &[i64], depth: usize, atom_size: usize) -> Result<usize, VmError> {
        let width = self.mem.width();
        let w = width.bytes();
        let header = array_header_len(width);
        let d = dims[depth];
        if d < 0 {
            return Err(VmError::NativeInvoke);
        }
        let n = d as usize;
        let is_last = depth + 1 == dims.len();
        let deferred_next = !is_last && dims[depth + 1] == -1;

        if is_last || deferred_next {
            let elem_size = if is_last { atom_size } else { w };
            Ok(header + width.align_up(n * elem_size))
        } else {
            let child_total = self.array_level_total(dims, depth + 1, atom_size)?;
            Ok(header + width.align_up(n * w) + n * child_total)
        }
    }

    /// Writes the subtree rooted at `dims[depth]` at the already-allocated
    /// `addr`, placing every child level immediately after its siblings
    /// within the same block (mirrors `Vm::main_args`'s cursor layout).
    fn write_array_level(&mut self, addr: usize, dims: &[i64], depth: usize, atom_size: usize) -> Result<(), VmError> {
        let width = self.mem.width();
        let w = width.bytes();
        let header = array_header_len(width);
        let n = dims[depth] as usize;
        let is_last = depth + 1 == dims.len();
        let deferred_next = !is_last && dims[depth + 1] == -1;

        if is_last || deferred_next {
            let elem_type = if is_last { leaf_type_code(atom_size) } else { TypeCode::Array };
            self.mem.write_uint(addr, n as u64);
            self.mem.write_uint(addr + w, elem_type as u64);
        } else {
            self.mem.write_uint(addr, n as u64);
            self.mem.write_uint(addr + w, TypeCode::Array as u64);
            let child_total = self.array_level_total(dims, depth + 1, atom_size)?;
            let mut cursor = addr + header + width.align_up(n * w);
            for i in 0..n {
                self.mem.write_addr(addr + header + i * w, cursor);
                self.write_array_level(cursor, dims, depth + 1, atom_size)?;
                cursor += child_total;
            }
        }
        Ok(())
    }
}

fn leaf_type_code(atom_size: usize) -> TypeCode {
    match atom_size {
        1 => TypeCode::Byte,
        2 => TypeCode::Char,
        _ => TypeCode::Int,
    }
}
