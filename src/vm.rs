// SPDX-License-Identifier: GPL-3.0-or-later

//! The `Vm` context (spec.md §9 "Global mutable state"): owns `Memory`,
//! the register file, frame stacks, and the program counter/stack/frame
//! pointers as one value instead of process-wide singletons. The dispatch
//! loop (spec.md §4.2) lives here; native dispatch lives in
//! [`crate::native`], allocation in [`crate::heap`], collection in
//! [`crate::gc`] — all as additional `impl Vm` blocks over the same type.

use tracing::warn;

use crate::config::VmConfig;
use crate::error::VmError;
use crate::frame::FrameStacks;
use crate::gc::GcPool;
use crate::memory::Memory;
use crate::opcode;
use crate::platform::Platform;
use crate::register::{Register, RegisterFile};

/// Owned VM state: memory, registers, frame stacks, and the three
/// addressing pointers (`pc`, `sp`, `fp`).
pub struct Vm {
    pub mem: Memory,
    pub regs: RegisterFile,
    pub frames: FrameStacks,
    pub pc: usize,
    pub sp: usize,
    pub fp: usize,
    pub config: VmConfig,
    pub error: Option<VmError>,
    /// Command-line arguments materialized by `main_args` (opcode 79).
    pub argv: Vec<String>,
    /// Bump-reset live-object table used by the collector, kept across
    /// cycles so its backing storage doesn't reallocate every run
    /// (spec.md §9 "Pool-allocated hash nodes").
    pub(crate) gc_pool: GcPool,
}

impl Vm {
    /// Builds a fresh `Vm` over an already-loaded [`Memory`], with `sp`/`fp`
    /// at their post-load initial values (spec.md §3: slot 0 and the `INT`
    /// slot at 1 are reserved for the exit-code pointer, so the stack
    /// proper starts at `1 + W`).
    #[must_use]
    pub fn new(mem: Memory, config: VmConfig, argv: Vec<String>) -> Self {
        let w = mem.w();
        let pc = mem.functions_end;
        Self {
            mem,
            regs: RegisterFile::new(),
            frames: FrameStacks::new(config.recursion_limit),
            pc,
            sp: 1 + w,
            fp: 1,
            config,
            error: None,
            argv,
            gc_pool: GcPool::default(),
        }
    }

    /// The exit code left in `M[1..1+W]`, written by `store_abs` (or by an
    /// error halt).
    #[must_use]
    pub fn exit_code(&self) -> i64 {
        self.mem.read_int(1)
    }

    /// Runs the dispatch loop to completion: either an `exit` opcode or an
    /// error condition. On error, writes the code into the exit-code slot
    /// and records it on `self.error`.
    pub fn run(&mut self, platform: &mut dyn Platform) {
        loop {
            match self.step(platform) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    self.error = Some(e);
                    self.mem.write_int(1, e.code());
                    warn!(code = e.code(), %e, "dispatch loop halted on error");
                    break;
                }
            }
        }
    }

    pub(crate) fn width(&self) -> crate::types::Width {
        self.mem.width()
    }

    pub(crate) fn frame_active(&self) -> bool {
        self.frames.frame_active()
    }

    pub(crate) fn taddr(&self, p: i64) -> i64 {
        self.mem.true_addr(p, self.fp, self.frame_active())
    }

    pub(crate) fn taddr_sp(&self, p: i64) -> i64 {
        self.mem.true_addr_sp(p, self.sp)
    }

    pub(crate) fn check_addr(&self, addr: i64) -> Result<usize, VmError> {
        if addr == 0 {
            return Err(VmError::NullPointer);
        }
        if addr < 0 || addr as usize >= self.mem.len() {
            return Err(VmError::Segment);
        }
        Ok(addr as usize)
    }

    pub(crate) fn fetch_byte(&self, at: usize) -> Result<u8, VmError> {
        if at >= self.mem.len() {
            return Err(VmError::Segment);
        }
        Ok(self.mem.read_byte(at))
    }

    pub(crate) fn fetch_imm(&self, at: usize) -> Result<i64, VmError> {
        let w = self.width().bytes();
        if at + w > self.mem.len() {
            return Err(VmError::Segment);
        }
        Ok(self.mem.read_int(at))
    }

    pub(crate) fn reg_int(&self, index: u8) -> i64 {
        self.regs.get(index).int(self.width())
    }

    pub(crate) fn set_reg_int(&mut self, index: u8, value: i64) {
        let width = self.width();
        let mut r = Register::zero();
        r.set_int(width, value);
        self.regs.set(index, r);
    }

    pub(crate) fn reg_float(&self, index: u8) -> f64 {
        self.regs.get(index).float(self.width())
    }

    pub(crate) fn set_reg_float(&mut self, index: u8, value: f64) {
        let width = self.width();
        let mut r = Register::zero();
        r.set_float(width, value);
        self.regs.set(index, r);
    }

    /// Executes one instruction. Returns `Ok(true)` if `exit` was reached.
    fn step(&mut self, platform: &mut dyn Platform) -> Result<bool, VmError> {
        let w = self.width().bytes();
        let pc = self.pc;
        let op = self.fetch_byte(pc)?;

        match op {
            opcode::NOP | opcode::SLEEP => {
                self.pc = pc + 1;
            }
            opcode::LOAD => {
                let reg = self.fetch_byte(pc + 1)?;
                let imm = self.fetch_imm(pc + 2)?;
                let addr = self.check_addr(self.taddr(imm))?;
                let val = self.mem.read_int(addr);
                self.set_reg_int(reg, val);
                self.pc = pc + 2 + w;
            }
            opcode::ILOAD => {
                let reg = self.fetch_byte(pc + 1)?;
                let imm = self.fetch_imm(pc + 2)?;
                self.set_reg_int(reg, imm);
                self.pc = pc + 2 + w;
            }
            opcode::ALOAD => {
                let reg = self.fetch_byte(pc + 1)?;
                let imm = self.fetch_imm(pc + 2)?;
                self.set_reg_int(reg, self.taddr(imm));
                self.pc = pc + 2 + w;
            }
            opcode::ALOAD_SP => {
                let reg = self.fetch_byte(pc + 1)?;
                let imm = self.fetch_imm(pc + 2)?;
                self.set_reg_int(reg, self.taddr_sp(imm));
                self.pc = pc + 2 + w;
            }
            opcode::STORE => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.taddr(self.reg_int(r1)))?;
                let bytes = self.regs.get(r2).bytes();
                self.mem.slice_mut(addr, w).copy_from_slice(&bytes[..w]);
                self.pc = pc + 3;
            }
            opcode::ASTORE => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.taddr(self.reg_int(r1)))?;
                let val = self.taddr(self.reg_int(r2));
                self.mem.write_int(addr, val);
                self.pc = pc + 3;
            }
            opcode::ASTORE_SP | opcode::STORE_ABS => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.reg_int(r1))?;
                let val = self.reg_int(r2);
                self.mem.write_int(addr, val);
                self.pc = pc + 3;
            }
            opcode::JUMP => {
                let imm = self.fetch_imm(pc + 1)?;
                self.pc = (pc as i64 + 1 + imm + w as i64) as usize;
            }
            opcode::PUSH => {
                let imm = self.fetch_imm(pc + 1)?;
                let candidate = self.sp as i64 + imm;
                if candidate < 0 || candidate as usize >= self.mem.stack_end {
                    return Err(VmError::StackOverflow);
                }
                self.sp = candidate as usize;
                self.pc = pc + 1 + w;
            }
            opcode::RET => {
                self.pc = self.frames.pop_pc()?;
            }
            opcode::PUSH_FP => {
                self.frames.push_call(self.fp)?;
                self.fp = self.sp;
                self.pc = pc + 1;
            }
            opcode::PULL_FP => {
                self.sp = self.fp;
                self.fp = self.frames.pop_call()?;
                self.pc = pc + 1;
            }
            opcode::SET_RET => {
                let reg = self.fetch_byte(pc + 1)?;
                let addr = self.check_addr(self.taddr(self.reg_int(reg)))?;
                self.frames.push_ret(addr)?;
                self.pc = pc + 2;
            }
            opcode::CALL => {
                let imm = self.fetch_imm(pc + 1)?;
                let ret_addr = pc + 1 + w;
                let addr1 = self.check_addr(self.taddr(imm))?;
                let func_val = self.mem.read_int(addr1);
                let new_pc = self.check_addr(self.taddr(func_val))?;
                self.frames.push_pc(ret_addr)?;
                self.pc = new_pc;
            }
            opcode::EXIT => {
                return Ok(true);
            }
            opcode::TRUE_ADDR => {
                let reg = self.fetch_byte(pc + 1)?;
                let val = self.taddr(self.reg_int(reg));
                self.set_reg_int(reg, val);
                self.pc = pc + 2;
            }
            opcode::PUT_RET => {
                let reg = self.fetch_byte(pc + 1)?;
                let addr = self.frames.pop_ret()?;
                let bytes = self.regs.get(reg).bytes();
                self.mem.slice_mut(addr, w).copy_from_slice(&bytes[..w]);
                self.pc = pc + 2;
            }
            opcode::COPY => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr1 = self.check_addr(self.reg_int(r1))?;
                let addr2 = self.check_addr(self.reg_int(r2))?;
                self.mem.move_bytes(addr1, addr2, w);
                self.pc = pc + 3;
            }
            opcode::IF_ZERO_JUMP => {
                let reg = self.fetch_byte(pc + 1)?;
                let imm = self.fetch_imm(pc + 2)?;
                let val = self.reg_int(reg);
                if val == 0 {
                    self.pc = (pc as i64 + 2 + imm + w as i64) as usize;
                } else {
                    self.pc = pc + 2 + w;
                }
            }
            opcode::INVOKE => {
                let imm = self.fetch_imm(pc + 1)?;
                let addr = self.check_addr(self.taddr(imm))?;
                let id = self.mem.read_int(addr);
                self.pc = pc + 1 + w;
                self.invoke_native(id, platform)?;
            }
            opcode::RLOAD_ABS => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.reg_int(r2))?;
                let val = self.mem.read_int(addr);
                self.set_reg_int(r1, val);
                self.pc = pc + 3;
            }
            opcode::RLOADC_ABS => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.reg_int(r2))?;
                let val = self.mem.read_char(addr);
                let mut r = Register::zero();
                r.set_char(val);
                self.regs.set(r1, r);
                self.pc = pc + 3;
            }
            opcode::RLOADB_ABS => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.reg_int(r2))?;
                let val = self.mem.read_byte(addr);
                let mut r = Register::zero();
                r.set_byte(val);
                self.regs.set(r1, r);
                self.pc = pc + 3;
            }
            opcode::ADDI | opcode::SUBI | opcode::MULI | opcode::DIVI | opcode::MODI => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let a = self.reg_int(r1);
                let b = self.reg_int(r2);
                let result = match op {
                    opcode::ADDI => a.wrapping_add(b),
                    opcode::SUBI => a.wrapping_sub(b),
                    opcode::MULI => a.wrapping_mul(b),
                    opcode::DIVI => {
                        if b == 0 {
                            return Err(VmError::Arithmetic);
                        }
                        a.wrapping_div(b)
                    }
                    opcode::MODI => {
                        if b == 0 {
                            return Err(VmError::Arithmetic);
                        }
                        a.wrapping_rem(b)
                    }
                    _ => unreachable!(),
                };
                self.set_reg_int(r1, result);
                self.pc = pc + 3;
            }
            opcode::EQI
            | opcode::NEI
            | opcode::GTI
            | opcode::LTI
            | opcode::GEI
            | opcode::LEI => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let a = self.reg_int(r1);
                let b = self.reg_int(r2);
                let result = match op {
                    opcode::EQI => a == b,
                    opcode::NEI => a != b,
                    opcode::GTI => a > b,
                    opcode::LTI => a < b,
                    opcode::GEI => a >= b,
                    opcode::LEI => a <= b,
                    _ => unreachable!(),
                };
                self.set_reg_int(r1, i64::from(result));
                self.pc = pc + 3;
            }
            opcode::NEGI => {
                let reg = self.fetch_byte(pc + 1)?;
                let val = self.reg_int(reg);
                self.set_reg_int(reg, val.wrapping_neg());
                self.pc = pc + 2;
            }
            opcode::NOT => {
                let reg = self.fetch_byte(pc + 1)?;
                let val = self.reg_int(reg);
                self.set_reg_int(reg, i64::from(val == 0));
                self.pc = pc + 2;
            }
            opcode::ADDF | opcode::SUBF | opcode::MULF | opcode::DIVF | opcode::MODF => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let a = self.reg_float(r1);
                let b = self.reg_float(r2);
                let result = match op {
                    opcode::ADDF => a + b,
                    opcode::SUBF => a - b,
                    opcode::MULF => a * b,
                    opcode::DIVF => {
                        if b == 0.0 {
                            return Err(VmError::Arithmetic);
                        }
                        a / b
                    }
                    opcode::MODF => {
                        if b == 0.0 {
                            return Err(VmError::Arithmetic);
                        }
                        repeated_subtraction_mod(a, b)
                    }
                    _ => unreachable!(),
                };
                self.set_reg_float(r1, result);
                self.pc = pc + 3;
            }
            opcode::EQF
            | opcode::NEF
            | opcode::GTF
            | opcode::LTF
            | opcode::GEF
            | opcode::LEF => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let a = self.reg_float(r1);
                let b = self.reg_float(r2);
                let result = match op {
                    opcode::EQF => a == b,
                    opcode::NEF => a != b,
                    opcode::GTF => a > b,
                    opcode::LTF => a < b,
                    opcode::GEF => a >= b,
                    opcode::LEF => a <= b,
                    _ => unreachable!(),
                };
                self.set_reg_int(r1, i64::from(result));
                self.pc = pc + 3;
            }
            opcode::NEGF => {
                let reg = self.fetch_byte(pc + 1)?;
                let val = self.reg_float(reg);
                self.set_reg_float(reg, -val);
                self.pc = pc + 2;
            }
            opcode::I_TO_F => {
                let reg = self.fetch_byte(pc + 1)?;
                let val = self.reg_int(reg) as f64;
                self.set_reg_float(reg, val);
                self.pc = pc + 2;
            }
            opcode::F_TO_I => {
                let reg = self.fetch_byte(pc + 1)?;
                let val = self.reg_float(reg).trunc() as i64;
                self.set_reg_int(reg, val);
                self.pc = pc + 2;
            }
            opcode::LOADC => {
                let reg = self.fetch_byte(pc + 1)?;
                let imm = self.fetch_imm(pc + 2)?;
                let addr = self.check_addr(self.taddr(imm))?;
                let val = self.mem.read_char(addr);
                let mut r = Register::zero();
                r.set_char(val);
                self.regs.set(reg, r);
                self.pc = pc + 2 + w;
            }
            opcode::STOREC => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.taddr(self.reg_int(r1)))?;
                let val = self.regs.get(r2).char();
                self.mem.write_char(addr, val);
                self.pc = pc + 3;
            }
            opcode::STOREC_ABS => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.reg_int(r1))?;
                let val = self.regs.get(r2).char();
                self.mem.write_char(addr, val);
                self.pc = pc + 3;
            }
            opcode::MAIN_ARGS => {
                self.main_args()?;
                self.pc = pc + 1;
            }
            opcode::LOADB => {
                let reg = self.fetch_byte(pc + 1)?;
                let imm = self.fetch_imm(pc + 2)?;
                let addr = self.check_addr(self.taddr(imm))?;
                let val = self.mem.read_byte(addr);
                let mut r = Register::zero();
                r.set_byte(val);
                self.regs.set(reg, r);
                self.pc = pc + 2 + w;
            }
            opcode::STOREB => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.taddr(self.reg_int(r1)))?;
                let val = self.regs.get(r2).byte();
                self.mem.write_byte(addr, val);
                self.pc = pc + 3;
            }
            opcode::STOREB_ABS => {
                let r1 = self.fetch_byte(pc + 1)?;
                let r2 = self.fetch_byte(pc + 2)?;
                let addr = self.check_addr(self.reg_int(r1))?;
                let val = self.regs.get(r2).byte();
                self.mem.write_byte(addr, val);
                self.pc = pc + 3;
            }
            _ => return Err(VmError::Instruction),
        }

        Ok(false)
    }

    /// Builds an array-of-array-of-char on the heap from `self.argv` and
    /// writes its pointer to the slot `main_args` targets (spec.md §6).
    /// Allocated as a single contiguous block so nothing is partially
    /// rooted mid-construction.
    fn main_args(&mut self) -> Result<(), VmError> {
        use crate::types::{array_header_len, TypeCode};

        let width = self.width();
        let w = width.bytes();
        let header_len = array_header_len(width);

        let inner_lens: Vec<usize> = self
            .argv
            .iter()
            .map(|s| header_len + width.align_up(s.chars().count() * 2))
            .collect();

        let outer_payload = width.align_up(self.argv.len() * w);
        let outer_total = header_len + outer_payload;
        let total: usize = outer_total + inner_lens.iter().sum::<usize>();

        let base = self.allocate(total)?;
        let outer_addr = base;
        self.mem.write_uint(outer_addr, self.argv.len() as u64);
        self.mem
            .write_uint(outer_addr + w, TypeCode::Array as u64);

        let mut cursor = outer_addr + outer_total;
        for (i, s) in self.argv.clone().iter().enumerate() {
            let inner_addr = cursor;
            self.mem.write_uint(inner_addr, s.chars().count() as u64);
            self.mem
                .write_uint(inner_addr + w, TypeCode::Char as u64);
            let mut off = inner_addr + header_len;
            for ch in s.chars() {
                self.mem.write_char(off, ch as u16);
                off += 2;
            }
            self.mem.write_addr(outer_addr + header_len + i * w, inner_addr);
            cursor += inner_lens[i];
        }

        let slot = self.check_addr(self.taddr_sp(0))?;
        self.mem.write_addr(slot, outer_addr);
        Ok(())
    }
}

/// `fmod` by repeated subtraction, matching spec.md §4.2's description of
/// `modf` rather than `f64::rem_euclid`/`%`.
fn repeated_subtraction_mod(a: f64, b: f64) -> f64 {
    let sign = if a < 0.0 { -1.0 } else { 1.0 };
    let mut mag = a.abs();
    let b = b.abs();
    while mag >= b {
        mag -= b;
    }
    sign * mag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::RecordingPlatform;
    use crate::types::Width;

    fn blank_vm(mem_size: usize) -> Vm {
        let mut mem = Memory::new(mem_size, Width::W64);
        mem.stack_end = 64;
        mem.global_end = 64;
        mem.literal_end = 64;
        mem.class_header_end = 64;
        mem.functions_end = 64;
        mem.entry_end = 64;
        mem.heap_start = 64;
        mem.heap_counter = 64;
        Vm::new(mem, VmConfig::new(Width::W64).with_memory_size(mem_size), Vec::new())
    }

    #[test]
    fn iload_then_store_abs_sets_exit_code() {
        let mut vm = blank_vm(256);
        let entry = vm.mem.functions_end;
        let mut pc = entry;
        vm.mem.write_byte(pc, opcode::ILOAD);
        vm.mem.write_byte(pc + 1, 0);
        vm.mem.write_int(pc + 2, 42);
        pc += 2 + 8;
        vm.mem.write_byte(pc, opcode::ILOAD);
        vm.mem.write_byte(pc + 1, 1);
        vm.mem.write_int(pc + 2, 1);
        pc += 2 + 8;
        vm.mem.write_byte(pc, opcode::STORE_ABS);
        vm.mem.write_byte(pc + 1, 1);
        vm.mem.write_byte(pc + 2, 0);
        pc += 3;
        vm.mem.write_byte(pc, opcode::EXIT);

        let mut platform = RecordingPlatform::default();
        vm.run(&mut platform);
        assert_eq!(vm.exit_code(), 42);
        assert!(vm.error.is_none());
    }

    #[test]
    fn divide_by_zero_sets_arithmetic_error() {
        let mut vm = blank_vm(256);
        let entry = vm.mem.functions_end;
        let mut pc = entry;
        vm.mem.write_byte(pc, opcode::ILOAD);
        vm.mem.write_byte(pc + 1, 0);
        vm.mem.write_int(pc + 2, 10);
        pc += 2 + 8;
        vm.mem.write_byte(pc, opcode::ILOAD);
        vm.mem.write_byte(pc + 1, 1);
        vm.mem.write_int(pc + 2, 0);
        pc += 2 + 8;
        vm.mem.write_byte(pc, opcode::DIVI);
        vm.mem.write_byte(pc + 1, 0);
        vm.mem.write_byte(pc + 2, 1);

        let mut platform = RecordingPlatform::default();
        vm.run(&mut platform);
        assert_eq!(vm.error, Some(VmError::Arithmetic));
        assert_eq!(vm.exit_code(), VmError::Arithmetic.code());
    }

    #[test]
    fn unknown_opcode_halts_with_instruction_error() {
        let mut vm = blank_vm(256);
        let entry = vm.mem.functions_end;
        vm.mem.write_byte(entry, 200);
        let mut platform = RecordingPlatform::default();
        vm.run(&mut platform);
        assert_eq!(vm.error, Some(VmError::Instruction));
    }
}
