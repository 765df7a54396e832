//! Error codes (spec.md §7). A plain enum mirroring the teacher's
//! `vm::RuntimeError` convention: no `thiserror`, just a match-friendly
//! enum with a hand-written [`core::fmt::Display`].

use std::fmt;

/// Numeric error codes as defined by the error-handling design. Code 0
/// ("no error") is represented by the absence of a `VmError`, not a variant.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmError {
    NativeInvoke = 2,
    VmOpt = 3,
    HeapCollision = 4,
    Instruction = 5,
    MemoryOut = 6,
    StackOverflow = 7,
    Segment = 8,
    NullPointer = 9,
    /// Divide or modulo by zero. Not numbered in the original error table
    /// (spec.md §4.2 names it "ARITHMETIC (see §7)" but §7's table has no
    /// such entry); assigned the next free code rather than overloading
    /// an existing kind (see DESIGN.md Open Questions).
    Arithmetic = 10,
}

impl VmError {
    /// The numeric code written to the exit-code slot on halt.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VmError::NativeInvoke => "native invoke error: unknown native id or bad argument",
            VmError::VmOpt => "vm option error: image rejected by loader",
            VmError::HeapCollision => "heap collision: allocator bookkeeping inconsistency",
            VmError::Instruction => "unexpected instruction",
            VmError::MemoryOut => "out of memory",
            VmError::StackOverflow => "stack overflow",
            VmError::Segment => "segment violation",
            VmError::NullPointer => "null pointer dereference",
            VmError::Arithmetic => "divide or modulo by zero",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for VmError {}

/// Errors the image loader can raise before the dispatch loop ever starts.
/// Distinct from [`VmError`] because loading happens before a `Vm` exists;
/// [`LoadError::into_vm_error`] maps each variant onto the §7 error table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    BadSignature,
    BadWidth,
    MemoryOut,
}

impl LoadError {
    #[must_use]
    pub const fn into_vm_error(self) -> VmError {
        match self {
            LoadError::BadSignature | LoadError::BadWidth => VmError::VmOpt,
            LoadError::MemoryOut => VmError::MemoryOut,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LoadError::BadSignature => "image signature is not \"TPC_\"",
            LoadError::BadWidth => "image bit width does not match the configured runtime width",
            LoadError::MemoryOut => "image payload does not fit in the configured memory size",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for LoadError {}
