//! Runtime configuration, replacing the original's compile-time
//! `MEMORY_SIZE`/`RECURSION_LIMIT` `#define`s with constructor parameters
//! (spec.md §9: no process-wide globals).

use crate::types::Width;

/// Default total memory size (spec.md §3 example: 131 072 bytes).
pub const DEFAULT_MEMORY_SIZE: usize = 131_072;

/// Default maximum active-frame depth (spec.md §4.2).
pub const DEFAULT_RECURSION_LIMIT: usize = 1000;

/// Parameters fixed for the lifetime of a [`crate::vm::Vm`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Total size `N` of the linear memory array.
    pub memory_size: usize,
    /// Maximum depth of the call/pc/ret frame stacks.
    pub recursion_limit: usize,
    /// Word width this runtime is configured for; an image whose declared
    /// bit width differs is rejected.
    pub width: Width,
}

impl VmConfig {
    #[must_use]
    pub const fn new(width: Width) -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            width,
        }
    }

    #[must_use]
    pub const fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    #[must_use]
    pub const fn with_recursion_limit(mut self, recursion_limit: usize) -> Self {
        self.recursion_limit = recursion_limit;
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new(Width::W64)
    }
}
