//! Call-frame discipline: the three parallel frame stacks (`call_stack`,
//! `pc_stack`, `ret_stack`) and the push/pop protocol behind
//! `push_fp`/`pull_fp`/`call`/`ret`/`set_ret`/`put_ret` (spec.md §4.2).

use crate::error::VmError;

/// The three frame stacks, bounded by a configured recursion limit. Owned
/// by [`crate::vm::Vm`] rather than process-wide statics (spec.md §9).
#[derive(Clone, Debug)]
pub struct FrameStacks {
    /// Saved frame pointers, one per active `push_fp`.
    call_stack: Vec<usize>,
    /// Saved program counters, one per active `call`.
    pc_stack: Vec<usize>,
    /// True addresses of pending return slots, one per active `set_ret`.
    ret_stack: Vec<usize>,
    limit: usize,
}

impl FrameStacks {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            call_stack: Vec::with_capacity(limit.min(64)),
            pc_stack: Vec::with_capacity(limit.min(64)),
            ret_stack: Vec::with_capacity(limit.min(64)),
            limit,
        }
    }

    /// Whether at least one frame is active, i.e. whether `fp` currently
    /// denotes a live frame base (spec.md §4.2 "true_addr").
    #[must_use]
    pub fn frame_active(&self) -> bool {
        !self.call_stack.is_empty()
    }

    pub fn push_call(&mut self, fp: usize) -> Result<(), VmError> {
        if self.call_stack.len() >= self.limit {
            return Err(VmError::StackOverflow);
        }
        self.call_stack.push(fp);
        Ok(())
    }

    pub fn pop_call(&mut self) -> Result<usize, VmError> {
        self.call_stack.pop().ok_or(VmError::StackOverflow)
    }

    pub fn push_pc(&mut self, pc: usize) -> Result<(), VmError> {
        if self.pc_stack.len() >= self.limit {
            return Err(VmError::StackOverflow);
        }
        self.pc_stack.push(pc);
        Ok(())
    }

    pub fn pop_pc(&mut self) -> Result<usize, VmError> {
        self.pc_stack.pop().ok_or(VmError::StackOverflow)
    }

    pub fn push_ret(&mut self, addr: usize) -> Result<(), VmError> {
        if self.ret_stack.len() >= self.limit {
            return Err(VmError::StackOverflow);
        }
        self.ret_stack.push(addr);
        Ok(())
    }

    pub fn pop_ret(&mut self) -> Result<usize, VmError> {
        self.ret_stack.pop().ok_or(VmError::StackOverflow)
    }

    /// Number of currently active call frames, i.e. pending `push_fp`es.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_call_roundtrips() {
        let mut f = FrameStacks::new(4);
        assert!(!f.frame_active());
        f.push_call(10).unwrap();
        assert!(f.frame_active());
        assert_eq!(f.pop_call().unwrap(), 10);
        assert!(!f.frame_active());
    }

    #[test]
    fn overflow_past_recursion_limit() {
        let mut f = FrameStacks::new(2);
        f.push_call(1).unwrap();
        f.push_call(2).unwrap();
        assert_eq!(f.push_call(3), Err(VmError::StackOverflow));
    }

    #[test]
    fn pop_on_empty_stack_is_stack_overflow() {
        let mut f = FrameStacks::new(4);
        assert_eq!(f.pop_pc(), Err(VmError::StackOverflow));
    }
}
