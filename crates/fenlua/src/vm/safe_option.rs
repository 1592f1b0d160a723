//! Runtime safety limits, checked independently of any single opcode or
//! native call so a misbehaving script fails with a catchable Lua error
//! instead of exhausting the host process.

#[derive(Debug, Clone)]
pub struct SafeOption {
    pub max_stack_size: usize,
    pub max_call_depth: usize,
    pub max_memory_limit: usize,
}

impl Default for SafeOption {
    fn default() -> Self {
        SafeOption {
            max_stack_size: 1_000_000,
            max_call_depth: crate::vm::call_stack::MAX_CALL_DEPTH,
            max_memory_limit: usize::MAX,
        }
    }
}
