//! Growable call stack (spec §3 "CallStack"). Mirrors Lua's trick of never
//! shrinking the backing `Vec`: frames below `depth` are reused slot-for-slot
//! across calls instead of being reallocated.

use crate::vm::call_info::CallInfo;
use crate::vm::error::{LuaError, LuaResult};

/// Matches Lua's `LUAI_MAXCCALLS`: bounds both Lua and native call nesting so
/// unbounded recursion raises a catchable error instead of overflowing the
/// host stack.
pub const MAX_CALL_DEPTH: usize = 200;

pub struct CallStack {
    frames: Vec<CallInfo>,
    depth: usize,
}

impl CallStack {
    pub fn new() -> Self {
        CallStack {
            frames: Vec::with_capacity(MAX_CALL_DEPTH.min(32)),
            depth: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn current(&self) -> Option<&CallInfo> {
        if self.depth > 0 {
            self.frames.get(self.depth - 1)
        } else {
            None
        }
    }

    pub fn current_mut(&mut self) -> Option<&mut CallInfo> {
        if self.depth > 0 {
            self.frames.get_mut(self.depth - 1)
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<&CallInfo> {
        if index < self.depth {
            self.frames.get(index)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CallInfo> {
        if index < self.depth {
            self.frames.get_mut(index)
        } else {
            None
        }
    }

    pub fn push(&mut self, frame: CallInfo) -> LuaResult<()> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(LuaError::runtime(format!(
                "stack overflow (call depth {})",
                self.depth
            )));
        }
        if self.depth < self.frames.len() {
            self.frames[self.depth] = frame;
        } else {
            self.frames.push(frame);
        }
        self.depth += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<CallInfo> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        self.frames.get(self.depth).cloned()
    }

    pub fn truncate_to(&mut self, depth: usize) {
        self.depth = depth.min(self.depth);
    }

    pub fn frames(&self) -> &[CallInfo] {
        &self.frames[..self.depth]
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}
