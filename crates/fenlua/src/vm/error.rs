//! Lua error values and classes (spec §7).

use crate::value::Value;

/// The four error classes of spec §7, each carrying the Lua value that
/// represents the error (usually a string, but `error()` accepts any
/// value — see scenario 3 in spec §8).
#[derive(Debug, Clone)]
pub enum LuaError {
    /// `errrun` (exit code 2): a runtime error raised by an opcode, a
    /// native function, or an explicit `error(v)` call.
    Runtime(Value),
    /// `errsyntax` (exit code 3): lexer/parser/compiler failure. No
    /// closure is produced.
    Syntax(String),
    /// `errmem` (exit code 4): allocator refusal.
    Memory,
    /// `errerr` (exit code 5): the error handler installed by `xpcall`
    /// itself raised an error while handling one.
    Handler(Value),
    /// Not a spec error class: the control-flow signal `coroutine.yield`
    /// uses to unwind through the Rust call stack without disturbing the
    /// logical Lua call stack, so `resume` can splice it back together
    /// later (spec §5, DESIGN.md). Never reaches a host driver; every
    /// frame on the path from a yielding native call back to `resume`
    /// must propagate this variant untouched instead of treating it as a
    /// failure to unwind.
    Yield(Vec<Value>),
}

pub type LuaResult<T> = Result<T, LuaError>;

impl LuaError {
    pub fn runtime(message: impl Into<String>) -> Self {
        LuaError::Runtime(Value::String(crate::value::StringRef::new_uninterned(
            message.into(),
        )))
    }

    /// Exit code a host driver should use for this error class (spec §6).
    pub fn exit_code(&self) -> i32 {
        match self {
            LuaError::Runtime(_) => 2,
            LuaError::Syntax(_) => 3,
            LuaError::Memory => 4,
            LuaError::Handler(_) => 5,
            LuaError::Yield(_) => 0,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            LuaError::Runtime(v) | LuaError::Handler(v) => Some(v),
            LuaError::Syntax(_) | LuaError::Memory | LuaError::Yield(_) => None,
        }
    }

    pub fn display_message(&self) -> String {
        match self {
            LuaError::Runtime(v) | LuaError::Handler(v) => crate::vm::tostring::raw_tostring(v),
            LuaError::Syntax(s) => s.clone(),
            LuaError::Memory => "not enough memory".to_string(),
            LuaError::Yield(_) => "attempt to yield from outside a coroutine".to_string(),
        }
    }
}

impl std::fmt::Display for LuaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_message())
    }
}

impl std::error::Error for LuaError {}
