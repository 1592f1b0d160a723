// A Lua 5.1-compatible compiler and register-based virtual machine

pub mod compiler;
pub mod gc;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod stdlib;
#[cfg(test)]
mod test;
pub mod value;
pub mod vm;

pub use value::Value;
pub use vm::{LuaError, LuaResult, LuaState};

/// Run a chunk of source in a fresh state with the standard library
/// installed, returning whatever it returns.
pub fn execute(source: &str) -> LuaResult<Vec<Value>> {
    let mut state = LuaState::new();
    stdlib::open_libs(&mut state);
    state.execute_string(source)
}
