//! The register-based virtual machine: call frames, the opcode dispatch
//! loop, metamethod dispatch, coroutines, and the error/state types that
//! tie them together (spec §3, §4, §5, §7).

pub mod call;
pub mod call_info;
pub mod call_stack;
pub mod coroutine;
pub mod error;
pub mod execute;
pub mod metamethod;
pub mod opcode;
pub mod prototype;
pub mod safe_option;
pub mod stack;
pub mod state;
pub mod tostring;

pub use call_info::{CallInfo, MULTRET};
pub use error::{LuaError, LuaResult};
pub use opcode::{Instruction, OpCode};
pub use prototype::Prototype;
pub use safe_option::SafeOption;
pub use state::{GlobalState, LuaState, ThreadStatus};
