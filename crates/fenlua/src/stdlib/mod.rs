//! Standard library registration (spec §3.N), installed into a fresh
//! [`LuaState`] by [`open_libs`] — the teacher's `create_standard_registry`
//! plus `load_all`, reduced to the modules this spec scopes in.

pub mod basic;
pub mod coroutine;
pub mod debug;
pub mod io;
pub mod lib_registry;
pub mod math;
pub mod os;
pub mod string;
pub mod table;

use crate::vm::state::LuaState;
use lib_registry::LibraryRegistry;

/// Registers every standard library module against `state`'s globals.
/// Panics only if a module initializer fails, which none of the built-in
/// modules' initializers do — they have none.
pub fn open_libs(state: &mut LuaState) {
    let mut registry = LibraryRegistry::new();
    registry.register(basic::create_basic_lib());
    registry.register(string::create_string_lib());
    registry.register(table::create_table_lib());
    registry.register(math::create_math_lib());
    registry.register(io::create_io_lib());
    registry.register(os::create_os_lib());
    registry.register(coroutine::create_coroutine_lib());
    registry.register(debug::create_debug_lib());
    registry
        .load_all(state)
        .expect("standard library registration cannot fail");
}
