//! A representative subset of the io library (spec §3.N): `write`.

use std::io::Write;

use crate::lib_module;
use crate::stdlib::lib_registry::LibraryModule;
use crate::value::Value;
use crate::vm::error::LuaResult;
use crate::vm::state::LuaState;

pub fn create_io_lib() -> LibraryModule {
    lib_module!("io", {
        "write" => lua_write,
    })
}

fn lua_write(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let mut stdout = std::io::stdout();
    for a in &args {
        match a {
            Value::String(_) | Value::Number(_) => {
                let _ = write!(stdout, "{}", crate::vm::tostring::raw_tostring(a));
            }
            _ => return Err(state.error(format!("bad argument to 'write' (string expected, got {})", a.type_name()))),
        }
    }
    let _ = stdout.flush();
    Ok(0)
}
