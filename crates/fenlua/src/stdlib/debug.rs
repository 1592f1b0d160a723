//! A representative subset of the debug library (spec §3.N):
//! `traceback/getinfo`.

use crate::lib_module;
use crate::stdlib::lib_registry::{arg, LibraryModule};
use crate::value::{Function, TableRef, Value};
use crate::vm::error::LuaResult;
use crate::vm::state::LuaState;

pub fn create_debug_lib() -> LibraryModule {
    lib_module!("debug", {
        "traceback" => lua_traceback,
        "getinfo" => lua_getinfo,
    })
}

fn lua_traceback(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let message = match arg(&args, 1) {
        Value::Nil => String::new(),
        v => format!("{}\n", crate::vm::tostring::raw_tostring(&v)),
    };
    let trace = format!("{}stack traceback:\n{}", message, state.traceback());
    state.push(Value::String(state.intern(&trace)))?;
    Ok(1)
}

/// Returns a table with `source`, `currentline`, `what`, and `name` for the
/// function at argument 1 (a function value, or a stack level as the
/// teacher's stubbed equivalent also accepts). `nil` for anything else —
/// local/upvalue introspection (`getlocal`/`getupvalue`) is out of scope.
fn lua_getinfo(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let target = arg(&args, 1);
    let func = match &target {
        Value::Function(_) => Some(target.clone()),
        Value::Number(n) => {
            let level = *n as usize;
            let depth = state.call_depth();
            depth.checked_sub(1 + level).and_then(|idx| state.frame(idx)).map(|ci| ci.func.clone())
        }
        _ => None,
    };
    let Some(Value::Function(f)) = func else {
        state.push(Value::Nil)?;
        return Ok(1);
    };
    let info = TableRef::new();
    match &f {
        Function::Lua(data) => {
            info.borrow_mut().raw_set(
                Value::String(state.intern("source")),
                Value::String(state.intern(&data.proto.source_name)),
            );
            info.borrow_mut().raw_set(
                Value::String(state.intern("what")),
                Value::String(state.intern("Lua")),
            );
            info.borrow_mut().raw_set(
                Value::String(state.intern("currentline")),
                Value::Number(data.proto.line_for(0) as f64),
            );
        }
        Function::Native(data) => {
            info.borrow_mut().raw_set(
                Value::String(state.intern("source")),
                Value::String(state.intern("=[C]")),
            );
            info.borrow_mut().raw_set(
                Value::String(state.intern("what")),
                Value::String(state.intern("C")),
            );
            info.borrow_mut().raw_set(
                Value::String(state.intern("name")),
                Value::String(state.intern(data.name)),
            );
        }
    }
    state.push(Value::Table(info))?;
    Ok(1)
}
