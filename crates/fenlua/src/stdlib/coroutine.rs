//! `coroutine.create/resume/yield/status/wrap` (spec §3.N), thin native
//! bindings over the already-implemented [`crate::vm::coroutine`] primitives.

use std::rc::Rc;

use crate::lib_module;
use crate::stdlib::lib_registry::{arg, LibraryModule};
use crate::value::closure::NativeClosureData;
use crate::value::{Function, UpvalueRef, Value};
use crate::vm::coroutine;
use crate::vm::error::LuaResult;
use crate::vm::state::LuaState;

pub fn create_coroutine_lib() -> LibraryModule {
    lib_module!("coroutine", {
        "create" => lua_create,
        "resume" => lua_resume,
        "yield" => lua_yield,
        "status" => lua_status,
        "wrap" => lua_wrap,
    })
}

fn lua_create(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let func = arg(&args, 1);
    if !func.is_function() {
        return Err(state.error("bad argument #1 to 'create' (function expected)"));
    }
    let co = coroutine::create(state, func);
    state.push(Value::Thread(co))?;
    Ok(1)
}

fn lua_resume(state: &mut LuaState) -> LuaResult<usize> {
    let mut args = state.native_args();
    if args.is_empty() {
        return Err(state.error("bad argument #1 to 'resume' (coroutine expected)"));
    }
    let co = args.remove(0);
    let co = co
        .as_thread()
        .ok_or_else(|| state.error("bad argument #1 to 'resume' (coroutine expected)"))?
        .clone();
    let (ok, results) = coroutine::resume(&co, args)?;
    state.push(Value::Boolean(ok))?;
    for r in &results {
        state.push(r.clone())?;
    }
    Ok(1 + results.len())
}

/// Only callable from inside a running coroutine — the main thread has
/// nothing to suspend back into (spec §5).
fn lua_yield(state: &mut LuaState) -> LuaResult<usize> {
    if state.is_main() {
        return Err(state.error("attempt to yield from outside a coroutine"));
    }
    Err(coroutine::do_yield(state.native_args()))
}

fn lua_status(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let co = arg(&args, 1);
    let co = co
        .as_thread()
        .ok_or_else(|| state.error("bad argument #1 to 'status' (coroutine expected)"))?;
    let status = coroutine::status(state, co);
    state.push(Value::String(state.intern(status)))?;
    Ok(1)
}

/// `coroutine.wrap(f)`: like `create` + `resume`, but returns a function
/// that raises the error instead of reporting `(false, err)`, and forgets
/// the `true`/`false` status on success. The returned native closure
/// remembers its coroutine the same way a Lua closure remembers an upvalue
/// — a single closed [`UpvalueRef`] holding the `Value::Thread`, since
/// `CFunction` is a bare `fn` pointer with no capture of its own.
fn lua_wrap(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let func = arg(&args, 1);
    if !func.is_function() {
        return Err(state.error("bad argument #1 to 'wrap' (function expected)"));
    }
    let co = coroutine::create(state, func);
    let upvalue = UpvalueRef::new_closed(Value::Thread(co));
    let wrapped = Function::Native(Rc::new(NativeClosureData {
        func: wrap_call,
        name: "wrapped coroutine",
        upvalues: vec![upvalue],
    }));
    state.push(Value::Function(wrapped))?;
    Ok(1)
}

fn wrap_call(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let co = match &state.current_frame().expect("native frame active").func {
        Value::Function(Function::Native(data)) => data.upvalues[0].get(),
        _ => unreachable!("wrap_call always runs as the native closure it was built for"),
    };
    let co = co.as_thread().expect("wrap's upvalue is always a thread").clone();
    let (ok, results) = coroutine::resume(&co, args)?;
    if !ok {
        let err = results.into_iter().next().unwrap_or(Value::Nil);
        return Err(state.error(crate::vm::tostring::raw_tostring(&err)));
    }
    for r in &results {
        state.push(r.clone())?;
    }
    Ok(results.len())
}
