//! Calling convention: `__call` resolution, frame setup/teardown, and the
//! protected-call entry points used by `pcall`/`xpcall` (spec §4.5 CALL,
//! §7 protected calls).

use std::rc::Rc;

use crate::value::{Function, Value};
use crate::vm::call_info::{CallInfo, MULTRET};
use crate::vm::error::{LuaError, LuaResult};
use crate::vm::state::LuaState;

/// How many `__call` hops we'll chase before giving up — mirrors the
/// defensive bound Lua itself doesn't need (tables can't point `__call` at
/// themselves without going through a function), but a malicious or buggy
/// metatable chain could otherwise spin forever.
const MAX_CALL_CHAIN: usize = 100;

pub(crate) fn resolve_callable(
    state: &LuaState,
    mut func: Value,
    mut args: Vec<Value>,
) -> LuaResult<(Function, Vec<Value>)> {
    for _ in 0..MAX_CALL_CHAIN {
        if let Value::Function(f) = func {
            return Ok((f, args));
        }
        let mt = state.metatable_of(&func);
        let mm = mt.and_then(|m| {
            let key = Value::String(state.intern("__call"));
            let v = m.borrow().raw_get(&key);
            if v.is_nil() {
                None
            } else {
                Some(v)
            }
        });
        match mm {
            Some(mm_func) => {
                args.insert(0, func);
                func = mm_func;
            }
            None => {
                return Err(state.error(format!("attempt to call a {} value", func.type_name())));
            }
        }
    }
    Err(state.error("'__call' chain too long; possible loop"))
}

/// Call any callable value (a function, or something with `__call`),
/// driving it to completion and returning its results.
pub fn call_value(
    state: &mut LuaState,
    func: Value,
    args: Vec<Value>,
    nresults: i32,
) -> LuaResult<Vec<Value>> {
    let (callee, args) = resolve_callable(state, func, args)?;
    match callee {
        Function::Native(_) => call_native(state, callee, args, nresults),
        Function::Lua(_) => call_lua(state, callee, args, nresults),
    }
}

fn call_native(
    state: &mut LuaState,
    func: Function,
    args: Vec<Value>,
    nresults: i32,
) -> LuaResult<Vec<Value>> {
    let native = match &func {
        Function::Native(data) => Rc::clone(data),
        Function::Lua(_) => unreachable!(),
    };

    let func_idx = state.stack_len();
    state.push(Value::Function(func.clone()))?;
    let base = state.stack_len();
    for a in args {
        state.push(a)?;
    }
    let ci = CallInfo::new_native(Value::Function(func), base, nresults);
    state.push_frame(ci)?;

    let result = (native.func)(state);
    state.pop_frame();

    match result {
        Ok(n) => {
            let top = state.stack_len();
            let start = top.saturating_sub(n);
            let results = state.stack_slice(start, top);
            state.truncate_stack(func_idx);
            Ok(results)
        }
        Err(LuaError::Yield(vals)) => {
            // Leave the stack and any outer frames exactly as they are:
            // `resume` splices the eventual resume arguments in at
            // `func_idx` as if this call had returned them (see
            // `vm::coroutine::resume`).
            state.set_pending_yield_nresults(nresults);
            state.set_pending_yield_func_idx(func_idx);
            Err(LuaError::Yield(vals))
        }
        Err(e) => {
            state.truncate_stack(func_idx);
            Err(e)
        }
    }
}

fn call_lua(
    state: &mut LuaState,
    func: Function,
    args: Vec<Value>,
    nresults: i32,
) -> LuaResult<Vec<Value>> {
    let data = match &func {
        Function::Lua(data) => Rc::clone(data),
        Function::Native(_) => unreachable!(),
    };
    let proto = Rc::clone(&data.proto);

    let func_idx = state.stack_len();
    state.push(Value::Function(func.clone()))?;
    let base = state.stack_len();

    let nparams = proto.num_params as usize;
    let mut fixed = args;
    let varargs: Vec<Value> = if proto.is_vararg && fixed.len() > nparams {
        fixed.split_off(nparams)
    } else {
        Vec::new()
    };
    if fixed.len() < nparams {
        fixed.resize(nparams, Value::Nil);
    } else if fixed.len() > nparams && !proto.is_vararg {
        fixed.truncate(nparams);
    }
    for a in fixed {
        state.push(a)?;
    }

    let frame_top = base + proto.max_stack_size as usize;
    state.ensure_stack_len(frame_top)?;

    let depth_before = state.call_depth();
    let mut ci = CallInfo::new_lua(Value::Function(func), base, nresults);
    ci.varargs = Rc::from(varargs);
    ci.top = frame_top;
    state.push_frame(ci)?;

    match crate::vm::execute::run(state, depth_before) {
        Ok(()) => {
            let top = state.stack_len();
            let results = state.stack_slice(func_idx, top);
            state.truncate_stack(func_idx);
            Ok(results)
        }
        Err(LuaError::Yield(vals)) => Err(LuaError::Yield(vals)),
        Err(e) => {
            state.close_upvalues(base);
            state.truncate_frames_to(depth_before);
            state.truncate_stack(func_idx);
            Err(e)
        }
    }
}

fn error_to_value(state: &LuaState, e: LuaError) -> Value {
    match e {
        LuaError::Runtime(v) | LuaError::Handler(v) => v,
        other => Value::String(state.intern(&other.display_message())),
    }
}

/// `pcall(func, ...)`: never propagates a runtime error, reports it as
/// `(false, err)` instead (spec §7). A yield from within, though, is not an
/// error to catch — it must keep unwinding through the Rust call stack
/// untouched so `resume` can find the suspended frames later (DESIGN.md).
pub fn protected_call(
    state: &mut LuaState,
    func: Value,
    args: Vec<Value>,
) -> LuaResult<(bool, Vec<Value>)> {
    let depth_before = state.call_depth();
    let stack_before = state.stack_len();
    match call_value(state, func, args, MULTRET) {
        Ok(results) => Ok((true, results)),
        Err(LuaError::Yield(vals)) => Err(LuaError::Yield(vals)),
        Err(e) => {
            state.truncate_frames_to(depth_before);
            state.truncate_stack(stack_before);
            Ok((false, vec![error_to_value(state, e)]))
        }
    }
}

/// `xpcall(func, handler, ...)`: same as `pcall`, but the error value is
/// passed through `handler` before being reported. The call stack is
/// unwound before the handler runs (spec §7 Open Question: traceback
/// detail is therefore limited to what the error itself carries — see
/// DESIGN.md).
pub fn protected_call_with_handler(
    state: &mut LuaState,
    func: Value,
    args: Vec<Value>,
    handler: Value,
) -> LuaResult<(bool, Vec<Value>)> {
    let depth_before = state.call_depth();
    let stack_before = state.stack_len();
    match call_value(state, func, args, MULTRET) {
        Ok(results) => Ok((true, results)),
        Err(LuaError::Yield(vals)) => Err(LuaError::Yield(vals)),
        Err(e) => {
            state.truncate_frames_to(depth_before);
            state.truncate_stack(stack_before);
            let err_val = error_to_value(state, e);
            match call_value(state, handler, vec![err_val.clone()], MULTRET) {
                Ok(results) => Ok((false, results)),
                Err(_) => Err(LuaError::Handler(err_val)),
            }
        }
    }
}
