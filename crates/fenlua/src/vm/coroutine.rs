//! Coroutine creation, resumption, and yielding (spec §5).
//!
//! A coroutine is a second [`LuaState`] sharing the parent's `GlobalState`.
//! `yield` is implemented the way the real interpreter's C API does it:
//! the yielding native call returns a control-flow `Err` that unwinds the
//! *Rust* call stack without anyone popping the *logical* Lua call stack
//! (`LuaState::call_stack`/`LuaState::stack`) on the way out. `resume`
//! re-enters `execute::run` flat from depth 0 — it doesn't need to know how
//! deep the suspension was, because the dispatch loop only ever looks at
//! whatever frame is currently on top. See DESIGN.md for the full writeup.

use crate::value::{ThreadRef, Value};
use crate::vm::call_info::MULTRET;
use crate::vm::error::{LuaError, LuaResult};
use crate::vm::state::{LuaState, ThreadStatus};

/// `coroutine.create(f)`: a new thread whose stack holds just `f`, not yet
/// started.
pub fn create(state: &LuaState, func: Value) -> ThreadRef {
    let thread = state.new_thread();
    thread.push(func).expect("fresh stack cannot overflow");
    ThreadRef::new(thread)
}

/// `coroutine.resume(co, ...)`. Never raises: failures are reported as
/// `(false, message)`, matching the Lua-visible contract. A propagated
/// `LuaError::Yield` here would mean *this* thread yielded while resuming
/// another one, which can only happen if the caller is itself running
/// inside a coroutine — that is handled one level up, in the `resume`
/// native function itself propagating the error outward so it reaches
/// *its own* enclosing `resume`.
pub fn resume(co: &ThreadRef, args: Vec<Value>) -> LuaResult<(bool, Vec<Value>)> {
    {
        let t = co.borrow();
        match t.status {
            ThreadStatus::Dead => {
                return Ok((false, vec![Value::String(t.intern("cannot resume dead coroutine"))]));
            }
            ThreadStatus::Running | ThreadStatus::Normal => {
                return Ok((
                    false,
                    vec![Value::String(t.intern("cannot resume non-suspended coroutine"))],
                ));
            }
            ThreadStatus::Suspended => {}
        }
    }

    let mut t = co.borrow_mut();
    t.status = ThreadStatus::Running;

    let outcome = if t.call_depth() == 0 {
        first_resume(&mut t, args)
    } else {
        continue_after_yield(&mut t, args)
    };

    match outcome {
        Ok(values) => {
            t.status = ThreadStatus::Dead;
            Ok((true, values))
        }
        Err(LuaError::Yield(values)) => {
            t.status = ThreadStatus::Suspended;
            Ok((true, values))
        }
        Err(e) => {
            t.status = ThreadStatus::Dead;
            Ok((false, vec![error_value(&t, e)]))
        }
    }
}

fn first_resume(t: &mut LuaState, args: Vec<Value>) -> LuaResult<Vec<Value>> {
    let func = t.stack_get(0);
    t.truncate_stack(0);
    t.call(func, args)
}

/// Splice `args` in as the return values of the call that yielded, then
/// keep running. `func_idx`/`nresults` are exactly what `call_native` would
/// have used to finish this call normally, stashed the moment it saw the
/// yield instead of being re-derived from the (unrelated) caller frame
/// (spec §5; register layout mirrors a normal CALL return).
fn continue_after_yield(t: &mut LuaState, args: Vec<Value>) -> LuaResult<Vec<Value>> {
    let func_idx = t.pending_yield_func_idx();
    let nresults = t.take_pending_yield_nresults();

    if nresults == MULTRET {
        t.truncate_stack(func_idx);
        for v in args {
            t.push(v)?;
        }
    } else {
        let want = nresults as usize;
        t.truncate_stack(func_idx);
        for i in 0..want {
            t.push(args.get(i).cloned().unwrap_or(Value::Nil))?;
        }
    }

    crate::vm::execute::run(t, 0)?;
    let top = t.stack_len();
    let results = t.stack_slice(0, top);
    t.truncate_stack(0);
    Ok(results)
}

fn error_value(state: &LuaState, e: LuaError) -> Value {
    match e {
        LuaError::Runtime(v) | LuaError::Handler(v) => v,
        other => Value::String(state.intern(&other.display_message())),
    }
}

/// `coroutine.yield(...)`: callable only from inside a native function
/// running on a non-main thread (checked by the stdlib binding, which also
/// knows which thread it's running on — this just packages the values).
pub fn do_yield(args: Vec<Value>) -> LuaError {
    LuaError::Yield(args)
}

/// `coroutine.status(co)`. `state` is whichever thread is making the call,
/// so a `Running` coroutine reports "running" only when it's asking about
/// itself, and "normal" when some other (necessarily suspended-in-resume)
/// thread is asking about the one that resumed it.
pub fn status(state: &LuaState, co: &ThreadRef) -> &'static str {
    let t = co.borrow();
    let is_self = std::ptr::eq(state, &*t);
    match t.status {
        ThreadStatus::Dead => "dead",
        ThreadStatus::Suspended => "suspended",
        ThreadStatus::Running => {
            if is_self {
                "running"
            } else {
                "normal"
            }
        }
        ThreadStatus::Normal => "normal",
    }
}
