//! A representative subset of the math library (spec §3.N):
//! `floor/ceil/abs/sqrt/max/min/huge/pi`.

use crate::lib_module;
use crate::stdlib::lib_registry::{arg, LibraryModule};
use crate::value::Value;
use crate::vm::error::LuaResult;
use crate::vm::state::LuaState;

pub fn create_math_lib() -> LibraryModule {
    lib_module!("math", {
        "floor" => lua_floor,
        "ceil" => lua_ceil,
        "abs" => lua_abs,
        "sqrt" => lua_sqrt,
        "max" => lua_max,
        "min" => lua_min,
    })
    .with_value("huge", |_| Value::Number(f64::INFINITY))
    .with_value("pi", |_| Value::Number(std::f64::consts::PI))
}

fn check_number(state: &LuaState, v: &Value, func_name: &str) -> LuaResult<f64> {
    v.coerce_to_number()
        .ok_or_else(|| state.error(format!("bad argument #1 to '{}' (number expected, got {})", func_name, v.type_name())))
}

fn lua_floor(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let n = check_number(state, &arg(&args, 1), "floor")?;
    state.push(Value::Number(n.floor()))?;
    Ok(1)
}

fn lua_ceil(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let n = check_number(state, &arg(&args, 1), "ceil")?;
    state.push(Value::Number(n.ceil()))?;
    Ok(1)
}

fn lua_abs(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let n = check_number(state, &arg(&args, 1), "abs")?;
    state.push(Value::Number(n.abs()))?;
    Ok(1)
}

fn lua_sqrt(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let n = check_number(state, &arg(&args, 1), "sqrt")?;
    state.push(Value::Number(n.sqrt()))?;
    Ok(1)
}

fn lua_max(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    if args.is_empty() {
        return Err(state.error("bad argument #1 to 'max' (value expected)"));
    }
    let mut best = check_number(state, &args[0], "max")?;
    for (i, a) in args.iter().enumerate().skip(1) {
        let n = a
            .coerce_to_number()
            .ok_or_else(|| state.error(format!("bad argument #{} to 'max' (number expected)", i + 1)))?;
        if n > best {
            best = n;
        }
    }
    state.push(Value::Number(best))?;
    Ok(1)
}

fn lua_min(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    if args.is_empty() {
        return Err(state.error("bad argument #1 to 'min' (value expected)"));
    }
    let mut best = check_number(state, &args[0], "min")?;
    for (i, a) in args.iter().enumerate().skip(1) {
        let n = a
            .coerce_to_number()
            .ok_or_else(|| state.error(format!("bad argument #{} to 'min' (number expected)", i + 1)))?;
        if n < best {
            best = n;
        }
    }
    state.push(Value::Number(best))?;
    Ok(1)
}
