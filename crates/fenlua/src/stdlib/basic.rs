//! The base library: `print`, `type`, `pcall`, and the rest of the globals
//! that live directly in `_G` rather than inside a named table (spec §3.N).

use crate::lib_module;
use crate::stdlib::lib_registry::{arg, LibraryModule};
use crate::value::{Function, TableRef, Value};
use crate::vm::error::{LuaError, LuaResult};
use crate::vm::state::LuaState;

pub fn create_basic_lib() -> LibraryModule {
    lib_module!("_G", {
        "print" => lua_print,
        "type" => lua_type,
        "tostring" => lua_tostring,
        "tonumber" => lua_tonumber,
        "assert" => lua_assert,
        "error" => lua_error,
        "pcall" => lua_pcall,
        "xpcall" => lua_xpcall,
        "select" => lua_select,
        "ipairs" => lua_ipairs,
        "pairs" => lua_pairs,
        "next" => lua_next,
        "rawget" => lua_rawget,
        "rawset" => lua_rawset,
        "rawequal" => lua_rawequal,
        "rawlen" => lua_rawlen,
        "setmetatable" => lua_setmetatable,
        "getmetatable" => lua_getmetatable,
        "unpack" => lua_unpack,
        "collectgarbage" => lua_collectgarbage,
    })
}

fn lua_print(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let mut out = String::new();
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push('\t');
        }
        out.push_str(&crate::vm::metamethod::tostring_mm(state, a)?);
    }
    println!("{}", out);
    Ok(0)
}

fn lua_type(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let name = arg(&args, 1).type_name();
    state.push(Value::String(state.intern(name)))?;
    Ok(1)
}

fn lua_tostring(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let s = crate::vm::metamethod::tostring_mm(state, &arg(&args, 1))?;
    state.push(Value::String(state.intern(&s)))?;
    Ok(1)
}

fn lua_tonumber(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let v = arg(&args, 1);
    match arg(&args, 2) {
        Value::Nil => {
            let n = v.coerce_to_number().map(Value::Number).unwrap_or(Value::Nil);
            state.push(n)?;
        }
        base_val => {
            let base = base_val
                .as_number()
                .filter(|b| (2.0..=36.0).contains(b))
                .ok_or_else(|| state.error("bad argument #2 to 'tonumber' (base out of range)"))? as u32;
            let s = v
                .as_str()
                .ok_or_else(|| state.error("bad argument #1 to 'tonumber' (string expected)"))?;
            let parsed = i64::from_str_radix(s.trim(), base).ok().map(|n| Value::Number(n as f64));
            state.push(parsed.unwrap_or(Value::Nil))?;
        }
    }
    Ok(1)
}

fn lua_assert(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    if arg(&args, 1).is_truthy() {
        for a in &args {
            state.push(a.clone())?;
        }
        return Ok(args.len());
    }
    let message = if args.len() >= 2 {
        args[1].clone()
    } else {
        Value::String(state.intern("assertion failed!"))
    };
    Err(raise_error(state, message, 1))
}

fn lua_error(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let value = arg(&args, 1);
    let level = match arg(&args, 2) {
        Value::Number(n) => n.max(0.0) as usize,
        _ => 1,
    };
    Err(raise_error(state, value, level))
}

/// Shared by `assert`/`error`: a string error raised at `level > 0` gets a
/// `source:line: ` prefix naming the Lua frame that many calls *below* the
/// raising native call (spec §7). Level 0 means "no position info" and
/// non-string values are never prefixed (matching §8 scenario 3: `error`
/// with a table value round-trips unchanged through `pcall`).
fn raise_error(state: &LuaState, value: Value, level: usize) -> LuaError {
    if level == 0 {
        return LuaError::Runtime(value);
    }
    if let Value::String(s) = &value {
        if let Some(prefix) = position_prefix(state, level) {
            return LuaError::Runtime(Value::String(state.intern(&format!("{}{}", prefix, s.as_str()))));
        }
    }
    LuaError::Runtime(value)
}

fn position_prefix(state: &LuaState, level: usize) -> Option<String> {
    let depth = state.call_depth();
    let idx = depth.checked_sub(1 + level)?;
    let ci = state.frame(idx)?;
    if let Value::Function(Function::Lua(data)) = &ci.func {
        let line = data.proto.line_for(ci.pc.saturating_sub(1));
        Some(format!("{}:{}: ", data.proto.source_name, line))
    } else {
        None
    }
}

fn lua_pcall(state: &mut LuaState) -> LuaResult<usize> {
    let mut args = state.native_args();
    if args.is_empty() {
        return Err(state.error("bad argument #1 to 'pcall' (value expected)"));
    }
    let func = args.remove(0);
    let (ok, results) = state.pcall(func, args)?;
    state.push(Value::Boolean(ok))?;
    for r in &results {
        state.push(r.clone())?;
    }
    Ok(1 + results.len())
}

fn lua_xpcall(state: &mut LuaState) -> LuaResult<usize> {
    let mut args = state.native_args();
    if args.len() < 2 {
        return Err(state.error("bad argument #2 to 'xpcall' (value expected)"));
    }
    let func = args.remove(0);
    let handler = args.remove(0);
    let (ok, results) = state.xpcall(func, args, handler)?;
    state.push(Value::Boolean(ok))?;
    for r in &results {
        state.push(r.clone())?;
    }
    Ok(1 + results.len())
}

fn lua_select(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let rest = if args.is_empty() { &[][..] } else { &args[1..] };
    match arg(&args, 1) {
        Value::String(s) if s.as_str() == "#" => {
            state.push(Value::Number(rest.len() as f64))?;
            Ok(1)
        }
        v => {
            let n = v
                .coerce_to_number()
                .ok_or_else(|| state.error("bad argument #1 to 'select' (number expected)"))?
                as i64;
            if n < 0 {
                let idx = rest.len() as i64 + n;
                if idx < 0 {
                    return Err(state.error("bad argument #1 to 'select' (index out of range)"));
                }
                for v in &rest[idx as usize..] {
                    state.push(v.clone())?;
                }
                Ok(rest.len() - idx as usize)
            } else if n == 0 {
                Err(state.error("bad argument #1 to 'select' (index out of range)"))
            } else {
                let start = (n as usize).saturating_sub(1).min(rest.len());
                for v in &rest[start..] {
                    state.push(v.clone())?;
                }
                Ok(rest.len() - start)
            }
        }
    }
}

fn ipairs_aux(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    let i = arg(&args, 2).as_number().unwrap_or(0.0) + 1.0;
    let table = t
        .as_table()
        .ok_or_else(|| state.error("bad argument #1 to 'ipairs' iterator (table expected)"))?;
    let v = table.borrow().raw_get(&Value::Number(i));
    if v.is_nil() {
        Ok(0)
    } else {
        state.push(Value::Number(i))?;
        state.push(v)?;
        Ok(2)
    }
}

fn lua_ipairs(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    if !t.is_table() {
        return Err(state.error("bad argument #1 to 'ipairs' (table expected)"));
    }
    state.push(Value::Function(Function::new_native("ipairs_iterator", ipairs_aux)))?;
    state.push(t)?;
    state.push(Value::Number(0.0))?;
    Ok(3)
}

fn lua_pairs(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    if !t.is_table() {
        return Err(state.error("bad argument #1 to 'pairs' (table expected)"));
    }
    state.push(Value::Function(Function::new_native("next", lua_next)))?;
    state.push(t)?;
    state.push(Value::Nil)?;
    Ok(3)
}

fn lua_next(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    let key = arg(&args, 2);
    let table = t
        .as_table()
        .ok_or_else(|| state.error("bad argument #1 to 'next' (table expected)"))?;
    match table.borrow().next_key(&key) {
        Some((k, v)) => {
            state.push(k)?;
            state.push(v)?;
            Ok(2)
        }
        None => {
            state.push(Value::Nil)?;
            Ok(1)
        }
    }
}

fn lua_rawget(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    let key = arg(&args, 2);
    let table = t
        .as_table()
        .ok_or_else(|| state.error("bad argument #1 to 'rawget' (table expected)"))?;
    state.push(table.borrow().raw_get(&key))?;
    Ok(1)
}

fn lua_rawset(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    let key = arg(&args, 2);
    let value = arg(&args, 3);
    if key.is_nil() {
        return Err(state.error("table index is nil"));
    }
    let table = t
        .as_table()
        .ok_or_else(|| state.error("bad argument #1 to 'rawset' (table expected)"))?;
    table.borrow_mut().raw_set(key, value);
    state.push(t)?;
    Ok(1)
}

fn lua_rawequal(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    state.push(Value::Boolean(arg(&args, 1) == arg(&args, 2)))?;
    Ok(1)
}

fn lua_rawlen(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let v = arg(&args, 1);
    let len = match &v {
        Value::Table(t) => t.borrow().length(),
        Value::String(s) => s.len() as i64,
        _ => return Err(state.error("table or string expected")),
    };
    state.push(Value::Number(len as f64))?;
    Ok(1)
}

fn lua_setmetatable(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    let table = t
        .as_table()
        .ok_or_else(|| state.error("bad argument #1 to 'setmetatable' (table expected)"))?
        .clone();
    if let Some(mt) = table.borrow().metatable() {
        if !mt.borrow().raw_get(&Value::String(state.intern("__metatable"))).is_nil() {
            return Err(state.error("cannot change a protected metatable"));
        }
    }
    match arg(&args, 2) {
        Value::Nil => table.borrow_mut().set_metatable(None),
        Value::Table(mt) => table.borrow_mut().set_metatable(Some(mt)),
        _ => return Err(state.error("bad argument #2 to 'setmetatable' (nil or table expected)")),
    }
    state.push(t)?;
    Ok(1)
}

fn lua_getmetatable(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let v = arg(&args, 1);
    match state.metatable_of(&v) {
        None => state.push(Value::Nil)?,
        Some(mt) => {
            let protected = mt.borrow().raw_get(&Value::String(state.intern("__metatable")));
            if protected.is_nil() {
                state.push(Value::Table(mt))?;
            } else {
                state.push(protected)?;
            }
        }
    }
    Ok(1)
}

fn lua_unpack(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    let table: TableRef = t
        .as_table()
        .ok_or_else(|| state.error("bad argument #1 to 'unpack' (table expected)"))?
        .clone();
    let i = match arg(&args, 2) {
        Value::Nil => 1,
        v => v.coerce_to_number().unwrap_or(1.0) as i64,
    };
    let j = match arg(&args, 3) {
        Value::Nil => table.borrow().length(),
        v => v.coerce_to_number().unwrap_or(0.0) as i64,
    };
    if i > j {
        return Ok(0);
    }
    let count = (j - i + 1) as usize;
    for k in i..=j {
        state.push(table.borrow().raw_get(&Value::Number(k as f64)))?;
    }
    Ok(count)
}

fn lua_collectgarbage(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let opt = arg(&args, 1);
    let opt = opt.as_str().unwrap_or("collect");
    match opt {
        "count" => {
            state.push(Value::Number(0.0))?;
            Ok(1)
        }
        "isrunning" => {
            state.push(Value::Boolean(true))?;
            Ok(1)
        }
        _ => {
            let reclaimed = state.collect_garbage();
            state.push(Value::Number(reclaimed as f64))?;
            Ok(1)
        }
    }
}
