//! A representative subset of the table library (spec §3.N):
//! `insert/remove/concat`.

use crate::lib_module;
use crate::stdlib::lib_registry::{arg, LibraryModule};
use crate::value::Value;
use crate::vm::error::LuaResult;
use crate::vm::state::LuaState;

pub fn create_table_lib() -> LibraryModule {
    lib_module!("table", {
        "insert" => lua_insert,
        "remove" => lua_remove,
        "concat" => lua_concat,
    })
}

fn lua_insert(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    let table = t
        .as_table()
        .ok_or_else(|| state.error("bad argument #1 to 'insert' (table expected)"))?
        .clone();
    let len = table.borrow().length();

    let (pos, value) = if args.len() >= 3 {
        let pos = arg(&args, 2)
            .coerce_to_number()
            .ok_or_else(|| state.error("bad argument #2 to 'insert' (number expected)"))? as i64;
        (pos, arg(&args, 3))
    } else {
        (len + 1, arg(&args, 2))
    };
    if pos < 1 || pos > len + 1 {
        return Err(state.error("bad argument #2 to 'insert' (position out of bounds)"));
    }
    let mut k = len;
    while k >= pos {
        let v = table.borrow().raw_get(&Value::Number(k as f64));
        table.borrow_mut().raw_set(Value::Number((k + 1) as f64), v);
        k -= 1;
    }
    table.borrow_mut().raw_set(Value::Number(pos as f64), value);
    Ok(0)
}

fn lua_remove(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    let table = t
        .as_table()
        .ok_or_else(|| state.error("bad argument #1 to 'remove' (table expected)"))?
        .clone();
    let len = table.borrow().length();
    if len == 0 && args.len() < 2 {
        state.push(Value::Nil)?;
        return Ok(1);
    }
    let pos = match arg(&args, 2) {
        Value::Nil => len,
        v => v
            .coerce_to_number()
            .ok_or_else(|| state.error("bad argument #2 to 'remove' (number expected)"))? as i64,
    };
    if len == 0 {
        state.push(Value::Nil)?;
        return Ok(1);
    }
    if pos < 1 || pos > len {
        return Err(state.error("bad argument #2 to 'remove' (position out of bounds)"));
    }
    let removed = table.borrow().raw_get(&Value::Number(pos as f64));
    let mut k = pos;
    while k < len {
        let v = table.borrow().raw_get(&Value::Number((k + 1) as f64));
        table.borrow_mut().raw_set(Value::Number(k as f64), v);
        k += 1;
    }
    table.borrow_mut().raw_set(Value::Number(len as f64), Value::Nil);
    state.push(removed)?;
    Ok(1)
}

fn lua_concat(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let t = arg(&args, 1);
    let table = t
        .as_table()
        .ok_or_else(|| state.error("bad argument #1 to 'concat' (table expected)"))?
        .clone();
    let sep = match arg(&args, 2) {
        Value::Nil => String::new(),
        v => crate::vm::tostring::raw_tostring(&v),
    };
    let i = match arg(&args, 3) {
        Value::Nil => 1,
        v => v.coerce_to_number().unwrap_or(1.0) as i64,
    };
    let j = match arg(&args, 4) {
        Value::Nil => table.borrow().length(),
        v => v.coerce_to_number().unwrap_or(0.0) as i64,
    };
    let mut out = String::new();
    let mut k = i;
    while k <= j {
        let v = table.borrow().raw_get(&Value::Number(k as f64));
        match &v {
            Value::String(_) | Value::Number(_) => out.push_str(&crate::vm::tostring::raw_tostring(&v)),
            _ => {
                return Err(state.error(format!(
                    "invalid value (a {} value) at index {} in table for 'concat'",
                    v.type_name(),
                    k
                )))
            }
        }
        if k < j {
            out.push_str(&sep);
        }
        k += 1;
    }
    state.push(Value::String(state.intern(&out)))?;
    Ok(1)
}
