//! A representative subset of the string library (spec §3.N):
//! `format/sub/len/rep/upper/lower/byte/char/find`.

use crate::lib_module;
use crate::stdlib::lib_registry::{arg, LibraryModule};
use crate::value::{TableRef, Value};
use crate::vm::error::LuaResult;
use crate::vm::state::LuaState;

pub fn create_string_lib() -> LibraryModule {
    lib_module!("string", {
        "format" => lua_format,
        "sub" => lua_sub,
        "len" => lua_len,
        "rep" => lua_rep,
        "upper" => lua_upper,
        "lower" => lua_lower,
        "byte" => lua_byte,
        "char" => lua_char,
        "find" => lua_find,
    })
    .with_initializer(install_string_metatable)
}

/// Installs `string` as every string value's `__index`, the same way real
/// Lua 5.1 wires `("x"):upper()` up without a per-string metatable —
/// `getmetatable("").__index == string`.
fn install_string_metatable(state: &mut LuaState, string_table: &TableRef) -> LuaResult<()> {
    let mt = TableRef::with_capacity(0, 1);
    mt.borrow_mut().raw_set(
        Value::String(state.intern("__index")),
        Value::Table(string_table.clone()),
    );
    state.set_string_metatable(Some(mt));
    Ok(())
}

fn check_string(state: &LuaState, v: &Value, func_name: &str) -> LuaResult<String> {
    match v {
        Value::String(s) => Ok(s.as_str().to_string()),
        Value::Number(n) => Ok(crate::vm::tostring::format_number(*n)),
        _ => Err(state.error(format!(
            "bad argument #1 to '{}' (string expected, got {})",
            func_name,
            v.type_name()
        ))),
    }
}

/// Lua's 1-based, negative-from-the-end string index, clamped into
/// `1..=len` (or `0` for "before the start", which callers treat as empty).
fn resolve_index(i: i64, len: usize) -> i64 {
    if i >= 0 {
        i
    } else {
        (len as i64 + i + 1).max(0)
    }
}

fn lua_len(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let s = check_string(state, &arg(&args, 1), "len")?;
    state.push(Value::Number(s.len() as f64))?;
    Ok(1)
}

fn lua_sub(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let s = check_string(state, &arg(&args, 1), "sub")?;
    let bytes = s.as_bytes();
    let len = bytes.len();
    let i = match arg(&args, 2) {
        Value::Nil => 1,
        v => v.coerce_to_number().unwrap_or(1.0) as i64,
    };
    let j = match arg(&args, 3) {
        Value::Nil => -1,
        v => v.coerce_to_number().unwrap_or(-1.0) as i64,
    };
    let mut start = resolve_index(i, len).max(1);
    let mut end = resolve_index(j, len).min(len as i64);
    if start < 1 {
        start = 1;
    }
    if start > end {
        state.push(Value::String(state.intern("")))?;
        return Ok(1);
    }
    if end > len as i64 {
        end = len as i64;
    }
    let slice = &bytes[(start as usize - 1)..(end as usize)];
    let out = String::from_utf8_lossy(slice).into_owned();
    state.push(Value::String(state.intern(&out)))?;
    Ok(1)
}

fn lua_rep(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let s = check_string(state, &arg(&args, 1), "rep")?;
    let n = arg(&args, 2).coerce_to_number().unwrap_or(0.0) as i64;
    let sep = match arg(&args, 3) {
        Value::Nil => String::new(),
        v => check_string(state, &v, "rep")?,
    };
    let out = if n <= 0 {
        String::new()
    } else {
        vec![s; n as usize].join(&sep)
    };
    state.push(Value::String(state.intern(&out)))?;
    Ok(1)
}

fn lua_upper(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let s = check_string(state, &arg(&args, 1), "upper")?;
    state.push(Value::String(state.intern(&s.to_uppercase())))?;
    Ok(1)
}

fn lua_lower(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let s = check_string(state, &arg(&args, 1), "lower")?;
    state.push(Value::String(state.intern(&s.to_lowercase())))?;
    Ok(1)
}

fn lua_byte(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let s = check_string(state, &arg(&args, 1), "byte")?;
    let bytes = s.as_bytes();
    let len = bytes.len();
    let i = match arg(&args, 2) {
        Value::Nil => 1,
        v => v.coerce_to_number().unwrap_or(1.0) as i64,
    };
    let j = match arg(&args, 3) {
        Value::Nil => i,
        v => v.coerce_to_number().unwrap_or(i as f64) as i64,
    };
    let start = resolve_index(i, len).max(1);
    let end = resolve_index(j, len).min(len as i64);
    if start > end {
        return Ok(0);
    }
    let mut count = 0;
    for k in start..=end {
        state.push(Value::Number(bytes[(k - 1) as usize] as f64))?;
        count += 1;
    }
    Ok(count)
}

fn lua_char(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let mut out = String::with_capacity(args.len());
    for (i, a) in args.iter().enumerate() {
        let code = a.coerce_to_number().ok_or_else(|| {
            state.error(format!("bad argument #{} to 'char' (number expected)", i + 1))
        })? as u32;
        let ch = char::from_u32(code)
            .ok_or_else(|| state.error(format!("bad argument #{} to 'char' (value out of range)", i + 1)))?;
        out.push(ch);
    }
    state.push(Value::String(state.intern(&out)))?;
    Ok(1)
}

/// Plain substring search (spec §3.N's representative subset — full Lua
/// pattern matching is out of scope). `plain` is accepted but ignored since
/// every search here is already a literal one.
fn lua_find(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let s = check_string(state, &arg(&args, 1), "find")?;
    let pattern = check_string(state, &arg(&args, 2), "find")?;
    let init = match arg(&args, 3) {
        Value::Nil => 1,
        v => v.coerce_to_number().unwrap_or(1.0) as i64,
    };
    let start = resolve_index(init, s.len()).max(1) as usize;
    if start > s.len() + 1 {
        state.push(Value::Nil)?;
        return Ok(1);
    }
    let haystack = &s[(start - 1).min(s.len())..];
    match haystack.find(pattern.as_str()) {
        Some(rel) => {
            let from = start + rel;
            let to = from + pattern.len() - 1;
            state.push(Value::Number(from as f64))?;
            state.push(Value::Number(to as f64))?;
            Ok(2)
        }
        None => {
            state.push(Value::Nil)?;
            Ok(1)
        }
    }
}

/// `string.format`: a hand-rolled printf subset (`%s %d %i %u %f %g %x %X
/// %o %c %q %%`), no width/precision beyond what Rust's own formatter gives
/// us for free — enough for the base library's use of `format` in error
/// messages and simple templating.
fn lua_format(state: &mut LuaState) -> LuaResult<usize> {
    let args = state.native_args();
    let fmt = check_string(state, &arg(&args, 1), "format")?;
    let mut out = String::new();
    let mut arg_idx = 2usize;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::from("%");
        while matches!(chars.peek(), Some('-') | Some('+') | Some(' ') | Some('#') | Some('0')) {
            spec.push(chars.next().unwrap());
        }
        while matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
            spec.push(chars.next().unwrap());
        }
        if chars.peek() == Some(&'.') {
            spec.push(chars.next().unwrap());
            while matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
                spec.push(chars.next().unwrap());
            }
        }
        let conv = match chars.next() {
            Some(c) => c,
            None => {
                out.push_str(&spec);
                break;
            }
        };
        if conv == '%' {
            out.push('%');
            continue;
        }
        let value = arg(&args, arg_idx);
        arg_idx += 1;
        let rendered = match conv {
            's' => crate::vm::metamethod::tostring_mm(state, &value)?,
            'd' | 'i' | 'u' => {
                let n = value
                    .coerce_to_number()
                    .ok_or_else(|| state.error("bad argument to 'format' (number expected)"))?;
                format!("{}", n as i64)
            }
            'f' | 'F' => {
                let n = value
                    .coerce_to_number()
                    .ok_or_else(|| state.error("bad argument to 'format' (number expected)"))?;
                format!("{:.6}", n)
            }
            'g' | 'G' => {
                let n = value
                    .coerce_to_number()
                    .ok_or_else(|| state.error("bad argument to 'format' (number expected)"))?;
                crate::vm::tostring::format_number(n)
            }
            'x' => {
                let n = value
                    .coerce_to_number()
                    .ok_or_else(|| state.error("bad argument to 'format' (number expected)"))?;
                format!("{:x}", n as i64)
            }
            'X' => {
                let n = value
                    .coerce_to_number()
                    .ok_or_else(|| state.error("bad argument to 'format' (number expected)"))?;
                format!("{:X}", n as i64)
            }
            'o' => {
                let n = value
                    .coerce_to_number()
                    .ok_or_else(|| state.error("bad argument to 'format' (number expected)"))?;
                format!("{:o}", n as i64)
            }
            'c' => {
                let n = value
                    .coerce_to_number()
                    .ok_or_else(|| state.error("bad argument to 'format' (number expected)"))?;
                char::from_u32(n as u32).map(|c| c.to_string()).unwrap_or_default()
            }
            'q' => format!("{:?}", crate::vm::tostring::raw_tostring(&value)),
            other => {
                return Err(state.error(format!("invalid conversion '%{}' to 'format'", other)));
            }
        };
        out.push_str(&rendered);
    }
    state.push(Value::String(state.intern(&out)))?;
    Ok(1)
}
