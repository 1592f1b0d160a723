//! Metamethod dispatch shared by the opcode dispatcher and the standard
//! library: indexing, arithmetic, comparison, concatenation, length, and
//! `tostring` all bottom out here (spec §4.5 "Metamethods").

use crate::value::{Function, Value};
use crate::vm::error::LuaResult;
use crate::vm::state::LuaState;
use crate::vm::tostring::raw_tostring;

/// Bound on `__index`/`__newindex` chains (a table whose metatable's
/// `__index` points back at itself would otherwise loop forever).
const MAX_TAG_CHAIN: usize = 100;

pub fn get_metamethod(state: &LuaState, v: &Value, name: &str) -> Option<Value> {
    let mt = state.metatable_of(v)?;
    let key = Value::String(state.intern(name));
    let mm = mt.borrow().raw_get(&key);
    if mm.is_nil() {
        None
    } else {
        Some(mm)
    }
}

/// `t[k]` with `__index` fallback (spec §4.5).
pub fn index(state: &mut LuaState, table: &Value, key: &Value) -> LuaResult<Value> {
    let mut cur = table.clone();
    for _ in 0..MAX_TAG_CHAIN {
        if let Value::Table(t) = &cur {
            let raw = t.borrow().raw_get(key);
            if !raw.is_nil() {
                return Ok(raw);
            }
            match get_metamethod(state, &cur, "__index") {
                None => return Ok(Value::Nil),
                Some(Value::Function(_)) => {
                    let mm = get_metamethod(state, &cur, "__index").unwrap();
                    let results = state.call(mm, vec![cur.clone(), key.clone()])?;
                    return Ok(results.into_iter().next().unwrap_or(Value::Nil));
                }
                Some(next) => cur = next,
            }
        } else {
            match get_metamethod(state, &cur, "__index") {
                None => {
                    return Err(state.error(format!("attempt to index a {} value", cur.type_name())))
                }
                Some(Value::Function(_)) => {
                    let mm = get_metamethod(state, &cur, "__index").unwrap();
                    let results = state.call(mm, vec![cur.clone(), key.clone()])?;
                    return Ok(results.into_iter().next().unwrap_or(Value::Nil));
                }
                Some(next) => cur = next,
            }
        }
    }
    Err(state.error("'__index' chain too long; possible loop"))
}

/// `t[k] = v` with `__newindex` fallback (spec §4.5).
pub fn newindex(state: &mut LuaState, table: &Value, key: Value, value: Value) -> LuaResult<()> {
    let mut cur = table.clone();
    for _ in 0..MAX_TAG_CHAIN {
        if let Value::Table(t) = &cur {
            let has_raw = !t.borrow().raw_get(&key).is_nil();
            if has_raw {
                t.borrow_mut().raw_set(key, value);
                return Ok(());
            }
            match get_metamethod(state, &cur, "__newindex") {
                None => {
                    if key.is_nil() {
                        return Err(state.error("table index is nil"));
                    }
                    t.borrow_mut().raw_set(key, value);
                    return Ok(());
                }
                Some(Value::Function(_)) => {
                    let mm = get_metamethod(state, &cur, "__newindex").unwrap();
                    state.call(mm, vec![cur.clone(), key, value])?;
                    return Ok(());
                }
                Some(next) => cur = next,
            }
        } else {
            match get_metamethod(state, &cur, "__newindex") {
                None => {
                    return Err(state.error(format!("attempt to index a {} value", cur.type_name())))
                }
                Some(Value::Function(_)) => {
                    let mm = get_metamethod(state, &cur, "__newindex").unwrap();
                    state.call(mm, vec![cur.clone(), key, value])?;
                    return Ok(());
                }
                Some(next) => cur = next,
            }
        }
    }
    Err(state.error("'__newindex' chain too long; possible loop"))
}

#[derive(Clone, Copy)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithOp {
    fn event(self) -> &'static str {
        match self {
            ArithOp::Add => "__add",
            ArithOp::Sub => "__sub",
            ArithOp::Mul => "__mul",
            ArithOp::Div => "__div",
            ArithOp::Mod => "__mod",
            ArithOp::Pow => "__pow",
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => {
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    r + b
                } else {
                    r
                }
            }
            ArithOp::Pow => a.powf(b),
        }
    }
}

pub fn arith(state: &mut LuaState, op: ArithOp, a: &Value, b: &Value) -> LuaResult<Value> {
    if let (Some(x), Some(y)) = (a.coerce_to_number(), b.coerce_to_number()) {
        return Ok(Value::Number(op.apply(x, y)));
    }
    let event = op.event();
    if let Some(mm) = get_metamethod(state, a, event).or_else(|| get_metamethod(state, b, event)) {
        let results = state.call(mm, vec![a.clone(), b.clone()])?;
        return Ok(results.into_iter().next().unwrap_or(Value::Nil));
    }
    let culprit = if a.coerce_to_number().is_none() { a } else { b };
    Err(state.error(format!(
        "attempt to perform arithmetic on a {} value",
        culprit.type_name()
    )))
}

pub fn unm(state: &mut LuaState, a: &Value) -> LuaResult<Value> {
    if let Some(x) = a.coerce_to_number() {
        return Ok(Value::Number(-x));
    }
    if let Some(mm) = get_metamethod(state, a, "__unm") {
        let results = state.call(mm, vec![a.clone(), a.clone()])?;
        return Ok(results.into_iter().next().unwrap_or(Value::Nil));
    }
    Err(state.error(format!(
        "attempt to perform arithmetic on a {} value",
        a.type_name()
    )))
}

/// `#v` (spec §4.5, §3 invariant 7).
pub fn length(state: &mut LuaState, v: &Value) -> LuaResult<Value> {
    match v {
        Value::String(s) => Ok(Value::Number(s.len() as f64)),
        Value::Table(t) => {
            if let Some(mm) = get_metamethod(state, v, "__len") {
                let results = state.call(mm, vec![v.clone()])?;
                return Ok(results.into_iter().next().unwrap_or(Value::Nil));
            }
            Ok(Value::Number(t.borrow().length() as f64))
        }
        _ => {
            if let Some(mm) = get_metamethod(state, v, "__len") {
                let results = state.call(mm, vec![v.clone()])?;
                return Ok(results.into_iter().next().unwrap_or(Value::Nil));
            }
            Err(state.error(format!("attempt to get length of a {} value", v.type_name())))
        }
    }
}

/// `a .. b` (spec §4.5): numbers and strings concatenate directly,
/// anything else falls back to `__concat`.
pub fn concat(state: &mut LuaState, a: &Value, b: &Value) -> LuaResult<Value> {
    let direct = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) => Some(s.as_str().to_string()),
            Value::Number(n) => Some(crate::vm::tostring::format_number(*n)),
            _ => None,
        }
    };
    if let (Some(x), Some(y)) = (direct(a), direct(b)) {
        return Ok(Value::String(state.intern(&(x + &y))));
    }
    if let Some(mm) = get_metamethod(state, a, "__concat").or_else(|| get_metamethod(state, b, "__concat")) {
        let results = state.call(mm, vec![a.clone(), b.clone()])?;
        return Ok(results.into_iter().next().unwrap_or(Value::Nil));
    }
    let culprit = if direct(a).is_none() { a } else { b };
    Err(state.error(format!(
        "attempt to concatenate a {} value",
        culprit.type_name()
    )))
}

/// Raw equality first (spec: rawequal short-circuits `__eq`), then `__eq`
/// when both operands are tables or both are userdata (spec §4.5).
pub fn equals(state: &mut LuaState, a: &Value, b: &Value) -> LuaResult<bool> {
    if a == b {
        return Ok(true);
    }
    let same_kind = matches!(
        (a, b),
        (Value::Table(_), Value::Table(_)) | (Value::Userdata(_), Value::Userdata(_))
    );
    if !same_kind {
        return Ok(false);
    }
    if let Some(mm) = get_metamethod(state, a, "__eq").or_else(|| get_metamethod(state, b, "__eq")) {
        let results = state.call(mm, vec![a.clone(), b.clone()])?;
        return Ok(results.into_iter().next().unwrap_or(Value::Nil).is_truthy());
    }
    Ok(false)
}

pub fn less_than(state: &mut LuaState, a: &Value, b: &Value) -> LuaResult<bool> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x < y),
        (Value::String(x), Value::String(y)) => Ok(x.as_str() < y.as_str()),
        _ => {
            if let Some(mm) = get_metamethod(state, a, "__lt").or_else(|| get_metamethod(state, b, "__lt")) {
                let results = state.call(mm, vec![a.clone(), b.clone()])?;
                return Ok(results.into_iter().next().unwrap_or(Value::Nil).is_truthy());
            }
            Err(state.error(format!(
                "attempt to compare {} with {}",
                a.type_name(),
                b.type_name()
            )))
        }
    }
}

pub fn less_equal(state: &mut LuaState, a: &Value, b: &Value) -> LuaResult<bool> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x <= y),
        (Value::String(x), Value::String(y)) => Ok(x.as_str() <= y.as_str()),
        _ => {
            if let Some(mm) = get_metamethod(state, a, "__le").or_else(|| get_metamethod(state, b, "__le")) {
                let results = state.call(mm, vec![a.clone(), b.clone()])?;
                return Ok(results.into_iter().next().unwrap_or(Value::Nil).is_truthy());
            }
            Err(state.error(format!(
                "attempt to compare {} with {}",
                a.type_name(),
                b.type_name()
            )))
        }
    }
}

/// `tostring(v)`: consults `__tostring`, else falls back to
/// [`raw_tostring`].
pub fn tostring_mm(state: &mut LuaState, v: &Value) -> LuaResult<String> {
    if let Some(Value::Function(f)) = get_metamethod(state, v, "__tostring") {
        let results = state.call(Value::Function(f), vec![v.clone()])?;
        return match results.into_iter().next() {
            Some(Value::String(s)) => Ok(s.as_str().to_string()),
            _ => Err(state.error("'__tostring' must return a string")),
        };
    }
    Ok(raw_tostring(v))
}
