//! Default (metamethod-free) value-to-string conversion, shared by
//! `tostring`, error message formatting, and string coercion in
//! concatenation/arithmetic (spec §4.5, §8 round-trip law).

use crate::value::Value;

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    // Rust's `Display` for f64 already omits a trailing ".0" for integral
    // values (3.0 -> "3"), which matches Lua 5.1's %.14g-style tostring
    // closely enough to satisfy the round-trip law for canonical decimals.
    format!("{}", n)
}

/// `tostring(v)` without consulting `__tostring` (that layer lives in the
/// VM, which has access to metatables; this is the fallback every path
/// bottoms out to).
pub fn raw_tostring(v: &Value) -> String {
    match v {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::String(s) => s.as_str().to_string(),
        Value::Table(t) => format!("table: {:p}", std::rc::Rc::as_ptr(t.inner())),
        Value::Function(f) => format!("{:?}", f),
        Value::Userdata(u) => format!("{:?}", u),
        Value::Thread(t) => format!("{:?}", t),
    }
}
