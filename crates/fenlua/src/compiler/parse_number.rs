//! Lua numeral parsing shared by the lexer, `tonumber`, and string-to-number
//! coercion in arithmetic (spec §3 invariant, §4.1). `Value` carries a
//! single `f64` (see DESIGN.md for why we don't distinguish int/float the
//! way the teacher's token-level parser does), so hex integers are parsed
//! as exact integral doubles and everything else goes through the standard
//! float parser.

/// Parse a Lua numeral (`"42"`, `"3.14"`, `"0x1A"`, `"1e10"`, ...), or
/// `None` if `s` isn't one. Leading/trailing whitespace must already be
/// trimmed by the caller (the lexer never sees whitespace here; coercion
/// sites trim explicitly).
pub fn parse_lua_number(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    let (sign, rest) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    if rest.is_empty() {
        return None;
    }
    if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        return parse_hex(hex).map(|v| sign * v);
    }
    rest.parse::<f64>().ok().map(|v| sign * v)
}

fn parse_hex(hex: &str) -> Option<f64> {
    if hex.is_empty() {
        return None;
    }
    if let Some(dot) = hex.find('.') {
        let (int_part, frac_part) = hex.split_at(dot);
        let frac_part = &frac_part[1..];
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let int_val = if int_part.is_empty() {
            0u64
        } else {
            u64::from_str_radix(int_part, 16).ok()?
        };
        let mut value = int_val as f64;
        let mut scale = 1.0 / 16.0;
        for c in frac_part.chars() {
            let d = c.to_digit(16)? as f64;
            value += d * scale;
            scale /= 16.0;
        }
        return Some(value);
    }
    u64::from_str_radix(hex, 16).ok().map(|v| v as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_forms() {
        assert_eq!(parse_lua_number("42"), Some(42.0));
        assert_eq!(parse_lua_number("3.14"), Some(3.14));
        assert_eq!(parse_lua_number("1e3"), Some(1000.0));
        assert_eq!(parse_lua_number("-5"), Some(-5.0));
    }

    #[test]
    fn hex_forms() {
        assert_eq!(parse_lua_number("0x1A"), Some(26.0));
        assert_eq!(parse_lua_number("0X10"), Some(16.0));
        assert_eq!(parse_lua_number("0x1.8"), Some(1.5));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_lua_number(""), None);
        assert_eq!(parse_lua_number("abc"), None);
        assert_eq!(parse_lua_number("1 2"), None);
    }
}
