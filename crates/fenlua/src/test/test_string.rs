// Tests for the string library and its method-call metatable wiring.
use crate::execute;

#[test]
fn test_sub_and_len() {
    let result = execute(
        r#"
        assert(string.len("hello") == 5)
        assert(string.sub("hello world", 1, 5) == "hello")
        assert(string.sub("hello world", 7) == "world")
        assert(string.sub("hello", -3) == "llo")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_upper_lower_rep() {
    let result = execute(
        r#"
        assert(string.upper("abc") == "ABC")
        assert(string.lower("ABC") == "abc")
        assert(string.rep("ab", 3) == "ababab")
        assert(string.rep("ab", 3, "-") == "ab-ab-ab")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_byte_and_char() {
    let result = execute(
        r#"
        assert(string.byte("A") == 65)
        assert(string.char(65, 66, 67) == "ABC")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_find_plain_substring() {
    let result = execute(
        r#"
        local from, to = string.find("hello world", "world")
        assert(from == 7 and to == 11)
        assert(string.find("hello", "xyz") == nil)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_format() {
    let result = execute(
        r#"
        assert(string.format("%d-%s", 42, "x") == "42-x")
        assert(string.format("%%") == "%")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

/// String values route `:method()` calls through `string`'s `__index`.
#[test]
fn test_method_call_syntax_on_string_values() {
    let result = execute(
        r#"
        local s = "Hello"
        assert(s:upper() == "HELLO")
        assert(s:len() == 5)
        assert(("x"):rep(3) == "xxx")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

/// Spec §8 end-to-end scenario 6: repeated concatenation.
#[test]
fn test_string_concatenation_chain() {
    let result = execute(
        r#"
        local s = ""
        for i = 1, 4 do
            s = s .. i
        end
        return s
    "#,
    );
    let values = result.expect("scenario 6 must not error");
    assert_eq!(values[0].as_str(), Some("1234"));
}
