// Tests for the basic library (stdlib::basic) and core statement forms.
use crate::execute;

#[test]
fn test_print_and_type() {
    let result = execute(
        r#"
        print("Hello, World!")
        print(1, 2, 3)
        print()
        assert(type(nil) == "nil")
        assert(type(true) == "boolean")
        assert(type(42) == "number")
        assert(type("hello") == "string")
        assert(type({}) == "table")
        assert(type(print) == "function")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_tonumber_tostring() {
    let result = execute(
        r#"
        assert(tonumber("123") == 123)
        assert(tonumber("3.14") == 3.14)
        assert(tonumber("FF", 16) == 255)
        assert(tonumber("invalid") == nil)
        assert(tonumber(42) == 42)
        assert(tostring(123) == "123")
        assert(tostring(true) == "true")
        assert(tostring(nil) == "nil")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_assert_success_and_failure() {
    let result = execute(
        r#"
        local a, b, c = assert(true, "test", 123)
        assert(a == true and b == "test" and c == 123)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());

    let result = execute("assert(false, 'boom')");
    assert!(result.is_err());
}

#[test]
fn test_error_carries_arbitrary_value() {
    let result = execute("error({code = 7})");
    let err = result.unwrap_err();
    let v = err.value().expect("runtime error carries a value");
    assert!(v.as_table().is_some());
}

#[test]
fn test_error_string_gets_position_prefix() {
    let result = execute(
        r#"
        local function f() error("boom") end
        f()
    "#,
    );
    let err = result.unwrap_err();
    // position-prefixed: "chunk:line: boom", not the bare message
    assert!(err.display_message().ends_with("boom"));
    assert!(err.display_message().contains(':'));
}

#[test]
fn test_error_level_zero_skips_prefix() {
    let result = execute(
        r#"
        local function f() error("boom", 0) end
        f()
    "#,
    );
    let err = result.unwrap_err();
    assert_eq!(err.display_message(), "boom");
}

#[test]
fn test_pcall_success_and_failure() {
    let result = execute(
        r#"
        local ok, v = pcall(function() return 42 end)
        assert(ok == true and v == 42)

        local ok2, err = pcall(function() error("test error") end)
        assert(ok2 == false)
        assert(type(err) == "string")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_xpcall_runs_handler() {
    let result = execute(
        r#"
        local handler_called = false
        local function handler(err)
            handler_called = true
            return "handled: " .. tostring(err)
        end
        local ok, msg = xpcall(function() error("test error") end, handler)
        assert(ok == false)
        assert(handler_called == true)
        assert(type(msg) == "string")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_select() {
    let result = execute(
        r#"
        assert(select("#", 1, 2, 3) == 3)
        local a, b = select(2, "a", "b", "c")
        assert(a == "b" and b == "c")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_ipairs_and_pairs() {
    let result = execute(
        r#"
        local t = {10, 20, 30}
        local sum = 0
        for i, v in ipairs(t) do
            sum = sum + v
        end
        assert(sum == 60)

        local t2 = {a = 1, b = 2, c = 3}
        local count = 0
        for k, v in pairs(t2) do
            count = count + 1
        end
        assert(count == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_raw_family() {
    let result = execute(
        r#"
        local t = {}
        rawset(t, "key", "value")
        assert(rawget(t, "key") == "value")
        assert(rawlen("hello") == 5)
        assert(rawlen({1, 2, 3}) == 3)
        assert(rawequal(1, 1) == true)
        local t1, t2 = {}, {}
        assert(rawequal(t1, t1) == true)
        assert(rawequal(t1, t2) == false)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_getmetatable_setmetatable() {
    let result = execute(
        r#"
        local t = {}
        local mt = {__index = function() return 42 end}
        setmetatable(t, mt)
        assert(getmetatable(t) == mt)
        assert(t.anything == 42)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_collectgarbage_does_not_error() {
    let result = execute(
        r#"
        collectgarbage("collect")
        collectgarbage("count")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_unpack() {
    let result = execute(
        r#"
        local a, b, c = unpack({1, 2, 3})
        assert(a == 1 and b == 2 and c == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
