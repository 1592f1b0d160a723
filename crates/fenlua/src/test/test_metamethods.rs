// Metatable-driven dispatch: __index, __newindex, __add, __eq, __tostring.
use crate::execute;

/// Spec §8 end-to-end scenario 4: `__add` on two setmetatable'd tables.
#[test]
fn test_metamethod_arithmetic() {
    let result = execute(
        r#"
        local mt = {__add = function(a, b) return a.x + b.x end}
        local p = setmetatable({x = 2}, mt)
        local q = setmetatable({x = 3}, mt)
        return p + q
    "#,
    );
    let values = result.expect("scenario 4 must not error");
    assert_eq!(values[0].as_number(), Some(5.0));
}

#[test]
fn test_index_metamethod_function_and_table() {
    let result = execute(
        r#"
        local base = {greet = "hi"}
        local derived = setmetatable({}, {__index = base})
        assert(derived.greet == "hi")

        local dynamic = setmetatable({}, {__index = function(t, k) return k .. "!" end})
        assert(dynamic.anything == "anything!")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_newindex_metamethod_function() {
    let result = execute(
        r#"
        local log = {}
        local t = setmetatable({}, {__newindex = function(t, k, v) log[k] = v end})
        t.x = 10
        assert(rawget(t, "x") == nil)
        assert(log.x == 10)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_eq_metamethod_only_fires_for_like_types() {
    let result = execute(
        r#"
        local mt = {__eq = function(a, b) return a.id == b.id end}
        local a = setmetatable({id = 1}, mt)
        local b = setmetatable({id = 1}, mt)
        local c = setmetatable({id = 2}, mt)
        assert(a == b)
        assert(not (a == c))
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_tostring_metamethod() {
    let result = execute(
        r#"
        local t = setmetatable({}, {__tostring = function(self) return "custom" end})
        assert(tostring(t) == "custom")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
