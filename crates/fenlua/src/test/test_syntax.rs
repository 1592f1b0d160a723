// Control-flow and expression syntax coverage beyond what test_basic and
// test_closures already exercise.
use crate::execute;

#[test]
fn test_while_and_repeat_until() {
    let result = execute(
        r#"
        local i, count = 0, 0
        while i < 5 do
            i = i + 1
            count = count + 1
        end
        assert(count == 5)

        local j = 0
        repeat
            j = j + 1
        until j >= 3
        assert(j == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_if_elseif_else_chain() {
    let result = execute(
        r#"
        local function classify(n)
            if n < 0 then return "negative"
            elseif n == 0 then return "zero"
            else return "positive" end
        end
        assert(classify(-1) == "negative")
        assert(classify(0) == "zero")
        assert(classify(1) == "positive")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_logical_and_or_short_circuit() {
    let result = execute(
        r#"
        local calls = 0
        local function mark(v) calls = calls + 1 return v end
        local r1 = false and mark(1)
        assert(r1 == false and calls == 0)
        local r2 = true or mark(2)
        assert(r2 == true and calls == 0)
        local r3 = true and mark(3)
        assert(r3 == 3 and calls == 1)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_multiple_assignment_and_swap() {
    let result = execute(
        r#"
        local a, b = 1, 2
        a, b = b, a
        assert(a == 2 and b == 1)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_method_definition_syntax() {
    let result = execute(
        r#"
        local obj = {value = 10}
        function obj:get() return self.value end
        function obj:add(n) self.value = self.value + n end
        assert(obj:get() == 10)
        obj:add(5)
        assert(obj:get() == 15)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

/// Spec §8 end-to-end scenario 3: `xpcall` with a table-valued error and a
/// handler that inspects it.
#[test]
fn test_xpcall_with_table_error_and_handler() {
    let result = execute(
        r#"
        return xpcall(function() error({code = 7}) end, function(e) return "caught:" .. e.code end)
    "#,
    );
    let values = result.expect("scenario 3 must not error");
    assert_eq!(values[0].as_number(), None);
    assert_eq!(values[0].as_str(), None);
    assert!(matches!(values[0], crate::Value::Boolean(false)));
    assert_eq!(values[1].as_str(), Some("caught:7"));
}

/// Spec §8 end-to-end scenario 5: vararg forwarding and `select('#', ...)`.
#[test]
fn test_multi_return_and_vararg_forwarding() {
    let result = execute(
        r#"
        local function f(...)
            return select('#', ...), ...
        end
        return f(10, 20, 30)
    "#,
    );
    let values = result.expect("scenario 5 must not error");
    let nums: Vec<f64> = values.iter().map(|v| v.as_number().unwrap()).collect();
    assert_eq!(nums, vec![3.0, 10.0, 20.0, 30.0]);
}

#[test]
fn test_break_exits_loop_early() {
    let result = execute(
        r#"
        local count = 0
        for i = 1, 100 do
            if i > 5 then break end
            count = count + 1
        end
        return count
    "#,
    );
    let values = result.unwrap();
    assert_eq!(values[0].as_number(), Some(5.0));
}

#[test]
fn test_table_constructor_mixed_array_and_hash() {
    let result = execute(
        r#"
        local t = {1, 2, name = "x", [10] = "ten"}
        assert(t[1] == 1 and t[2] == 2)
        assert(t.name == "x")
        assert(t[10] == "ten")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
