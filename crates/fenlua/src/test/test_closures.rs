// Closure capture, shared-upvalue, and recursion tests (spec §8 invariant 5
// and end-to-end scenario 1).
use crate::execute;

#[test]
fn test_simple_closure() {
    let result = execute(
        r#"
        local function make_counter()
            local count = 0
            return function()
                count = count + 1
                return count
            end
        end
        local counter = make_counter()
        assert(counter() == 1)
        assert(counter() == 2)
        assert(counter() == 3)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_multiple_closures_share_upvalue() {
    let result = execute(
        r#"
        local function make_getset()
            local value = 10
            local function get() return value end
            local function set(v) value = v end
            return get, set
        end
        local get, set = make_getset()
        assert(get() == 10)
        set(20)
        assert(get() == 20)
        set(30)
        assert(get() == 30)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_nested_closures() {
    let result = execute(
        r#"
        local function outer(x)
            return function(y)
                return function(z)
                    return x + y + z
                end
            end
        end
        assert(outer(10)(20)(30) == 60)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

/// Spec §8 end-to-end scenario 1: each loop iteration's `i` is a distinct
/// local, so closures created in different iterations must NOT share one
/// upvalue cell.
#[test]
fn test_closure_captures_distinct_loop_variable_per_iteration() {
    let result = execute(
        r#"
        local t = {}
        for i = 1, 3 do
            t[i] = function() return i end
        end
        return t[1](), t[2](), t[3]()
    "#,
    );
    let values = result.expect("scenario 1 must not error");
    let nums: Vec<f64> = values.iter().map(|v| v.as_number().unwrap()).collect();
    assert_eq!(nums, vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_closure_modifies_shared_upvalue_across_loop_bodies() {
    let result = execute(
        r#"
        local sum = 0
        local adders = {}
        for i = 1, 3 do
            adders[i] = function(x)
                sum = sum + x
                return sum
            end
        end
        assert(adders[1](10) == 10)
        assert(adders[2](5) == 15)
        assert(adders[3](3) == 18)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_closure_factory_pattern() {
    let result = execute(
        r#"
        local function make_adder(n)
            return function(x) return x + n end
        end
        local add5 = make_adder(5)
        local add10 = make_adder(10)
        assert(add5(3) == 8)
        assert(add10(3) == 13)
        assert(add5(7) == 12)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_closure_recursive_upvalue() {
    let result = execute(
        r#"
        local function make_factorial()
            local fact
            fact = function(n)
                if n <= 1 then return 1
                else return n * fact(n - 1) end
            end
            return fact
        end
        local f = make_factorial()
        assert(f(5) == 120)
        assert(f(6) == 720)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_closure_mutually_recursive() {
    let result = execute(
        r#"
        local is_even, is_odd
        is_even = function(n)
            if n == 0 then return true else return is_odd(n - 1) end
        end
        is_odd = function(n)
            if n == 0 then return false else return is_even(n - 1) end
        end
        assert(is_even(4) == true)
        assert(is_odd(5) == true)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_closure_returning_multiple_values() {
    let result = execute(
        r#"
        local function make_pair(a, b)
            return function() return a, b end
        end
        local x, y = make_pair(10, 20)()
        assert(x == 10 and y == 20)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

/// Spec §8 end-to-end scenario 2: tail calls must not grow the call stack,
/// so a million-deep self tail call finishes instead of overflowing.
#[test]
fn test_tail_call_depth_unbounded() {
    let result = execute(
        r#"
        local function f(n)
            if n == 0 then return "ok" end
            return f(n - 1)
        end
        return f(1000000)
    "#,
    );
    let values = result.expect("deep tail recursion must not overflow the host stack");
    assert_eq!(values[0].as_str(), Some("ok"));
}
