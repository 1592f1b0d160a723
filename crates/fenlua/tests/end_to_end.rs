//! Black-box integration suite for the six end-to-end scenarios of spec §8.
//! Each test runs a small source string through [`fenlua::execute`] exactly
//! as a host embedding this crate would, and checks only the returned
//! values — no VM internals.

use fenlua::Value;

fn run(source: &str) -> Vec<Value> {
    fenlua::execute(source).unwrap_or_else(|e| panic!("unexpected error: {}", e))
}

#[test]
fn scenario_1_closure_capture_across_loop() {
    let values = run(
        r#"
        local t = {}
        for i=1,3 do t[i] = function() return i end end
        return t[1](), t[2](), t[3]()
    "#,
    );
    let nums: Vec<f64> = values.iter().map(|v| v.as_number().unwrap()).collect();
    assert_eq!(nums, vec![1.0, 2.0, 3.0]);
}

#[test]
fn scenario_2_tail_call_depth() {
    let values = run(
        r#"
        local function f(n) if n==0 then return "ok" end return f(n-1) end
        return f(1000000)
    "#,
    );
    assert_eq!(values[0].as_str(), Some("ok"));
}

#[test]
fn scenario_3_protected_error_with_handler() {
    let values = run(
        r#"
        return xpcall(function() error({code=7}) end, function(e) return "caught:"..e.code end)
    "#,
    );
    assert!(matches!(values[0], Value::Boolean(false)));
    assert_eq!(values[1].as_str(), Some("caught:7"));
}

#[test]
fn scenario_4_metamethod_arithmetic() {
    let values = run(
        r#"
        local mt={__add=function(a,b) return a.x+b.x end}
        local p=setmetatable({x=2},mt); local q=setmetatable({x=3},mt); return p+q
    "#,
    );
    assert_eq!(values[0].as_number(), Some(5.0));
}

#[test]
fn scenario_5_multi_return_and_vararg() {
    let values = run(
        r#"
        local function f(...) return select('#',...), ... end return f(10,20,30)
    "#,
    );
    let nums: Vec<f64> = values.iter().map(|v| v.as_number().unwrap()).collect();
    assert_eq!(nums, vec![3.0, 10.0, 20.0, 30.0]);
}

#[test]
fn scenario_6_string_concatenation_chain() {
    let values = run(
        r#"
        local s = "" for i=1,4 do s = s..i end return s
    "#,
    );
    assert_eq!(values[0].as_str(), Some("1234"));
}
