// Spec §8 invariants that are best exercised as whole-program behavior
// rather than white-box checks against VM internals.
use crate::execute;

/// Invariant 6: `for i = a, b, s` runs exactly
/// `floor((b - a) / s) + 1` times for `s > 0`, symmetrically for `s < 0`.
#[test]
fn test_numeric_for_iteration_count_positive_step() {
    let result = execute(
        r#"
        local count = 0
        for i = 1, 10, 3 do
            count = count + 1
        end
        return count
    "#,
    );
    let values = result.unwrap();
    // floor((10 - 1) / 3) + 1 == 4
    assert_eq!(values[0].as_number(), Some(4.0));
}

#[test]
fn test_numeric_for_iteration_count_negative_step() {
    let result = execute(
        r#"
        local count = 0
        for i = 10, 1, -3 do
            count = count + 1
        end
        return count
    "#,
    );
    let values = result.unwrap();
    assert_eq!(values[0].as_number(), Some(4.0));
}

#[test]
fn test_numeric_for_zero_step_is_a_runtime_error() {
    let result = execute("for i = 1, 10, 0 do end");
    assert!(result.is_err());
}

#[test]
fn test_numeric_for_empty_range_runs_zero_times() {
    let result = execute(
        r#"
        local count = 0
        for i = 10, 1 do count = count + 1 end
        return count
    "#,
    );
    let values = result.unwrap();
    assert_eq!(values[0].as_number(), Some(0.0));
}

/// Invariant 4: after `pcall(f, ...)` returns, the stack height is restored
/// regardless of whether `f` errored — exercised indirectly by running many
/// succeeding and failing calls back to back without the host stack growing
/// unboundedly or later calls seeing leftover values.
#[test]
fn test_pcall_restores_stack_height_across_success_and_failure() {
    let result = execute(
        r#"
        for i = 1, 1000 do
            local ok = pcall(function() return 1, 2, 3 end)
            local ok2 = pcall(function() error("x") end)
            assert(ok == true)
            assert(ok2 == false)
        end
        local a, b = pcall(function() return 42 end)
        assert(a == true and b == 42)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

/// Invariant 5: closures capturing the same local observe identical values.
#[test]
fn test_shared_upvalue_identical_observation() {
    let result = execute(
        r#"
        local x = 1
        local function get() return x end
        local function set(v) x = v end
        assert(get() == 1)
        set(99)
        assert(get() == 99)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

/// Invariant 8: string interning — strings built from the same bytes via
/// different code paths (literal vs. concatenation vs. `tostring`) must
/// still compare `rawequal` (pointer-identity under the hood).
#[test]
fn test_string_interning_pointer_identity_across_construction_paths() {
    let result = execute(
        r#"
        local a = "hello"
        local b = "hel" .. "lo"
        local c = string.sub("hello world", 1, 5)
        assert(rawequal(a, b))
        assert(rawequal(a, c))
        local t = {}
        t[a] = 1
        assert(t[b] == 1)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

/// Round-trip law: `pcall(error, v)` returns `(false, v)` for any value.
#[test]
fn test_pcall_error_roundtrip_law() {
    let result = execute(
        r#"
        local ok, v = pcall(error, "plain string")
        assert(ok == false and v == "plain string")

        local t = {}
        local ok2, v2 = pcall(error, t)
        assert(ok2 == false and v2 == t)

        local ok3, v3 = pcall(error, 42)
        assert(ok3 == false and v3 == 42)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

/// Round-trip law: `tostring(tonumber(s)) == s` for canonical decimals.
#[test]
fn test_tonumber_tostring_roundtrip_law() {
    let result = execute(
        r#"
        local cases = {"0", "1", "42", "3.5", "100", "-7"}
        for _, s in ipairs(cases) do
            assert(tostring(tonumber(s)) == s, s)
        end
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
