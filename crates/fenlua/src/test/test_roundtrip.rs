// Round-trip / idempotence laws (spec §8). No pretty-printer exists in this
// crate, so the parse-print-parse law is vacuous here; the other two laws
// get their own focused coverage (test_invariants covers the basic cases).
use crate::execute;

#[test]
fn test_tonumber_tostring_roundtrip_on_floats() {
    let result = execute(
        r#"
        local cases = {"0.5", "1.25", "10.1", "0.1"}
        for _, s in ipairs(cases) do
            assert(tostring(tonumber(s)) == s, s)
        end
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_pcall_error_roundtrip_preserves_identity_for_reference_values() {
    let result = execute(
        r#"
        local original = {message = "x"}
        local ok, caught = pcall(error, original)
        assert(ok == false)
        assert(caught == original)
        assert(caught.message == "x")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_pcall_error_roundtrip_with_nil_and_boolean() {
    let result = execute(
        r#"
        local ok1, v1 = pcall(error, nil)
        assert(ok1 == false and v1 == nil)

        local ok2, v2 = pcall(error, false)
        assert(ok2 == false and v2 == false)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
