// Tests for the coroutine library.
use crate::execute;

#[test]
fn test_create_resume_basic() {
    let result = execute(
        r#"
        local co = coroutine.create(function(a, b)
            return a + b
        end)
        local ok, sum = coroutine.resume(co, 3, 4)
        assert(ok == true and sum == 7)
        assert(coroutine.status(co) == "dead")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_yield_and_resume_roundtrip() {
    let result = execute(
        r#"
        local co = coroutine.create(function(x)
            local y = coroutine.yield(x + 1)
            return y + 1
        end)
        local ok1, v1 = coroutine.resume(co, 10)
        assert(ok1 == true and v1 == 11)
        assert(coroutine.status(co) == "suspended")
        local ok2, v2 = coroutine.resume(co, 20)
        assert(ok2 == true and v2 == 21)
        assert(coroutine.status(co) == "dead")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_resume_after_error_reports_failure_not_crash() {
    let result = execute(
        r#"
        local co = coroutine.create(function() error("boom") end)
        local ok, err = coroutine.resume(co)
        assert(ok == false)
        assert(coroutine.status(co) == "dead")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_yield_outside_coroutine_is_an_error() {
    let result = execute("coroutine.yield()");
    assert!(result.is_err());
}

#[test]
fn test_wrap_raises_instead_of_returning_status() {
    let result = execute(
        r#"
        local next_val = coroutine.wrap(function()
            coroutine.yield(1)
            coroutine.yield(2)
        end)
        assert(next_val() == 1)
        assert(next_val() == 2)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_wrap_propagates_error_to_caller() {
    let result = execute(
        r#"
        local f = coroutine.wrap(function() error("wrapped boom") end)
        f()
    "#,
    );
    assert!(result.is_err());
}
