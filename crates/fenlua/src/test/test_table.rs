// Tests for the table and math libraries.
use crate::execute;

#[test]
fn test_table_insert_append_and_positional() {
    let result = execute(
        r#"
        local t = {1, 2, 3}
        table.insert(t, 4)
        assert(t[4] == 4)
        table.insert(t, 1, 0)
        assert(t[1] == 0 and t[2] == 1 and t[5] == 4)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_table_remove() {
    let result = execute(
        r#"
        local t = {10, 20, 30}
        local removed = table.remove(t)
        assert(removed == 30 and #t == 2)
        local first = table.remove(t, 1)
        assert(first == 10 and t[1] == 20)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_table_concat() {
    let result = execute(
        r#"
        assert(table.concat({1, 2, 3}) == "123")
        assert(table.concat({"a", "b", "c"}, "-") == "a-b-c")
        assert(table.concat({1, 2, 3, 4}, ",", 2, 3) == "2,3")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_table_concat_rejects_non_scalar_entries() {
    let result = execute(r#"table.concat({1, {}, 3})"#);
    assert!(result.is_err());
}

/// Spec §8 invariant 7: `#t` must return *a* border, not necessarily any
/// particular one, for a table with holes — only the no-holes case is
/// pinned down precisely here.
#[test]
fn test_length_operator_on_array_without_holes() {
    let result = execute(
        r#"
        local t = {1, 2, 3, 4, 5}
        return #t
    "#,
    );
    let values = result.expect("length of a hole-free array must not error");
    assert_eq!(values[0].as_number(), Some(5.0));
}

#[test]
fn test_math_functions() {
    let result = execute(
        r#"
        assert(math.floor(3.7) == 3)
        assert(math.ceil(3.2) == 4)
        assert(math.abs(-5) == 5)
        assert(math.sqrt(16) == 4)
        assert(math.max(1, 5, 3) == 5)
        assert(math.min(1, 5, 3) == 1)
        assert(math.huge > 0)
        assert(math.pi > 3.14 and math.pi < 3.15)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
