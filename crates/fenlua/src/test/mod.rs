// Test module organization
pub mod test_basic;
pub mod test_closures;
pub mod test_coroutine;
pub mod test_invariants;
pub mod test_metamethods;
pub mod test_roundtrip;
pub mod test_string;
pub mod test_syntax;
pub mod test_table;
