//! Interned Lua strings.

use smol_str::SmolStr;
use std::cell::Cell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::gc::GcColor;

/// A heap-allocated, immutable Lua string.
///
/// All `LuaStr` instances reachable from Lua code are produced by
/// [`crate::gc::StringInterner::intern`], so two strings built from the same
/// byte sequence always share one `Rc<LuaStr>` — this is what lets
/// [`StringRef`] equality and hashing be pointer-based instead of
/// content-based.
pub struct LuaStr {
    pub data: SmolStr,
    pub hash: u64,
    pub(crate) color: Cell<GcColor>,
}

impl LuaStr {
    pub fn as_str(&self) -> &str {
        self.data.as_str()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A shared, interned string reference. Equality and hashing are by pointer
/// identity (spec §3: "interned-pointer identity for strings").
#[derive(Clone)]
pub struct StringRef(pub(crate) Rc<LuaStr>);

impl StringRef {
    pub fn as_str(&self) -> &str {
        self.0.data.as_str()
    }

    pub fn len(&self) -> usize {
        self.0.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.data.is_empty()
    }

    pub fn content_hash(&self) -> u64 {
        self.0.hash
    }

    pub(crate) fn inner(&self) -> &Rc<LuaStr> {
        &self.0
    }

    pub(crate) fn from_rc(rc: Rc<LuaStr>) -> Self {
        StringRef(rc)
    }

    /// Build a string outside the interner. Used for ad-hoc error messages
    /// where identity semantics don't matter; anything that needs to
    /// compare equal to Lua-visible strings must go through
    /// [`crate::gc::StringInterner::intern`] instead.
    pub fn new_uninterned(s: impl Into<smol_str::SmolStr>) -> Self {
        let data = s.into();
        let hash = {
            use std::hash::{Hash, Hasher};
            let mut h = std::collections::hash_map::DefaultHasher::new();
            data.hash(&mut h);
            h.finish()
        };
        StringRef(Rc::new(LuaStr {
            data,
            hash,
            color: Cell::new(GcColor::White),
        }))
    }
}

impl PartialEq for StringRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for StringRef {}

impl Hash for StringRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Pointer-derived hash keeps HashMap<Value, _> consistent with Eq.
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for StringRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl std::fmt::Display for StringRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
