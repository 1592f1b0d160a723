//! String interning (spec §3 "String", §8 invariant 8).

use std::cell::Cell;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::rc::Rc;

use smol_str::SmolStr;

use super::GcColor;
use crate::value::string::{LuaStr, StringRef};

/// Deduplicates strings by content hash so that two strings built from the
/// same bytes are always the same `Rc<LuaStr>` — this is what lets
/// [`StringRef`] equality be pointer-based (spec invariant 8).
pub struct StringInterner {
    map: HashMap<u64, Vec<Rc<LuaStr>>, ahash::RandomState>,
    hasher: ahash::RandomState,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner {
            map: HashMap::with_hasher(ahash::RandomState::new()),
            hasher: ahash::RandomState::new(),
        }
    }

    pub fn intern(&mut self, s: &str) -> StringRef {
        let hash = self.hash_of(s);
        if let Some(bucket) = self.map.get(&hash) {
            if let Some(existing) = bucket.iter().find(|rc| rc.as_str() == s) {
                return StringRef::from_rc(existing.clone());
            }
        }
        let rc = Rc::new(LuaStr {
            data: SmolStr::new(s),
            hash,
            color: Cell::new(GcColor::White),
        });
        self.map.entry(hash).or_default().push(rc.clone());
        StringRef::from_rc(rc)
    }

    fn hash_of(&self, s: &str) -> u64 {
        let mut h = self.hasher.build_hasher();
        s.hash(&mut h);
        h.finish()
    }

    /// Drop interner entries whose only remaining reference is the
    /// interner's own bucket (i.e. no live `StringRef` points at them
    /// anymore). Cheap enough to run alongside table GC cycles.
    pub fn sweep_dead(&mut self) {
        self.map.retain(|_, bucket| {
            bucket.retain(|rc| Rc::strong_count(rc) > 1);
            !bucket.is_empty()
        });
    }

    pub fn live_count(&self) -> usize {
        self.map.values().map(|b| b.len()).sum()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}
