//! Hybrid array+hash table implementation (spec §3 "Table").

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::gc::GcColor;
use crate::value::Value;

/// The runtime table object. `array` holds values for integer keys `1..=n`
/// (never storing a `nil` below its live extent); everything else lives in
/// `hash`, keyed by any non-nil `Value`.
pub struct Table {
    pub(crate) array: Vec<Value>,
    pub(crate) hash: hashbrown::HashMap<Value, Value, ahash::RandomState>,
    pub(crate) metatable: Option<Rc<RefCell<Table>>>,
    pub(crate) color: Cell<GcColor>,
}

/// Shared, mutable reference to a table (spec §3: "shared, mutable
/// reference").
#[derive(Clone)]
pub struct TableRef(pub(crate) Rc<RefCell<Table>>);

impl Table {
    pub fn new() -> Self {
        Table {
            array: Vec::new(),
            hash: hashbrown::HashMap::with_hasher(ahash::RandomState::new()),
            metatable: None,
            color: Cell::new(GcColor::White),
        }
    }

    pub fn with_capacity(narr: usize, nhash: usize) -> Self {
        Table {
            array: Vec::with_capacity(narr),
            hash: hashbrown::HashMap::with_capacity_and_hasher(nhash, ahash::RandomState::new()),
            metatable: None,
            color: Cell::new(GcColor::White),
        }
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone().map(TableRef)
    }

    pub fn set_metatable(&mut self, mt: Option<TableRef>) {
        self.metatable = mt.map(|t| t.0);
    }

    /// Raw get, no metamethods.
    pub fn raw_get(&self, key: &Value) -> Value {
        if let Some(i) = as_array_index(key) {
            if i >= 1 && (i as usize) <= self.array.len() {
                return self.array[i as usize - 1].clone();
            }
        }
        self.hash.get(key).cloned().unwrap_or(Value::Nil)
    }

    /// Raw set, no metamethods. `key` must not be `Value::Nil`.
    pub fn raw_set(&mut self, key: Value, value: Value) {
        if let Some(i) = as_array_index(&key) {
            if i >= 1 && (i as usize) <= self.array.len() {
                self.array[i as usize - 1] = value;
                if matches!(self.array.last(), Some(Value::Nil)) {
                    self.shrink_array_tail();
                }
                return;
            }
            if i as usize == self.array.len() + 1 && !matches!(value, Value::Nil) {
                self.array.push(value);
                self.migrate_from_hash();
                return;
            }
        }
        if matches!(value, Value::Nil) {
            self.hash.remove(&key);
        } else {
            self.hash.insert(key, value);
        }
    }

    /// After appending to the array part, pull in any hash-part entries that
    /// now form a contiguous run, matching Lua's array/hash rebalancing.
    fn migrate_from_hash(&mut self) {
        loop {
            let next = (self.array.len() + 1) as i64;
            match self.hash.remove(&Value::Number(next as f64)) {
                Some(v) if !matches!(v, Value::Nil) => self.array.push(v),
                Some(_) => break,
                None => break,
            }
        }
    }

    fn shrink_array_tail(&mut self) {
        while matches!(self.array.last(), Some(Value::Nil)) {
            self.array.pop();
        }
    }

    /// A border of the table: `i` such that `t[i]` is non-nil and `t[i+1]`
    /// is nil (spec §3, §8 invariant 7). Any valid border may be returned
    /// when the table has holes.
    pub fn length(&self) -> i64 {
        if !self.array.is_empty() && !matches!(self.array.last(), Some(Value::Nil)) {
            // Array extent is itself a border unless the hash part
            // continues the sequence (rare: migrate_from_hash keeps this
            // in sync on append, but direct raw_set into hash can still
            // leave a continuation there).
            let mut n = self.array.len() as i64;
            while !matches!(self.hash.get(&Value::Number((n + 1) as f64)), None | Some(Value::Nil))
            {
                n += 1;
            }
            return n;
        }
        if self.array.is_empty() {
            if self.hash.is_empty()
                || matches!(self.hash.get(&Value::Number(1.0)), None | Some(Value::Nil))
            {
                return 0;
            }
            // Unbounded search doubling, then binary search, as luaH_getn.
            let mut i: i64 = 1;
            let mut j: i64 = 2;
            while !matches!(self.hash.get(&Value::Number(j as f64)), None | Some(Value::Nil)) {
                i = j;
                if j > i64::MAX / 2 {
                    // fall back to linear probing to avoid overflow
                    let mut k = 1;
                    while !matches!(self.hash.get(&Value::Number(k as f64)), None | Some(Value::Nil)) {
                        k += 1;
                    }
                    return k - 1;
                }
                j *= 2;
            }
            while j - i > 1 {
                let m = (i + j) / 2;
                if matches!(self.hash.get(&Value::Number(m as f64)), None | Some(Value::Nil)) {
                    j = m;
                } else {
                    i = m;
                }
            }
            return i;
        }
        // Array part has a hole: binary search within it for a border.
        let mut lo: usize = 0;
        let mut hi = self.array.len();
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if matches!(self.array[mid - 1], Value::Nil) {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo as i64
    }

    /// `next(key)` iteration order: array part first (in index order), then
    /// hash part (in map iteration order).
    pub fn next_key(&self, key: &Value) -> Option<(Value, Value)> {
        let array_start = match key {
            Value::Nil => 0,
            _ => {
                if let Some(i) = as_array_index(key) {
                    if i >= 1 && (i as usize) <= self.array.len() {
                        i as usize
                    } else {
                        return self.next_in_hash(Some(key));
                    }
                } else {
                    return self.next_in_hash(Some(key));
                }
            }
        };
        for idx in array_start..self.array.len() {
            if !matches!(self.array[idx], Value::Nil) {
                return Some((Value::Number((idx + 1) as f64), self.array[idx].clone()));
            }
        }
        self.next_in_hash(None)
    }

    fn next_in_hash(&self, after: Option<&Value>) -> Option<(Value, Value)> {
        let mut iter = self.hash.iter();
        match after {
            None => iter.next().map(|(k, v)| (k.clone(), v.clone())),
            Some(key) => {
                let mut found = false;
                for (k, v) in iter.by_ref() {
                    if found {
                        return Some((k.clone(), v.clone()));
                    }
                    if k == key {
                        found = true;
                    }
                }
                None
            }
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

fn as_array_index(key: &Value) -> Option<i64> {
    match key {
        Value::Number(n) => {
            let i = *n as i64;
            if i as f64 == *n { Some(i) } else { None }
        }
        _ => None,
    }
}

impl TableRef {
    pub fn new() -> Self {
        TableRef(Rc::new(RefCell::new(Table::new())))
    }

    pub fn with_capacity(narr: usize, nhash: usize) -> Self {
        TableRef(Rc::new(RefCell::new(Table::with_capacity(narr, nhash))))
    }

    pub fn borrow(&self) -> std::cell::Ref<'_, Table> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    pub(crate) fn inner(&self) -> &Rc<RefCell<Table>> {
        &self.0
    }
}

impl Default for TableRef {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for TableRef {}

impl std::hash::Hash for TableRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table: {:p}", Rc::as_ptr(&self.0))
    }
}
