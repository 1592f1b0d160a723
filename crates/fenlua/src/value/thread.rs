//! `thread` values: a coroutine's own execution state, shared by reference
//! wherever the coroutine value itself is passed around (spec §5).

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::vm::state::LuaState;

#[derive(Clone)]
pub struct ThreadRef(pub(crate) Rc<RefCell<LuaState>>);

impl ThreadRef {
    pub fn new(state: LuaState) -> Self {
        ThreadRef(Rc::new(RefCell::new(state)))
    }

    pub fn borrow(&self) -> Ref<'_, LuaState> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, LuaState> {
        self.0.borrow_mut()
    }
}

impl PartialEq for ThreadRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for ThreadRef {}

impl std::hash::Hash for ThreadRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "thread: {:p}", Rc::as_ptr(&self.0))
    }
}
