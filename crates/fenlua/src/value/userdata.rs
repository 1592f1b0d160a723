//! Opaque host userdata (spec §3: "userdata, optional").

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::value::table::TableRef;

pub struct Userdata {
    pub data: RefCell<Box<dyn Any>>,
    pub metatable: RefCell<Option<TableRef>>,
    pub type_name: &'static str,
}

#[derive(Clone)]
pub struct UserdataRef(pub(crate) Rc<Userdata>);

impl UserdataRef {
    pub fn new<T: Any>(type_name: &'static str, value: T) -> Self {
        UserdataRef(Rc::new(Userdata {
            data: RefCell::new(Box::new(value)),
            metatable: RefCell::new(None),
            type_name,
        }))
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.0.metatable.borrow().clone()
    }

    pub fn set_metatable(&self, mt: Option<TableRef>) {
        *self.0.metatable.borrow_mut() = mt;
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<std::cell::Ref<'_, T>> {
        let r = self.0.data.borrow();
        if (*r).is::<T>() {
            Some(std::cell::Ref::map(r, |b| b.downcast_ref::<T>().unwrap()))
        } else {
            None
        }
    }

    pub fn downcast_mut<T: Any>(&self) -> Option<std::cell::RefMut<'_, T>> {
        let r = self.0.data.borrow_mut();
        if (*r).is::<T>() {
            Some(std::cell::RefMut::map(r, |b| {
                b.downcast_mut::<T>().unwrap()
            }))
        } else {
            None
        }
    }
}

impl PartialEq for UserdataRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for UserdataRef {}

impl std::hash::Hash for UserdataRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for UserdataRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "userdata: {}@{:p}", self.0.type_name, Rc::as_ptr(&self.0))
    }
}

/// Marker trait for host types embeddable as Lua userdata. `#[derive(UserData)]`
/// in `fenlua-derive` implements `type_name` from the struct's name (or a
/// `#[lua(name = "...")]` override); `into_userdata` is a free conversion to
/// the opaque, `Any`-backed [`UserdataRef`] every VM-visible userdata value
/// actually is.
pub trait UserData: Any {
    fn type_name() -> &'static str
    where
        Self: Sized;

    fn into_userdata(self) -> UserdataRef
    where
        Self: Sized + 'static,
    {
        UserdataRef::new(Self::type_name(), self)
    }
}
