//! Closures and upvalue cells (spec §3 "Upvalue", "Closure").

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;
use crate::vm::error::LuaResult;
use crate::vm::prototype::Prototype;
use crate::vm::state::LuaState;

/// The backing store a thread's value stack lives in. Shared by `Rc` so an
/// open [`Upvalue`] can alias a live stack slot without owning the thread.
pub type StackCell = Rc<RefCell<Vec<Value>>>;

/// A single upvalue cell: either still aliasing a live stack slot (open) or
/// owning its value after the enclosing frame returned (closed).
pub enum Upvalue {
    Open { stack: StackCell, index: usize },
    Closed(Value),
}

impl Upvalue {
    pub fn get(&self) -> Value {
        match self {
            Upvalue::Open { stack, index } => stack.borrow()[*index].clone(),
            Upvalue::Closed(v) => v.clone(),
        }
    }

    pub fn set(&mut self, value: Value) {
        match self {
            Upvalue::Open { stack, index } => stack.borrow_mut()[*index] = value,
            Upvalue::Closed(slot) => *slot = value,
        }
    }

    pub fn is_open_at(&self, stack: &StackCell, index: usize) -> bool {
        matches!(self, Upvalue::Open { stack: s, index: i } if Rc::ptr_eq(s, stack) && *i == index)
    }

    pub fn close(&mut self) {
        if let Upvalue::Open { stack, index } = self {
            let v = stack.borrow()[*index].clone();
            *self = Upvalue::Closed(v);
        }
    }
}

/// Shared handle to an [`Upvalue`]; closures that capture the same local
/// hold the same `UpvalueRef`, which is what makes mutation through one
/// closure visible through the other (spec §8 invariant 5).
#[derive(Clone)]
pub struct UpvalueRef(pub(crate) Rc<RefCell<Upvalue>>);

impl UpvalueRef {
    pub fn new_open(stack: StackCell, index: usize) -> Self {
        UpvalueRef(Rc::new(RefCell::new(Upvalue::Open { stack, index })))
    }

    pub fn new_closed(value: Value) -> Self {
        UpvalueRef(Rc::new(RefCell::new(Upvalue::Closed(value))))
    }

    pub fn get(&self) -> Value {
        self.0.borrow().get()
    }

    pub fn set(&self, value: Value) {
        self.0.borrow_mut().set(value);
    }

    pub fn close(&self) {
        self.0.borrow_mut().close();
    }

    pub fn is_open_at(&self, stack: &StackCell, index: usize) -> bool {
        self.0.borrow().is_open_at(stack, index)
    }
}

/// A native (host-defined) callable: `fn(state) -> i32` per spec §6's
/// native function contract, returning the count of results it pushed.
pub type CFunction = fn(&mut LuaState) -> LuaResult<usize>;

pub struct LuaClosureData {
    pub proto: Rc<Prototype>,
    pub upvalues: Vec<UpvalueRef>,
}

pub struct NativeClosureData {
    pub func: CFunction,
    pub name: &'static str,
    pub upvalues: Vec<UpvalueRef>,
}

/// A function value: either a Lua closure (prototype + captured upvalues)
/// or a native closure (function pointer + optional upvalue cells).
#[derive(Clone)]
pub enum Function {
    Lua(Rc<LuaClosureData>),
    Native(Rc<NativeClosureData>),
}

impl Function {
    pub fn new_lua(proto: Rc<Prototype>, upvalues: Vec<UpvalueRef>) -> Self {
        Function::Lua(Rc::new(LuaClosureData { proto, upvalues }))
    }

    pub fn new_native(name: &'static str, func: CFunction) -> Self {
        Function::Native(Rc::new(NativeClosureData {
            func,
            name,
            upvalues: Vec::new(),
        }))
    }

    pub fn is_lua(&self) -> bool {
        matches!(self, Function::Lua(_))
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Lua(a), Function::Lua(b)) => Rc::ptr_eq(a, b),
            (Function::Native(a), Function::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
impl Eq for Function {}

impl std::hash::Hash for Function {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Function::Lua(rc) => (Rc::as_ptr(rc) as usize).hash(state),
            Function::Native(rc) => (Rc::as_ptr(rc) as usize).hash(state),
        }
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Function::Lua(rc) => write!(f, "function: {:p}", Rc::as_ptr(rc)),
            Function::Native(rc) => write!(f, "function: builtin#{}", rc.name),
        }
    }
}
