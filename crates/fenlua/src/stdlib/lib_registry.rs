//! Library registration: a module is a named table of `CFunction`/value
//! entries plus an optional initializer, installed into a [`LuaState`] by
//! [`LibraryRegistry::load_all`] (spec §6 "library module registration
//! contract", teacher's exact builder/macro shape).

use crate::value::{CFunction, Function, TableRef, Value};
use crate::vm::error::LuaResult;
use crate::vm::state::LuaState;

/// A value computed once, when its module loads (for things like
/// `math.huge`/`math.pi` that aren't functions).
pub type ValueInitializer = fn(&LuaState) -> Value;

/// Runs after a module's table has been populated, for setup that doesn't
/// fit the entries list (e.g. the string library installing itself as the
/// shared string metatable's `__index`).
pub type ModuleInitializer = fn(&mut LuaState, &TableRef) -> LuaResult<()>;

pub enum LibraryEntry {
    Function(CFunction),
    Value(ValueInitializer),
}

pub struct LibraryModule {
    pub name: &'static str,
    pub entries: Vec<(&'static str, LibraryEntry)>,
    pub initializer: Option<ModuleInitializer>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        LibraryModule {
            name,
            entries: Vec::new(),
            initializer: None,
        }
    }

    pub fn with_function(mut self, name: &'static str, func: CFunction) -> Self {
        self.entries.push((name, LibraryEntry::Function(func)));
        self
    }

    pub fn with_value(mut self, name: &'static str, init: ValueInitializer) -> Self {
        self.entries.push((name, LibraryEntry::Value(init)));
        self
    }

    pub fn with_initializer(mut self, init: ModuleInitializer) -> Self {
        self.initializer = Some(init);
        self
    }
}

/// Builds a [`LibraryModule`] from a `name => entries` literal map, the
/// common case of every entry being a plain function.
#[macro_export]
macro_rules! lib_module {
    ($name:expr, { $($item_name:expr => $item:expr),* $(,)? }) => {{
        let mut module = $crate::stdlib::lib_registry::LibraryModule::new($name);
        $(
            module.entries.push(($item_name, $crate::stdlib::lib_registry::LibraryEntry::Function($item)));
        )*
        module
    }};
}

/// Registered modules, installed in insertion order so later modules (e.g.
/// `coroutine`) can assume earlier ones (`basic`) already set up globals.
pub struct LibraryRegistry {
    modules: Vec<LibraryModule>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        LibraryRegistry { modules: Vec::new() }
    }

    pub fn register(&mut self, module: LibraryModule) {
        self.modules.push(module);
    }

    pub fn load_all(&self, state: &mut LuaState) -> LuaResult<()> {
        for module in &self.modules {
            self.load_module(state, module)?;
        }
        Ok(())
    }

    fn load_module(&self, state: &mut LuaState, module: &LibraryModule) -> LuaResult<()> {
        if module.name == "_G" {
            for (name, entry) in &module.entries {
                let value = self.entry_value(state, *name, entry);
                let key = Value::String(state.intern(name));
                state.globals().borrow_mut().raw_set(key, value);
            }
            if let Some(init) = module.initializer {
                let globals = state.globals();
                init(state, &globals)?;
            }
            return Ok(());
        }

        let table = TableRef::with_capacity(0, module.entries.len());
        for (name, entry) in &module.entries {
            let value = self.entry_value(state, *name, entry);
            let key = Value::String(state.intern(name));
            table.borrow_mut().raw_set(key, value);
        }
        let name_key = Value::String(state.intern(module.name));
        state.globals().borrow_mut().raw_set(name_key, Value::Table(table.clone()));
        if let Some(init) = module.initializer {
            init(state, &table)?;
        }
        Ok(())
    }

    fn entry_value(&self, state: &LuaState, name: &'static str, entry: &LibraryEntry) -> Value {
        match entry {
            LibraryEntry::Function(f) => Value::Function(Function::new_native(name, *f)),
            LibraryEntry::Value(init) => init(state),
        }
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a 1-based argument (Lua convention) from the current native call's
/// arguments, or `Value::Nil` past the end (spec §6 "native function calling
/// convention" — missing arguments read as nil, not an error).
pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index.saturating_sub(1)).cloned().unwrap_or(Value::Nil)
}

/// Like [`arg`], but raises a catchable error naming `func_name` when the
/// argument is missing entirely (as opposed to present-but-nil).
pub fn require_arg(state: &LuaState, args: &[Value], index: usize, func_name: &str) -> LuaResult<Value> {
    if index == 0 || index > args.len() {
        return Err(state.error(format!("bad argument #{} to '{}' (value expected)", index, func_name)));
    }
    Ok(args[index - 1].clone())
}
