//! Per-thread execution state and the state shared across every thread of
//! one Lua universe (spec §3 "LuaState"/"GlobalState", §5 coroutines).

use std::rc::Rc;

use crate::gc::{Gc, StringInterner};
use crate::value::closure::{StackCell, UpvalueRef};
use crate::value::{Function, StringRef, TableRef, Value};
use crate::vm::call_info::{status, CallInfo, MULTRET};
use crate::vm::call_stack::CallStack;
use crate::vm::error::{LuaError, LuaResult};
use crate::vm::safe_option::SafeOption;
use crate::vm::stack::Stack;

/// State shared by the main thread and every coroutine spawned from it:
/// the global table, the registry, the string intern table, and the
/// collector. Coroutines are separate [`LuaState`]s that hold an `Rc` to
/// the same `GlobalState` (spec §5: "share globals, the string table, and
/// the registry; do not share a call stack or register stack").
pub struct GlobalState {
    pub globals: TableRef,
    pub registry: TableRef,
    pub string_interner: std::cell::RefCell<StringInterner>,
    pub gc: std::cell::RefCell<Gc>,
    pub string_metatable: std::cell::RefCell<Option<TableRef>>,
}

impl GlobalState {
    pub fn new() -> Self {
        GlobalState {
            globals: TableRef::new(),
            registry: TableRef::new(),
            string_interner: std::cell::RefCell::new(StringInterner::new()),
            gc: std::cell::RefCell::new(Gc::new()),
            string_metatable: std::cell::RefCell::new(None),
        }
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Coroutine status (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Suspended,
    Running,
    Normal,
    Dead,
}

pub struct LuaState {
    pub(crate) globals_state: Rc<GlobalState>,
    stack: Stack,
    call_stack: CallStack,
    /// Live open upvalues, kept sorted by descending stack index so
    /// `close_upvalues` can stop at the first one below the cutoff.
    open_upvalues: Vec<UpvalueRef>,
    pub safe_option: SafeOption,
    is_main: bool,
    pub status: ThreadStatus,
    /// Result arity the yielding native call's *caller* wanted, stashed by
    /// `call_native` right before its own `CallInfo` is popped so `resume`
    /// can splice the resume arguments back in as if they were that call's
    /// return values (spec §5, DESIGN.md "yield propagation").
    pending_yield_nresults: std::cell::Cell<i32>,
    /// The absolute stack index the yielding call was set up at — the same
    /// `func_idx` a normal return would have truncated back down to.
    pending_yield_func_idx: std::cell::Cell<usize>,
}

impl LuaState {
    pub fn new() -> Self {
        LuaState::with_options(SafeOption::default())
    }

    pub fn with_options(safe_option: SafeOption) -> Self {
        LuaState {
            globals_state: Rc::new(GlobalState::new()),
            stack: Stack::new(),
            call_stack: CallStack::new(),
            open_upvalues: Vec::new(),
            safe_option,
            is_main: true,
            status: ThreadStatus::Running,
            pending_yield_nresults: std::cell::Cell::new(MULTRET),
            pending_yield_func_idx: std::cell::Cell::new(0),
        }
    }

    /// Spawn a coroutine thread sharing this state's globals/registry/string
    /// table but with its own stack and call stack.
    pub fn new_thread(&self) -> LuaState {
        LuaState {
            globals_state: Rc::clone(&self.globals_state),
            stack: Stack::new(),
            call_stack: CallStack::new(),
            open_upvalues: Vec::new(),
            safe_option: self.safe_option.clone(),
            is_main: false,
            status: ThreadStatus::Suspended,
            pending_yield_nresults: std::cell::Cell::new(MULTRET),
            pending_yield_func_idx: std::cell::Cell::new(0),
        }
    }

    pub fn is_main(&self) -> bool {
        self.is_main
    }

    // ---- globals / registry / interning ----------------------------------

    pub fn globals(&self) -> TableRef {
        self.globals_state.globals.clone()
    }

    pub fn registry(&self) -> TableRef {
        self.globals_state.registry.clone()
    }

    pub fn intern(&self, s: &str) -> StringRef {
        self.globals_state.string_interner.borrow_mut().intern(s)
    }

    pub fn string_metatable(&self) -> Option<TableRef> {
        self.globals_state.string_metatable.borrow().clone()
    }

    pub fn set_string_metatable(&self, mt: Option<TableRef>) {
        *self.globals_state.string_metatable.borrow_mut() = mt;
    }

    /// The metatable consulted for metamethod lookup on `v`: per-instance
    /// for tables/userdata, the shared one for strings, none for anything
    /// else (spec §4.5).
    pub fn metatable_of(&self, v: &Value) -> Option<TableRef> {
        match v {
            Value::Table(t) => t.borrow().metatable(),
            Value::Userdata(u) => u.metatable(),
            Value::String(_) => self.string_metatable(),
            _ => None,
        }
    }

    // ---- stack -------------------------------------------------------------

    pub fn stack_cells(&self) -> &StackCell {
        self.stack.cells()
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn stack_get(&self, index: usize) -> Value {
        self.stack.get(index)
    }

    pub fn stack_set(&self, index: usize, value: Value) {
        self.stack.set(index, value);
    }

    pub fn push(&self, value: Value) -> LuaResult<()> {
        if self.stack.len() >= self.safe_option.max_stack_size {
            return Err(self.error("stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&self) -> Value {
        self.stack.pop().unwrap_or(Value::Nil)
    }

    pub fn truncate_stack(&self, len: usize) {
        self.close_upvalues(len);
        self.stack.truncate(len);
    }

    pub fn ensure_stack_len(&self, len: usize) -> LuaResult<()> {
        if len > self.safe_option.max_stack_size {
            return Err(self.error("stack overflow"));
        }
        self.stack.ensure_len(len);
        Ok(())
    }

    pub fn stack_slice(&self, from: usize, to: usize) -> Vec<Value> {
        self.stack.slice(from, to)
    }

    /// Arguments passed to the currently-running native function: every
    /// slot from its frame's base to the current stack top. Native
    /// functions read their arguments this way rather than through a
    /// fixed-arity parameter list (spec §6 "native function calling
    /// convention").
    pub fn native_args(&self) -> Vec<Value> {
        let base = self.current_frame().map(|f| f.base).unwrap_or(0);
        self.stack.slice(base, self.stack.len())
    }

    pub(crate) fn take_pending_yield_nresults(&self) -> i32 {
        let n = self.pending_yield_nresults.get();
        self.pending_yield_nresults.set(MULTRET);
        n
    }

    pub(crate) fn set_pending_yield_nresults(&self, n: i32) {
        self.pending_yield_nresults.set(n);
    }

    pub(crate) fn pending_yield_func_idx(&self) -> usize {
        self.pending_yield_func_idx.get()
    }

    pub(crate) fn set_pending_yield_func_idx(&self, idx: usize) {
        self.pending_yield_func_idx.set(idx);
    }

    // ---- call frames --------------------------------------------------------

    pub fn call_depth(&self) -> usize {
        self.call_stack.depth()
    }

    pub fn current_frame(&self) -> Option<&CallInfo> {
        self.call_stack.current()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut CallInfo> {
        self.call_stack.current_mut()
    }

    pub fn frame(&self, index: usize) -> Option<&CallInfo> {
        self.call_stack.get(index)
    }

    pub fn frame_mut(&mut self, index: usize) -> Option<&mut CallInfo> {
        self.call_stack.get_mut(index)
    }

    pub fn frames(&self) -> &[CallInfo] {
        self.call_stack.frames()
    }

    pub fn push_frame(&mut self, frame: CallInfo) -> LuaResult<()> {
        self.call_stack.push(frame)
    }

    pub fn pop_frame(&mut self) -> Option<CallInfo> {
        self.call_stack.pop()
    }

    pub fn truncate_frames_to(&mut self, depth: usize) {
        self.call_stack.truncate_to(depth);
    }

    /// Register relative to the current frame's base.
    pub fn reg_get(&self, reg: u8) -> Value {
        let base = self.current_frame().map(|f| f.base).unwrap_or(0);
        self.stack_get(base + reg as usize)
    }

    pub fn reg_set(&self, reg: u8, value: Value) {
        let base = self.current_frame().map(|f| f.base).unwrap_or(0);
        self.stack_set(base + reg as usize, value);
    }

    // ---- upvalues -----------------------------------------------------------

    /// Find the open upvalue aliasing `index`, or create one.
    pub fn find_or_create_upvalue(&mut self, index: usize) -> UpvalueRef {
        if let Some(existing) = self
            .open_upvalues
            .iter()
            .find(|u| u.is_open_at(self.stack.cells(), index))
        {
            return existing.clone();
        }
        let up = UpvalueRef::new_open(self.stack.cells().clone(), index);
        let pos = self
            .open_upvalues
            .iter()
            .position(|u| match &*u.0.borrow() {
                crate::value::closure::Upvalue::Open { index: i, .. } => *i < index,
                crate::value::closure::Upvalue::Closed(_) => true,
            })
            .unwrap_or(self.open_upvalues.len());
        self.open_upvalues.insert(pos, up.clone());
        up
    }

    /// Close every open upvalue at or above `from` (spec §3 "closing an
    /// upvalue" on frame exit / block exit).
    pub fn close_upvalues(&mut self, from: usize) {
        self.open_upvalues.retain(|u| {
            let should_close = match &*u.0.borrow() {
                crate::value::closure::Upvalue::Open { index, .. } => *index >= from,
                crate::value::closure::Upvalue::Closed(_) => false,
            };
            if should_close {
                u.close();
                false
            } else {
                true
            }
        });
    }

    // ---- errors ---------------------------------------------------------

    /// Build a runtime error, prefixed with `source:line:` when the current
    /// frame is a Lua function (spec §7).
    pub fn error(&self, msg: impl Into<String>) -> LuaError {
        let msg = msg.into();
        if let Some(frame) = self.current_frame() {
            if let Value::Function(Function::Lua(data)) = &frame.func {
                let line = data.proto.line_for(frame.pc.saturating_sub(1));
                return LuaError::runtime(format!("{}:{}: {}", data.proto.source_name, line, msg));
            }
        }
        LuaError::runtime(msg)
    }

    /// Lua-style stack traceback, most recent call first (spec §7).
    pub fn traceback(&self) -> String {
        let mut out = String::new();
        for (level, ci) in self.frames().iter().rev().enumerate() {
            if level >= 32 {
                out.push_str("\t...\n");
                break;
            }
            match &ci.func {
                Value::Function(Function::Lua(data)) => {
                    let line = data.proto.line_for(ci.pc.saturating_sub(1));
                    out.push_str(&format!(
                        "\t{}:{}: in {}\n",
                        data.proto.source_name, line, data.proto.debug_name
                    ));
                }
                Value::Function(Function::Native(data)) => {
                    out.push_str(&format!("\t[C]: in function '{}'\n", data.name));
                }
                _ => out.push_str("\t[?]\n"),
            }
        }
        out
    }

    // ---- GC ---------------------------------------------------------------

    pub fn note_alloc(&self, bytes: usize) {
        self.globals_state.gc.borrow_mut().note_alloc(bytes);
    }

    /// Run a collection cycle if the allocation threshold has been crossed,
    /// rooted at globals, the registry, this thread's stack, and any open
    /// upvalues (spec §4.6). Returns tables reclaimed, if a cycle ran.
    pub fn maybe_collect(&mut self) -> Option<usize> {
        if !self.globals_state.gc.borrow().should_collect() {
            return None;
        }
        Some(self.collect_garbage())
    }

    /// This thread's own roots — its stack, its frames' functions, and its
    /// open upvalues — without globals/registry (those are added once by
    /// whichever thread drives the collection). Used both by
    /// `collect_garbage` and by marking a live `Value::Thread` reachable
    /// from another thread's roots (spec §5: a suspended coroutine's stack
    /// must stay reachable through the `thread` value that references it).
    pub fn gc_trace_roots(&self) -> Vec<Value> {
        let mut roots = self.stack.slice(0, self.stack.len());
        for ci in self.frames() {
            roots.push(ci.func.clone());
        }
        for up in &self.open_upvalues {
            roots.push(up.get());
        }
        roots
    }

    pub fn collect_garbage(&mut self) -> usize {
        let mut roots = vec![
            Value::Table(self.globals()),
            Value::Table(self.registry()),
        ];
        roots.extend(self.gc_trace_roots());
        self.globals_state.gc.borrow_mut().collect(roots)
    }

    // ---- call/protected-call entry points (delegated to vm::call) --------

    pub fn call(&mut self, func: Value, args: Vec<Value>) -> LuaResult<Vec<Value>> {
        crate::vm::call::call_value(self, func, args, MULTRET)
    }

    /// `pcall`'s `Err` path here carries only [`LuaError::Yield`] — every
    /// ordinary runtime error is already folded into the `(false, value)`
    /// result (spec §7; yielding across a protected call propagates rather
    /// than being caught, matching our coroutine design in DESIGN.md).
    pub fn pcall(&mut self, func: Value, args: Vec<Value>) -> LuaResult<(bool, Vec<Value>)> {
        crate::vm::call::protected_call(self, func, args)
    }

    pub fn xpcall(
        &mut self,
        func: Value,
        args: Vec<Value>,
        handler: Value,
    ) -> LuaResult<(bool, Vec<Value>)> {
        crate::vm::call::protected_call_with_handler(self, func, args, handler)
    }

    // ---- top-level chunk execution -----------------------------------------

    /// Compile and run a chunk as the body of a vararg function, returning
    /// whatever it returns. This is the entry point both the CLI and the
    /// test suite drive (spec §6 "Running a chunk").
    pub fn execute_string(&mut self, source: &str) -> LuaResult<Vec<Value>> {
        self.execute_named(source, "=(load)")
    }

    pub fn execute_named(&mut self, source: &str, chunk_name: &str) -> LuaResult<Vec<Value>> {
        let closure = crate::compiler::compile_chunk(self, source, chunk_name)
            .map_err(|e| LuaError::Syntax(e.to_string()))?;
        self.call(Value::Function(closure), Vec::new())
    }

    pub(crate) fn status_flags_of_current(&self) -> u32 {
        self.current_frame().map(|f| f.status).unwrap_or(0)
    }
}

impl Default for LuaState {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the current (innermost) frame belongs to a `pcall`/`xpcall`
/// protected call (spec §7 "error propagation stops at the nearest
/// protected call").
pub fn in_protected_call(state: &LuaState) -> bool {
    state.status_flags_of_current() & status::YPCALL != 0
}
