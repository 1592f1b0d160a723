//! The bytecode dispatch loop (spec §4 "Execution", §4.4).
//!
//! `run` drives exactly the frames at or above `base_depth`: a `CALL` to a
//! Lua function recurses through [`crate::vm::call::call_value`], which
//! calls back into `run` for the nested frame, so this loop only ever
//! needs to notice when its *own* frame's `RETURN` has popped the call
//! stack back down to `base_depth`.

use std::rc::Rc;

use crate::value::closure::LuaClosureData;
use crate::value::{Function, TableRef, Value};
use crate::vm::error::LuaResult;
use crate::vm::metamethod::{self, ArithOp};
use crate::vm::opcode::{is_constant, rk_constant_index, Instruction, OpCode};
use crate::vm::prototype::{Prototype, UpvalueSource};
use crate::vm::state::LuaState;

pub fn run(state: &mut LuaState, base_depth: usize) -> LuaResult<()> {
    while state.call_depth() > base_depth {
        step(state)?;
        if let Some(n) = state.maybe_collect() {
            let _ = n;
        }
    }
    Ok(())
}

fn current_lua_closure(state: &LuaState) -> Rc<LuaClosureData> {
    match &state.current_frame().expect("run() requires an active frame").func {
        Value::Function(Function::Lua(data)) => Rc::clone(data),
        _ => unreachable!("run() only drives Lua frames; native frames never call run()"),
    }
}

fn rk(state: &LuaState, proto: &Prototype, base: usize, operand: u32) -> Value {
    if is_constant(operand) {
        proto.constants[rk_constant_index(operand) as usize].clone()
    } else {
        state.stack_get(base + rk_constant_index(operand) as usize)
    }
}

fn step(state: &mut LuaState) -> LuaResult<()> {
    let closure = current_lua_closure(state);
    let proto = Rc::clone(&closure.proto);
    let pc = state.current_frame().unwrap().pc;
    let instr: Instruction = proto.instructions[pc];
    state.current_frame_mut().unwrap().pc = pc + 1;
    let base = state.current_frame().unwrap().base;
    let a = instr.a() as usize;

    match instr.op() {
        OpCode::Move => {
            let v = state.stack_get(base + instr.b() as usize);
            state.stack_set(base + a, v);
        }
        OpCode::LoadK | OpCode::LoadKX => {
            let v = proto.constants[instr.bx() as usize].clone();
            state.stack_set(base + a, v);
        }
        OpCode::LoadNil => {
            let b = instr.b() as usize;
            for i in 0..=b {
                state.stack_set(base + a + i, Value::Nil);
            }
        }
        OpCode::LoadBool => {
            state.stack_set(base + a, Value::Boolean(instr.b() != 0));
            if instr.c() != 0 {
                state.current_frame_mut().unwrap().pc += 1;
            }
        }
        OpCode::GetGlobal => {
            let key = proto.constants[instr.bx() as usize].clone();
            let globals = Value::Table(state.globals());
            let v = metamethod::index(state, &globals, &key)?;
            state.stack_set(base + a, v);
        }
        OpCode::SetGlobal => {
            let key = proto.constants[instr.bx() as usize].clone();
            let globals = Value::Table(state.globals());
            let v = state.stack_get(base + a);
            metamethod::newindex(state, &globals, key, v)?;
        }
        OpCode::GetUpval => {
            let v = closure.upvalues[instr.b() as usize].get();
            state.stack_set(base + a, v);
        }
        OpCode::SetUpval => {
            let v = state.stack_get(base + a);
            closure.upvalues[instr.b() as usize].set(v);
        }
        OpCode::NewTable => {
            let t = TableRef::with_capacity(instr.b() as usize, instr.c() as usize);
            state.stack_set(base + a, Value::Table(t));
        }
        OpCode::GetTable => {
            let t = state.stack_get(base + instr.b() as usize);
            let k = rk(state, &proto, base, instr.c());
            let v = metamethod::index(state, &t, &k)?;
            state.stack_set(base + a, v);
        }
        OpCode::SetTable => {
            let t = state.stack_get(base + a);
            let k = rk(state, &proto, base, instr.b());
            let v = rk(state, &proto, base, instr.c());
            metamethod::newindex(state, &t, k, v)?;
        }
        OpCode::SelfOp => {
            let t = state.stack_get(base + instr.b() as usize);
            let k = rk(state, &proto, base, instr.c());
            let method = metamethod::index(state, &t, &k)?;
            state.stack_set(base + a + 1, t);
            state.stack_set(base + a, method);
        }
        OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow => {
            let op = match instr.op() {
                OpCode::Add => ArithOp::Add,
                OpCode::Sub => ArithOp::Sub,
                OpCode::Mul => ArithOp::Mul,
                OpCode::Div => ArithOp::Div,
                OpCode::Mod => ArithOp::Mod,
                OpCode::Pow => ArithOp::Pow,
                _ => unreachable!(),
            };
            let x = rk(state, &proto, base, instr.b());
            let y = rk(state, &proto, base, instr.c());
            let v = metamethod::arith(state, op, &x, &y)?;
            state.stack_set(base + a, v);
        }
        OpCode::Unm => {
            let x = state.stack_get(base + instr.b() as usize);
            let v = metamethod::unm(state, &x)?;
            state.stack_set(base + a, v);
        }
        OpCode::Not => {
            let x = state.stack_get(base + instr.b() as usize);
            state.stack_set(base + a, Value::Boolean(!x.is_truthy()));
        }
        OpCode::Len => {
            let x = state.stack_get(base + instr.b() as usize);
            let v = metamethod::length(state, &x)?;
            state.stack_set(base + a, v);
        }
        OpCode::Concat => {
            let b = instr.b() as usize;
            let c = instr.c() as usize;
            let mut acc = state.stack_get(base + c);
            let mut i = c;
            while i > b {
                i -= 1;
                let left = state.stack_get(base + i);
                acc = metamethod::concat(state, &left, &acc)?;
            }
            state.stack_set(base + a, acc);
        }
        OpCode::Eq => {
            let x = rk(state, &proto, base, instr.b());
            let y = rk(state, &proto, base, instr.c());
            let cond = metamethod::equals(state, &x, &y)?;
            if cond != (a != 0) {
                state.current_frame_mut().unwrap().pc += 1;
            }
        }
        OpCode::Lt => {
            let x = rk(state, &proto, base, instr.b());
            let y = rk(state, &proto, base, instr.c());
            let cond = metamethod::less_than(state, &x, &y)?;
            if cond != (a != 0) {
                state.current_frame_mut().unwrap().pc += 1;
            }
        }
        OpCode::Le => {
            let x = rk(state, &proto, base, instr.b());
            let y = rk(state, &proto, base, instr.c());
            let cond = metamethod::less_equal(state, &x, &y)?;
            if cond != (a != 0) {
                state.current_frame_mut().unwrap().pc += 1;
            }
        }
        OpCode::Jmp => {
            let target = (pc + 1) as i64 + instr.sbx() as i64;
            state.current_frame_mut().unwrap().pc = target as usize;
        }
        OpCode::Test => {
            let v = state.stack_get(base + a);
            if v.is_truthy() != (instr.c() != 0) {
                state.current_frame_mut().unwrap().pc += 1;
            }
        }
        OpCode::TestSet => {
            let v = state.stack_get(base + instr.b() as usize);
            if v.is_truthy() == (instr.c() != 0) {
                state.stack_set(base + a, v);
            } else {
                state.current_frame_mut().unwrap().pc += 1;
            }
        }
        OpCode::Call => {
            let b = instr.b() as usize;
            let c = instr.c() as usize;
            exec_call(state, base + a, b, c)?;
        }
        OpCode::TailCall => {
            let b = instr.b() as usize;
            exec_tailcall(state, base, base + a, b)?;
        }
        OpCode::Return => {
            exec_return(state, base, a, instr.b() as usize);
        }
        OpCode::Vararg => {
            exec_vararg(state, base, a, instr.b() as usize);
        }
        OpCode::Closure => {
            exec_closure(state, &closure, &proto, base, a, instr.bx() as usize)?;
        }
        OpCode::Close => {
            state.close_upvalues(base + a);
        }
        OpCode::ForPrep => {
            let init = numeric_for_operand(state, base, a)?;
            let step_v = numeric_for_operand(state, base, a + 2)?;
            state.stack_set(base + a, Value::Number(init - step_v));
            let target = (pc + 1) as i64 + instr.sbx() as i64;
            state.current_frame_mut().unwrap().pc = target as usize;
        }
        OpCode::ForLoop => {
            let init = numeric_for_operand(state, base, a)?;
            let limit = numeric_for_operand(state, base, a + 1)?;
            let step_v = numeric_for_operand(state, base, a + 2)?;
            let next = init + step_v;
            let continues = if step_v > 0.0 {
                next <= limit
            } else {
                next >= limit
            };
            if continues {
                state.stack_set(base + a, Value::Number(next));
                state.stack_set(base + a + 3, Value::Number(next));
                let target = (pc + 1) as i64 + instr.sbx() as i64;
                state.current_frame_mut().unwrap().pc = target as usize;
            }
        }
        OpCode::TForLoop => {
            let c = instr.c() as usize;
            let func = state.stack_get(base + a);
            let iter_state = state.stack_get(base + a + 1);
            let control = state.stack_get(base + a + 2);
            let results = state.call(func, vec![iter_state, control])?;
            for i in 0..c {
                let v = results.get(i).cloned().unwrap_or(Value::Nil);
                state.stack_set(base + a + 3 + i, v);
            }
            let first = state.stack_get(base + a + 3);
            if first.is_nil() {
                state.current_frame_mut().unwrap().pc += 1;
            } else {
                state.stack_set(base + a + 2, first);
            }
        }
    }
    Ok(())
}

fn numeric_for_operand(state: &LuaState, base: usize, reg: usize) -> LuaResult<f64> {
    state
        .stack_get(base + reg)
        .coerce_to_number()
        .ok_or_else(|| state.error("'for' initial value, limit, or step must be a number"))
}

fn gather_call_args(state: &LuaState, func_reg: usize, b: usize) -> Vec<Value> {
    let nargs = if b >= 1 {
        b - 1
    } else {
        state.stack_len().saturating_sub(func_reg + 1)
    };
    state.stack_slice(func_reg + 1, func_reg + 1 + nargs)
}

fn exec_call(state: &mut LuaState, func_reg: usize, b: usize, c: usize) -> LuaResult<()> {
    let func = state.stack_get(func_reg);
    let args = gather_call_args(state, func_reg, b);
    let results = state.call(func, args)?;
    if c >= 1 {
        let want = c - 1;
        for i in 0..want {
            let v = results.get(i).cloned().unwrap_or(Value::Nil);
            state.stack_set(func_reg + i, v);
        }
    } else {
        for (i, v) in results.iter().enumerate() {
            state.stack_set(func_reg + i, v.clone());
        }
        state.truncate_stack(func_reg + results.len());
    }
    Ok(())
}

/// Tail calls (spec §4.5 TAILCALL). When the resolved callee is a Lua
/// closure, the current frame's register window is overwritten in place and
/// `run`'s dispatch loop just keeps stepping — no new `CallInfo` is pushed
/// and no new native stack frame is used, so a chain of tail calls costs
/// O(1) Rust stack regardless of its length (spec: "tail-call depth is
/// unbounded by design"). Native closures never tail-call (spec §4.5), so
/// that case falls back to a real call and is finished off exactly like a
/// CALL immediately followed by a RETURN.
fn exec_tailcall(state: &mut LuaState, frame_base: usize, func_reg: usize, b: usize) -> LuaResult<()> {
    let func = state.stack_get(func_reg);
    let args = gather_call_args(state, func_reg, b);
    let func_idx = frame_base - 1;
    let (callee, args) = crate::vm::call::resolve_callable(state, func, args)?;

    match callee {
        Function::Lua(data) => {
            state.close_upvalues(frame_base);
            let proto = Rc::clone(&data.proto);
            let nparams = proto.num_params as usize;
            let mut fixed = args;
            let varargs: Vec<Value> = if proto.is_vararg && fixed.len() > nparams {
                fixed.split_off(nparams)
            } else {
                Vec::new()
            };
            if fixed.len() < nparams {
                fixed.resize(nparams, Value::Nil);
            } else if fixed.len() > nparams && !proto.is_vararg {
                fixed.truncate(nparams);
            }
            let new_base = func_idx + 1;
            state.stack_set(func_idx, Value::Function(Function::Lua(Rc::clone(&data))));
            for (i, v) in fixed.into_iter().enumerate() {
                state.stack_set(new_base + i, v);
            }
            let frame_top = new_base + proto.max_stack_size as usize;
            state.ensure_stack_len(frame_top)?;
            state.truncate_stack(frame_top);
            if let Some(frame) = state.current_frame_mut() {
                frame.func = Value::Function(Function::Lua(data));
                frame.base = new_base;
                frame.top = frame_top;
                frame.pc = 0;
                frame.varargs = Rc::from(varargs);
                frame.mark_tail_call();
            }
            Ok(())
        }
        Function::Native(_) => {
            let results = crate::vm::call::call_value(
                state,
                Value::Function(callee),
                args,
                crate::vm::call_info::MULTRET,
            )?;
            for (i, v) in results.iter().enumerate() {
                state.stack_set(func_idx + i, v.clone());
            }
            state.truncate_stack(func_idx + results.len());
            state.pop_frame();
            Ok(())
        }
    }
}

fn exec_return(state: &mut LuaState, base: usize, a: usize, b: usize) {
    let nres = if b >= 1 {
        b - 1
    } else {
        state.stack_len().saturating_sub(base + a)
    };
    let results = state.stack_slice(base + a, base + a + nres);
    let func_idx = base - 1;
    state.close_upvalues(base);
    for (i, v) in results.iter().enumerate() {
        state.stack_set(func_idx + i, v.clone());
    }
    state.truncate_stack(func_idx + results.len());
    state.pop_frame();
}

fn exec_vararg(state: &mut LuaState, base: usize, a: usize, b: usize) {
    let varargs = state.current_frame().unwrap().varargs.clone();
    if b >= 1 {
        let want = b - 1;
        for i in 0..want {
            let v = varargs.get(i).cloned().unwrap_or(Value::Nil);
            state.stack_set(base + a + i, v);
        }
    } else {
        for (i, v) in varargs.iter().enumerate() {
            state.stack_set(base + a + i, v.clone());
        }
        state.truncate_stack(base + a + varargs.len());
    }
}

fn exec_closure(
    state: &mut LuaState,
    enclosing: &LuaClosureData,
    proto: &Prototype,
    base: usize,
    a: usize,
    child_index: usize,
) -> LuaResult<()> {
    let child_proto = Rc::clone(&proto.children[child_index]);
    let mut upvalues = Vec::with_capacity(child_proto.upvalues.len());
    for desc in &child_proto.upvalues {
        let up = match desc.source {
            UpvalueSource::ParentLocal(idx) => state.find_or_create_upvalue(base + idx as usize),
            UpvalueSource::ParentUpvalue(idx) => enclosing.upvalues[idx as usize].clone(),
        };
        upvalues.push(up);
    }
    let func = Function::new_lua(child_proto, upvalues);
    state.stack_set(base + a, Value::Function(func));
    Ok(())
}
