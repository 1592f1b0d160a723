//! AST-to-bytecode lowering (spec §4.4). Runs after [`crate::resolver`] has
//! annotated every [`crate::parser::ast::NameRef`], and walks the same tree
//! shape the resolver did so the two passes agree on register numbering and
//! on which [`FunctionInfo`](crate::resolver::FunctionInfo) belongs to which
//! function body.

pub mod parse_number;

use std::collections::VecDeque;
use std::rc::Rc;

use crate::parser::ast::{
    BinOp, Block, Chunk, Expr, FunctionBody, Resolution, SourceLocation, Stat, TableField, UnOp,
};
use crate::parser::{Parser, ParseError};
use crate::resolver::{FunctionInfo, Resolver};
use crate::value::closure::Function;
use crate::value::Value;
use crate::vm::opcode::{rk_from_constant, Instruction, OpCode, MAX_INDEX_RK};
use crate::vm::prototype::{Prototype, UpvalueDesc as ProtoUpvalueDesc, UpvalueSource};
use crate::vm::state::LuaState;

#[derive(Debug)]
pub struct CompileError {
    pub message: String,
    pub loc: SourceLocation,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.loc.line, self.loc.column, self.message)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError { message: e.message, loc: e.loc }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Parse, resolve, and compile `source`, returning a ready-to-call closure
/// for its main chunk (spec §6 "running a chunk").
pub fn compile_chunk(state: &LuaState, source: &str, chunk_name: &str) -> CompileResult<Function> {
    let chunk = Parser::parse_chunk(source, chunk_name)?;
    let infos = Resolver::resolve_chunk(&chunk);
    let mut compiler = Compiler::new(state, infos);
    let proto = compiler.compile_main(&chunk)?;
    Ok(Function::new_lua(Rc::new(proto), Vec::new()))
}

struct FuncState {
    code: Vec<Instruction>,
    lines: Vec<u32>,
    constants: Vec<Value>,
    children: Vec<Rc<Prototype>>,
    upvalues: Vec<ProtoUpvalueDesc>,
    nactive: u16,
    freereg: u16,
    max_stack: u16,
    source_name: Rc<str>,
    line_defined: u32,
    num_params: u8,
    is_vararg: bool,
    debug_name: String,
    break_jumps: Vec<Vec<usize>>,
}

impl FuncState {
    fn new(source_name: Rc<str>, line_defined: u32, debug_name: String) -> Self {
        FuncState {
            code: Vec::new(),
            lines: Vec::new(),
            constants: Vec::new(),
            children: Vec::new(),
            upvalues: Vec::new(),
            nactive: 0,
            freereg: 0,
            max_stack: 2,
            source_name,
            line_defined,
            num_params: 0,
            is_vararg: false,
            debug_name,
            break_jumps: Vec::new(),
        }
    }

    fn emit(&mut self, instr: Instruction, line: u32) -> usize {
        self.code.push(instr);
        self.lines.push(line);
        self.code.len() - 1
    }

    fn reserve(&mut self, n: u16) -> u16 {
        let r = self.freereg;
        self.freereg += n;
        self.max_stack = self.max_stack.max(self.freereg);
        r
    }

    fn free_to(&mut self, reg: u16) {
        self.freereg = reg;
    }

    fn const_index(&mut self, v: Value) -> u32 {
        if let Some(i) = self.constants.iter().position(|c| const_eq(c, &v)) {
            return i as u32;
        }
        self.constants.push(v);
        (self.constants.len() - 1) as u32
    }
}

fn const_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
        (Value::String(x), Value::String(y)) => x.as_str() == y.as_str(),
        (Value::Nil, Value::Nil) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        _ => false,
    }
}

pub struct Compiler<'a> {
    state: &'a LuaState,
    funcs: Vec<FuncState>,
    infos: VecDeque<FunctionInfo>,
}

impl<'a> Compiler<'a> {
    fn new(state: &'a LuaState, infos: Vec<FunctionInfo>) -> Self {
        Compiler {
            state,
            funcs: Vec::new(),
            infos: infos.into(),
        }
    }

    fn f(&mut self) -> &mut FuncState {
        self.funcs.last_mut().unwrap()
    }

    fn compile_main(&mut self, chunk: &Chunk) -> CompileResult<Prototype> {
        self.compile_function_body(&chunk.body, &chunk.source_name, "main chunk".to_string())
    }

    fn compile_function_body(
        &mut self,
        body: &FunctionBody,
        source_name: &Rc<str>,
        debug_name: String,
    ) -> CompileResult<Prototype> {
        self.funcs.push(FuncState::new(source_name.clone(), body.loc.line, debug_name));
        self.f().num_params = body.params.len() as u8;
        self.f().is_vararg = body.is_vararg;
        self.f().reserve(body.params.len() as u16);
        self.f().nactive = body.params.len() as u16;

        self.compile_block(&body.body)?;
        // Every function implicitly ends with `return` (no values) if
        // control falls off the end.
        let line = body.body.stats.last().map(stat_line).unwrap_or(body.loc.line);
        self.f().emit(Instruction::iabc(OpCode::Return, 0, 1, 0), line);

        let mut fs = self.funcs.pop().unwrap();
        let info = self.infos.pop_front().expect("resolver/compiler function walk order mismatch");
        fs.upvalues = info.upvalues.iter().map(to_proto_upvalue).collect();
        fs.max_stack = fs.max_stack.max(info.max_locals);
        Ok(Prototype {
            source_name: fs.source_name,
            line_defined: fs.line_defined,
            num_params: fs.num_params,
            is_vararg: fs.is_vararg,
            max_stack_size: fs.max_stack.min(250) as u8,
            instructions: fs.code,
            lines: fs.lines,
            constants: fs.constants,
            children: fs.children,
            upvalues: fs.upvalues,
            debug_name: fs.debug_name,
        })
    }

    // ---- statements --------------------------------------------------

    fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        let save_active = self.f().nactive;
        for stat in &block.stats {
            self.compile_stat(stat)?;
            self.f().free_to(self.f().nactive);
        }
        self.f().nactive = save_active;
        Ok(())
    }

    fn compile_stat(&mut self, stat: &Stat) -> CompileResult<()> {
        match stat {
            Stat::Expr(e) => {
                self.compile_call_as_stat(e)?;
                Ok(())
            }
            Stat::Local(names, exprs, loc) => {
                let base = self.f().nactive;
                self.f().free_to(base);
                self.f().reserve(names.len() as u16);
                self.compile_expr_list_to(exprs, base, names.len(), *loc)?;
                self.f().nactive = base + names.len() as u16;
                Ok(())
            }
            Stat::Assign(targets, values, loc) => self.compile_assign(targets, values, *loc),
            Stat::Do(b) => self.compile_block(b),
            Stat::While(cond, body, loc) => self.compile_while(cond, body, *loc),
            Stat::Repeat(body, cond, loc) => self.compile_repeat(body, cond, *loc),
            Stat::If(arms, else_block, loc) => self.compile_if(arms, else_block, *loc),
            Stat::NumericFor { var: _, start, limit, step, body, loc } => {
                self.compile_numeric_for(start, limit, step, body, *loc)
            }
            Stat::GenericFor { vars, exprs, body, loc } => {
                self.compile_generic_for(vars, exprs, body, *loc)
            }
            Stat::Function { target, body, loc } => {
                let reg = self.f().reserve(1);
                self.compile_closure_into(body, reg, *loc)?;
                self.compile_store(target, reg, *loc)?;
                self.f().free_to(reg);
                Ok(())
            }
            Stat::LocalFunction { name: _, body, loc } => {
                // The local slot was already reserved at this statement's
                // active-local count by the resolver; the closure can
                // reference itself recursively through it.
                let reg = self.f().nactive;
                self.f().reserve(1);
                self.f().nactive += 1;
                self.compile_closure_into(body, reg, *loc)?;
                Ok(())
            }
            Stat::Return(exprs, loc) => self.compile_return(exprs, *loc),
            Stat::Break(loc) => {
                let idx = self.emit_jmp(*loc);
                self.f()
                    .break_jumps
                    .last_mut()
                    .expect("break outside loop body (resolver/parser should reject this)")
                    .push(idx);
                Ok(())
            }
        }
    }

    fn compile_call_as_stat(&mut self, e: &Expr) -> CompileResult<()> {
        let base = self.f().nactive;
        self.f().free_to(base);
        match e {
            Expr::Call(..) | Expr::MethodCall(..) => {
                self.compile_call_expr(e, base, 1)?;
            }
            _ => {
                // Parser already rejects non-call expression statements;
                // still evaluate defensively so side effects (if any) run.
                self.compile_expr_to(e, base)?;
            }
        }
        self.f().free_to(base);
        Ok(())
    }

    fn compile_assign(&mut self, targets: &[Expr], values: &[Expr], loc: SourceLocation) -> CompileResult<()> {
        let base = self.f().nactive;
        self.f().free_to(base);

        // Pre-evaluate each target's "location" (table+key for Index
        // targets) before the rhs runs, matching ordinary left-to-right
        // evaluation.
        enum Target {
            Name(Resolution),
            Index(u16, u32),
        }
        let mut resolved = Vec::with_capacity(targets.len());
        for t in targets {
            match t {
                Expr::Name(n) => {
                    resolved.push(Target::Name(n.resolution.get().expect("unresolved name")));
                }
                Expr::Index(obj, key, _) => {
                    let obj_reg = self.compile_expr_any(obj)?;
                    let key_rk = self.compile_expr_rk(key)?;
                    resolved.push(Target::Index(obj_reg, key_rk));
                }
                _ => return Err(self.err("cannot assign to this expression", loc)),
            }
        }

        let val_base = self.f().freereg;
        self.compile_expr_list_to(values, val_base, targets.len(), loc)?;

        for (i, target) in resolved.into_iter().enumerate() {
            let src = val_base + i as u16;
            match target {
                Target::Name(Resolution::Local(slot)) => {
                    self.f().emit(Instruction::iabc(OpCode::Move, slot as u32, src as u32, 0), loc.line);
                }
                Target::Name(Resolution::Upvalue(idx)) => {
                    self.f().emit(Instruction::iabc(OpCode::SetUpval, src as u32, idx as u32, 0), loc.line);
                }
                Target::Name(Resolution::Global) => {
                    let name = match &targets[i] {
                        Expr::Name(n) => n.name.clone(),
                        _ => unreachable!(),
                    };
                    let k = self.f().const_index(Value::String(self.state.intern(&name)));
                    self.f().emit(Instruction::iabx(OpCode::SetGlobal, src as u32, k), loc.line);
                }
                Target::Index(obj_reg, key_rk) => {
                    self.f().emit(Instruction::iabc(OpCode::SetTable, obj_reg as u32, key_rk, src as u32), loc.line);
                }
            }
        }

        self.f().free_to(base);
        Ok(())
    }

    fn compile_store(&mut self, target: &Expr, src_reg: u16, loc: SourceLocation) -> CompileResult<()> {
        match target {
            Expr::Name(n) => match n.resolution.get().expect("unresolved name") {
                Resolution::Local(slot) => {
                    self.f().emit(Instruction::iabc(OpCode::Move, slot as u32, src_reg as u32, 0), loc.line);
                }
                Resolution::Upvalue(idx) => {
                    self.f().emit(Instruction::iabc(OpCode::SetUpval, src_reg as u32, idx as u32, 0), loc.line);
                }
                Resolution::Global => {
                    let k = self.f().const_index(Value::String(self.state.intern(&n.name)));
                    self.f().emit(Instruction::iabx(OpCode::SetGlobal, src_reg as u32, k), loc.line);
                }
            },
            Expr::Index(obj, key, _) => {
                let obj_reg = self.compile_expr_any(obj)?;
                let key_rk = self.compile_expr_rk(key)?;
                self.f().emit(Instruction::iabc(OpCode::SetTable, obj_reg as u32, key_rk, src_reg as u32), loc.line);
            }
            _ => return Err(self.err("cannot assign to this expression", loc)),
        }
        Ok(())
    }

    fn compile_return(&mut self, exprs: &[Expr], loc: SourceLocation) -> CompileResult<()> {
        let base = self.f().nactive;
        self.f().free_to(base);
        if exprs.is_empty() {
            self.f().emit(Instruction::iabc(OpCode::Return, 0, 1, 0), loc.line);
            return Ok(());
        }
        if exprs.len() == 1 && matches!(exprs[0], Expr::Call(..) | Expr::MethodCall(..)) {
            // `return f(...)` / `return obj:m(...)` in tail position: emit
            // TAILCALL instead of CALL (spec §4.5 — unbounded tail-call
            // depth). A trailing RETURN still follows, matching the
            // CALL+RETURN layout; it's unreachable when the callee is a Lua
            // closure (the frame is reused in place and never falls back to
            // this pc), and harmless padding otherwise.
            self.compile_call_expr(&exprs[0], base, 0)?;
            let idx = self.f().code.len() - 1;
            let instr = self.f().code[idx];
            self.f().code[idx] = Instruction::iabc(OpCode::TailCall, instr.a(), instr.b(), instr.c());
            self.f().emit(Instruction::iabc(OpCode::Return, base as u32, 0, 0), loc.line);
            return Ok(());
        }
        let open = self.compile_expr_list_open(exprs, base)?;
        let b = if open { 0 } else { (exprs.len() + 1) as u32 };
        self.f().emit(Instruction::iabc(OpCode::Return, base as u32, b, 0), loc.line);
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &Block, loc: SourceLocation) -> CompileResult<()> {
        let loop_start = self.f().code.len();
        let base = self.f().nactive;
        self.f().free_to(base);
        let cond_reg = self.compile_expr_any(cond)?;
        self.f().emit(Instruction::iabc(OpCode::Test, cond_reg as u32, 0, 0), loc.line);
        let exit_jmp = self.emit_jmp(loc);
        self.f().free_to(base);
        self.f().break_jumps.push(Vec::new());
        self.compile_block(body)?;
        let back = self.emit_jmp(loc);
        self.patch_jmp_to(back, loop_start);
        self.patch_jmp_here(exit_jmp);
        let breaks = self.f().break_jumps.pop().unwrap();
        let here = self.f().code.len();
        for b in breaks {
            self.patch_jmp_to(b, here);
        }
        Ok(())
    }

    fn compile_repeat(&mut self, body: &Block, cond: &Expr, loc: SourceLocation) -> CompileResult<()> {
        let loop_start = self.f().code.len();
        let base = self.f().nactive;
        self.f().break_jumps.push(Vec::new());
        // `until`'s condition can see the body's own locals, so don't reset
        // nactive until after compiling it (mirrors the resolver pass).
        for s in &body.stats {
            self.compile_stat(s)?;
        }
        let cond_reg = self.compile_expr_any(cond)?;
        self.f().nactive = base;
        // `until cond` loops back while `cond` is false; skip (exit) when
        // it's true, same polarity as `while`'s own loop-continue test.
        self.f().emit(Instruction::iabc(OpCode::Test, cond_reg as u32, 0, 0), loc.line);
        let back = self.emit_jmp(loc);
        self.patch_jmp_to(back, loop_start);
        let breaks = self.f().break_jumps.pop().unwrap();
        let here = self.f().code.len();
        for b in breaks {
            self.patch_jmp_to(b, here);
        }
        self.f().free_to(base);
        Ok(())
    }

    fn compile_if(
        &mut self,
        arms: &[(Expr, Block)],
        else_block: &Option<Block>,
        loc: SourceLocation,
    ) -> CompileResult<()> {
        let mut end_jumps = Vec::new();
        for (i, (cond, body)) in arms.iter().enumerate() {
            let base = self.f().nactive;
            let cond_reg = self.compile_expr_any(cond)?;
            self.f().emit(Instruction::iabc(OpCode::Test, cond_reg as u32, 0, 0), loc.line);
            let skip = self.emit_jmp(loc);
            self.f().free_to(base);
            self.compile_block(body)?;
            let is_last = i == arms.len() - 1;
            if !is_last || else_block.is_some() {
                end_jumps.push(self.emit_jmp(loc));
            }
            self.patch_jmp_here(skip);
        }
        if let Some(b) = else_block {
            self.compile_block(b)?;
        }
        let here = self.f().code.len();
        for j in end_jumps {
            self.patch_jmp_to(j, here);
        }
        Ok(())
    }

    fn compile_numeric_for(
        &mut self,
        start: &Expr,
        limit: &Expr,
        step: &Option<Expr>,
        body: &Block,
        loc: SourceLocation,
    ) -> CompileResult<()> {
        let base = self.f().nactive;
        self.f().free_to(base);
        let ctrl = self.f().reserve(3); // index, limit, step
        self.compile_expr_to(start, ctrl)?;
        self.compile_expr_to(limit, ctrl + 1)?;
        match step {
            Some(s) => {
                self.compile_expr_to(s, ctrl + 2)?;
            }
            None => {
                let k = self.f().const_index(Value::Number(1.0));
                self.f().emit(Instruction::iabx(OpCode::LoadK, (ctrl + 2) as u32, k), loc.line);
            }
        }
        self.f().reserve(1); // visible loop variable at ctrl+3
        self.f().nactive = ctrl + 4;

        let prep = self.emit_forprep(ctrl, loc);
        let body_start = self.f().code.len();
        self.f().break_jumps.push(Vec::new());
        self.compile_block(body)?;
        self.patch_jmp_here(prep);
        let loop_idx = self.emit_forloop(ctrl, loc);
        self.patch_jmp_to(loop_idx, body_start);
        let breaks = self.f().break_jumps.pop().unwrap();
        let here = self.f().code.len();
        for b in breaks {
            self.patch_jmp_to(b, here);
        }
        self.f().nactive = base;
        self.f().free_to(base);
        Ok(())
    }

    fn emit_forprep(&mut self, ctrl: u16, loc: SourceLocation) -> usize {
        self.f().emit(Instruction::iasbx(OpCode::ForPrep, ctrl as u32, 0), loc.line)
    }

    fn emit_forloop(&mut self, ctrl: u16, loc: SourceLocation) -> usize {
        self.f().emit(Instruction::iasbx(OpCode::ForLoop, ctrl as u32, 0), loc.line)
    }

    fn compile_generic_for(
        &mut self,
        vars: &[Rc<str>],
        exprs: &[Expr],
        body: &Block,
        loc: SourceLocation,
    ) -> CompileResult<()> {
        let base = self.f().nactive;
        self.f().free_to(base);
        let ctrl = self.f().reserve(3); // iterator func, state, control
        self.compile_expr_list_to(exprs, ctrl, 3, loc)?;
        self.f().reserve(vars.len() as u16);
        self.f().nactive = ctrl + 3 + vars.len() as u16;

        let jmp_to_test = self.emit_jmp(loc);
        let body_start = self.f().code.len();
        self.f().break_jumps.push(Vec::new());
        self.compile_block(body)?;
        self.patch_jmp_here(jmp_to_test);
        self.f()
            .emit(Instruction::iabc(OpCode::TForLoop, ctrl as u32, 0, vars.len() as u32), loc.line);
        let back = self.emit_jmp(loc);
        self.patch_jmp_to(back, body_start);
        let breaks = self.f().break_jumps.pop().unwrap();
        let here = self.f().code.len();
        for b in breaks {
            self.patch_jmp_to(b, here);
        }
        self.f().nactive = base;
        self.f().free_to(base);
        Ok(())
    }

    // ---- jump helpers --------------------------------------------------

    fn emit_jmp(&mut self, loc: SourceLocation) -> usize {
        self.f().emit(Instruction::iasbx(OpCode::Jmp, 0, 0), loc.line)
    }

    fn patch_jmp_to(&mut self, jmp_idx: usize, target: usize) {
        let sbx = target as i32 - (jmp_idx as i32 + 1);
        let f = self.f();
        f.code[jmp_idx] = Instruction::iasbx(OpCode::Jmp, 0, sbx);
    }

    fn patch_jmp_here(&mut self, jmp_idx: usize) {
        let here = self.f().code.len();
        self.patch_jmp_to(jmp_idx, here);
    }

    // ---- expressions -----------------------------------------------------

    /// Compile `expr` so its value ends up exactly in register `reg`
    /// (spec's "expression adjustment" rule: truncates any multi-value
    /// expression to one value).
    fn compile_expr_to(&mut self, expr: &Expr, reg: u16) -> CompileResult<()> {
        let loc = expr.loc();
        match expr {
            Expr::Nil(_) => {
                self.f().emit(Instruction::iabc(OpCode::LoadNil, reg as u32, 0, 0), loc.line);
            }
            Expr::True(_) => {
                self.f().emit(Instruction::iabc(OpCode::LoadBool, reg as u32, 1, 0), loc.line);
            }
            Expr::False(_) => {
                self.f().emit(Instruction::iabc(OpCode::LoadBool, reg as u32, 0, 0), loc.line);
            }
            Expr::Number(n, _) => {
                let k = self.f().const_index(Value::Number(*n));
                self.f().emit(Instruction::iabx(OpCode::LoadK, reg as u32, k), loc.line);
            }
            Expr::Str(s, _) => {
                let k = self.f().const_index(Value::String(self.state.intern(s)));
                self.f().emit(Instruction::iabx(OpCode::LoadK, reg as u32, k), loc.line);
            }
            Expr::Vararg(_) => {
                self.f().emit(Instruction::iabc(OpCode::Vararg, reg as u32, 2, 0), loc.line);
            }
            Expr::Name(n) => match n.resolution.get().expect("unresolved name") {
                Resolution::Local(slot) => {
                    if slot != reg {
                        self.f().emit(Instruction::iabc(OpCode::Move, reg as u32, slot as u32, 0), loc.line);
                    }
                }
                Resolution::Upvalue(idx) => {
                    self.f().emit(Instruction::iabc(OpCode::GetUpval, reg as u32, idx as u32, 0), loc.line);
                }
                Resolution::Global => {
                    let k = self.f().const_index(Value::String(self.state.intern(&n.name)));
                    self.f().emit(Instruction::iabx(OpCode::GetGlobal, reg as u32, k), loc.line);
                }
            },
            Expr::Paren(inner, _) => {
                self.compile_expr_to(inner, reg)?;
            }
            Expr::Unary(op, operand, _) => self.compile_unary(*op, operand, reg, loc)?,
            Expr::Binary(BinOp::And, l, r, _) => self.compile_and(l, r, reg)?,
            Expr::Binary(BinOp::Or, l, r, _) => self.compile_or(l, r, reg)?,
            Expr::Binary(op, l, r, _) if is_relational(*op) => {
                self.compile_relational_to_value(*op, l, r, reg, loc)?;
            }
            Expr::Binary(op, l, r, _) => self.compile_arith_or_concat(*op, l, r, reg, loc)?,
            Expr::Index(obj, key, _) => {
                let obj_reg = self.compile_expr_any(obj)?;
                let key_rk = self.compile_expr_rk(key)?;
                self.f().emit(Instruction::iabc(OpCode::GetTable, reg as u32, obj_reg as u32, key_rk), loc.line);
            }
            Expr::Call(..) | Expr::MethodCall(..) => {
                self.compile_call_expr(expr, reg, 2)?;
            }
            Expr::Function(body, _) => {
                self.compile_closure_into(body, reg, loc)?;
            }
            Expr::Table(fields, _) => {
                self.compile_table(fields, reg, loc)?;
            }
        }
        Ok(())
    }

    /// Compile `expr` into a fresh temporary register, returning it.
    fn compile_expr_any(&mut self, expr: &Expr) -> CompileResult<u16> {
        if let Expr::Name(n) = expr {
            if let Some(Resolution::Local(slot)) = n.resolution.get() {
                return Ok(slot);
            }
        }
        let reg = self.f().reserve(1);
        self.compile_expr_to(expr, reg)?;
        Ok(reg)
    }

    /// Compile `expr` for use as an RK operand: a literal number/string
    /// folds straight into the constant table, everything else materializes
    /// into a register.
    fn compile_expr_rk(&mut self, expr: &Expr) -> CompileResult<u32> {
        match expr {
            Expr::Number(n, _) => {
                let k = self.f().const_index(Value::Number(*n));
                if k <= MAX_INDEX_RK {
                    return Ok(rk_from_constant(k));
                }
            }
            Expr::Str(s, _) => {
                let k = self.f().const_index(Value::String(self.state.intern(s)));
                if k <= MAX_INDEX_RK {
                    return Ok(rk_from_constant(k));
                }
            }
            _ => {}
        }
        Ok(self.compile_expr_any(expr)? as u32)
    }

    fn compile_unary(&mut self, op: UnOp, operand: &Expr, reg: u16, loc: SourceLocation) -> CompileResult<()> {
        let opnd = self.compile_expr_any(operand)?;
        let opcode = match op {
            UnOp::Neg => OpCode::Unm,
            UnOp::Not => OpCode::Not,
            UnOp::Len => OpCode::Len,
        };
        self.f().emit(Instruction::iabc(opcode, reg as u32, opnd as u32, 0), loc.line);
        Ok(())
    }

    fn compile_and(&mut self, l: &Expr, r: &Expr, reg: u16) -> CompileResult<()> {
        self.compile_expr_to(l, reg)?;
        self.f().emit(Instruction::iabc(OpCode::Test, reg as u32, 0, 0), l.loc().line);
        let skip = self.emit_jmp(l.loc());
        self.compile_expr_to(r, reg)?;
        self.patch_jmp_here(skip);
        Ok(())
    }

    fn compile_or(&mut self, l: &Expr, r: &Expr, reg: u16) -> CompileResult<()> {
        self.compile_expr_to(l, reg)?;
        self.f().emit(Instruction::iabc(OpCode::Test, reg as u32, 0, 1), l.loc().line);
        let skip = self.emit_jmp(l.loc());
        self.compile_expr_to(r, reg)?;
        self.patch_jmp_here(skip);
        Ok(())
    }

    /// `r = (x OP y)` as a boolean value — the classic four-instruction
    /// pattern (CMP skip-if-matched, JMP to false branch, LOADBOOL true
    /// with auto-skip, LOADBOOL false).
    fn compile_relational_to_value(
        &mut self,
        op: BinOp,
        l: &Expr,
        r: &Expr,
        reg: u16,
        loc: SourceLocation,
    ) -> CompileResult<()> {
        let base = self.f().freereg;
        let (opcode, want, x, y) = self.compile_relational_operands(op, l, r)?;
        // CMP's `A` is the polarity to match, not the desired result: `A=0`
        // skips (lands on the true-load) when the comparator itself came
        // back true, so a direct comparison (want=true) takes `A=0` and an
        // inverted one (`~=`, want=false) takes `A=1`.
        let a = if want { 0 } else { 1 };
        self.f().emit(Instruction::iabc(opcode, a, x, y), loc.line);
        let to_false = self.emit_jmp(loc);
        self.f().emit(Instruction::iabc(OpCode::LoadBool, reg as u32, 1, 1), loc.line);
        self.f().emit(Instruction::iabc(OpCode::LoadBool, reg as u32, 0, 0), loc.line);
        self.patch_jmp_to(to_false, self.f().code.len() - 1);
        self.f().free_to(base.max(reg + 1));
        Ok(())
    }

    /// Lowers `>`/`>=` to `<`/`<=` with swapped operands (Lua 5.1 has no
    /// direct GT/GE opcodes) and `~=` to `==` with inverted polarity,
    /// returning the opcode, the `A` polarity bit, and its RK operands.
    fn compile_relational_operands(&mut self, op: BinOp, l: &Expr, r: &Expr) -> CompileResult<(OpCode, bool, u32, u32)> {
        let (op, l, r, want) = match op {
            BinOp::Eq => (OpCode::Eq, l, r, true),
            BinOp::Ne => (OpCode::Eq, l, r, false),
            BinOp::Lt => (OpCode::Lt, l, r, true),
            BinOp::Le => (OpCode::Le, l, r, true),
            BinOp::Gt => (OpCode::Lt, r, l, true),
            BinOp::Ge => (OpCode::Le, r, l, true),
            _ => unreachable!(),
        };
        let x = self.compile_expr_rk(l)?;
        let y = self.compile_expr_rk(r)?;
        Ok((op, want, x, y))
    }

    fn compile_arith_or_concat(
        &mut self,
        op: BinOp,
        l: &Expr,
        r: &Expr,
        reg: u16,
        loc: SourceLocation,
    ) -> CompileResult<()> {
        if op == BinOp::Concat {
            let base = self.f().freereg;
            let lr = self.compile_expr_any(l)?;
            let rr = self.compile_expr_any(r)?;
            self.f().emit(Instruction::iabc(OpCode::Concat, reg as u32, lr as u32, rr as u32), loc.line);
            self.f().free_to(base.max(reg + 1));
            return Ok(());
        }
        let base = self.f().freereg;
        let x = self.compile_expr_rk(l)?;
        let y = self.compile_expr_rk(r)?;
        let opcode = match op {
            BinOp::Add => OpCode::Add,
            BinOp::Sub => OpCode::Sub,
            BinOp::Mul => OpCode::Mul,
            BinOp::Div => OpCode::Div,
            BinOp::Mod => OpCode::Mod,
            BinOp::Pow => OpCode::Pow,
            _ => unreachable!(),
        };
        self.f().emit(Instruction::iabc(opcode, reg as u32, x, y), loc.line);
        self.f().free_to(base.max(reg + 1));
        Ok(())
    }

    fn compile_call_expr(&mut self, expr: &Expr, reg: u16, c: u32) -> CompileResult<()> {
        let base = self.f().freereg.max(reg);
        self.f().free_to(reg);
        self.f().reserve(1); // function slot at `reg`
        match expr {
            Expr::Call(func, args, loc) => {
                self.compile_expr_to(func, reg)?;
                let open = self.compile_call_args_open(args, reg + 1)?;
                let b = if open { 0 } else { (args.len() + 1) as u32 };
                self.f().emit(Instruction::iabc(OpCode::Call, reg as u32, b, c), loc.line);
            }
            Expr::MethodCall(obj, method, args, loc) => {
                let obj_reg = self.compile_expr_any(obj)?;
                let key_rk = self.compile_expr_rk(&Expr::Str(method.clone(), *loc))?;
                self.f().free_to(reg);
                self.f().reserve(2); // method + self
                self.f().emit(Instruction::iabc(OpCode::SelfOp, reg as u32, obj_reg as u32, key_rk), loc.line);
                let open = self.compile_call_args_open(args, reg + 2)?;
                let b = if open { 0 } else { (args.len() + 2) as u32 };
                self.f().emit(Instruction::iabc(OpCode::Call, reg as u32, b, c), loc.line);
            }
            _ => unreachable!("compile_call_expr called on non-call expression"),
        }
        self.f().free_to(base.max(reg + 1));
        Ok(())
    }

    /// Compiles `args` starting at `start_reg`, returning whether the call
    /// was left "open" (its last argument was itself a multi-value call or
    /// `...`, so the callee reads through the stack top instead of a fixed
    /// count).
    fn compile_call_args_open(&mut self, args: &[Expr], start_reg: u16) -> CompileResult<bool> {
        self.f().free_to(start_reg);
        if args.is_empty() {
            return Ok(false);
        }
        for a in &args[..args.len() - 1] {
            let r = self.f().reserve(1);
            self.compile_expr_to(a, r)?;
        }
        let last = args.last().unwrap();
        if last.is_multi() {
            let r = self.f().freereg;
            self.compile_multi_open(last, r)?;
            Ok(true)
        } else {
            let r = self.f().reserve(1);
            self.compile_expr_to(last, r)?;
            Ok(false)
        }
    }

    /// Compiles a call/`...` expression in "open" mode: its results land
    /// starting at `reg` and extend to the stack top rather than a fixed
    /// count (`B`/`C` `0` convention, spec §4.4).
    fn compile_multi_open(&mut self, expr: &Expr, reg: u16) -> CompileResult<()> {
        match expr {
            Expr::Call(..) => self.compile_call_expr(expr, reg, 0),
            Expr::MethodCall(..) => self.compile_call_expr(expr, reg, 0),
            Expr::Vararg(loc) => {
                self.f().emit(Instruction::iabc(OpCode::Vararg, reg as u32, 0, 0), loc.line);
                Ok(())
            }
            _ => unreachable!("compile_multi_open called on a non-multi expression"),
        }
    }

    /// Compile an expression list into consecutive registers starting at
    /// `base`, adjusted to exactly `want` values (padding with `nil` or
    /// discarding extras) — the assignment/local-declaration/for-control
    /// adjustment rule.
    fn compile_expr_list_to(&mut self, exprs: &[Expr], base: u16, want: usize, loc: SourceLocation) -> CompileResult<()> {
        self.f().free_to(base);
        if exprs.is_empty() {
            for i in 0..want {
                self.f().reserve(1);
                self.f().emit(Instruction::iabc(OpCode::LoadNil, (base as usize + i) as u32, 0, 0), loc.line);
            }
            return Ok(());
        }
        let n = exprs.len();
        for (i, e) in exprs[..n - 1].iter().enumerate() {
            if i < want {
                let r = self.f().reserve(1);
                self.compile_expr_to(e, r)?;
            } else {
                // Still evaluate for side effects, just into a scratch reg.
                let r = self.f().reserve(1);
                self.compile_expr_to(e, r)?;
                self.f().free_to(base + i as u16 + 1);
            }
        }
        let last = &exprs[n - 1];
        let filled_before_last = (n - 1).min(want);
        if last.is_multi() && n <= want {
            let r = base + (n - 1) as u16;
            self.f().free_to(r);
            self.compile_multi_open(last, r)?;
            let extra = want - (n - 1);
            // Ask the open call/vararg for exactly `extra` results instead
            // of "everything" now that `want` is known.
            self.set_last_result_count(r, extra as u32 + 1)?;
            self.f().free_to(base + want as u16);
        } else {
            let r = base + filled_before_last as u16;
            if filled_before_last < want {
                self.f().reserve(1);
                self.compile_expr_to(last, r)?;
                for i in (filled_before_last + 1)..want {
                    self.f().reserve(1);
                    self.f().emit(Instruction::iabc(OpCode::LoadNil, (base as usize + i) as u32, 0, 0), loc.line);
                }
            } else {
                // want <= n-1: last value (and anything beyond `want`) is
                // evaluated for side effects only and discarded.
                let scratch = self.f().reserve(1);
                self.compile_expr_to(last, scratch)?;
            }
            self.f().free_to(base + want as u16);
        }
        Ok(())
    }

    /// Patches the just-emitted open CALL/VARARG instruction at register
    /// `reg` to request exactly `count` results instead of "all of them".
    fn set_last_result_count(&mut self, reg: u16, count: u32) -> CompileResult<()> {
        let idx = self.f().code.len() - 1;
        let instr = self.f().code[idx];
        let new_instr = match instr.op() {
            OpCode::Call => Instruction::iabc(OpCode::Call, instr.a(), instr.b(), count),
            OpCode::Vararg => Instruction::iabc(OpCode::Vararg, instr.a(), count, 0),
            _ => instr,
        };
        let _ = reg;
        self.f().code[idx] = new_instr;
        Ok(())
    }

    /// Compiles an expression list left "open" (for `return`/table trailing
    /// context), returning whether the last element was multi-valued.
    fn compile_expr_list_open(&mut self, exprs: &[Expr], base: u16) -> CompileResult<bool> {
        self.f().free_to(base);
        let n = exprs.len();
        for e in &exprs[..n - 1] {
            let r = self.f().reserve(1);
            self.compile_expr_to(e, r)?;
        }
        let last = &exprs[n - 1];
        if last.is_multi() {
            let r = self.f().freereg;
            self.compile_multi_open(last, r)?;
            Ok(true)
        } else {
            let r = self.f().reserve(1);
            self.compile_expr_to(last, r)?;
            Ok(false)
        }
    }

    fn compile_table(&mut self, fields: &[TableField], reg: u16, loc: SourceLocation) -> CompileResult<()> {
        let narr = fields.iter().filter(|f| matches!(f, TableField::Positional(_))).count();
        let nhash = fields.len() - narr;
        self.f().emit(Instruction::iabc(OpCode::NewTable, reg as u32, narr as u32, nhash as u32), loc.line);
        let base = self.f().freereg;
        let mut pos_index: u32 = 0;
        for (i, field) in fields.iter().enumerate() {
            match field {
                TableField::Positional(v) => {
                    pos_index += 1;
                    let is_last = i == fields.len() - 1;
                    if is_last && v.is_multi() {
                        let r = self.f().freereg;
                        self.compile_multi_open(v, r)?;
                        // Open results land on the stack above `reg`; store
                        // them one SETTABLE at a time isn't possible once
                        // they're past the top, so this simplified
                        // constructor caps trailing multret fields at one
                        // value (see DESIGN.md).
                        let k = self.f().const_index(Value::Number(pos_index as f64));
                        self.f().emit(
                            Instruction::iabc(OpCode::SetTable, reg as u32, rk_from_constant(k), r as u32),
                            loc.line,
                        );
                    } else {
                        let r = self.compile_expr_any(v)?;
                        let k = self.f().const_index(Value::Number(pos_index as f64));
                        self.f().emit(
                            Instruction::iabc(OpCode::SetTable, reg as u32, rk_from_constant(k), r as u32),
                            loc.line,
                        );
                        self.f().free_to(base);
                    }
                }
                TableField::Named(name, v) => {
                    let r = self.compile_expr_any(v)?;
                    let k = self.f().const_index(Value::String(self.state.intern(name)));
                    self.f().emit(
                        Instruction::iabc(OpCode::SetTable, reg as u32, rk_from_constant(k), r as u32),
                        loc.line,
                    );
                    self.f().free_to(base);
                }
                TableField::Keyed(key, v) => {
                    let key_rk = self.compile_expr_rk(key)?;
                    let r = self.compile_expr_any(v)?;
                    self.f().emit(Instruction::iabc(OpCode::SetTable, reg as u32, key_rk, r as u32), loc.line);
                    self.f().free_to(base);
                }
            }
        }
        self.f().free_to(base);
        Ok(())
    }

    fn compile_closure_into(&mut self, body: &Rc<FunctionBody>, reg: u16, loc: SourceLocation) -> CompileResult<()> {
        let source_name = self.f().source_name.clone();
        let debug_name = match &body.name {
            Some(n) => format!("function '{}'", n),
            None => format!("function <{}:{}>", source_name, loc.line),
        };
        let proto = self.compile_function_body(body, &source_name, debug_name)?;
        let child_idx = self.f().children.len();
        self.f().children.push(Rc::new(proto));
        self.f().emit(Instruction::iabx(OpCode::Closure, reg as u32, child_idx as u32), loc.line);
        Ok(())
    }

    fn err(&self, message: impl Into<String>, loc: SourceLocation) -> CompileError {
        CompileError { message: message.into(), loc }
    }
}

fn is_relational(op: BinOp) -> bool {
    matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
}

fn stat_line(stat: &Stat) -> u32 {
    match stat {
        Stat::Expr(e) => e.loc().line,
        Stat::Local(_, _, l)
        | Stat::Assign(_, _, l)
        | Stat::While(_, _, l)
        | Stat::Repeat(_, _, l)
        | Stat::If(_, _, l)
        | Stat::NumericFor { loc: l, .. }
        | Stat::GenericFor { loc: l, .. }
        | Stat::Function { loc: l, .. }
        | Stat::LocalFunction { loc: l, .. }
        | Stat::Return(_, l)
        | Stat::Break(l) => l.line,
        Stat::Do(b) => b.stats.last().map(stat_line).unwrap_or(SourceLocation { line: 0, column: 0 }.line),
    }
}

fn to_proto_upvalue(d: &crate::resolver::UpvalueDesc) -> ProtoUpvalueDesc {
    ProtoUpvalueDesc {
        name: d.name.clone(),
        source: if d.in_parent_locals {
            UpvalueSource::ParentLocal(d.index as u32)
        } else {
            UpvalueSource::ParentUpvalue(d.index as u32)
        },
    }
}
