//! Name resolution and upvalue analysis (spec §4.3), run as a standalone
//! pass over the parsed AST before the compiler ever looks at it. Walks
//! every [`crate::parser::ast::NameRef`] and fills in its `resolution` cell
//! with where the name actually lives: a local slot in the current
//! function, an upvalue (possibly chained through several enclosing
//! functions), or a global.

use std::rc::Rc;

use crate::parser::ast::{
    Block, Chunk, Expr, FunctionBody, NameRef, Resolution, Stat, TableField,
};
use crate::parser::report::{Reporter, ReporterConfig, Severity};

/// One entry in a function's upvalue list: where the value lives in the
/// immediately enclosing function. `in_parent_locals` distinguishes a
/// parent's own local slot from one of the parent's own upvalues, so a
/// three-levels-deep closure chains through each intermediate function's
/// upvalue list rather than reaching straight past it.
#[derive(Debug, Clone)]
pub struct UpvalueDesc {
    pub name: Rc<str>,
    pub in_parent_locals: bool,
    pub index: u16,
}

/// Resolution output for one function body, handed to the compiler
/// alongside the (already-annotated) AST it was computed from.
#[derive(Debug, Default)]
pub struct FunctionInfo {
    pub upvalues: Vec<UpvalueDesc>,
    pub max_locals: u16,
}

struct FuncScope {
    blocks: Vec<Vec<(Option<Rc<str>>, u16)>>,
    next_slot: u16,
    max_slot: u16,
    upvalues: Vec<UpvalueDesc>,
}

impl FuncScope {
    fn new() -> Self {
        FuncScope {
            blocks: vec![Vec::new()],
            next_slot: 0,
            max_slot: 0,
            upvalues: Vec::new(),
        }
    }

    fn push_block(&mut self) {
        self.blocks.push(Vec::new());
    }

    fn pop_block(&mut self) {
        let block = self.blocks.pop().expect("unbalanced block push/pop");
        self.next_slot -= block.len() as u16;
    }

    fn find_local(&self, name: &str) -> Option<u16> {
        for block in self.blocks.iter().rev() {
            if let Some((_, slot)) = block.iter().rev().find(|(n, _)| n.as_deref() == Some(name)) {
                return Some(*slot);
            }
        }
        None
    }

    fn add_local(&mut self, name: Rc<str>) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.max_slot = self.max_slot.max(self.next_slot);
        self.blocks.last_mut().unwrap().push((Some(name), slot));
        slot
    }

    /// Reserve a register slot with no name — the three control registers
    /// `for` loops need underneath their visible loop variable(s) (spec
    /// §4.4 FORPREP/FORLOOP/TFORLOOP register layout). Never resolvable by
    /// name, only ever referenced by the compiler via its known offset from
    /// the loop variable's own slot.
    fn add_hidden(&mut self) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.max_slot = self.max_slot.max(self.next_slot);
        self.blocks.last_mut().unwrap().push((None, slot));
        slot
    }

    fn find_or_add_upvalue(&mut self, name: &str, in_parent_locals: bool, index: u16) -> u16 {
        if let Some(i) = self.upvalues.iter().position(|u| &*u.name == name) {
            return i as u16;
        }
        self.upvalues.push(UpvalueDesc {
            name: Rc::from(name),
            in_parent_locals,
            index,
        });
        (self.upvalues.len() - 1) as u16
    }
}

pub struct Resolver {
    funcs: Vec<FuncScope>,
    pub infos: Vec<FunctionInfo>,
    pub reporter: Reporter,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            funcs: Vec::new(),
            infos: Vec::new(),
            reporter: Reporter::new(ReporterConfig::default_mode()),
        }
    }

    /// Resolve every name in `chunk` in place, returning one [`FunctionInfo`]
    /// per function body in the order its body finished resolving
    /// (post-order — a nested function's info is appended before its
    /// enclosing one's).
    pub fn resolve_chunk(chunk: &Chunk) -> Vec<FunctionInfo> {
        let mut r = Resolver::new();
        r.resolve_function(&chunk.body, false);
        r.infos
    }

    fn resolve_function(&mut self, body: &FunctionBody, _is_method: bool) -> u16 {
        self.funcs.push(FuncScope::new());
        for p in &body.params {
            self.funcs.last_mut().unwrap().add_local(p.clone());
        }
        self.resolve_block(&body.body);
        let scope = self.funcs.pop().unwrap();
        self.infos.push(FunctionInfo {
            upvalues: scope.upvalues,
            max_locals: scope.max_slot,
        });
        (self.infos.len() - 1) as u16
    }

    fn resolve_block(&mut self, block: &Block) {
        self.funcs.last_mut().unwrap().push_block();
        for stat in &block.stats {
            self.resolve_stat(stat);
        }
        self.funcs.last_mut().unwrap().pop_block();
    }

    fn resolve_stat(&mut self, stat: &Stat) {
        match stat {
            Stat::Expr(e) => self.resolve_expr(e),
            Stat::Local(names, exprs, _loc) => {
                for e in exprs {
                    self.resolve_expr(e);
                }
                for n in names {
                    self.funcs.last_mut().unwrap().add_local(n.clone());
                }
            }
            Stat::Assign(targets, values, _loc) => {
                for v in values {
                    self.resolve_expr(v);
                }
                for t in targets {
                    self.resolve_expr(t);
                }
            }
            Stat::Do(b) => self.resolve_block(b),
            Stat::While(cond, body, _loc) => {
                self.resolve_expr(cond);
                self.resolve_block(body);
            }
            Stat::Repeat(body, cond, _loc) => {
                // `until` can see locals declared in the loop body (spec
                // §4.2 repeat-until scoping), so resolve the condition
                // before popping the body's block.
                self.funcs.last_mut().unwrap().push_block();
                for s in &body.stats {
                    self.resolve_stat(s);
                }
                self.resolve_expr(cond);
                self.funcs.last_mut().unwrap().pop_block();
            }
            Stat::If(arms, else_block, _loc) => {
                for (cond, body) in arms {
                    self.resolve_expr(cond);
                    self.resolve_block(body);
                }
                if let Some(b) = else_block {
                    self.resolve_block(b);
                }
            }
            Stat::NumericFor { var, start, limit, step, body, .. } => {
                self.resolve_expr(start);
                self.resolve_expr(limit);
                if let Some(s) = step {
                    self.resolve_expr(s);
                }
                self.funcs.last_mut().unwrap().push_block();
                // Three hidden control registers (index, limit, step) sit
                // beneath the visible loop variable (spec §4.4 FORLOOP).
                for _ in 0..3 {
                    self.funcs.last_mut().unwrap().add_hidden();
                }
                self.funcs.last_mut().unwrap().add_local(var.clone());
                for s in &body.stats {
                    self.resolve_stat(s);
                }
                self.funcs.last_mut().unwrap().pop_block();
            }
            Stat::GenericFor { vars, exprs, body, .. } => {
                for e in exprs {
                    self.resolve_expr(e);
                }
                self.funcs.last_mut().unwrap().push_block();
                // Three hidden control registers (iterator function, state,
                // control variable) sit beneath the visible loop variables
                // (spec §4.4 TFORLOOP).
                for _ in 0..3 {
                    self.funcs.last_mut().unwrap().add_hidden();
                }
                for v in vars {
                    self.funcs.last_mut().unwrap().add_local(v.clone());
                }
                for s in &body.stats {
                    self.resolve_stat(s);
                }
                self.funcs.last_mut().unwrap().pop_block();
            }
            Stat::Function { target, body, .. } => {
                self.resolve_expr(target);
                self.resolve_function(body, false);
            }
            Stat::LocalFunction { name, body, .. } => {
                // The local is in scope inside its own body, so it can
                // recurse by name.
                self.funcs.last_mut().unwrap().add_local(name.clone());
                self.resolve_function(body, false);
            }
            Stat::Return(exprs, _loc) => {
                for e in exprs {
                    self.resolve_expr(e);
                }
            }
            Stat::Break(_loc) => {}
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Nil(_) | Expr::True(_) | Expr::False(_) | Expr::Vararg(_) | Expr::Number(..) | Expr::Str(..) => {}
            Expr::Name(name_ref) => self.resolve_name_ref(name_ref),
            Expr::Unary(_, e, _) => self.resolve_expr(e),
            Expr::Binary(_, l, r, _) => {
                self.resolve_expr(l);
                self.resolve_expr(r);
            }
            Expr::Index(obj, key, _) => {
                self.resolve_expr(obj);
                self.resolve_expr(key);
            }
            Expr::Call(f, args, _) => {
                self.resolve_expr(f);
                for a in args {
                    self.resolve_expr(a);
                }
            }
            Expr::MethodCall(obj, _, args, _) => {
                self.resolve_expr(obj);
                for a in args {
                    self.resolve_expr(a);
                }
            }
            Expr::Function(body, _) => {
                self.resolve_function(body, false);
            }
            Expr::Table(fields, _) => {
                for f in fields {
                    match f {
                        TableField::Keyed(k, v) => {
                            self.resolve_expr(k);
                            self.resolve_expr(v);
                        }
                        TableField::Named(_, v) => self.resolve_expr(v),
                        TableField::Positional(v) => self.resolve_expr(v),
                    }
                }
            }
            Expr::Paren(e, _) => self.resolve_expr(e),
        }
    }

    fn resolve_name_ref(&mut self, name_ref: &NameRef) {
        let resolution = self.resolve_name(&name_ref.name);
        name_ref.resolution.set(Some(resolution));
    }

    fn resolve_name(&mut self, name: &str) -> Resolution {
        let found_level = self
            .funcs
            .iter()
            .enumerate()
            .rev()
            .find(|(_, f)| f.find_local(name).is_some())
            .map(|(i, _)| i);

        let Some(level) = found_level else {
            return Resolution::Global;
        };
        let top = self.funcs.len() - 1;
        if level == top {
            return Resolution::Local(self.funcs[top].find_local(name).unwrap());
        }

        let mut idx = self.funcs[level].find_local(name).unwrap();
        let mut in_parent_locals = true;
        for i in (level + 1)..=top {
            idx = self.funcs[i].find_or_add_upvalue(name, in_parent_locals, idx);
            in_parent_locals = false;
        }
        Resolution::Upvalue(idx)
    }

    #[allow(dead_code)]
    fn warn(&mut self, message: impl Into<String>, loc: crate::parser::ast::SourceLocation) {
        self.reporter.report(Severity::Warning, message, loc);
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new()
    }
}
