//! Recursive-descent parser with Pratt-style expression precedence (spec
//! §4.2). Consumes the token stream from [`crate::lexer::Lexer`] and
//! produces the [`ast::Chunk`] tree consumed by the resolver and compiler.

pub mod ast;
pub mod report;

use std::rc::Rc;

use crate::lexer::{LexError, Lexer, Token, TokenKind};
use ast::{BinOp, Block, Chunk, Expr, FunctionBody, NameRef, SourceLocation, Stat, TableField, UnOp};
use report::{Reporter, ReporterConfig, Severity};

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub loc: SourceLocation,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.loc.line, self.loc.column, self.message)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            message: e.message,
            loc: SourceLocation { line: e.line, column: e.column },
        }
    }
}

/// `or` binds loosest, `^` tightest (binds tighter than unary operators).
/// Left-associative levels are tried at `level + 1` on the right; the two
/// right-associative ones (`..`, `^`) are tried at `level` on the right.
fn infix_binding_power(kind: &TokenKind) -> Option<(u8, u8, BinOp)> {
    use TokenKind::*;
    Some(match kind {
        Or => (1, 2, BinOp::Or),
        And => (3, 4, BinOp::And),
        Lt => (5, 6, BinOp::Lt),
        Gt => (5, 6, BinOp::Gt),
        Le => (5, 6, BinOp::Le),
        Ge => (5, 6, BinOp::Ge),
        Ne => (5, 6, BinOp::Ne),
        Eq => (5, 6, BinOp::Eq),
        Concat => (8, 7, BinOp::Concat), // right-assoc
        Plus => (9, 10, BinOp::Add),
        Minus => (9, 10, BinOp::Sub),
        Star => (11, 12, BinOp::Mul),
        Slash => (11, 12, BinOp::Div),
        Percent => (11, 12, BinOp::Mod),
        Caret => (16, 15, BinOp::Pow), // right-assoc, tighter than unary
        _ => return None,
    })
}

const UNARY_BINDING_POWER: u8 = 14;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub reporter: Reporter,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            reporter: Reporter::new(ReporterConfig::default_mode()),
        }
    }

    pub fn with_config(tokens: Vec<Token>, config: ReporterConfig) -> Self {
        Parser {
            tokens,
            pos: 0,
            reporter: Reporter::new(config),
        }
    }

    /// Parse `source` (tokenizing it first) into a [`Chunk`] named
    /// `source_name`, the name that shows up in error messages and `debug`
    /// info.
    pub fn parse_chunk(source: &str, source_name: &str) -> ParseResult<Chunk> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = Parser::new(tokens);
        let body = parser.parse_block()?;
        parser.expect(TokenKind::Eof)?;
        Ok(Chunk {
            source_name: Rc::from(source_name),
            body: FunctionBody {
                params: Vec::new(),
                is_vararg: true,
                body,
                name: None,
                loc: SourceLocation { line: 1, column: 1 },
            },
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn loc(&self) -> SourceLocation {
        let t = self.peek();
        SourceLocation { line: t.line, column: t.column }
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {:?}, found {:?}",
                kind,
                self.peek_kind()
            )))
        }
    }

    fn expect_name(&mut self) -> ParseResult<Rc<str>> {
        match self.peek_kind().clone() {
            TokenKind::Name(n) => {
                self.advance();
                Ok(n)
            }
            other => Err(self.error(format!("expected name, found {:?}", other))),
        }
    }

    fn error(&mut self, message: impl Into<String>) -> ParseError {
        let loc = self.loc();
        let message = message.into();
        self.reporter.report(Severity::Error, message.clone(), loc);
        ParseError { message, loc }
    }

    fn block_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Eof
                | TokenKind::End
                | TokenKind::Else
                | TokenKind::Elseif
                | TokenKind::Until
        )
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        let mut stats = Vec::new();
        while !self.block_end() {
            if self.matches(&TokenKind::Semi) {
                continue;
            }
            if matches!(self.peek_kind(), TokenKind::Return) {
                stats.push(self.parse_return()?);
                break;
            }
            stats.push(self.parse_stat()?);
        }
        Ok(Block { stats })
    }

    fn parse_return(&mut self) -> ParseResult<Stat> {
        let loc = self.loc();
        self.advance();
        let mut exprs = Vec::new();
        if !self.block_end() && !matches!(self.peek_kind(), TokenKind::Semi) {
            exprs = self.parse_expr_list()?;
        }
        self.matches(&TokenKind::Semi);
        Ok(Stat::Return(exprs, loc))
    }

    fn parse_stat(&mut self) -> ParseResult<Stat> {
        let loc = self.loc();
        match self.peek_kind().clone() {
            TokenKind::Break => {
                self.advance();
                Ok(Stat::Break(loc))
            }
            TokenKind::Do => {
                self.advance();
                let b = self.parse_block()?;
                self.expect(TokenKind::End)?;
                Ok(Stat::Do(b))
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Do)?;
                let body = self.parse_block()?;
                self.expect(TokenKind::End)?;
                Ok(Stat::While(cond, body, loc))
            }
            TokenKind::Repeat => {
                self.advance();
                let body = self.parse_block()?;
                self.expect(TokenKind::Until)?;
                let cond = self.parse_expr()?;
                Ok(Stat::Repeat(body, cond, loc))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Function => self.parse_function_stat(),
            TokenKind::Local => self.parse_local(),
            _ => self.parse_expr_stat(),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stat> {
        let loc = self.loc();
        self.advance();
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Then)?;
        let body = self.parse_block()?;
        arms.push((cond, body));
        loop {
            match self.peek_kind() {
                TokenKind::Elseif => {
                    self.advance();
                    let cond = self.parse_expr()?;
                    self.expect(TokenKind::Then)?;
                    let body = self.parse_block()?;
                    arms.push((cond, body));
                }
                _ => break,
            }
        }
        let else_block = if self.matches(&TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        self.expect(TokenKind::End)?;
        Ok(Stat::If(arms, else_block, loc))
    }

    fn parse_for(&mut self) -> ParseResult<Stat> {
        let loc = self.loc();
        self.advance();
        let first = self.expect_name()?;
        if self.matches(&TokenKind::Assign) {
            let start = self.parse_expr()?;
            self.expect(TokenKind::Comma)?;
            let limit = self.parse_expr()?;
            let step = if self.matches(&TokenKind::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(TokenKind::Do)?;
            let body = self.parse_block()?;
            self.expect(TokenKind::End)?;
            return Ok(Stat::NumericFor { var: first, start, limit, step, body, loc });
        }
        let mut vars = vec![first];
        while self.matches(&TokenKind::Comma) {
            vars.push(self.expect_name()?);
        }
        self.expect(TokenKind::In)?;
        let exprs = self.parse_expr_list()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End)?;
        Ok(Stat::GenericFor { vars, exprs, body, loc })
    }

    fn parse_function_stat(&mut self) -> ParseResult<Stat> {
        let loc = self.loc();
        self.advance();
        let first = self.expect_name()?;
        let mut target = Expr::Name(NameRef::new(first.clone(), loc));
        let mut name_parts = vec![first.to_string()];
        let mut is_method = false;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_name()?;
                    name_parts.push(field.to_string());
                    let field_loc = self.loc();
                    target = Expr::Index(
                        Box::new(target),
                        Box::new(Expr::Str(field, field_loc)),
                        field_loc,
                    );
                }
                TokenKind::Colon => {
                    self.advance();
                    let field = self.expect_name()?;
                    name_parts.push(field.to_string());
                    let field_loc = self.loc();
                    target = Expr::Index(
                        Box::new(target),
                        Box::new(Expr::Str(field, field_loc)),
                        field_loc,
                    );
                    is_method = true;
                    break;
                }
                _ => break,
            }
        }
        let full_name: Rc<str> = Rc::from(name_parts.join(".").as_str());
        let body = self.parse_function_body(is_method, Some(full_name))?;
        Ok(Stat::Function { target, body: Rc::new(body), loc })
    }

    fn parse_local(&mut self) -> ParseResult<Stat> {
        let loc = self.loc();
        self.advance();
        if self.matches(&TokenKind::Function) {
            let name = self.expect_name()?;
            let body = self.parse_function_body(false, Some(name.clone()))?;
            return Ok(Stat::LocalFunction { name, body: Rc::new(body), loc });
        }
        let mut names = vec![self.expect_name()?];
        while self.matches(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }
        let exprs = if self.matches(&TokenKind::Assign) {
            self.parse_expr_list()?
        } else {
            Vec::new()
        };
        Ok(Stat::Local(names, exprs, loc))
    }

    fn parse_expr_stat(&mut self) -> ParseResult<Stat> {
        let loc = self.loc();
        let first = self.parse_suffixed_expr()?;
        if matches!(self.peek_kind(), TokenKind::Assign | TokenKind::Comma) {
            let mut targets = vec![first];
            while self.matches(&TokenKind::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            self.expect(TokenKind::Assign)?;
            let values = self.parse_expr_list()?;
            for t in &targets {
                if !matches!(t, Expr::Name(_) | Expr::Index(..)) {
                    return Err(self.error("cannot assign to this expression"));
                }
            }
            return Ok(Stat::Assign(targets, values, loc));
        }
        match &first {
            Expr::Call(..) | Expr::MethodCall(..) => Ok(Stat::Expr(first)),
            _ => Err(self.error("syntax error: expression statement must be a call")),
        }
    }

    fn parse_expr_list(&mut self) -> ParseResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.matches(&TokenKind::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let loc = self.loc();
        let mut lhs = match self.peek_kind().clone() {
            TokenKind::Not => {
                self.advance();
                let rhs = self.parse_expr_bp(UNARY_BINDING_POWER)?;
                Expr::Unary(UnOp::Not, Box::new(rhs), loc)
            }
            TokenKind::Minus => {
                self.advance();
                let rhs = self.parse_expr_bp(UNARY_BINDING_POWER)?;
                Expr::Unary(UnOp::Neg, Box::new(rhs), loc)
            }
            TokenKind::Hash => {
                self.advance();
                let rhs = self.parse_expr_bp(UNARY_BINDING_POWER)?;
                Expr::Unary(UnOp::Len, Box::new(rhs), loc)
            }
            _ => self.parse_simple_expr()?,
        };

        loop {
            let kind = self.peek_kind().clone();
            let Some((lbp, rbp, op)) = infix_binding_power(&kind) else { break };
            if lbp < min_bp {
                break;
            }
            let op_loc = self.loc();
            self.advance();
            let rhs = self.parse_expr_bp(rbp)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), op_loc);
        }
        Ok(lhs)
    }

    fn parse_simple_expr(&mut self) -> ParseResult<Expr> {
        let loc = self.loc();
        match self.peek_kind().clone() {
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::Nil(loc))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::True(loc))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::False(loc))
            }
            TokenKind::Ellipsis => {
                self.advance();
                Ok(Expr::Vararg(loc))
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n, loc))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Str(s, loc))
            }
            TokenKind::Function => {
                self.advance();
                let body = self.parse_function_body(false, None)?;
                Ok(Expr::Function(Rc::new(body), loc))
            }
            TokenKind::LBrace => self.parse_table(),
            _ => self.parse_suffixed_expr(),
        }
    }

    fn parse_primary_expr(&mut self) -> ParseResult<Expr> {
        let loc = self.loc();
        match self.peek_kind().clone() {
            TokenKind::Name(n) => {
                self.advance();
                Ok(Expr::Name(NameRef::new(n, loc)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Paren(Box::new(inner), loc))
            }
            other => Err(self.error(format!("unexpected symbol near {:?}", other))),
        }
    }

    /// A primary expression followed by any number of `.field`, `[k]`,
    /// `:method(args)`, or `(args)` suffixes.
    fn parse_suffixed_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            let loc = self.loc();
            match self.peek_kind().clone() {
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_name()?;
                    expr = Expr::Index(Box::new(expr), Box::new(Expr::Str(field, loc)), loc);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(key), loc);
                }
                TokenKind::Colon => {
                    self.advance();
                    let method = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    expr = Expr::MethodCall(Box::new(expr), method, args, loc);
                }
                TokenKind::LParen | TokenKind::String(_) | TokenKind::LBrace => {
                    let args = self.parse_call_args()?;
                    expr = Expr::Call(Box::new(expr), args, loc);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        let loc = self.loc();
        match self.peek_kind().clone() {
            TokenKind::LParen => {
                self.advance();
                let args = if self.check(&TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.expect(TokenKind::RParen)?;
                Ok(args)
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(vec![Expr::Str(s, loc)])
            }
            TokenKind::LBrace => Ok(vec![self.parse_table()?]),
            other => Err(self.error(format!("function arguments expected, found {:?}", other))),
        }
    }

    fn parse_table(&mut self) -> ParseResult<Expr> {
        let loc = self.loc();
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            match self.peek_kind().clone() {
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    self.expect(TokenKind::Assign)?;
                    let value = self.parse_expr()?;
                    fields.push(TableField::Keyed(key, value));
                }
                TokenKind::Name(n) if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Assign)) => {
                    self.advance();
                    self.advance();
                    let value = self.parse_expr()?;
                    fields.push(TableField::Named(n, value));
                }
                _ => {
                    let value = self.parse_expr()?;
                    fields.push(TableField::Positional(value));
                }
            }
            if !self.matches(&TokenKind::Comma) && !self.matches(&TokenKind::Semi) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Table(fields, loc))
    }

    fn parse_function_body(&mut self, is_method: bool, name: Option<Rc<str>>) -> ParseResult<FunctionBody> {
        let loc = self.loc();
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if is_method {
            params.push(Rc::from("self"));
        }
        let mut is_vararg = false;
        if !self.check(&TokenKind::RParen) {
            loop {
                match self.peek_kind().clone() {
                    TokenKind::Ellipsis => {
                        self.advance();
                        is_vararg = true;
                        break;
                    }
                    TokenKind::Name(n) => {
                        self.advance();
                        params.push(n);
                    }
                    other => return Err(self.error(format!("expected parameter name, found {:?}", other))),
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End)?;
        Ok(FunctionBody { params, is_vararg, body, name, loc })
    }
}
