// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Syntax tree produced by the parser and consumed by the compiler.
//!
//! Every node that can fail compilation or execution carries the source
//! position of its first token, so errors point back into the query text.

use std::fmt;

/// A 1-based line/column source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// An identifier occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub pos: Pos,
}

/// A parsed program: leading statements, then exactly one result.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub statements: Vec<Stmt>,
    pub result: ResultExpr,
}

/// The value-producing tail of a program or FOR body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultExpr {
    Return { value: Expr, pos: Pos },
    For(Box<ForExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: Ident,
        value: Expr,
        pos: Pos,
    },
    /// A function call or WAITFOR executed for its effect.
    Expr(Expr),
}

/// A FOR iteration expression with its body.
#[derive(Debug, Clone, PartialEq)]
pub struct ForExpr {
    pub value_var: Ident,
    pub key_var: Option<Ident>,
    pub source: ForSource,
    pub body: Vec<ForItem>,
    pub result: ResultExpr,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForSource {
    /// `IN expr`: an array, object, or range to walk.
    Iterable(Expr),
    /// `WHILE expr`: re-evaluated before each iteration.
    While(Expr),
}

/// One interleaved body element, in textual order.
#[derive(Debug, Clone, PartialEq)]
pub enum ForItem {
    Stmt(Stmt),
    Clause(Clause),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Filter {
        cond: Expr,
        pos: Pos,
    },
    Sort {
        keys: Vec<SortKey>,
        pos: Pos,
    },
    Limit {
        offset: Option<Expr>,
        count: Expr,
        pos: Pos,
    },
    Collect(CollectClause),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectClause {
    /// `name = expr` grouping keys; empty for the groupless forms.
    pub groups: Vec<(Ident, Expr)>,
    pub into: Option<Ident>,
    pub count_into: Option<Ident>,
    pub aggregates: Vec<Aggregate>,
    pub pos: Pos,
}

/// `AGGREGATE name = FN(args)` selector.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub name: Ident,
    pub call: CallExpr,
}

/// A namespace-qualified function call, e.g. `UTILS::TRIM(s)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    /// Qualified name as written (`X::CREATE`); resolution is
    /// case-insensitive.
    pub function: String,
    pub args: Vec<Expr>,
    pub pos: Pos,
}

/// `WAITFOR EVENT name IN source [TIMEOUT ms]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitForExpr {
    pub event: Expr,
    pub source: Expr,
    pub timeout: Option<Expr>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None(Pos),
    Bool(bool, Pos),
    Int(i64, Pos),
    Float(f64, Pos),
    String(String, Pos),
    Array {
        items: Vec<Expr>,
        pos: Pos,
    },
    Object {
        entries: Vec<(PropKey, Expr)>,
        pos: Pos,
    },
    Var(Ident),
    /// `@name`, bound at run time.
    Param {
        name: String,
        pos: Pos,
    },
    Call(CallExpr),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        pos: Pos,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        pos: Pos,
    },
    /// `cond ? then : otherwise`; elvis form when `then` is absent.
    Ternary {
        cond: Box<Expr>,
        then: Option<Box<Expr>>,
        otherwise: Box<Expr>,
        pos: Pos,
    },
    /// Inclusive integer range `start..end`.
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        pos: Pos,
    },
    Member {
        target: Box<Expr>,
        key: MemberKey,
        pos: Pos,
    },
    For(Box<ForExpr>),
    WaitFor(Box<WaitForExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKey {
    /// `.name`: string key lookup.
    Name(String),
    /// `[expr]`: Int index into arrays, String key into objects.
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Name(String),
    /// The key of `[expr]: value`, which must evaluate to a string.
    Computed(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Like,
    NotLike,
    RegexMatch,
    RegexNotMatch,
    And,
    Or,
}

impl Expr {
    /// Source position of the expression's first token.
    pub fn pos(&self) -> Pos {
        match self {
            Expr::None(pos)
            | Expr::Bool(_, pos)
            | Expr::Int(_, pos)
            | Expr::Float(_, pos)
            | Expr::String(_, pos)
            | Expr::Array { pos, .. }
            | Expr::Object { pos, .. }
            | Expr::Param { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Ternary { pos, .. }
            | Expr::Range { pos, .. }
            | Expr::Member { pos, .. } => *pos,
            Expr::Var(ident) => ident.pos,
            Expr::Call(call) => call.pos,
            Expr::For(f) => f.pos,
            Expr::WaitFor(w) => w.pos,
        }
    }
}
