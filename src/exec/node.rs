// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Compiled program representation.
//!
//! The compiler lowers the syntax tree into this closed node set: literals
//! are folded to values, variable references are verified names, and
//! function calls carry the resolved handler, so executing a program never
//! touches the registry. FOR bodies arrive normalized: statements in
//! textual order, clauses split into fixed pipeline slots.

use std::sync::Arc;

use regex::Regex;

use crate::namespace::Function;
use crate::syntax::ast::{BinaryOp, UnaryOp};
use crate::syntax::Pos;
use crate::value::Value;

#[derive(Clone)]
pub(crate) enum Node {
    Literal(Value),
    Array {
        items: Vec<Node>,
    },
    Object {
        entries: Vec<(PropNode, Node)>,
        pos: Pos,
    },
    Var {
        name: String,
        pos: Pos,
    },
    Param {
        name: String,
        pos: Pos,
    },
    Call(CallNode),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
        pos: Pos,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
        pos: Pos,
    },
    /// A pattern operator whose literal right side compiled ahead of time.
    /// Dynamic or malformed patterns stay `Binary` and compile per row.
    Match {
        op: BinaryOp,
        left: Box<Node>,
        regex: Regex,
        pos: Pos,
    },
    Ternary {
        cond: Box<Node>,
        then: Option<Box<Node>>,
        otherwise: Box<Node>,
    },
    Range {
        start: Box<Node>,
        end: Box<Node>,
        pos: Pos,
    },
    Member {
        target: Box<Node>,
        key: KeyNode,
        pos: Pos,
    },
    For(Box<ForNode>),
    WaitFor(Box<WaitForNode>),
}

#[derive(Clone)]
pub(crate) enum KeyNode {
    Name(String),
    Computed(Box<Node>),
}

#[derive(Clone)]
pub(crate) enum PropNode {
    Name(String),
    Computed(Node),
}

#[derive(Clone)]
pub(crate) struct CallNode {
    /// Qualified name as written, for error context.
    pub name: String,
    pub function: Arc<dyn Function>,
    pub args: Vec<Node>,
    pub pos: Pos,
}

#[derive(Clone)]
pub(crate) enum StmtNode {
    Let { name: String, value: Node },
    Expr(Node),
}

#[derive(Clone)]
pub(crate) enum ResultNode {
    Return(Node),
    /// Nested FOR: its elements feed the enclosing output directly.
    Nested(Box<ForNode>),
}

#[derive(Clone)]
pub(crate) struct ForNode {
    pub value_var: String,
    pub key_var: Option<String>,
    pub source: SourceNode,
    /// LET and call statements, textual order, run once per iteration.
    pub statements: Vec<StmtNode>,
    /// All FILTER conditions conjoined.
    pub filter: Option<Node>,
    pub limit: Option<LimitNode>,
    pub sort: Vec<SortKeyNode>,
    pub collect: Option<CollectNode>,
    /// Statements textually after COLLECT, run once per group.
    pub group_statements: Vec<StmtNode>,
    pub result: ResultNode,
    pub pos: Pos,
}

#[derive(Clone)]
pub(crate) enum SourceNode {
    Iterable(Node),
    While(Node),
}

#[derive(Clone)]
pub(crate) struct LimitNode {
    pub offset: Option<Node>,
    pub count: Node,
    pub pos: Pos,
}

#[derive(Clone)]
pub(crate) struct SortKeyNode {
    pub key: Node,
    pub descending: bool,
}

#[derive(Clone)]
pub(crate) struct CollectNode {
    pub groups: Vec<(String, Node)>,
    pub into: Option<String>,
    /// Whether INTO binds bare elements (only the loop value variable is
    /// live) or an object per row.
    pub into_bare: bool,
    pub count_into: Option<String>,
    pub aggregates: Vec<AggregateNode>,
    pub pos: Pos,
}

#[derive(Clone)]
pub(crate) struct AggregateNode {
    pub name: String,
    pub call: CallNode,
}

#[derive(Clone)]
pub(crate) struct WaitForNode {
    pub event: Node,
    pub source: Node,
    pub timeout: Option<Node>,
    pub pos: Pos,
}
