// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Query compilation.
//!
//! The compiler owns the function registry and turns parsed source into a
//! self-contained [`Program`]: every variable reference is checked against
//! the scopes that will exist at run time, and every function call is
//! resolved to its registered handler up front. A compiled program holds
//! its own handles, so later registry changes never affect it.
//!
//! Scoping rules worth knowing:
//!
//! - A LET initializer cannot see the name it is binding.
//! - A FOR source is resolved in the enclosing scope, so the loop
//!   variable is not visible in it.
//! - COLLECT replaces the iteration frame with a group frame; only the
//!   grouping keys, INTO, WITH COUNT and AGGREGATE names survive it.
//! - Shadowing an outer name is allowed; redeclaring within the same
//!   frame is not.

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{CompileError, InvalidFunctionName};
use crate::exec::node::{
    AggregateNode, CallNode, CollectNode, ForNode, KeyNode, LimitNode, Node, PropNode,
    ResultNode, SortKeyNode, SourceNode, StmtNode, WaitForNode,
};
use crate::exec::operators;
use crate::exec::Program;
use crate::namespace::{Function, FunctionRegistry, Namespace};
use crate::syntax::ast::{
    BinaryOp, CallExpr, Clause, Expr, ForExpr, ForItem, ForSource, Ident, MemberKey, Pos,
    PropKey, ResultExpr, Stmt,
};
use crate::value::Value;

/// Compiles query source against a set of registered functions.
#[derive(Default, Clone)]
pub struct Compiler {
    registry: FunctionRegistry,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write handle for the given namespace, e.g.
    /// `compiler.namespace("UTILS").register("TRIM", ...)`.
    pub fn namespace(&mut self, name: &str) -> Namespace<'_> {
        self.registry.namespace(name)
    }

    /// Register a function in the root namespace.
    pub fn register(
        &mut self,
        name: &str,
        function: impl Function + 'static,
    ) -> Result<(), InvalidFunctionName> {
        self.registry.register(name, function)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Parse and check `src`, producing a runnable program.
    pub fn compile(&self, src: &str) -> Result<Program, CompileError> {
        match self.compile_inner(src) {
            Ok(program) => {
                debug!("query compiled");
                Ok(program)
            }
            Err(e) => {
                warn!(error = %e, "query failed to compile");
                Err(e)
            }
        }
    }

    fn compile_inner(&self, src: &str) -> Result<Program, CompileError> {
        let ast = crate::syntax::parse(src)?;
        let mut ctx = CompileCtx {
            registry: &self.registry,
            scopes: vec![HashSet::new()],
        };
        let mut statements = Vec::with_capacity(ast.statements.len());
        for stmt in &ast.statements {
            statements.push(ctx.compile_stmt(stmt)?);
        }
        let result = ctx.compile_result(&ast.result)?;
        Ok(Program { statements, result })
    }
}

/// Per-compilation state: the registry snapshot and the stack of variable
/// frames mirroring what the executor will push.
struct CompileCtx<'c> {
    registry: &'c FunctionRegistry,
    scopes: Vec<HashSet<String>>,
}

impl CompileCtx<'_> {
    fn push(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Duplicates are rejected against the current frame only, so inner
    /// frames may shadow.
    fn declare(&mut self, ident: &Ident) -> Result<(), CompileError> {
        let frame = match self.scopes.last_mut() {
            Some(frame) => frame,
            None => unreachable!("scope stack is never empty"),
        };
        if !frame.insert(ident.name.clone()) {
            return Err(CompileError::DuplicateVariable {
                name: ident.name.clone(),
                pos: ident.pos,
            });
        }
        Ok(())
    }

    fn is_defined(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|frame| frame.contains(name))
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<StmtNode, CompileError> {
        match stmt {
            Stmt::Let { name, value, .. } => {
                // The initializer cannot reference the name it binds.
                let value = self.compile_expr(value)?;
                self.declare(name)?;
                Ok(StmtNode::Let {
                    name: name.name.clone(),
                    value,
                })
            }
            Stmt::Expr(expr) => Ok(StmtNode::Expr(self.compile_expr(expr)?)),
        }
    }

    fn compile_result(&mut self, result: &ResultExpr) -> Result<ResultNode, CompileError> {
        match result {
            ResultExpr::Return { value, .. } => {
                Ok(ResultNode::Return(self.compile_expr(value)?))
            }
            ResultExpr::For(for_expr) => {
                Ok(ResultNode::Nested(Box::new(self.compile_for(for_expr)?)))
            }
        }
    }

    fn compile_for(&mut self, for_expr: &ForExpr) -> Result<ForNode, CompileError> {
        // The source sees the enclosing scope, not the loop variables.
        let source = match &for_expr.source {
            ForSource::Iterable(expr) => SourceNode::Iterable(self.compile_expr(expr)?),
            ForSource::While(expr) => SourceNode::While(self.compile_expr(expr)?),
        };

        self.push();
        self.declare(&for_expr.value_var)?;
        if let Some(key_var) = &for_expr.key_var {
            self.declare(key_var)?;
        }

        let mut statements = Vec::new();
        let mut group_statements = Vec::new();
        let mut filters = Vec::new();
        let mut sort = Vec::new();
        let mut limit = None;
        let mut collect: Option<CollectNode> = None;

        for item in &for_expr.body {
            match item {
                ForItem::Stmt(stmt) => {
                    let node = self.compile_stmt(stmt)?;
                    if collect.is_some() {
                        group_statements.push(node);
                    } else {
                        statements.push(node);
                    }
                }
                ForItem::Clause(Clause::Filter { cond, pos }) => {
                    filters.push((self.compile_expr(cond)?, *pos));
                }
                ForItem::Clause(Clause::Sort { keys, .. }) => {
                    for key in keys {
                        sort.push(SortKeyNode {
                            key: self.compile_expr(&key.expr)?,
                            descending: key.descending,
                        });
                    }
                }
                ForItem::Clause(Clause::Limit { offset, count, pos }) => {
                    // A later LIMIT replaces an earlier one.
                    limit = Some(LimitNode {
                        offset: match offset {
                            Some(expr) => Some(self.compile_expr(expr)?),
                            None => None,
                        },
                        count: self.compile_expr(count)?,
                        pos: *pos,
                    });
                }
                ForItem::Clause(Clause::Collect(clause)) => {
                    // Key and aggregate argument expressions still run per
                    // iteration, so they compile against the iteration frame.
                    let mut groups = Vec::with_capacity(clause.groups.len());
                    for (name, expr) in &clause.groups {
                        groups.push((name.name.clone(), self.compile_expr(expr)?));
                    }
                    let mut aggregates = Vec::with_capacity(clause.aggregates.len());
                    for agg in &clause.aggregates {
                        aggregates.push(AggregateNode {
                            name: agg.name.name.clone(),
                            call: self.compile_call(&agg.call)?,
                        });
                    }
                    let into_bare = for_expr.key_var.is_none()
                        && !statements
                            .iter()
                            .any(|stmt| matches!(stmt, StmtNode::Let { .. }));

                    // Swap the iteration frame for the group frame.
                    self.pop();
                    self.push();
                    for (name, _) in &clause.groups {
                        self.declare(name)?;
                    }
                    if let Some(into) = &clause.into {
                        self.declare(into)?;
                    }
                    if let Some(count_into) = &clause.count_into {
                        self.declare(count_into)?;
                    }
                    for agg in &clause.aggregates {
                        self.declare(&agg.name)?;
                    }

                    collect = Some(CollectNode {
                        groups,
                        into: clause.into.as_ref().map(|ident| ident.name.clone()),
                        into_bare,
                        count_into: clause.count_into.as_ref().map(|ident| ident.name.clone()),
                        aggregates,
                        pos: clause.pos,
                    });
                }
            }
        }

        let result = self.compile_result(&for_expr.result)?;
        self.pop();

        Ok(ForNode {
            value_var: for_expr.value_var.name.clone(),
            key_var: for_expr.key_var.as_ref().map(|ident| ident.name.clone()),
            source,
            statements,
            filter: conjoin(filters),
            limit,
            sort,
            collect,
            group_statements,
            result,
            pos: for_expr.pos,
        })
    }

    fn compile_call(&mut self, call: &CallExpr) -> Result<CallNode, CompileError> {
        let function = match self.registry.get(&call.function) {
            Some(function) => function,
            None => {
                return Err(CompileError::UnknownFunction {
                    name: call.function.clone(),
                    pos: call.pos,
                })
            }
        };
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.compile_expr(arg)?);
        }
        Ok(CallNode {
            name: call.function.clone(),
            function,
            args,
            pos: call.pos,
        })
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<Node, CompileError> {
        match expr {
            Expr::None(_) => Ok(Node::Literal(Value::None)),
            Expr::Bool(b, _) => Ok(Node::Literal(Value::Bool(*b))),
            Expr::Int(n, _) => Ok(Node::Literal(Value::Int(*n))),
            Expr::Float(f, _) => Ok(Node::Literal(Value::Float(*f))),
            Expr::String(s, _) => Ok(Node::Literal(Value::String(s.clone()))),

            Expr::Array { items, .. } => {
                let mut compiled = Vec::with_capacity(items.len());
                for item in items {
                    compiled.push(self.compile_expr(item)?);
                }
                Ok(Node::Array { items: compiled })
            }

            Expr::Object { entries, pos } => {
                let mut compiled = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = match key {
                        PropKey::Name(name) => PropNode::Name(name.clone()),
                        PropKey::Computed(expr) => PropNode::Computed(self.compile_expr(expr)?),
                    };
                    compiled.push((key, self.compile_expr(value)?));
                }
                Ok(Node::Object {
                    entries: compiled,
                    pos: *pos,
                })
            }

            Expr::Var(ident) => {
                if !self.is_defined(&ident.name) {
                    return Err(CompileError::UndefinedVariable {
                        name: ident.name.clone(),
                        pos: ident.pos,
                    });
                }
                Ok(Node::Var {
                    name: ident.name.clone(),
                    pos: ident.pos,
                })
            }

            // Parameters are bound per run; presence is checked then.
            Expr::Param { name, pos } => Ok(Node::Param {
                name: name.clone(),
                pos: *pos,
            }),

            Expr::Call(call) => Ok(Node::Call(self.compile_call(call)?)),

            Expr::Unary { op, operand, pos } => Ok(Node::Unary {
                op: *op,
                operand: Box::new(self.compile_expr(operand)?),
                pos: *pos,
            }),

            Expr::Binary {
                op,
                left,
                right,
                pos,
            } => {
                let left = Box::new(self.compile_expr(left)?);
                if let Some(regex) = literal_pattern(*op, right) {
                    return Ok(Node::Match {
                        op: *op,
                        left,
                        regex,
                        pos: *pos,
                    });
                }
                Ok(Node::Binary {
                    op: *op,
                    left,
                    right: Box::new(self.compile_expr(right)?),
                    pos: *pos,
                })
            }

            Expr::Ternary {
                cond,
                then,
                otherwise,
                ..
            } => Ok(Node::Ternary {
                cond: Box::new(self.compile_expr(cond)?),
                then: match then {
                    Some(expr) => Some(Box::new(self.compile_expr(expr)?)),
                    None => None,
                },
                otherwise: Box::new(self.compile_expr(otherwise)?),
            }),

            Expr::Range { start, end, pos } => Ok(Node::Range {
                start: Box::new(self.compile_expr(start)?),
                end: Box::new(self.compile_expr(end)?),
                pos: *pos,
            }),

            Expr::Member { target, key, pos } => Ok(Node::Member {
                target: Box::new(self.compile_expr(target)?),
                key: match key {
                    MemberKey::Name(name) => KeyNode::Name(name.clone()),
                    MemberKey::Computed(expr) => {
                        KeyNode::Computed(Box::new(self.compile_expr(expr)?))
                    }
                },
                pos: *pos,
            }),

            Expr::For(for_expr) => Ok(Node::For(Box::new(self.compile_for(for_expr)?))),

            Expr::WaitFor(waitfor) => Ok(Node::WaitFor(Box::new(WaitForNode {
                event: self.compile_expr(&waitfor.event)?,
                source: self.compile_expr(&waitfor.source)?,
                timeout: match &waitfor.timeout {
                    Some(expr) => Some(self.compile_expr(expr)?),
                    None => None,
                },
                pos: waitfor.pos,
            }))),
        }
    }
}

/// Compile the regex of a pattern operator up front when its right side is
/// a string literal, so FILTERs do not rebuild it per row. A literal that
/// fails to compile returns `None` and keeps the per-evaluation path, which
/// reports it as a runtime error exactly like a dynamic pattern.
fn literal_pattern(op: BinaryOp, right: &Expr) -> Option<Regex> {
    let pattern = match right {
        Expr::String(s, _) => s,
        _ => return None,
    };
    match op {
        BinaryOp::Like | BinaryOp::NotLike => {
            Regex::new(&operators::like_to_regex(pattern)).ok()
        }
        BinaryOp::RegexMatch | BinaryOp::RegexNotMatch => Regex::new(pattern).ok(),
        _ => None,
    }
}

/// Fold FILTER conditions into one left-associated AND chain.
fn conjoin(filters: Vec<(Node, Pos)>) -> Option<Node> {
    let mut iter = filters.into_iter();
    let (first, _) = iter.next()?;
    Some(iter.fold(first, |acc, (cond, pos)| Node::Binary {
        op: BinaryOp::And,
        left: Box::new(acc),
        right: Box::new(cond),
        pos,
    }))
}
