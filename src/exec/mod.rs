// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The execution engine.
//!
//! A [`Program`] is the immutable output of compilation; `run` walks its
//! node tree with a per-run scope stack, so a single program can serve
//! any number of sequential or concurrent executions. Evaluation is
//! async throughout: WAITFOR suspends on its subject, and registered
//! functions may do arbitrary async work. The context is polled before
//! every node, so cancellation and deadlines cut in between steps.

pub(crate) mod context;
pub(crate) mod node;
pub(crate) mod operators;
mod pipeline;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use crate::error::RuntimeError;
use crate::scope::ScopeStack;
use crate::syntax::ast::BinaryOp;
use crate::value::{ObjectMap, Value};

use node::{CallNode, KeyNode, Node, PropNode, ResultNode, StmtNode, WaitForNode};

pub use context::Context;

/// Wait this long for an event when WAITFOR has no TIMEOUT clause.
const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_millis(5000);

/// A compiled query, ready to run.
#[derive(Clone)]
pub struct Program {
    pub(crate) statements: Vec<StmtNode>,
    pub(crate) result: ResultNode,
}

impl Program {
    /// Execute and serialize the result to its canonical JSON text form.
    pub async fn run(&self, ctx: Context) -> Result<String, RuntimeError> {
        self.run_with_params(ctx, HashMap::new()).await
    }

    /// Execute with `@param` bindings.
    pub async fn run_with_params(
        &self,
        ctx: Context,
        params: HashMap<String, Value>,
    ) -> Result<String, RuntimeError> {
        let started = std::time::Instant::now();
        let mut exec = Executor {
            ctx: &ctx,
            params: &params,
            scope: ScopeStack::new(),
        };
        for stmt in &self.statements {
            exec.run_stmt(stmt).await?;
        }
        let value = match &self.result {
            ResultNode::Return(node) => exec.eval(node).await?,
            ResultNode::Nested(for_node) => exec.run_for(for_node).await?,
        };
        let output = value.to_json();
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query execution finished"
        );
        Ok(output)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("statements", &self.statements.len())
            .finish_non_exhaustive()
    }
}

/// One execution's mutable state: the context handle, parameter bindings,
/// and the scope stack.
pub(crate) struct Executor<'r> {
    pub(crate) ctx: &'r Context,
    pub(crate) params: &'r HashMap<String, Value>,
    pub(crate) scope: ScopeStack,
}

impl Executor<'_> {
    pub(crate) async fn run_stmt(&mut self, stmt: &StmtNode) -> Result<(), RuntimeError> {
        match stmt {
            StmtNode::Let { name, value } => {
                let value = self.eval(value).await?;
                self.scope.declare(name.clone(), value);
            }
            StmtNode::Expr(node) => {
                self.eval(node).await?;
            }
        }
        Ok(())
    }

    /// Evaluate one node. Boxed so the recursion through async fns has a
    /// finite future size.
    pub(crate) fn eval<'e>(
        &'e mut self,
        node: &'e Node,
    ) -> BoxFuture<'e, Result<Value, RuntimeError>> {
        Box::pin(async move {
            self.ctx.ensure_active()?;
            match node {
                Node::Literal(value) => Ok(value.clone()),

                Node::Array { items } => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval(item).await?);
                    }
                    Ok(Value::from(out))
                }

                Node::Object { entries, pos } => {
                    let mut map = ObjectMap::with_capacity(entries.len());
                    for (key, value) in entries {
                        let key = match key {
                            PropNode::Name(name) => name.clone(),
                            PropNode::Computed(expr) => match self.eval(expr).await? {
                                Value::String(s) => s,
                                other => {
                                    return Err(RuntimeError::type_mismatch(format!(
                                        "computed property keys must be strings, got {}",
                                        other.kind()
                                    ))
                                    .at("object literal", *pos))
                                }
                            },
                        };
                        let value = self.eval(value).await?;
                        map.insert(key, value);
                    }
                    Ok(Value::from(map))
                }

                Node::Var { name, pos } => match self.scope.lookup(name) {
                    Some(value) => Ok(value.clone()),
                    // The compiler proves every reference; a miss here is
                    // an engine defect, not a query error.
                    None => Err(RuntimeError::External(anyhow::anyhow!(
                        "variable '{name}' is not bound"
                    ))
                    .at("variable", *pos)),
                },

                Node::Param { name, pos } => match self.params.get(name) {
                    Some(value) => Ok(value.clone()),
                    None => Err(RuntimeError::MissingParam { name: name.clone() }
                        .at("parameter", *pos)),
                },

                Node::Call(call) => self.eval_call(call).await,

                Node::Unary { op, operand, pos } => {
                    let value = self.eval(operand).await?;
                    operators::unary(*op, &value).map_err(|e| e.at("unary operator", *pos))
                }

                Node::Binary {
                    op: BinaryOp::And,
                    left,
                    right,
                    ..
                } => {
                    let left = self.eval(left).await?;
                    if !left.is_truthy() {
                        Ok(left)
                    } else {
                        self.eval(right).await
                    }
                }

                Node::Binary {
                    op: BinaryOp::Or,
                    left,
                    right,
                    ..
                } => {
                    let left = self.eval(left).await?;
                    if left.is_truthy() {
                        Ok(left)
                    } else {
                        self.eval(right).await
                    }
                }

                Node::Binary {
                    op,
                    left,
                    right,
                    pos,
                } => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    operators::binary(*op, &left, &right)
                        .map_err(|e| e.at("binary operator", *pos))
                }

                Node::Match {
                    op,
                    left,
                    regex,
                    pos,
                } => {
                    let left = self.eval(left).await?;
                    operators::pattern_match(*op, &left, regex)
                        .map_err(|e| e.at("binary operator", *pos))
                }

                Node::Ternary {
                    cond,
                    then,
                    otherwise,
                } => {
                    let cond = self.eval(cond).await?;
                    match then {
                        Some(then) => {
                            if cond.is_truthy() {
                                self.eval(then).await
                            } else {
                                self.eval(otherwise).await
                            }
                        }
                        // Elvis: a truthy condition is its own result.
                        None => {
                            if cond.is_truthy() {
                                Ok(cond)
                            } else {
                                self.eval(otherwise).await
                            }
                        }
                    }
                }

                Node::Range { start, end, pos } => {
                    let start = self.eval(start).await?;
                    let end = self.eval(end).await?;
                    let (a, b) =
                        operators::range_bounds(&start, &end).map_err(|e| e.at("range", *pos))?;
                    let values: Vec<Value> = if a <= b {
                        (a..=b).map(Value::Int).collect()
                    } else {
                        (b..=a).rev().map(Value::Int).collect()
                    };
                    Ok(Value::from(values))
                }

                Node::Member { target, key, pos } => {
                    let target = self.eval(target).await?;
                    let result = match key {
                        KeyNode::Name(name) => operators::named_member(&target, name),
                        KeyNode::Computed(key) => {
                            let key = self.eval(key).await?;
                            operators::member(&target, &key)
                        }
                    };
                    result.map_err(|e| e.at("member access", *pos))
                }

                Node::For(for_node) => self.run_for(for_node).await,

                Node::WaitFor(waitfor) => self.eval_waitfor(waitfor).await,
            }
        })
    }

    async fn eval_call(&mut self, call: &CallNode) -> Result<Value, RuntimeError> {
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.eval(arg).await?);
        }
        debug!(function = %call.name, "invoking function");
        call.function
            .call(self.ctx, args)
            .await
            .map_err(|e| e.at("function call", call.pos))
    }

    async fn eval_waitfor(&mut self, waitfor: &WaitForNode) -> Result<Value, RuntimeError> {
        let event = match self.eval(&waitfor.event).await? {
            Value::String(name) => name,
            other => {
                return Err(RuntimeError::type_mismatch(format!(
                    "event name must be a string, got {}",
                    other.kind()
                ))
                .at("wait for event", waitfor.pos))
            }
        };
        let subject = match self.eval(&waitfor.source).await? {
            Value::Subject(subject) => subject,
            other => {
                return Err(RuntimeError::type_mismatch(format!(
                    "WAITFOR source must be an observable, got {}",
                    other.kind()
                ))
                .at("wait for event", waitfor.pos))
            }
        };
        let timeout = match &waitfor.timeout {
            Some(node) => match self.eval(node).await? {
                Value::Int(ms) if ms >= 0 => Duration::from_millis(ms as u64),
                _ => {
                    return Err(RuntimeError::type_mismatch(
                        "TIMEOUT must be a non-negative integer",
                    )
                    .at("wait for event", waitfor.pos))
                }
            },
            None => DEFAULT_EVENT_TIMEOUT,
        };

        debug!(event = %event, timeout_ms = timeout.as_millis() as u64, "waiting for event");
        subject
            .subscribe(self.ctx, &event, timeout)
            .await
            .map_err(|e| e.at("wait for event", waitfor.pos))
    }
}
