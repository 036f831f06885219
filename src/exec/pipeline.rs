// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! FOR loop execution.
//!
//! Each iteration gets a fresh scope frame holding the loop variables and
//! any per-iteration LET bindings. Rows that pass FILTER and fall inside
//! the LIMIT window are buffered together with their precomputed sort
//! keys, group keys and aggregate inputs, then SORT reorders the buffer
//! and COLLECT partitions it into groups. Emission runs last: each
//! surviving row (or group) gets its frame restored and the result
//! expression appends to the output, with nested FOR results flattened
//! in place.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::RuntimeError;
use crate::syntax::ast::Pos;
use crate::value::{ObjectMap, Value};

use super::node::{CollectNode, ForNode, Node, ResultNode, SortKeyNode, SourceNode};
use super::{operators, Executor};

/// One buffered iteration that survived FILTER and LIMIT.
struct Row {
    /// The iteration frame, popped off the scope stack.
    bindings: HashMap<String, Value>,
    sort_keys: Vec<Value>,
    group_keys: Vec<Value>,
    /// Evaluated AGGREGATE call arguments, one inner vec per aggregate.
    agg_inputs: Vec<Vec<Value>>,
    /// The INTO element, present only when the loop collects INTO.
    element: Option<Value>,
}

/// Source being iterated. Ranges and WHILE never materialize; arrays and
/// objects are snapshotted up front so later mutation of the scope cannot
/// alias into them.
enum ForIter {
    Values {
        items: std::vec::IntoIter<Value>,
        index: i64,
    },
    Entries(std::vec::IntoIter<(String, Value)>),
    Range {
        next: i64,
        end: i64,
        descending: bool,
        done: bool,
        index: i64,
    },
    While {
        counter: i64,
    },
}

impl Executor<'_> {
    /// Run a FOR expression and return its output array.
    pub(crate) async fn run_for(&mut self, node: &ForNode) -> Result<Value, RuntimeError> {
        let mut output = Vec::new();
        self.run_for_into(node, &mut output).await?;
        Ok(Value::from(output))
    }

    /// Run a FOR loop, appending produced elements to `output`. Nested
    /// result loops share the caller's buffer, which is what flattens
    /// them.
    pub(crate) fn run_for_into<'e>(
        &'e mut self,
        node: &'e ForNode,
        output: &'e mut Vec<Value>,
    ) -> BoxFuture<'e, Result<(), RuntimeError>> {
        Box::pin(async move {
            let limit = self.eval_limit(node).await?;
            if let Some((_, 0)) = limit {
                return Ok(());
            }

            let mut rows = self.collect_rows(node, limit).await?;
            if !node.sort.is_empty() {
                sort_rows(&mut rows, &node.sort);
            }

            match &node.collect {
                Some(collect) => self.emit_groups(node, collect, rows, output).await,
                None => {
                    for row in rows {
                        self.scope.push_bindings(row.bindings);
                        let result = self.emit_result(&node.result, output).await;
                        self.scope.pop_frame();
                        result?;
                    }
                    Ok(())
                }
            }
        })
    }

    /// LIMIT operands are evaluated once, before the source.
    async fn eval_limit(&mut self, node: &ForNode) -> Result<Option<(usize, usize)>, RuntimeError> {
        let limit = match &node.limit {
            Some(limit) => limit,
            None => return Ok(None),
        };
        let offset = match &limit.offset {
            Some(node) => self.limit_operand(node, limit.pos).await?,
            None => 0,
        };
        let count = self.limit_operand(&limit.count, limit.pos).await?;
        Ok(Some((offset, count)))
    }

    async fn limit_operand(&mut self, node: &Node, pos: Pos) -> Result<usize, RuntimeError> {
        match self.eval(node).await? {
            Value::Int(n) if n >= 0 => Ok(n as usize),
            _ => Err(
                RuntimeError::type_mismatch("LIMIT expects non-negative integers")
                    .at("limit", pos),
            ),
        }
    }

    async fn for_source(&mut self, node: &ForNode) -> Result<ForIter, RuntimeError> {
        let source = match &node.source {
            SourceNode::While(_) => return Ok(ForIter::While { counter: 0 }),
            SourceNode::Iterable(source) => source,
        };
        // A literal range source iterates lazily.
        if let Node::Range { start, end, pos } = source {
            let start = self.eval(start).await?;
            let end = self.eval(end).await?;
            let (a, b) =
                operators::range_bounds(&start, &end).map_err(|e| e.at("range", *pos))?;
            return Ok(ForIter::Range {
                next: a,
                end: b,
                descending: a > b,
                done: false,
                index: 0,
            });
        }
        match self.eval(source).await? {
            Value::Array(items) => {
                let items = Arc::try_unwrap(items).unwrap_or_else(|shared| (*shared).clone());
                Ok(ForIter::Values {
                    items: items.into_iter(),
                    index: 0,
                })
            }
            Value::Object(map) => {
                let entries: Vec<(String, Value)> = map
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect();
                Ok(ForIter::Entries(entries.into_iter()))
            }
            other => Err(RuntimeError::type_mismatch(format!(
                "cannot iterate over a {} value",
                other.kind()
            ))
            .at("for loop", node.pos)),
        }
    }

    /// Produce the next `(value, key)` pair, or `None` when the source is
    /// exhausted. WHILE re-evaluates its condition in the enclosing scope,
    /// where the loop variable is not visible.
    async fn next_item(
        &mut self,
        iter: &mut ForIter,
        node: &ForNode,
    ) -> Result<Option<(Value, Value)>, RuntimeError> {
        match iter {
            ForIter::Values { items, index } => Ok(items.next().map(|value| {
                let key = Value::Int(*index);
                *index += 1;
                (value, key)
            })),
            ForIter::Entries(entries) => {
                Ok(entries.next().map(|(key, value)| (value, Value::String(key))))
            }
            ForIter::Range {
                next,
                end,
                descending,
                done,
                index,
            } => {
                if *done {
                    return Ok(None);
                }
                let value = Value::Int(*next);
                let key = Value::Int(*index);
                *index += 1;
                if *next == *end {
                    *done = true;
                } else if *descending {
                    *next -= 1;
                } else {
                    *next += 1;
                }
                Ok(Some((value, key)))
            }
            ForIter::While { counter } => {
                let cond = match &node.source {
                    SourceNode::While(cond) => cond,
                    SourceNode::Iterable(_) => unreachable!("while iterator from iterable source"),
                };
                if !self.eval(cond).await?.is_truthy() {
                    return Ok(None);
                }
                let value = Value::Int(*counter);
                *counter += 1;
                Ok(Some((value.clone(), value)))
            }
        }
    }

    /// Drive the source, filtering and limiting as rows arrive. The
    /// source stops being pulled once the LIMIT window is full.
    async fn collect_rows(
        &mut self,
        node: &ForNode,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<Row>, RuntimeError> {
        let mut iter = self.for_source(node).await?;
        let (offset, count) = match limit {
            Some((offset, count)) => (offset, Some(count)),
            None => (0, None),
        };
        let mut rows = Vec::new();
        let mut passed = 0usize;
        loop {
            self.ctx.ensure_active()?;
            let (value, key) = match self.next_item(&mut iter, node).await? {
                Some(pair) => pair,
                None => break,
            };
            self.scope.push_frame();
            self.scope.declare(node.value_var.clone(), value);
            if let Some(key_var) = &node.key_var {
                self.scope.declare(key_var.clone(), key);
            }
            let outcome = self.evaluate_row(node).await;
            let bindings = self.scope.pop_frame();
            let mut row = match outcome? {
                Some(row) => row,
                None => continue,
            };
            passed += 1;
            if passed <= offset {
                continue;
            }
            row.bindings = bindings;
            rows.push(row);
            if count == Some(rows.len()) {
                break;
            }
        }
        Ok(rows)
    }

    /// Run per-iteration statements and FILTER, then precompute everything
    /// the later stages need while the frame is still live. Returns `None`
    /// for filtered-out rows. The caller owns the frame.
    async fn evaluate_row(&mut self, node: &ForNode) -> Result<Option<Row>, RuntimeError> {
        for stmt in &node.statements {
            self.run_stmt(stmt).await?;
        }
        if let Some(filter) = &node.filter {
            if !self.eval(filter).await?.is_truthy() {
                return Ok(None);
            }
        }
        let mut sort_keys = Vec::with_capacity(node.sort.len());
        for key in &node.sort {
            sort_keys.push(self.eval(&key.key).await?);
        }
        let mut group_keys = Vec::new();
        let mut agg_inputs = Vec::new();
        let mut element = None;
        if let Some(collect) = &node.collect {
            group_keys.reserve(collect.groups.len());
            for (_, expr) in &collect.groups {
                let key = self
                    .eval(expr)
                    .await
                    .map_err(|e| e.at("collect", collect.pos))?;
                group_keys.push(key);
            }
            agg_inputs.reserve(collect.aggregates.len());
            for agg in &collect.aggregates {
                let mut inputs = Vec::with_capacity(agg.call.args.len());
                for arg in &agg.call.args {
                    inputs.push(self.eval(arg).await?);
                }
                agg_inputs.push(inputs);
            }
            if collect.into.is_some() {
                element = Some(if collect.into_bare {
                    self.scope
                        .lookup(&node.value_var)
                        .cloned()
                        .unwrap_or_default()
                } else {
                    self.projected_frame()
                });
            }
        }
        Ok(Some(Row {
            bindings: HashMap::new(),
            sort_keys,
            group_keys,
            agg_inputs,
            element,
        }))
    }

    /// Snapshot the iteration frame as an object, keys sorted so the
    /// projection shape is deterministic.
    fn projected_frame(&self) -> Value {
        let frame = self.scope.top_frame();
        let mut keys: Vec<&String> = frame.keys().collect();
        keys.sort();
        let mut map = ObjectMap::with_capacity(keys.len());
        for key in keys {
            map.insert(key.clone(), frame[key].clone());
        }
        Value::from(map)
    }

    /// Partition sorted rows into groups and emit one result per group.
    /// Groups come out in ascending key order; members keep the order the
    /// buffer had, so an earlier SORT shows up inside INTO arrays.
    async fn emit_groups(
        &mut self,
        node: &ForNode,
        collect: &CollectNode,
        mut rows: Vec<Row>,
        output: &mut Vec<Value>,
    ) -> Result<(), RuntimeError> {
        if collect.groups.is_empty() {
            // WITH COUNT or bare AGGREGATE: one row covering everything,
            // even when no rows arrived.
            let frame = self.group_frame(collect, &rows, None).await?;
            return self.emit_group(node, frame, output).await;
        }
        rows.sort_by(|a, b| compare_key_tuples(&a.group_keys, &b.group_keys));
        let mut start = 0;
        while start < rows.len() {
            let mut end = start + 1;
            while end < rows.len()
                && compare_key_tuples(&rows[start].group_keys, &rows[end].group_keys)
                    == Ordering::Equal
            {
                end += 1;
            }
            let keys = rows[start].group_keys.clone();
            let frame = self
                .group_frame(collect, &rows[start..end], Some(&keys))
                .await?;
            self.emit_group(node, frame, output).await?;
            start = end;
        }
        Ok(())
    }

    /// Build the bindings visible after COLLECT: group variables, the
    /// INTO array, the WITH COUNT total, and one value per AGGREGATE.
    async fn group_frame(
        &mut self,
        collect: &CollectNode,
        members: &[Row],
        keys: Option<&[Value]>,
    ) -> Result<HashMap<String, Value>, RuntimeError> {
        let mut frame = HashMap::new();
        if let Some(keys) = keys {
            for ((name, _), key) in collect.groups.iter().zip(keys) {
                frame.insert(name.clone(), key.clone());
            }
        }
        if let Some(into) = &collect.into {
            let elements: Vec<Value> = members
                .iter()
                .map(|row| row.element.clone().unwrap_or_default())
                .collect();
            frame.insert(into.clone(), Value::from(elements));
        }
        if let Some(count_into) = &collect.count_into {
            frame.insert(count_into.clone(), Value::Int(members.len() as i64));
        }
        for (i, agg) in collect.aggregates.iter().enumerate() {
            // Each argument becomes the column of its per-row values; the
            // function runs once per group.
            let mut args = Vec::with_capacity(agg.call.args.len());
            for j in 0..agg.call.args.len() {
                let column: Vec<Value> = members
                    .iter()
                    .map(|row| row.agg_inputs[i][j].clone())
                    .collect();
                args.push(Value::from(column));
            }
            let value = agg
                .call
                .function
                .call(self.ctx, args)
                .await
                .map_err(|e| e.at("aggregate", agg.call.pos))?;
            frame.insert(agg.name.clone(), value);
        }
        Ok(frame)
    }

    async fn emit_group(
        &mut self,
        node: &ForNode,
        frame: HashMap<String, Value>,
        output: &mut Vec<Value>,
    ) -> Result<(), RuntimeError> {
        self.scope.push_bindings(frame);
        let result = async {
            for stmt in &node.group_statements {
                self.run_stmt(stmt).await?;
            }
            self.emit_result(&node.result, output).await
        }
        .await;
        self.scope.pop_frame();
        result
    }

    async fn emit_result(
        &mut self,
        result: &ResultNode,
        output: &mut Vec<Value>,
    ) -> Result<(), RuntimeError> {
        match result {
            ResultNode::Return(node) => {
                let value = self.eval(node).await?;
                output.push(value);
                Ok(())
            }
            ResultNode::Nested(for_node) => self.run_for_into(for_node, output).await,
        }
    }
}

fn sort_rows(rows: &mut [Row], keys: &[SortKeyNode]) {
    rows.sort_by(|a, b| {
        for (i, key) in keys.iter().enumerate() {
            let ord = a.sort_keys[i].compare(&b.sort_keys[i]);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn compare_key_tuples(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.compare(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(sort_keys: Vec<Value>, marker: i64) -> Row {
        let mut bindings = HashMap::new();
        bindings.insert("marker".to_string(), Value::Int(marker));
        Row {
            bindings,
            sort_keys,
            group_keys: Vec::new(),
            agg_inputs: Vec::new(),
            element: None,
        }
    }

    fn markers(rows: &[Row]) -> Vec<i64> {
        rows.iter()
            .map(|r| match r.bindings["marker"] {
                Value::Int(n) => n,
                _ => panic!("marker must be an int"),
            })
            .collect()
    }

    #[test]
    fn test_sort_rows_is_stable() {
        let mut rows = vec![
            row(vec![Value::Int(2)], 0),
            row(vec![Value::Int(1)], 1),
            row(vec![Value::Int(1)], 2),
            row(vec![Value::Int(2)], 3),
        ];
        sort_rows(
            &mut rows,
            &[SortKeyNode {
                key: Node::Literal(Value::None),
                descending: false,
            }],
        );
        assert_eq!(markers(&rows), vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_sort_rows_descending_and_tiebreak() {
        let mut rows = vec![
            row(vec![Value::Int(1), Value::String("b".into())], 0),
            row(vec![Value::Int(2), Value::String("a".into())], 1),
            row(vec![Value::Int(1), Value::String("a".into())], 2),
        ];
        let keys = [
            SortKeyNode {
                key: Node::Literal(Value::None),
                descending: true,
            },
            SortKeyNode {
                key: Node::Literal(Value::None),
                descending: false,
            },
        ];
        sort_rows(&mut rows, &keys);
        assert_eq!(markers(&rows), vec![1, 2, 0]);
    }

    #[test]
    fn test_compare_key_tuples_is_lexicographic() {
        let a = [Value::Int(1), Value::String("b".into())];
        let b = [Value::Int(1), Value::String("c".into())];
        assert_eq!(compare_key_tuples(&a, &b), Ordering::Less);
        assert_eq!(compare_key_tuples(&a, &a), Ordering::Equal);
        assert_eq!(compare_key_tuples(&b, &a), Ordering::Greater);
    }
}
