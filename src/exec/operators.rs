// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Operator semantics over runtime values.
//!
//! Arithmetic is numeric-only: Int/Int stays Int (truncating division,
//! wrapping on overflow like the 64-bit integers they model), any Float
//! operand promotes the operation to Float. Comparisons never coerce; the
//! cross-kind total order makes every pair comparable. AND/OR are not
//! here; they short-circuit in the evaluator.

use regex::Regex;

use crate::error::RuntimeError;
use crate::syntax::ast::{BinaryOp, UnaryOp};
use crate::value::{Kind, Value};

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right)
        }
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => Ok(Value::Bool(left < right)),
        BinaryOp::Gt => Ok(Value::Bool(left > right)),
        BinaryOp::Le => Ok(Value::Bool(left <= right)),
        BinaryOp::Ge => Ok(Value::Bool(left >= right)),
        BinaryOp::In => membership(left, right),
        BinaryOp::NotIn => {
            let contained = membership(left, right)?;
            Ok(Value::Bool(!contained.is_truthy()))
        }
        BinaryOp::Like => like(left, right, false),
        BinaryOp::NotLike => like(left, right, true),
        BinaryOp::RegexMatch => regex_match(left, right, false),
        BinaryOp::RegexNotMatch => regex_match(left, right, true),
        BinaryOp::And | BinaryOp::Or => {
            // Short-circuited before reaching operator dispatch.
            Err(RuntimeError::type_mismatch(
                "logical operator evaluated without short-circuit",
            ))
        }
    }
}

pub(crate) fn unary(op: UnaryOp, operand: &Value) -> Result<Value, RuntimeError> {
    match (op, operand) {
        (UnaryOp::Minus, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Plus, Value::Int(i)) => Ok(Value::Int(*i)),
        (UnaryOp::Plus, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Minus, other) | (UnaryOp::Plus, other) => Err(RuntimeError::type_mismatch(
            format!("unary sign expects a numeric operand, got {}", other.kind()),
        )),
    }
}

/// Int endpoints of a `..` range, validated.
pub(crate) fn range_bounds(start: &Value, end: &Value) -> Result<(i64, i64), RuntimeError> {
    match (start, end) {
        (Value::Int(a), Value::Int(b)) => Ok((*a, *b)),
        (a, b) => Err(RuntimeError::type_mismatch(format!(
            "range bounds must be integers, got {} and {}",
            a.kind(),
            b.kind()
        ))),
    }
}

/// Computed member access: Int index into arrays, String key into objects.
pub(crate) fn member(target: &Value, key: &Value) -> Result<Value, RuntimeError> {
    match (target, key) {
        (Value::Array(items), Value::Int(index)) => {
            let at = usize::try_from(*index).ok().filter(|i| *i < items.len());
            match at {
                Some(i) => Ok(items[i].clone()),
                None => Err(RuntimeError::IndexOutOfRange {
                    index: *index,
                    len: items.len(),
                }),
            }
        }
        (Value::Object(map), Value::String(key)) => match map.get(key) {
            Some(v) => Ok(v.clone()),
            None => Err(RuntimeError::KeyNotFound { key: key.clone() }),
        },
        (Value::Array(_), other) => Err(RuntimeError::type_mismatch(format!(
            "array index must be an integer, got {}",
            other.kind()
        ))),
        (Value::Object(_), other) => Err(RuntimeError::type_mismatch(format!(
            "object key must be a string, got {}",
            other.kind()
        ))),
        (other, _) => Err(not_indexable(other.kind())),
    }
}

/// `.name` member access; objects only.
pub(crate) fn named_member(target: &Value, name: &str) -> Result<Value, RuntimeError> {
    match target {
        Value::Object(map) => match map.get(name) {
            Some(v) => Ok(v.clone()),
            None => Err(RuntimeError::KeyNotFound {
                key: name.to_string(),
            }),
        },
        other => Err(not_indexable(other.kind())),
    }
}

fn not_indexable(kind: Kind) -> RuntimeError {
    RuntimeError::type_mismatch(format!("cannot access members of a {kind} value"))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b),
        (Value::Int(a), Value::Float(b)) => Ok(float_arithmetic(op, *a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Ok(float_arithmetic(op, *a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(float_arithmetic(op, *a, *b)),
        (a, b) => Err(RuntimeError::type_mismatch(format!(
            "operator '{}' expects numeric operands, got {} and {}",
            op_symbol(op),
            a.kind(),
            b.kind()
        ))),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b == 0 => {
            return Err(RuntimeError::type_mismatch("division by zero"))
        }
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Mod if b == 0 => {
            return Err(RuntimeError::type_mismatch("division by zero"))
        }
        BinaryOp::Mod => a.wrapping_rem(b),
        _ => unreachable!("non-arithmetic operator"),
    };
    Ok(Value::Int(value))
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Value {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!("non-arithmetic operator"),
    };
    Value::Float(value)
}

fn membership(needle: &Value, haystack: &Value) -> Result<Value, RuntimeError> {
    match haystack {
        Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| item == needle))),
        other => Err(RuntimeError::type_mismatch(format!(
            "operator 'IN' expects an array on the right, got {}",
            other.kind()
        ))),
    }
}

fn like(left: &Value, right: &Value, negated: bool) -> Result<Value, RuntimeError> {
    let (text, pattern) = string_operands("LIKE", left, right)?;
    let regex = Regex::new(&like_to_regex(pattern))
        .map_err(|e| RuntimeError::type_mismatch(format!("invalid LIKE pattern: {e}")))?;
    Ok(Value::Bool(regex.is_match(text) != negated))
}

/// Match `left` against a regex the compiler already built from a literal
/// pattern. The right operand was a string by construction.
pub(crate) fn pattern_match(
    op: BinaryOp,
    left: &Value,
    regex: &Regex,
) -> Result<Value, RuntimeError> {
    let text = match left {
        Value::String(s) => s,
        other => {
            return Err(RuntimeError::type_mismatch(format!(
                "operator '{}' expects string operands, got {} and string",
                op_symbol(op),
                other.kind()
            )))
        }
    };
    let negated = matches!(op, BinaryOp::NotLike | BinaryOp::RegexNotMatch);
    Ok(Value::Bool(regex.is_match(text) != negated))
}

/// Translate a LIKE pattern (`%` any run, `_` any char) into an anchored
/// regular expression.
pub(crate) fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c if "\\.+*?()|[]{}^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

fn regex_match(left: &Value, right: &Value, negated: bool) -> Result<Value, RuntimeError> {
    let (text, pattern) = string_operands("=~", left, right)?;
    let regex = Regex::new(pattern)
        .map_err(|e| RuntimeError::type_mismatch(format!("invalid regular expression: {e}")))?;
    Ok(Value::Bool(regex.is_match(text) != negated))
}

fn string_operands<'v>(
    op: &str,
    left: &'v Value,
    right: &'v Value,
) -> Result<(&'v str, &'v str), RuntimeError> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok((l, r)),
        (l, r) => Err(RuntimeError::type_mismatch(format!(
            "operator '{op}' expects string operands, got {} and {}",
            l.kind(),
            r.kind()
        ))),
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::In => "IN",
        BinaryOp::NotIn => "NOT IN",
        BinaryOp::Like => "LIKE",
        BinaryOp::NotLike => "NOT LIKE",
        BinaryOp::RegexMatch => "=~",
        BinaryOp::RegexNotMatch => "!~",
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
    }
}
