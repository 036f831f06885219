// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lexical scope frames for the executor.
//!
//! Each block (program body, loop iteration) pushes a frame; name lookup
//! walks frames innermost first. The compiler has already rejected
//! duplicate declarations and unknown names, so the executor treats a
//! failed lookup as an internal invariant breach rather than a user error.

use std::collections::HashMap;

use crate::value::Value;

#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<HashMap<String, Value>>,
}

impl ScopeStack {
    /// A stack with a single root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pop the innermost frame, returning its bindings so callers can keep
    /// them as a row snapshot.
    pub fn pop_frame(&mut self) -> HashMap<String, Value> {
        debug_assert!(self.frames.len() > 1, "cannot pop the root frame");
        self.frames.pop().unwrap_or_default()
    }

    /// Bind a name in the innermost frame. Shadowing an outer frame's name
    /// is allowed; the compiler has already rejected rebinding within one
    /// frame.
    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    /// Look a name up, innermost frame first.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// The innermost frame's own bindings, without enclosing frames.
    pub fn top_frame(&self) -> &HashMap<String, Value> {
        match self.frames.last() {
            Some(frame) => frame,
            None => unreachable!("the root frame is never popped"),
        }
    }

    /// Push a frame pre-populated with the given bindings.
    pub fn push_bindings(&mut self, bindings: HashMap<String, Value>) {
        self.frames.push(bindings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_frames_inner_first() {
        let mut scope = ScopeStack::new();
        scope.declare("a", Value::Int(1));
        scope.push_frame();
        scope.declare("a", Value::Int(2));
        scope.declare("b", Value::Int(3));

        assert_eq!(scope.lookup("a"), Some(&Value::Int(2)));
        assert_eq!(scope.lookup("b"), Some(&Value::Int(3)));

        scope.pop_frame();
        assert_eq!(scope.lookup("a"), Some(&Value::Int(1)));
        assert_eq!(scope.lookup("b"), None);
    }

    #[test]
    fn test_pop_returns_frame_bindings() {
        let mut scope = ScopeStack::new();
        scope.push_frame();
        scope.declare("x", Value::Int(2));
        scope.declare("y", Value::Int(9));

        let frame = scope.pop_frame();
        assert_eq!(frame.get("x"), Some(&Value::Int(2)));
        assert_eq!(frame.get("y"), Some(&Value::Int(9)));
        assert_eq!(scope.lookup("x"), None);
    }

    #[test]
    fn test_push_bindings_restores_snapshot() {
        let mut scope = ScopeStack::new();
        let mut snapshot = HashMap::new();
        snapshot.insert("row".to_string(), Value::Int(7));
        scope.push_bindings(snapshot);

        assert_eq!(scope.lookup("row"), Some(&Value::Int(7)));
        scope.pop_frame();
        assert_eq!(scope.lookup("row"), None);
    }
}
