// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Registered functions and the namespace registry.
//!
//! Collaborators expose capabilities to queries as async functions grouped
//! under `::`-separated namespaces (`NET::FETCH`, `X::CREATE`). Names are
//! case-insensitive and stored upper-cased; registering an existing name
//! replaces it. The registry is consulted only at compile time: resolved
//! function handles are embedded into the compiled program, so later
//! registry changes never affect an already-compiled program.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::{InvalidFunctionName, RuntimeError};
use crate::exec::Context;
use crate::value::Value;

/// A function callable from a query.
///
/// Implementations receive the execution context (for cancellation checks
/// in long-running work) and evaluated arguments, and return one value.
#[async_trait]
pub trait Function: Send + Sync {
    async fn call(&self, ctx: &Context, args: Vec<Value>) -> Result<Value, RuntimeError>;
}

type NativeBody =
    dyn Fn(Context, Vec<Value>) -> BoxFuture<'static, Result<Value, RuntimeError>> + Send + Sync;

/// Adapter turning a plain async closure into a [`Function`].
pub struct NativeFunction {
    body: Box<NativeBody>,
}

impl NativeFunction {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RuntimeError>> + Send + 'static,
    {
        Self {
            body: Box::new(move |ctx, args| Box::pin(f(ctx, args))),
        }
    }
}

#[async_trait]
impl Function for NativeFunction {
    async fn call(&self, ctx: &Context, args: Vec<Value>) -> Result<Value, RuntimeError> {
        (self.body)(ctx.clone(), args).await
    }
}

/// Check an argument count against an inclusive range, raising
/// `ArgumentError` with the function's name otherwise.
pub fn validate_arity(
    function: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), RuntimeError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let reason = if min == max {
        format!("expected {} argument(s), got {}", min, args.len())
    } else {
        format!(
            "expected between {} and {} arguments, got {}",
            min,
            max,
            args.len()
        )
    };
    Err(RuntimeError::ArgumentError {
        function: function.to_string(),
        reason,
    })
}

fn is_valid_segment(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Flat map of fully qualified (upper-cased) function names to handlers.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under a namespace prefix (empty for the root namespace).
    /// Every segment of the resulting qualified name is validated.
    fn register_at(
        &mut self,
        prefix: &str,
        name: &str,
        function: Arc<dyn Function>,
    ) -> Result<(), InvalidFunctionName> {
        let qualified = if prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}::{}", prefix, name.to_uppercase())
        };
        if !qualified.split("::").all(is_valid_segment) {
            return Err(InvalidFunctionName(qualified));
        }
        self.functions.insert(qualified, function);
        Ok(())
    }

    /// Look a qualified name up, case-insensitively.
    pub fn get(&self, qualified: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(&qualified.to_uppercase()).cloned()
    }

    pub fn contains(&self, qualified: &str) -> bool {
        self.functions.contains_key(&qualified.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registration proxy for a namespace path.
    pub fn namespace(&mut self, name: &str) -> Namespace<'_> {
        Namespace {
            registry: self,
            prefix: name.to_uppercase(),
        }
    }

    /// Root-namespace registration.
    pub fn register(
        &mut self,
        name: &str,
        function: impl Function + 'static,
    ) -> Result<(), InvalidFunctionName> {
        self.register_at("", name, Arc::new(function))
    }
}

/// Write handle scoped to one namespace path.
pub struct Namespace<'a> {
    registry: &'a mut FunctionRegistry,
    prefix: String,
}

impl<'a> Namespace<'a> {
    /// Descend into a nested namespace (`a.namespace("STR")` under `UTILS`
    /// registers as `UTILS::STR::…`).
    pub fn namespace(self, name: &str) -> Namespace<'a> {
        let prefix = format!("{}::{}", self.prefix, name.to_uppercase());
        Namespace {
            registry: self.registry,
            prefix,
        }
    }

    pub fn register(
        &mut self,
        name: &str,
        function: impl Function + 'static,
    ) -> Result<(), InvalidFunctionName> {
        self.registry.register_at(&self.prefix, name, Arc::new(function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: Value) -> NativeFunction {
        NativeFunction::new(move |_ctx, _args| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    #[tokio::test]
    async fn test_register_and_call() {
        let mut registry = FunctionRegistry::new();
        registry
            .namespace("X")
            .register("CREATE", constant(Value::Int(42)))
            .unwrap();

        let f = registry.get("X::CREATE").unwrap();
        let out = f.call(&Context::new(), vec![]).await.unwrap();
        assert_eq!(out, Value::Int(42));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut registry = FunctionRegistry::new();
        registry
            .namespace("utils")
            .register("trim", constant(Value::None))
            .unwrap();

        assert!(registry.contains("UTILS::TRIM"));
        assert!(registry.contains("Utils::Trim"));
        assert!(!registry.contains("UTILS::TRIMMED"));
    }

    #[test]
    fn test_nested_namespaces() {
        let mut registry = FunctionRegistry::new();
        registry
            .namespace("UTILS")
            .namespace("STR")
            .register("UPPER", constant(Value::None))
            .unwrap();

        assert!(registry.contains("UTILS::STR::UPPER"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut registry = FunctionRegistry::new();
        assert!(registry.register("2BAD", constant(Value::None)).is_err());
        assert!(registry.register("BAD NAME", constant(Value::None)).is_err());
        assert!(registry
            .namespace("NS!")
            .register("OK", constant(Value::None))
            .is_err());
        assert!(registry.register("FINE_1", constant(Value::None)).is_ok());
    }

    #[test]
    fn test_duplicate_registration_overwrites() {
        let mut registry = FunctionRegistry::new();
        registry.register("F", constant(Value::Int(1))).unwrap();
        registry.register("f", constant(Value::Int(2))).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_validate_arity_messages() {
        let args = vec![Value::Int(1)];
        assert!(validate_arity("X::F", &args, 1, 2).is_ok());

        let err = validate_arity("X::F", &args, 2, 2).unwrap_err();
        match err {
            RuntimeError::ArgumentError { function, reason } => {
                assert_eq!(function, "X::F");
                assert!(reason.contains("expected 2 argument(s), got 1"));
            }
            other => panic!("expected ArgumentError, got {other:?}"),
        }

        let err = validate_arity("X::F", &[], 1, 3).unwrap_err();
        assert!(err.to_string().contains("between 1 and 3"));
    }
}
