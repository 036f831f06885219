// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for compilation and execution.
//!
//! Compile-time errors are terminal for the compilation attempt; no partial
//! program is ever returned. Runtime errors unwind the current execution
//! immediately and reach the caller of `run`; the engine never retries.

use crate::syntax::Pos;

/// A parse failure from the syntax layer, with the source position
/// it was detected at.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at {line}:{col}: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

impl SyntaxError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            line: pos.line,
            col: pos.col,
            message: message.into(),
        }
    }
}

/// All errors that can stop a compilation.
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("duplicate variable '{name}' at {pos}")]
    DuplicateVariable { name: String, pos: Pos },

    #[error("undefined variable '{name}' at {pos}")]
    UndefinedVariable { name: String, pos: Pos },

    #[error("unknown function '{name}' at {pos}")]
    UnknownFunction { name: String, pos: Pos },
}

/// Rejected function or namespace name at registration time. Names must
/// start with an ASCII letter and contain only letters, digits, and `_`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid function name '{0}'")]
pub struct InvalidFunctionName(pub String);

/// All errors that can stop a running program.
///
/// `Cancelled` and `DeadlineExceeded` abort the whole run; the rest are
/// recoverable by the caller in the sense that the program and its inputs,
/// not the engine, caused them.
#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid argument to {function}: {reason}")]
    ArgumentError { function: String, reason: String },

    #[error("timed out waiting for event '{event}'")]
    EventTimeout { event: String },

    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("key '{key}' not found")]
    KeyNotFound { key: String },

    #[error("missing parameter '@{name}'")]
    MissingParam { name: String },

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution deadline exceeded")]
    DeadlineExceeded,

    /// Failure raised inside an externally registered function.
    #[error(transparent)]
    External(#[from] anyhow::Error),

    /// Position context attached by the engine to the failing operation.
    #[error("{operation} at {pos}: {source}")]
    At {
        pos: Pos,
        operation: &'static str,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Shorthand for a `TypeMismatch` with a formatted reason.
    pub fn type_mismatch(reason: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch(reason.into())
    }

    /// Attach operation/position context unless the error already carries
    /// some or is an execution-wide abort (those stay bare so callers can
    /// match on them directly).
    pub fn at(self, operation: &'static str, pos: Pos) -> Self {
        match self {
            RuntimeError::At { .. } | RuntimeError::Cancelled | RuntimeError::DeadlineExceeded => {
                self
            }
            other => RuntimeError::At {
                pos,
                operation,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with any position wrappers stripped.
    pub fn root(&self) -> &RuntimeError {
        match self {
            RuntimeError::At { source, .. } => source.root(),
            other => other,
        }
    }
}
