// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dredge is an embeddable query language for extraction pipelines.
//!
//! DQL programs iterate over arrays, objects, ranges and event streams,
//! shape rows with FILTER, SORT, LIMIT and COLLECT, and call into
//! host-registered async functions. Compilation checks every variable
//! reference and resolves every function up front; the resulting
//! [`Program`] is immutable and can run any number of times, each run
//! carrying its own [`Context`] for cancellation and deadlines.
//!
//! ```no_run
//! use dredge::{Compiler, Context};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let compiler = Compiler::new();
//! let program = compiler.compile("FOR n IN [1, 2, 3] FILTER n > 1 RETURN n * 2")?;
//! let output = program.run(Context::new()).await?;
//! assert_eq!(output, "[4,6]");
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod error;
pub mod events;
pub mod exec;
pub mod namespace;
mod scope;
pub mod syntax;
pub mod value;

pub use compiler::Compiler;
pub use error::{CompileError, InvalidFunctionName, RuntimeError, SyntaxError};
pub use events::Subject;
pub use exec::{Context, Program};
pub use namespace::{validate_arity, Function, FunctionRegistry, Namespace, NativeFunction};
pub use value::{Kind, ObjectMap, Value};
