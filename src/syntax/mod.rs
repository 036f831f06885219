// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lexing and parsing of DQL source text.
//!
//! The syntax tree and [`parse`] are the boundary the compiler builds on;
//! the token stream is internal.

pub mod ast;
mod lexer;
mod parser;

pub use ast::Pos;
pub use parser::parse;
