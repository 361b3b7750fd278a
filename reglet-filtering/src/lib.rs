// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A small boolean expression DSL shared by reglet's control filter and
//! expectation evaluator.
//!
//! Expressions are parsed into an [`ast::Expr`] tree, compiled into a
//! [`Program`] against an [`compile::EnvSchema`] (which identifier roots
//! and functions are legal), and evaluated against an [`env::Env`].
//! Compiled programs are cached process-wide in a [`cache::ProgramCache`].

pub mod ast;
pub mod cache;
pub mod compile;
pub mod env;
pub mod errors;
pub mod parsing;
pub mod value;

pub use ast::{BinOp, Expr};
pub use cache::ProgramCache;
pub use compile::{EnvSchema, Program};
pub use env::{Env, MapEnv};
pub use errors::{CompileError, EvalError, ParseError};
pub use value::Value;
