// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while parsing, compiling, and evaluating expressions.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// The maximum length, in bytes, of an expectation/filter expression.
///
/// Longer expressions are rejected before parsing (spec.md §4.6's DoS
/// guard) rather than merely being slow to parse.
pub const MAX_EXPRESSION_LEN: usize = 1000;

/// The maximum number of AST nodes a compiled expression may contain.
pub const MAX_AST_NODES: usize = 100;

/// An error produced while parsing the surface syntax.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ParseError {
    #[error("failed to parse expression")]
    #[diagnostic(code(reglet_filtering::parse::syntax))]
    Syntax {
        #[source_code]
        input: String,
        #[label("parsing failed somewhere in this expression")]
        span: SourceSpan,
    },

    #[error("unexpected trailing input: {trailing:?}")]
    #[diagnostic(code(reglet_filtering::parse::trailing))]
    Trailing {
        #[source_code]
        input: String,
        #[label("unexpected input after a complete expression")]
        span: SourceSpan,
        trailing: String,
    },
}

impl ParseError {
    pub(crate) fn syntax(input: &str) -> Self {
        Self::Syntax {
            input: input.to_string(),
            span: (0, input.len()).into(),
        }
    }

    pub(crate) fn trailing(input: &str, rest: &str, start: usize) -> Self {
        Self::Trailing {
            input: input.to_string(),
            span: (start, rest.len()).into(),
            trailing: rest.to_string(),
        }
    }
}

/// An error produced while compiling a parsed expression into a [`crate::Program`].
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum CompileError {
    #[error("expression too long: {len} bytes exceeds the {max}-byte limit")]
    #[diagnostic(code(reglet_filtering::compile::too_long))]
    TooLong { len: usize, max: usize },

    #[error("expression too complex: {nodes} AST nodes exceeds the {max}-node limit")]
    #[diagnostic(code(reglet_filtering::compile::too_complex))]
    TooComplex { nodes: usize, max: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error("undefined identifier `{0}`")]
    #[diagnostic(code(reglet_filtering::compile::undefined_identifier))]
    UndefinedIdentifier(String),

    #[error("undefined function `{0}`")]
    #[diagnostic(code(reglet_filtering::compile::undefined_function))]
    UndefinedFunction(String),

    #[error("function `{name}` expects {expected} argument(s), got {actual}")]
    #[diagnostic(code(reglet_filtering::compile::arity_mismatch))]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// An error produced while evaluating a compiled expression against an environment.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("identifier `{path}` is not present in the evaluation environment")]
    MissingValue { path: String },

    #[error("type mismatch in `{op}`: {detail}")]
    TypeMismatch { op: String, detail: String },

    #[error("expression did not evaluate to a boolean (got {0})")]
    NonBoolean(String),
}
