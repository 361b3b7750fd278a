// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compilation of parsed expressions into evaluable [`Program`]s.

use crate::{
    ast::{BinOp, Expr},
    env::{call_builtin, Env},
    errors::{CompileError, EvalError, MAX_AST_NODES, MAX_EXPRESSION_LEN},
    parsing,
    value::Value,
};
use std::collections::BTreeSet;

/// Describes the identifier roots and function names a [`Program`] is
/// allowed to reference. Compilation fails fast on anything outside this
/// schema ("undefined identifiers fail at compile time", spec.md §4.6).
#[derive(Debug, Clone)]
pub struct EnvSchema {
    roots: BTreeSet<String>,
    functions: BTreeSet<String>,
}

impl EnvSchema {
    pub fn new(roots: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            functions: BTreeSet::from(["isIPv4".to_string()]),
        }
    }

    /// Registers an additional host-provided function name as callable.
    /// Its implementation must be provided at evaluation time by a custom
    /// env or a wrapper around [`call_builtin`]; see spec.md §9 Open
    /// Questions #1.
    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.functions.insert(name.into());
        self
    }

    /// The env schema used by the expectation evaluator (spec.md §4.6).
    pub fn expectation() -> Self {
        Self::new(["data", "status", "timestamp", "error"])
    }

    /// The env schema used by the control filter's `Expression` predicate
    /// (spec.md §4.4).
    pub fn control_filter() -> Self {
        Self::new(["id", "name", "severity", "owner", "tags"])
    }
}

/// A compiled, type-checked expression ready for repeated evaluation.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    ast: Expr,
}

impl Program {
    /// Parses, validates, and compiles `source` against `schema`.
    pub fn compile(source: &str, schema: &EnvSchema) -> Result<Self, CompileError> {
        if source.len() > MAX_EXPRESSION_LEN {
            return Err(CompileError::TooLong {
                len: source.len(),
                max: MAX_EXPRESSION_LEN,
            });
        }
        let ast = parsing::parse(source).map_err(CompileError::from)?;
        let nodes = ast.node_count();
        if nodes > MAX_AST_NODES {
            return Err(CompileError::TooComplex {
                nodes,
                max: MAX_AST_NODES,
            });
        }
        check_identifiers(&ast, schema)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the program against `env`, requiring a boolean result.
    pub fn evaluate_bool(&self, env: &dyn Env) -> Result<bool, EvalError> {
        let value = eval(&self.ast, env)?;
        value
            .as_bool()
            .ok_or_else(|| EvalError::NonBoolean(value.to_string()))
    }

    /// If the root expression is a simple `lhs <op> rhs` comparison whose
    /// left-hand side is a dotted identifier, returns the path and
    /// operator so callers can build a field-level diagnostic message
    /// ("Expected data.size > 100, got 42"), per spec.md §4.6.
    pub fn describe_simple_comparison(&self) -> Option<(Vec<String>, BinOp, &Expr)> {
        match &self.ast {
            Expr::Binary(op, lhs, rhs)
                if matches!(
                    op,
                    BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
                ) =>
            {
                match lhs.as_ref() {
                    Expr::Ident(path) => Some((path.clone(), *op, rhs.as_ref())),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn check_identifiers(expr: &Expr, schema: &EnvSchema) -> Result<(), CompileError> {
    match expr {
        Expr::Bool(_) | Expr::Number(_) | Expr::Str(_) => Ok(()),
        Expr::Ident(path) => {
            let root = path.first().expect("parser never produces an empty path");
            if schema.roots.contains(root) {
                Ok(())
            } else {
                Err(CompileError::UndefinedIdentifier(path.join(".")))
            }
        }
        Expr::Not(inner) => check_identifiers(inner, schema),
        Expr::Binary(_, lhs, rhs) => {
            check_identifiers(lhs, schema)?;
            check_identifiers(rhs, schema)
        }
        Expr::Call(name, args) => {
            if !schema.functions.contains(name) {
                return Err(CompileError::UndefinedFunction(name.clone()));
            }
            if name == "isIPv4" && args.len() != 1 {
                return Err(CompileError::ArityMismatch {
                    name: name.clone(),
                    expected: 1,
                    actual: args.len(),
                });
            }
            for arg in args {
                check_identifiers(arg, schema)?;
            }
            Ok(())
        }
    }
}

fn eval(expr: &Expr, env: &dyn Env) -> Result<Value, EvalError> {
    match expr {
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Number(n) => Ok(Value::Float(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Ident(path) => env.resolve(path).ok_or_else(|| EvalError::MissingValue {
            path: path.join("."),
        }),
        Expr::Not(inner) => {
            let value = eval(inner, env)?;
            let b = value
                .as_bool()
                .ok_or_else(|| EvalError::TypeMismatch {
                    op: "!".to_string(),
                    detail: format!("expected bool, got {value}"),
                })?;
            Ok(Value::Bool(!b))
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, env),
        Expr::Call(name, args) => {
            let values: Result<Vec<Value>, EvalError> =
                args.iter().map(|a| eval(a, env)).collect();
            let values = values?;
            match call_builtin(name, &values) {
                Some(Ok(v)) => Ok(v),
                Some(Err(msg)) => Err(EvalError::TypeMismatch {
                    op: name.clone(),
                    detail: msg,
                }),
                None => Err(EvalError::TypeMismatch {
                    op: name.clone(),
                    detail: "no such function registered with the evaluator".to_string(),
                }),
            }
        }
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, env: &dyn Env) -> Result<Value, EvalError> {
    match op {
        BinOp::And => {
            let l = eval(lhs, env)?.as_bool().ok_or_else(|| type_mismatch("&&"))?;
            if !l {
                return Ok(Value::Bool(false));
            }
            let r = eval(rhs, env)?.as_bool().ok_or_else(|| type_mismatch("&&"))?;
            Ok(Value::Bool(r))
        }
        BinOp::Or => {
            let l = eval(lhs, env)?.as_bool().ok_or_else(|| type_mismatch("||"))?;
            if l {
                return Ok(Value::Bool(true));
            }
            let r = eval(rhs, env)?.as_bool().ok_or_else(|| type_mismatch("||"))?;
            Ok(Value::Bool(r))
        }
        BinOp::In => {
            let l = eval(lhs, env)?;
            let r = eval(rhs, env)?;
            let list = r.as_list().ok_or_else(|| EvalError::TypeMismatch {
                op: "in".to_string(),
                detail: format!("right-hand side must be a list, got {r}"),
            })?;
            Ok(Value::Bool(list.contains(&l)))
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let l = eval(lhs, env)?;
            let r = eval(rhs, env)?;
            compare(op, &l, &r)
        }
    }
}

fn type_mismatch(op: &str) -> EvalError {
    EvalError::TypeMismatch {
        op: op.to_string(),
        detail: "expected bool operand".to_string(),
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    if op == BinOp::Eq {
        return Ok(Value::Bool(values_equal(l, r)));
    }
    if op == BinOp::Ne {
        return Ok(Value::Bool(!values_equal(l, r)));
    }
    let (lf, rf) = match (l.as_f64(), r.as_f64()) {
        (Some(lf), Some(rf)) => (lf, rf),
        _ => {
            // Fall back to string ordering for non-numeric operands.
            let (Some(ls), Some(rs)) = (l.as_str(), r.as_str()) else {
                return Err(EvalError::TypeMismatch {
                    op: op.as_str().to_string(),
                    detail: format!("cannot compare {l} and {r}"),
                });
            };
            let ord = ls.cmp(rs);
            return Ok(Value::Bool(match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Le => ord.is_le(),
                BinOp::Gt => ord.is_gt(),
                BinOp::Ge => ord.is_ge(),
                _ => unreachable!(),
            }));
        }
    };
    let result = match op {
        BinOp::Lt => lf < rf,
        BinOp::Le => lf <= rf,
        BinOp::Gt => lf > rf,
        BinOp::Ge => lf >= rf,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn values_equal(l: &Value, r: &Value) -> bool {
    if let (Some(lf), Some(rf)) = (l.as_f64(), r.as_f64()) {
        return lf == rf;
    }
    l == r
}
