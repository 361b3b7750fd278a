// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Evaluation environments and built-in helper functions.

use crate::value::Value;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A source of identifier values for a compiled expression.
///
/// Both the expectation evaluator's `{data, status, timestamp, error}`
/// environment and the control filter's `{id, name, severity, owner,
/// tags}` environment implement this trait, so `Program` is shared between
/// the two call sites per spec.md's Design Notes (§9, "specification
/// pattern").
pub trait Env {
    /// Resolves a dotted identifier path to a value, or `None` if the path
    /// does not exist in this environment.
    fn resolve(&self, path: &[String]) -> Option<Value>;
}

/// A plain map-backed environment, handy for tests and for simple
/// single-level environments such as the control filter's.
#[derive(Debug, Default, Clone)]
pub struct MapEnv {
    values: BTreeMap<String, Value>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl Env for MapEnv {
    fn resolve(&self, path: &[String]) -> Option<Value> {
        let (head, rest) = path.split_first()?;
        let root = self.values.get(head)?;
        if rest.is_empty() {
            Some(root.clone())
        } else {
            root.get_path(rest).cloned()
        }
    }
}

/// Invokes a built-in helper function by name.
///
/// `isIPv4` is the only function shipped by the core (spec.md §4.6); hosts
/// may extend this with additional pure predicates (spec.md §9 Open
/// Questions #1) by matching on `name` before falling back to this
/// function.
pub fn call_builtin(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    match name {
        "isIPv4" => {
            let Some(first) = args.first() else {
                return Some(Err("isIPv4 expects exactly one argument".to_string()));
            };
            if args.len() != 1 {
                return Some(Err("isIPv4 expects exactly one argument".to_string()));
            }
            let Some(s) = first.as_str() else {
                return Some(Ok(Value::Bool(false)));
            };
            Some(Ok(Value::Bool(Ipv4Addr::from_str(s).is_ok())))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_ipv4_recognizes_valid_addresses() {
        let result = call_builtin("isIPv4", &[Value::String("10.0.0.1".into())]).unwrap();
        assert_eq!(result, Ok(Value::Bool(true)));
    }

    #[test]
    fn is_ipv4_rejects_garbage() {
        let result = call_builtin("isIPv4", &[Value::String("not-an-ip".into())]).unwrap();
        assert_eq!(result, Ok(Value::Bool(false)));
    }

    #[test]
    fn map_env_resolves_nested_path() {
        let inner = Value::Map(BTreeMap::from([("size".to_string(), Value::Int(42))]));
        let env = MapEnv::new().insert("data", inner);
        let value = env.resolve(&["data".to_string(), "size".to_string()]);
        assert_eq!(value, Some(Value::Int(42)));
    }
}
