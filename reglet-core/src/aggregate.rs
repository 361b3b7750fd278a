// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status aggregation and the expectation evaluator (spec.md §4.6).
//!
//! Expression compilation and evaluation themselves live in
//! `reglet_filtering`; this module owns the DoS guards, the env shape
//! `{data, status, timestamp, error}`, and the diagnostic-message rules
//! that are specific to evidence expectations rather than to the DSL.

use crate::{ports::Evidence, result::ExpectationResult, value::Status};
use reglet_filtering::{EnvSchema, Env, MapEnv, Program, ProgramCache, Value};

/// Mirrors `reglet_filtering::errors::MAX_EXPRESSION_LEN`; restated here so
/// the "Expression too long" message can be produced before a `Program` is
/// even attempted, matching spec.md §4.6's ordering of the two guards.
const MAX_EXPECTATION_LEN: usize = reglet_filtering::errors::MAX_EXPRESSION_LEN;

/// Aggregates per-observation statuses into one control status (spec.md
/// §4.6): empty ⇒ skipped; any fail wins over any error (an auditable
/// violation must never be masked); all-skipped ⇒ skipped; otherwise pass.
/// Idempotent under input permutation.
pub fn aggregate_control_status(observation_statuses: &[Status]) -> Status {
    if observation_statuses.is_empty() {
        return Status::Skipped;
    }
    if observation_statuses.contains(&Status::Fail) {
        return Status::Fail;
    }
    if observation_statuses.contains(&Status::Error) {
        return Status::Error;
    }
    if observation_statuses.iter().all(|s| *s == Status::Skipped) {
        return Status::Skipped;
    }
    Status::Pass
}

/// Evaluates `expects` against `evidence`, returning the observation's
/// status and the per-expectation results (spec.md §4.6
/// `DetermineObservationStatus`).
pub fn determine_observation_status(
    evidence: &Evidence,
    expects: &[String],
    cache: &ProgramCache,
) -> (Status, Vec<ExpectationResult>) {
    if expects.is_empty() {
        let status = if evidence.status {
            Status::Pass
        } else {
            Status::Fail
        };
        return (status, Vec::new());
    }

    if evidence.error.is_some() {
        return (Status::Error, Vec::new());
    }

    let env = expectation_env(evidence);
    let schema = EnvSchema::expectation();
    let mut results = Vec::with_capacity(expects.len());
    let mut any_error = false;
    let mut any_false = false;

    for expression in expects {
        if expression.len() > MAX_EXPECTATION_LEN {
            results.push(ExpectationResult {
                expression: expression.clone(),
                passed: false,
                message: Some(format!(
                    "Expression too long: {} bytes exceeds the {}-byte limit",
                    expression.len(),
                    MAX_EXPECTATION_LEN
                )),
            });
            any_error = true;
            continue;
        }

        let program = match cache.get_or_compile(expression, &schema) {
            Ok(program) => program,
            Err(err) => {
                results.push(ExpectationResult {
                    expression: expression.clone(),
                    passed: false,
                    message: Some(err.to_string()),
                });
                any_error = true;
                continue;
            }
        };

        match program.evaluate_bool(&env) {
            Ok(true) => results.push(ExpectationResult {
                expression: expression.clone(),
                passed: true,
                message: None,
            }),
            Ok(false) => {
                results.push(ExpectationResult {
                    expression: expression.clone(),
                    passed: false,
                    message: Some(describe_failure(&program, &env)),
                });
                any_false = true;
            }
            Err(err) => {
                results.push(ExpectationResult {
                    expression: expression.clone(),
                    passed: false,
                    message: Some(err.to_string()),
                });
                any_error = true;
            }
        }
    }

    let status = if any_error {
        Status::Error
    } else if any_false {
        Status::Fail
    } else {
        Status::Pass
    };
    (status, results)
}

fn expectation_env(evidence: &Evidence) -> MapEnv {
    MapEnv::new()
        .insert("data", evidence.data.clone())
        .insert("status", Value::Bool(evidence.status))
        .insert("timestamp", Value::String(evidence.timestamp.to_rfc3339()))
        .insert(
            "error",
            match &evidence.error {
                Some(message) => Value::String(message.clone()),
                None => Value::Null,
            },
        )
}

/// Builds the "Expected data.size > 100, got 42" diagnostic for a clean
/// `false` result, falling back to the generic form for anything that
/// isn't a simple `data.<field> <op> <literal>` comparison.
fn describe_failure(program: &Program, env: &MapEnv) -> String {
    if let Some((path, _op, _rhs)) = program.describe_simple_comparison() {
        if path.first().map(String::as_str) == Some("data") {
            if let Some(actual) = env.resolve(&path) {
                return format!("Expected {}, got {actual}", program.source());
            }
        }
    }
    format!("Expression evaluated to false: {}", program.source())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::collection::vec as prop_vec;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = Status> {
        prop_oneof![
            Just(Status::Pass),
            Just(Status::Skipped),
            Just(Status::Error),
            Just(Status::Fail),
        ]
    }

    #[test]
    fn empty_observation_list_is_skipped() {
        assert_eq!(aggregate_control_status(&[]), Status::Skipped);
    }

    #[test]
    fn fail_overrides_error_and_skipped() {
        let statuses = [Status::Pass, Status::Fail, Status::Error];
        assert_eq!(aggregate_control_status(&statuses), Status::Fail);
    }

    #[test]
    fn aggregate_is_permutation_invariant() {
        let a = [Status::Error, Status::Skipped, Status::Pass];
        let b = [Status::Pass, Status::Error, Status::Skipped];
        assert_eq!(aggregate_control_status(&a), aggregate_control_status(&b));
    }

    #[test]
    fn all_skipped_is_skipped() {
        assert_eq!(
            aggregate_control_status(&[Status::Skipped, Status::Skipped]),
            Status::Skipped
        );
    }

    fn evidence(status: bool, data: Value) -> Evidence {
        Evidence {
            status,
            data,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn empty_expects_uses_raw_evidence_status() {
        let cache = ProgramCache::new();
        let (status, results) = determine_observation_status(&evidence(true, Value::Null), &[], &cache);
        assert_eq!(status, Status::Pass);
        assert!(results.is_empty());
    }

    #[test]
    fn evidence_error_short_circuits_to_error_without_evaluating() {
        let cache = ProgramCache::new();
        let mut ev = evidence(true, Value::Null);
        ev.error = Some("plugin failed".to_string());
        let (status, results) =
            determine_observation_status(&ev, &["data.x == 1".to_string()], &cache);
        assert_eq!(status, Status::Error);
        assert!(results.is_empty());
    }

    #[test]
    fn clean_false_produces_field_level_diagnostic() {
        let cache = ProgramCache::new();
        let data = Value::Map(std::collections::BTreeMap::from([(
            "size".to_string(),
            Value::Int(42),
        )]));
        let (status, results) =
            determine_observation_status(&evidence(true, data), &["data.size > 100".to_string()], &cache);
        assert_eq!(status, Status::Fail);
        assert_eq!(
            results[0].message.as_deref(),
            Some("Expected data.size > 100, got 42")
        );
    }

    #[test]
    fn too_long_expression_promotes_to_error() {
        let cache = ProgramCache::new();
        let long_expr = format!("data.x == {}", "9".repeat(MAX_EXPECTATION_LEN));
        let (status, results) =
            determine_observation_status(&evidence(true, Value::Null), &[long_expr], &cache);
        assert_eq!(status, Status::Error);
        assert!(results[0].message.as_ref().unwrap().contains("too long"));
    }

    #[test]
    fn compile_failure_promotes_to_error() {
        let cache = ProgramCache::new();
        let (status, _) = determine_observation_status(
            &evidence(true, Value::Null),
            &["nonexistent.field == 1".to_string()],
            &cache,
        );
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn shared_expression_compiles_exactly_once_across_observations() {
        let cache = ProgramCache::new();
        let data = Value::Map(std::collections::BTreeMap::from([(
            "value".to_string(),
            Value::Int(42),
        )]));
        for _ in 0..2 {
            let (status, _) = determine_observation_status(
                &evidence(true, data.clone()),
                &["data.value == 42".to_string()],
                &cache,
            );
            assert_eq!(status, Status::Pass);
        }
        assert_eq!(cache.len(), 1);
    }

    proptest! {
        /// Any shuffle of the same multiset of statuses aggregates to the
        /// same control status, for arbitrary (not just hand-picked) inputs.
        #[test]
        fn aggregate_control_status_ignores_order(
            statuses in prop_vec(any_status(), 0..12),
            seed in 0u64..1000,
        ) {
            let mut shuffled = statuses.clone();
            // A cheap deterministic shuffle: rotate by `seed`, reversible
            // without needing a `rand` dependency inside the proptest body.
            let split = if shuffled.is_empty() { 0 } else { (seed as usize) % shuffled.len() };
            shuffled.rotate_left(split);
            shuffled.reverse();

            prop_assert_eq!(
                aggregate_control_status(&statuses),
                aggregate_control_status(&shuffled)
            );
        }
    }
}
