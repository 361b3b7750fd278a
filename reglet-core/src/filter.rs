// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The control filter specification algebra (spec.md §4.4): composable,
//! AND-combined predicates over a [`Control`], with one mode switch
//! (`ExclusiveControls`) and a final `Expression` predicate backed by
//! [`reglet_filtering`].

use crate::{
    profile::Control,
    value::{ControlId, Severity},
};
use reglet_filtering::{MapEnv, Program, Value};
use std::{collections::BTreeSet, sync::Arc};

/// The configuration for a [`ControlFilter`]; mirrors the `ExecutionConfig`
/// filter fields in spec.md §6.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// If non-empty, *only* these ids match; all other predicates are
    /// disabled (spec.md §4.4 "ExclusiveControls").
    pub include_control_ids: BTreeSet<ControlId>,
    pub exclude_control_ids: BTreeSet<ControlId>,
    pub exclude_tags: BTreeSet<String>,
    pub include_severities: BTreeSet<Severity>,
    pub include_tags: BTreeSet<String>,
    pub expression: Option<Arc<Program>>,
}

/// The control filter builder. `should_run` returns whether a control
/// should execute, and if not, a human-readable skip reason.
#[derive(Debug, Clone, Default)]
pub struct ControlFilter {
    config: FilterConfig,
}

impl ControlFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Evaluates every predicate, in the precedence order documented in
    /// spec.md §4.4: exclusive mode short-circuits everything else;
    /// otherwise exclusions are evaluated before inclusions, and the
    /// `Expression` predicate runs last.
    pub fn should_run(&self, control: &Control) -> (bool, Option<String>) {
        if !self.config.include_control_ids.is_empty() {
            return if self.config.include_control_ids.contains(&control.id) {
                (true, None)
            } else {
                (
                    false,
                    Some(format!(
                        "control `{}` is not in the exclusive include list",
                        control.id
                    )),
                )
            };
        }

        if self.config.exclude_control_ids.contains(&control.id) {
            return (
                false,
                Some(format!("control `{}` is explicitly excluded", control.id)),
            );
        }

        if control
            .tags
            .iter()
            .any(|tag| self.config.exclude_tags.contains(tag))
        {
            return (
                false,
                Some(format!(
                    "control `{}` has an excluded tag",
                    control.id
                )),
            );
        }

        if !self.config.include_severities.is_empty()
            && !self.config.include_severities.contains(&control.severity)
        {
            return (
                false,
                Some(format!(
                    "control `{}` severity `{}` is not in the included set",
                    control.id, control.severity
                )),
            );
        }

        if !self.config.include_tags.is_empty()
            && !control
                .tags
                .iter()
                .any(|tag| self.config.include_tags.contains(tag))
        {
            return (
                false,
                Some(format!(
                    "control `{}` has no tag in the included set",
                    control.id
                )),
            );
        }

        if let Some(program) = &self.config.expression {
            let env = control_env(control);
            return match program.evaluate_bool(&env) {
                Ok(true) => (true, None),
                Ok(false) => (
                    false,
                    Some(format!(
                        "control `{}` did not match expression `{}`",
                        control.id,
                        program.source()
                    )),
                ),
                Err(err) => (
                    false,
                    Some(format!(
                        "control `{}` expression evaluation failed: {err}",
                        control.id
                    )),
                ),
            };
        }

        (true, None)
    }
}

fn control_env(control: &Control) -> MapEnv {
    MapEnv::new()
        .insert("id", Value::String(control.id.as_str().to_string()))
        .insert("name", Value::String(control.name.clone()))
        .insert("severity", Value::String(control.severity.as_str().to_string()))
        .insert("owner", Value::String(control.owner.clone()))
        .insert(
            "tags",
            Value::List(
                control
                    .tags
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PluginName;
    use reglet_filtering::EnvSchema;

    fn control(id: &str, severity: Severity, tags: &[&str]) -> Control {
        let mut c = Control::new(ControlId::new(id).unwrap());
        c.severity = severity;
        c.tags = tags.iter().map(|t| t.to_string()).collect();
        c.observations.push(crate::profile::ObservationDefinition {
            plugin: PluginName::new("noop").unwrap(),
            config: Value::Null,
            expect: vec![],
        });
        c
    }

    #[test]
    fn exclusive_mode_disables_every_other_predicate() {
        let mut config = FilterConfig::default();
        config.include_control_ids = BTreeSet::from([ControlId::new("a").unwrap()]);
        config.exclude_control_ids = BTreeSet::from([ControlId::new("a").unwrap()]);
        let filter = ControlFilter::new(config);

        let (run, _) = filter.should_run(&control("a", Severity::High, &[]));
        assert!(run, "exclusive include must win over the exclude list");
    }

    #[test]
    fn exclusions_checked_before_inclusions() {
        let mut config = FilterConfig::default();
        config.exclude_tags = BTreeSet::from(["legacy".to_string()]);
        config.include_tags = BTreeSet::from(["legacy".to_string()]);
        let filter = ControlFilter::new(config);

        let (run, reason) = filter.should_run(&control("a", Severity::High, &["legacy"]));
        assert!(!run);
        assert!(reason.unwrap().contains("excluded tag"));
    }

    #[test]
    fn empty_selectors_run_everything() {
        let filter = ControlFilter::new(FilterConfig::default());
        let (run, _) = filter.should_run(&control("a", Severity::Low, &[]));
        assert!(run);
    }

    #[test]
    fn expression_predicate_runs_last() {
        let program = Program::compile("severity == \"high\"", &EnvSchema::control_filter()).unwrap();
        let mut config = FilterConfig::default();
        config.expression = Some(Arc::new(program));
        let filter = ControlFilter::new(config);

        assert!(filter.should_run(&control("a", Severity::High, &[])).0);
        assert!(!filter.should_run(&control("a", Severity::Low, &[])).0);
    }
}
