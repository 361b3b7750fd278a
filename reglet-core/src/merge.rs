// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Profile inheritance merge and compilation (spec.md §4.3), plus the
//! peripheral lockfile format referenced by the compiler seam.

use crate::{
    errors::CompileProfileError,
    profile::Profile,
};
use std::ops::Deref;

/// Merges `overlay` onto `base`. `base` is never mutated; `overlay` wins on
/// conflict per-field, as documented in spec.md §4.3.
pub fn merge(base: &Profile, overlay: &Profile) -> Profile {
    let mut result = base.clone();

    result.metadata.name = pick_nonempty(&overlay.metadata.name, &base.metadata.name);
    result.metadata.version = pick_nonempty(&overlay.metadata.version, &base.metadata.version);
    result.metadata.description =
        pick_nonempty(&overlay.metadata.description, &base.metadata.description);

    for (key, value) in &overlay.vars {
        result.vars.insert(key.clone(), value.clone());
    }

    // Concatenate base then overlay, deduplicating by first occurrence.
    let mut seen = std::collections::BTreeSet::new();
    let mut plugins = Vec::new();
    for plugin in base.plugins.iter().chain(overlay.plugins.iter()) {
        if seen.insert(plugin.clone()) {
            plugins.push(plugin.clone());
        }
    }
    result.plugins = plugins;

    if !overlay.defaults.severity.is_unset() {
        result.defaults.severity = overlay.defaults.severity;
    }
    if !overlay.defaults.owner.trim().is_empty() {
        result.defaults.owner = overlay.defaults.owner.clone();
    }
    if overlay.defaults.timeout.is_some() {
        result.defaults.timeout = overlay.defaults.timeout;
    }
    result
        .defaults
        .tags
        .extend(overlay.defaults.tags.iter().cloned());

    // Controls: same id => overlay replaces wholesale; new id => appended
    // after all base items, in overlay's declared order.
    for (id, control) in &overlay.controls {
        result.controls.insert(id.clone(), control.clone());
    }

    result.extends.clear();
    result
}

fn pick_nonempty(overlay: &str, base: &str) -> String {
    if overlay.trim().is_empty() {
        base.to_string()
    } else {
        overlay.to_string()
    }
}

/// Folds `merge` left-to-right over `parents` (later parents override
/// earlier ones), then overlays `current`. An empty `parents` list returns
/// a deep copy of `current`.
pub fn merge_all(parents: &[Profile], current: &Profile) -> Profile {
    let Some((first, rest)) = parents.split_first() else {
        return current.clone();
    };
    let folded = rest.iter().fold(first.clone(), |acc, parent| merge(&acc, parent));
    merge(&folded, current)
}

/// A profile that has passed through [`Compiler::compile`]: deep-copied,
/// defaulted, and validated. This marker type exists so the engine can
/// require a compiled profile at its API boundary (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct ValidatedProfile(Profile);

impl ValidatedProfile {
    pub fn profile(&self) -> &Profile {
        &self.0
    }
}

impl Deref for ValidatedProfile {
    type Target = Profile;
    fn deref(&self) -> &Profile {
        &self.0
    }
}

/// Deep-copies, applies defaults, and validates a profile.
pub struct Compiler;

impl Compiler {
    pub fn compile(profile: &Profile) -> Result<ValidatedProfile, CompileProfileError> {
        let mut compiled = profile.clone();
        compiled.apply_defaults();
        compiled.validate()?;
        Ok(ValidatedProfile(compiled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Control, ControlDefaults, ObservationDefinition, ProfileMetadata};
    use crate::value::{ControlId, PluginName, Severity};
    use reglet_filtering::Value;

    fn profile_with(name: &str, plugins: Vec<&str>, control_ids: Vec<&str>) -> Profile {
        let mut p = Profile::new(ProfileMetadata {
            name: name.into(),
            version: "1.0".into(),
            description: String::new(),
        });
        p.plugins = plugins.into_iter().map(String::from).collect();
        for id in control_ids {
            let mut c = Control::new(ControlId::new(id).unwrap());
            c.severity = Severity::High;
            c.observations.push(ObservationDefinition {
                plugin: PluginName::new("noop").unwrap(),
                config: Value::Null,
                expect: vec![],
            });
            p.controls.insert(c.id.clone(), c);
        }
        p
    }

    #[test]
    fn merge_does_not_mutate_base() {
        let base = profile_with("base", vec!["p1", "p2"], vec!["ssh-config"]);
        let overlay = profile_with("child", vec!["p2", "p3"], vec!["api-health"]);
        let base_snapshot = base.clone();

        let merged = merge(&base, &overlay);

        assert_eq!(base, base_snapshot);
        assert_eq!(merged.plugins, vec!["p1", "p2", "p3"]);
        assert_eq!(merged.controls.len(), 2);
        assert!(merged.extends.is_empty());
        // Definition order: base items first, then overlay's new items.
        let ids: Vec<_> = merged.controls.keys().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["ssh-config", "api-health"]);
    }

    #[test]
    fn merge_same_profile_with_itself_is_a_noop_on_metadata() {
        let p = profile_with("p", vec!["a"], vec!["c1"]);
        let merged = merge(&p, &p);
        assert_eq!(merged.metadata, p.metadata);
        assert_eq!(merged.controls.len(), p.controls.len());
    }

    #[test]
    fn merge_all_with_no_parents_deep_copies_current() {
        let current = profile_with("p", vec!["a"], vec!["c1"]);
        let merged = merge_all(&[], &current);
        assert_eq!(merged, current);
    }

    #[test]
    fn merge_all_folds_parents_left_to_right_then_overlays_current() {
        let grandparent = profile_with("gp", vec!["p1"], vec!["old"]);
        let parent = profile_with("parent", vec!["p2"], vec!["ssh-config"]);
        let current = profile_with("child", vec!["p3"], vec!["api-health"]);

        let merged = merge_all(&[grandparent, parent], &current);
        assert_eq!(merged.plugins, vec!["p1", "p2", "p3"]);
        assert_eq!(merged.metadata.name, "child");
        assert_eq!(merged.controls.len(), 3);
    }

    #[test]
    fn compiler_applies_defaults_before_validating() {
        let mut p = profile_with("p", vec![], vec!["c1"]);
        p.defaults = ControlDefaults {
            severity: Severity::Low,
            owner: "sec-team".into(),
            tags: Default::default(),
            timeout: None,
        };
        p.controls.get_mut(&ControlId::new("c1").unwrap()).unwrap().severity = Severity::Unset;

        let compiled = Compiler::compile(&p).unwrap();
        let c1 = compiled.get_control(&ControlId::new("c1").unwrap()).unwrap();
        assert_eq!(c1.severity, Severity::Low);
        assert_eq!(c1.owner, "sec-team");
    }

    #[test]
    fn compiler_rejects_invalid_profile() {
        let p = Profile::new(ProfileMetadata::default());
        assert!(Compiler::compile(&p).is_err());
    }
}
