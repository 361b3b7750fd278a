// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The profile aggregate (spec.md §4.2): `Profile` -> `Control` ->
//! `ObservationDefinition`, plus defaults propagation and validation.

use crate::{
    errors::ValidationError,
    retry::RetryStrategy,
    value::{ControlId, PluginName, Severity},
};
use indexmap::IndexMap;
use reglet_filtering::Value;
use std::{collections::BTreeSet, time::Duration};

/// An immutable, single plugin invocation with optional boolean
/// expectations (spec.md §3 "ObservationDefinition").
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationDefinition {
    pub plugin: PluginName,
    pub config: Value,
    pub expect: Vec<String>,
}

/// Per-control retry configuration, distinct from the compile-time
/// [`RetryStrategy`] enum so `Control` can carry concrete delays.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub retries: u32,
    pub delay: Duration,
    pub backoff: RetryStrategy,
    pub max_delay: Option<Duration>,
    /// Whether backoff delays are randomized into `(0.5, 1]` of their
    /// computed value, per `nextest-runner`'s `BackoffIter` jitter option.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
            backoff: RetryStrategy::None,
            max_delay: None,
            jitter: false,
        }
    }
}

/// A named, tagged compliance control (spec.md §3 "Control").
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub id: ControlId,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub owner: String,
    pub tags: BTreeSet<String>,
    pub depends_on: Vec<ControlId>,
    pub timeout: Option<Duration>,
    pub retry: RetryConfig,
    pub observations: Vec<ObservationDefinition>,
}

impl Control {
    pub fn new(id: ControlId) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            severity: Severity::Unset,
            owner: String::new(),
            tags: BTreeSet::new(),
            depends_on: Vec::new(),
            timeout: None,
            retry: RetryConfig::default(),
            observations: Vec::new(),
        }
    }
}

/// Defaults inherited by controls that leave a field unset (spec.md §4.2
/// "ApplyDefaults").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlDefaults {
    pub severity: Severity,
    pub owner: String,
    pub tags: BTreeSet<String>,
    pub timeout: Option<Duration>,
}

/// Top-level profile metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// The profile aggregate root (spec.md §3 "Profile").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub metadata: ProfileMetadata,
    /// Ordered, deduplicated plugin references.
    pub plugins: Vec<String>,
    pub vars: IndexMap<String, Value>,
    pub defaults: ControlDefaults,
    /// Controls in definition order, keyed by id for O(1) lookup.
    pub controls: IndexMap<ControlId, Control>,
    /// `extends` paths; cleared once the inheritance loader has resolved them.
    pub extends: Vec<String>,
}

impl Profile {
    pub fn new(metadata: ProfileMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    /// Checks the invariants from spec.md §3/§4.2. Dependency-cycle
    /// detection is deliberately *not* part of this call; see
    /// [`crate::depgraph`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.metadata.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.metadata.version.trim().is_empty() {
            return Err(ValidationError::EmptyVersion);
        }

        let mut seen = BTreeSet::new();
        for control in self.controls.values() {
            if !seen.insert(control.id.clone()) {
                return Err(ValidationError::DuplicateControlId(
                    control.id.as_str().to_string(),
                ));
            }
        }

        for control in self.controls.values() {
            if control.observations.is_empty() {
                return Err(ValidationError::NoObservations(
                    control.id.as_str().to_string(),
                ));
            }
            for dep in &control.depends_on {
                if !self.controls.contains_key(dep) {
                    return Err(ValidationError::UnknownDependency {
                        control: control.id.as_str().to_string(),
                        target: dep.as_str().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Propagates `controls.defaults` into any control that left the
    /// corresponding field unset. Tags are set-merged (defaults ∪
    /// control.tags); order is irrelevant.
    pub fn apply_defaults(&mut self) {
        let defaults = self.defaults.clone();
        for control in self.controls.values_mut() {
            if control.severity.is_unset() {
                control.severity = defaults.severity;
            }
            if control.owner.trim().is_empty() {
                control.owner = defaults.owner.clone();
            }
            if control.timeout.is_none() {
                control.timeout = defaults.timeout;
            }
            control.tags.extend(defaults.tags.iter().cloned());
        }
    }

    /// Adds a control, enforcing id uniqueness, dependency existence, and
    /// acyclicity. On failure the profile is left unmodified (rollback).
    pub fn add_control(&mut self, control: Control) -> Result<(), ValidationError> {
        if self.controls.contains_key(&control.id) {
            return Err(ValidationError::DuplicateControlId(
                control.id.as_str().to_string(),
            ));
        }
        for dep in &control.depends_on {
            if !self.controls.contains_key(dep) && *dep != control.id {
                return Err(ValidationError::UnknownDependency {
                    control: control.id.as_str().to_string(),
                    target: dep.as_str().to_string(),
                });
            }
        }

        // Speculatively insert, then check for a cycle; roll back on failure.
        let id = control.id.clone();
        self.controls.insert(id.clone(), control);
        if crate::depgraph::build_control_dag(&self.controls).is_err() {
            self.controls.shift_remove(&id);
            return Err(ValidationError::UnknownDependency {
                control: id.as_str().to_string(),
                target: "<cycle>".to_string(),
            });
        }
        Ok(())
    }

    pub fn get_control(&self, id: &ControlId) -> Option<&Control> {
        self.controls.get(id)
    }

    pub fn has_control(&self, id: &ControlId) -> bool {
        self.controls.contains_key(id)
    }

    /// "Any tag matches"; an empty selector returns all controls.
    pub fn select_controls_by_tags(&self, tags: &BTreeSet<String>) -> Vec<&Control> {
        if tags.is_empty() {
            return self.controls.values().collect();
        }
        self.controls
            .values()
            .filter(|c| c.tags.iter().any(|t| tags.contains(t)))
            .collect()
    }

    /// Exact match; an empty selector returns all controls.
    pub fn select_controls_by_severity(&self, severities: &BTreeSet<Severity>) -> Vec<&Control> {
        if severities.is_empty() {
            return self.controls.values().collect();
        }
        self.controls
            .values()
            .filter(|c| severities.contains(&c.severity))
            .collect()
    }

    pub fn exclude_controls_by_id(&self, ids: &BTreeSet<ControlId>) -> Vec<&Control> {
        self.controls
            .values()
            .filter(|c| !ids.contains(&c.id))
            .collect()
    }
}
