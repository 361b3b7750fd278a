// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The control dependency resolver (spec.md §4.5): Kahn's-algorithm level
//! ordering plus DFS-based transitive closure for dependency-inclusion.

use crate::{errors::DependencyError, profile::Control, value::ControlId};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Builds the control DAG's level ordering via Kahn's algorithm: level 0
/// contains every zero-in-degree control, each subsequent level is peeled
/// off once its predecessors have all appeared. Definition order is
/// preserved within a level.
pub fn build_control_dag(
    controls: &IndexMap<ControlId, Control>,
) -> Result<Vec<Vec<ControlId>>, DependencyError> {
    for control in controls.values() {
        for dep in &control.depends_on {
            if !controls.contains_key(dep) {
                return Err(DependencyError::UnknownDependency {
                    control: control.id.as_str().to_string(),
                    target: dep.as_str().to_string(),
                });
            }
        }
    }

    let mut in_degree: HashMap<ControlId, usize> = controls
        .values()
        .map(|c| (c.id.clone(), c.depends_on.len()))
        .collect();
    let mut reverse_deps: HashMap<ControlId, Vec<ControlId>> = HashMap::new();
    for control in controls.values() {
        for dep in &control.depends_on {
            reverse_deps
                .entry(dep.clone())
                .or_default()
                .push(control.id.clone());
        }
    }

    let mut emitted = HashSet::new();
    let mut levels = Vec::new();

    loop {
        // Preserve definition order within a level.
        let level: Vec<ControlId> = controls
            .values()
            .map(|c| c.id.clone())
            .filter(|id| !emitted.contains(id) && in_degree[id] == 0)
            .collect();

        if level.is_empty() {
            break;
        }

        for id in &level {
            emitted.insert(id.clone());
        }
        for id in &level {
            if let Some(dependents) = reverse_deps.get(id) {
                for dependent in dependents {
                    if let Some(count) = in_degree.get_mut(dependent) {
                        *count -= 1;
                    }
                }
            }
        }
        levels.push(level);
    }

    if emitted.len() != controls.len() {
        let mut stuck: Vec<String> = controls
            .keys()
            .filter(|id| !emitted.contains(*id))
            .map(|id| id.as_str().to_string())
            .collect();
        stuck.sort();
        return Err(DependencyError::Cycle(stuck));
    }

    Ok(levels)
}

/// Computes, for every control, the set of controls it transitively
/// depends on, via DFS with a per-path visited set for cycle detection.
/// Used to force-include the dependencies of any control matched by the
/// filter when dependency-inclusion is requested (spec.md §4.5).
pub fn resolve_dependencies(
    controls: &IndexMap<ControlId, Control>,
) -> Result<HashMap<ControlId, BTreeSet<ControlId>>, DependencyError> {
    let mut result = HashMap::new();
    for id in controls.keys() {
        let mut visiting = HashSet::new();
        let mut closure = BTreeSet::new();
        dfs_closure(id, controls, &mut visiting, &mut closure)?;
        result.insert(id.clone(), closure);
    }
    Ok(result)
}

fn dfs_closure(
    id: &ControlId,
    controls: &IndexMap<ControlId, Control>,
    visiting: &mut HashSet<ControlId>,
    closure: &mut BTreeSet<ControlId>,
) -> Result<(), DependencyError> {
    if !visiting.insert(id.clone()) {
        return Err(DependencyError::Cycle(vec![id.as_str().to_string()]));
    }
    let Some(control) = controls.get(id) else {
        return Err(DependencyError::UnknownDependency {
            control: id.as_str().to_string(),
            target: id.as_str().to_string(),
        });
    };
    for dep in &control.depends_on {
        closure.insert(dep.clone());
        dfs_closure(dep, controls, visiting, closure)?;
    }
    visiting.remove(id);
    Ok(())
}

/// Expands a set of matched controls to include every direct or transitive
/// dependency, per spec.md §4.5 ("force-included").
pub fn expand_with_dependencies(
    matched: &BTreeSet<ControlId>,
    closures: &HashMap<ControlId, BTreeSet<ControlId>>,
) -> BTreeSet<ControlId> {
    let mut required: BTreeSet<ControlId> = matched.clone();
    for id in matched {
        if let Some(closure) = closures.get(id) {
            required.extend(closure.iter().cloned());
        }
    }
    required
}
