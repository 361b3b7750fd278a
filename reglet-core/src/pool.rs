// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dependency-aware worker pool (spec.md §4.10): executes controls as
//! soon as every dependency has reached a terminal state, without level
//! barriers, bounded to `max_concurrent_controls` concurrent controls.
//!
//! All graph bookkeeping (`in_degree`, `reverse_deps`, the ready queue) is
//! owned by this single coordinating future, serialized by construction
//! rather than by an explicit lock — the same "single-writer" discipline
//! `nextest-runner`'s dispatcher applies to its own run state, adapted here
//! to a [`futures::stream::FuturesUnordered`] of in-flight controls instead
//! of spawned tasks plus channels, since the control/engine/profile
//! references borrowed here are not `'static` and no scoped-spawn crate is
//! in the dependency set. Concurrency is real: controls overlap across
//! their `.await` points exactly as spawned tasks would, just driven from
//! one coordinator future instead of N OS tasks.

use crate::{
    context::ExecutionContext,
    depgraph::build_control_dag,
    engine::Engine,
    errors::EngineError,
    profile::Profile,
    result::ExecutionResult,
    value::ControlId,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Runs every control in `profile` to completion, honoring dependency
/// order, and appends each result to `result` as it completes.
pub async fn run(
    ctx: &ExecutionContext,
    profile: &Profile,
    engine: &Engine,
    result: &ExecutionResult,
    required: &BTreeSet<ControlId>,
    max_concurrent_controls: usize,
) -> Result<(), EngineError> {
    build_control_dag(&profile.controls)?;

    let index_by_id: HashMap<ControlId, usize> = profile
        .controls
        .keys()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    let mut in_degree: HashMap<ControlId, usize> = profile
        .controls
        .values()
        .map(|c| (c.id.clone(), c.depends_on.len()))
        .collect();

    let mut reverse_deps: HashMap<ControlId, Vec<ControlId>> = HashMap::new();
    for control in profile.controls.values() {
        for dep in &control.depends_on {
            reverse_deps.entry(dep.clone()).or_default().push(control.id.clone());
        }
    }

    let mut ready: VecDeque<ControlId> = profile
        .controls
        .values()
        .filter(|c| in_degree[&c.id] == 0)
        .map(|c| c.id.clone())
        .collect();

    let limit = max_concurrent_controls.max(1);
    let total = profile.controls.len();
    let mut completed = 0usize;
    let mut in_flight = FuturesUnordered::new();

    loop {
        ctx.check()?;

        while in_flight.len() < limit {
            let Some(id) = ready.pop_front() else { break };
            let control = &profile.controls[&id];
            let index = index_by_id[&id];
            in_flight.push(async move {
                let control_result = engine.execute_control(ctx, control, index, result, required).await;
                (id, control_result)
            });
        }

        if in_flight.is_empty() {
            break;
        }

        let Some((id, control_result)) = in_flight.next().await else {
            break;
        };
        result.add_control_result(control_result);
        completed += 1;

        if let Some(dependents) = reverse_deps.get(&id) {
            for dependent in dependents {
                if let Some(count) = in_degree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(dependent.clone());
                    }
                }
            }
        }

        if completed == total {
            break;
        }
    }

    Ok(())
}
