// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine (spec.md §4.9): orchestrates one run end-to-end — filters,
//! dependency resolution, sequential-or-pooled control execution, and
//! finalization.

use crate::{
    aggregate,
    context::ExecutionContext,
    depgraph::{expand_with_dependencies, resolve_dependencies},
    errors::EngineError,
    executor::{EvidenceConfig, ObservationExecutor},
    filter::{ControlFilter, FilterConfig},
    merge::ValidatedProfile,
    pool,
    ports::Repository,
    profile::{Control, ObservationDefinition},
    result::{self, ControlResult, ExecutionResult, ObservationResult},
    value::{ControlId, Status},
};
use futures::stream::{self, StreamExt};
use std::{collections::BTreeSet, sync::Arc, time::Instant};
use tracing::instrument;

/// Mirrors spec.md §6's `ExecutionConfig`. `Default` applies the stated
/// defaults: `max(available_parallelism, 4)` controls, `clamp(cpus/2, 2,
/// 10)` observations.
#[derive(Clone)]
pub struct ExecutionConfig {
    pub filter: FilterConfig,
    pub include_dependencies: bool,
    pub parallel: bool,
    pub max_concurrent_controls: usize,
    pub max_concurrent_observations: usize,
    pub evidence: EvidenceConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            filter: FilterConfig::default(),
            include_dependencies: false,
            parallel: false,
            max_concurrent_controls: cpus.max(4),
            max_concurrent_observations: (cpus / 2).clamp(2, 10),
            evidence: EvidenceConfig::default(),
        }
    }
}

/// Orchestrates execution of a [`ValidatedProfile`] (spec.md §4.9).
pub struct Engine {
    filter: ControlFilter,
    executor: Arc<ObservationExecutor>,
    repository: Option<Arc<dyn Repository>>,
    config: ExecutionConfig,
    engine_version: String,
}

impl Engine {
    pub fn new(config: ExecutionConfig, executor: Arc<ObservationExecutor>, engine_version: impl Into<String>) -> Self {
        let filter = ControlFilter::new(config.filter.clone());
        Self {
            filter,
            executor,
            repository: None,
            config,
            engine_version: engine_version.into(),
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Runs `profile` to completion (spec.md §4.9 `Execute`). Only
    /// cancellation/deadline-exceeded and fatal dependency-resolution
    /// errors are returned here; everything else surfaces inside the
    /// returned [`ExecutionResult`].
    #[instrument(skip(self, ctx, profile), fields(profile = %profile.metadata.name))]
    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        profile: &ValidatedProfile,
    ) -> Result<ExecutionResult, EngineError> {
        ctx.check()?;

        let result = ExecutionResult::new(
            profile.metadata.name.clone(),
            profile.metadata.version.clone(),
            self.engine_version.clone(),
        );

        let required = if self.config.include_dependencies {
            let closures = resolve_dependencies(&profile.controls)?;
            let matched: BTreeSet<ControlId> = profile
                .controls
                .values()
                .filter(|c| self.filter.should_run(c).0)
                .map(|c| c.id.clone())
                .collect();
            expand_with_dependencies(&matched, &closures)
        } else {
            BTreeSet::new()
        };

        if self.config.parallel && profile.controls.len() > 1 {
            pool::run(
                ctx,
                profile,
                self,
                &result,
                &required,
                self.config.max_concurrent_controls,
            )
            .await?;
        } else {
            for (index, control) in profile.controls.values().enumerate() {
                ctx.check()?;
                let control_result = self.execute_control(ctx, control, index, &result, &required).await;
                result.add_control_result(control_result);
            }
        }

        let mut result = result;
        result.finalize();

        if let Some(repository) = &self.repository {
            if let Err(err) = repository.save(&result).await {
                tracing::warn!(error = %err, "failed to persist execution result");
            }
        }

        Ok(result)
    }

    /// Executes one control, including its skip pre-checks and retry loop
    /// (spec.md §4.9 `executeControl`). Called directly for the sequential
    /// path and from [`pool::run`] for the worker-pool path.
    pub(crate) async fn execute_control(
        &self,
        ctx: &ExecutionContext,
        control: &Control,
        index: usize,
        result: &ExecutionResult,
        required: &BTreeSet<ControlId>,
    ) -> ControlResult {
        let (should_run, skip_reason) = self.filter.should_run(control);
        if !should_run && !required.contains(&control.id) {
            return ControlResult::skipped(
                index,
                control,
                skip_reason.unwrap_or_else(|| "filtered out".to_string()),
            );
        }

        for dep in &control.depends_on {
            match result.get_control_status(dep) {
                None => {
                    return ControlResult::skipped(index, control, format!("dependency `{dep}` not found"));
                }
                Some(status) if matches!(status, Status::Fail | Status::Error | Status::Skipped) => {
                    return ControlResult::skipped(
                        index,
                        control,
                        format!("dependency `{dep}` has status `{status}`"),
                    );
                }
                Some(_) => {}
            }
        }

        let mut control_result = ControlResult::new(index, control.id.clone());
        control_result.name = control.name.clone();
        control_result.description = control.description.clone();
        control_result.severity = control.severity;
        control_result.tags = control.tags.clone();

        let derived_ctx = match control.timeout {
            Some(timeout) => ctx.with_derived_timeout(timeout),
            None => ctx.clone(),
        };

        let max_attempts = control.retry.retries + 1;
        let start = Instant::now();

        for attempt in 1..=max_attempts {
            if let Err(kind) = derived_ctx.check() {
                control_result.status = Status::Error;
                control_result.message = format!("control {kind}");
                control_result.duration = start.elapsed();
                return control_result;
            }

            let observations = run_observations(
                &derived_ctx,
                &control.observations,
                &self.executor,
                self.config.parallel && control.observations.len() > 1,
                self.config.max_concurrent_observations,
            )
            .await;

            let statuses: Vec<Status> = observations.iter().map(|o| o.status).collect();
            let status = aggregate::aggregate_control_status(&statuses);
            let single_error = single_error_message(&observations);

            let observation_count = observations.len();
            control_result.observation_results = observations;
            control_result.status = status;
            control_result.message =
                result::control_message(status, observation_count, single_error.as_deref());

            if status != Status::Error {
                control_result.duration = start.elapsed();
                return control_result;
            }

            let transient = control_result
                .observation_results
                .iter()
                .any(|o| o.raw_error.is_some_and(crate::retry::is_transient_error));
            if !transient || attempt == max_attempts {
                control_result.duration = start.elapsed();
                return control_result;
            }

            let mut delay = crate::retry::calculate_backoff(
                control.retry.backoff,
                attempt,
                control.retry.delay,
                control.retry.max_delay,
            );
            if control.retry.jitter {
                delay = crate::retry::apply_jitter(delay);
            }
            tracing::debug!(
                control = %control.id,
                attempt,
                max_attempts,
                ?delay,
                "retrying control after a transient observation error"
            );
            if derived_ctx.sleep_or_cancelled(delay).await.is_err() {
                control_result.duration = start.elapsed();
                return control_result;
            }
        }

        control_result.duration = start.elapsed();
        control_result
    }
}

/// Runs an observation list, capped at `max_concurrent` in-flight calls when
/// `parallel` is set, preserving definition-order regardless of completion
/// order (spec.md §4.9 "each result is placed in a pre-sized slot indexed
/// by its definition position").
async fn run_observations(
    ctx: &ExecutionContext,
    observations: &[ObservationDefinition],
    executor: &ObservationExecutor,
    parallel: bool,
    max_concurrent: usize,
) -> Vec<ObservationResult> {
    if !parallel || observations.len() <= 1 {
        let mut results = Vec::with_capacity(observations.len());
        for obs in observations {
            results.push(executor.execute(ctx, obs).await);
        }
        return results;
    }

    let indexed = observations.iter().enumerate();
    let mut slots: Vec<Option<ObservationResult>> = (0..observations.len()).map(|_| None).collect();
    let mut completed: Vec<(usize, ObservationResult)> = stream::iter(indexed)
        .map(|(i, obs)| async move { (i, executor.execute(ctx, obs).await) })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;
    completed.sort_by_key(|(i, _)| *i);
    for (i, r) in completed {
        slots[i] = Some(r);
    }
    slots
        .into_iter()
        .map(|s| s.expect("every observation index is dispatched exactly once"))
        .collect()
}

fn single_error_message(observations: &[ObservationResult]) -> Option<String> {
    let errored: Vec<&ObservationResult> = observations
        .iter()
        .filter(|o| o.status == Status::Error)
        .collect();
    if errored.len() == 1 {
        errored[0].error.as_ref().map(|e| e.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ports::{Evidence, PluginExecutor, TransportError},
        profile::{ProfileMetadata},
        merge::Compiler,
        profile::Profile,
        value::PluginName,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use reglet_filtering::{ProgramCache, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Routes `tracing` spans through the test harness's captured output
    /// instead of stdout, so `#[instrument]`-decorated engine code is
    /// visible under `cargo test -- --nocapture` without polluting passing
    /// runs.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    struct AlwaysFails;

    #[async_trait]
    impl PluginExecutor for AlwaysFails {
        async fn observe(
            &self,
            _ctx: &ExecutionContext,
            _plugin: &PluginName,
            _config: &Value,
        ) -> Result<Evidence, TransportError> {
            Ok(Evidence {
                status: false,
                data: Value::Null,
                timestamp: Utc::now(),
                error: None,
            })
        }
    }

    fn single_control_profile(id: &str, deps: &[&str]) -> Profile {
        let mut profile = Profile::new(ProfileMetadata {
            name: "p".into(),
            version: "1.0".into(),
            description: String::new(),
        });
        let mut control = Control::new(ControlId::new(id).unwrap());
        control.depends_on = deps.iter().map(|d| ControlId::new(*d).unwrap()).collect();
        control.observations.push(ObservationDefinition {
            plugin: PluginName::new("noop").unwrap(),
            config: Value::Null,
            expect: vec![],
        });
        profile.controls.insert(control.id.clone(), control);
        profile
    }

    #[tokio::test]
    async fn dependency_failure_propagates_as_skipped() {
        init_tracing();
        let mut profile = single_control_profile("a", &[]);
        let mut b = Control::new(ControlId::new("b").unwrap());
        b.depends_on = vec![ControlId::new("a").unwrap()];
        b.observations.push(ObservationDefinition {
            plugin: PluginName::new("noop").unwrap(),
            config: Value::Null,
            expect: vec![],
        });
        profile.controls.insert(b.id.clone(), b);
        let compiled = Compiler::compile(&profile).unwrap();

        let executor = Arc::new(ObservationExecutor::new(
            Arc::new(AlwaysFails),
            Arc::new(ProgramCache::new()),
            EvidenceConfig::default(),
        ));
        let engine = Engine::new(ExecutionConfig::default(), executor, "test");

        let ctx = ExecutionContext::new();
        let result = engine.execute(&ctx, &compiled).await.unwrap();

        let controls = result.control_results();
        let a = controls.iter().find(|c| c.id.as_str() == "a").unwrap();
        let b = controls.iter().find(|c| c.id.as_str() == "b").unwrap();
        assert_eq!(a.status, Status::Fail);
        assert_eq!(b.status, Status::Skipped);
        assert!(b.skip_reason.as_ref().unwrap().contains("status `fail`"));
    }

    #[tokio::test]
    async fn cancelled_context_aborts_execute() {
        init_tracing();
        let profile = single_control_profile("a", &[]);
        let compiled = Compiler::compile(&profile).unwrap();
        let executor = Arc::new(ObservationExecutor::new(
            Arc::new(AlwaysFails),
            Arc::new(ProgramCache::new()),
            EvidenceConfig::default(),
        ));
        let engine = Engine::new(ExecutionConfig::default(), executor, "test");

        let ctx = ExecutionContext::new();
        ctx.cancel();
        let err = engine.execute(&ctx, &compiled).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancellation(_)));
    }

    /// Cancels `ctx` as a side effect of its first `observe` call, simulating
    /// an external cancellation arriving while a run is already underway.
    struct CancelsOnFirstCall {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PluginExecutor for CancelsOnFirstCall {
        async fn observe(
            &self,
            ctx: &ExecutionContext,
            _plugin: &PluginName,
            _config: &Value,
        ) -> Result<Evidence, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                ctx.cancel();
            }
            Ok(Evidence {
                status: true,
                data: Value::Null,
                timestamp: Utc::now(),
                error: None,
            })
        }
    }

    #[tokio::test]
    async fn mid_run_cancellation_is_returned_as_an_error_not_a_partial_result() {
        init_tracing();
        let mut profile = single_control_profile("a", &[]);
        let mut b = Control::new(ControlId::new("b").unwrap());
        b.observations.push(ObservationDefinition {
            plugin: PluginName::new("noop").unwrap(),
            config: Value::Null,
            expect: vec![],
        });
        profile.controls.insert(b.id.clone(), b);
        let compiled = Compiler::compile(&profile).unwrap();

        let executor = Arc::new(ObservationExecutor::new(
            Arc::new(CancelsOnFirstCall {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(ProgramCache::new()),
            EvidenceConfig::default(),
        ));
        let engine = Engine::new(ExecutionConfig::default(), executor, "test");

        let ctx = ExecutionContext::new();
        let err = engine.execute(&ctx, &compiled).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancellation(_)));
    }
}
