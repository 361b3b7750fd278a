// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The observation executor adapter (spec.md §4.8): wraps the external
//! `PluginExecutor`, applies redaction and truncation, and hands the
//! evidence to the aggregator (C6) to produce an [`ObservationResult`].

use crate::{
    aggregate,
    context::ExecutionContext,
    errors::ObservationError,
    ports::{PluginExecutor, Redactor, TruncationStrategy},
    profile::ObservationDefinition,
    result::ObservationResult,
    value::Status,
};
use reglet_filtering::ProgramCache;
use std::{sync::Arc, time::Instant};
use tracing::instrument;

/// Configuration mirroring spec.md §6's `ExecutionConfig` "Evidence" group.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceConfig {
    pub max_evidence_size_bytes: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_evidence_size_bytes: 1_048_576,
        }
    }
}

/// Adapts one observation definition into a plugin call plus post-processing.
pub struct ObservationExecutor {
    plugin_executor: Arc<dyn PluginExecutor>,
    redactor: Option<Arc<dyn Redactor>>,
    truncation: Option<Arc<dyn TruncationStrategy>>,
    cache: Arc<ProgramCache>,
    config: EvidenceConfig,
}

impl ObservationExecutor {
    pub fn new(
        plugin_executor: Arc<dyn PluginExecutor>,
        cache: Arc<ProgramCache>,
        config: EvidenceConfig,
    ) -> Self {
        Self {
            plugin_executor,
            redactor: None,
            truncation: None,
            cache,
            config,
        }
    }

    pub fn with_redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = Some(redactor);
        self
    }

    pub fn with_truncation(mut self, truncation: Arc<dyn TruncationStrategy>) -> Self {
        self.truncation = Some(truncation);
        self
    }

    /// Executes one observation to completion. Never returns `Err` — every
    /// failure mode surfaces as a `status=error` [`ObservationResult`]
    /// (spec.md §7 "all others surface per observation or per control").
    #[instrument(skip(self, ctx, obs), fields(plugin = %obs.plugin))]
    pub async fn execute(&self, ctx: &ExecutionContext, obs: &ObservationDefinition) -> ObservationResult {
        let start = Instant::now();
        let mut result = ObservationResult::new(obs.plugin.clone(), obs.config.clone());

        match self
            .plugin_executor
            .observe(ctx, &obs.plugin, &obs.config)
            .await
        {
            Err(transport_err) => {
                tracing::warn!(plugin = %obs.plugin, error = %transport_err, "plugin execution failed");
                result.status = Status::Error;
                result.raw_error = Some(transport_err.kind);
                result.error = Some(ObservationError::PluginExecution {
                    plugin: obs.plugin.to_string(),
                    message: transport_err.message,
                });
            }
            Ok(mut evidence) => {
                if let Some(redactor) = &self.redactor {
                    redactor.redact(&mut evidence.data);
                }
                if let Some(truncation) = &self.truncation {
                    result.truncated =
                        truncation.truncate(&mut evidence.data, self.config.max_evidence_size_bytes);
                }

                let (status, expectations) =
                    aggregate::determine_observation_status(&evidence, &obs.expect, &self.cache);
                result.status = status;
                result.expectations = expectations;

                if let Some(message) = &evidence.error {
                    result.error = Some(ObservationError::PluginExecution {
                        plugin: obs.plugin.to_string(),
                        message: message.clone(),
                    });
                }
                result.evidence = Some(evidence);
            }
        }

        result.duration = start.elapsed();
        result
    }
}
