// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External collaborator seams (spec.md §6 "Consumed"). The engine depends
//! on these traits only; YAML loading, the plugin sandbox, secret storage,
//! persistence, and redaction policy are implemented by the host and
//! injected at construction, mirroring how `nextest-runner` takes a
//! `TestRunnerBuilder` with pluggable reporters rather than owning them.

use crate::{
    context::ExecutionContext,
    profile::Profile,
    result::ExecutionResult,
    retry::TransportErrorKind,
    value::PluginName,
};
use async_trait::async_trait;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use reglet_filtering::Value;

/// The plugin's factual return for one observation (spec.md §3 "Evidence").
/// "Error present" is orthogonal to `status == false`: a plugin can report
/// both a failed check and a transport-level error on the same evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub status: bool,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// A transport/load failure from a [`PluginExecutor`], carrying enough
/// information to classify it via [`crate::retry::is_transient_error`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

/// Delegates a single observation to the plugin sandbox. The sandbox itself
/// (WASM host, capability enforcement) is entirely out of scope here; the
/// engine only ever sees this seam.
#[async_trait]
pub trait PluginExecutor: Send + Sync {
    async fn observe(
        &self,
        ctx: &ExecutionContext,
        plugin: &PluginName,
        config: &Value,
    ) -> Result<Evidence, TransportError>;
}

/// Loads a [`Profile`] from a path or an in-memory reader. YAML parsing and
/// file I/O are the host's responsibility; this seam exists so the engine
/// never depends on a concrete format.
#[async_trait]
pub trait ProfileLoader: Send + Sync {
    async fn load(&self, path: &Utf8Path) -> Result<Profile, Box<dyn std::error::Error + Send + Sync>>;

    async fn load_from_str(
        &self,
        contents: &str,
    ) -> Result<Profile, Box<dyn std::error::Error + Send + Sync>>;
}

/// Resolves named secrets referenced from plugin config; `None` means not
/// found rather than an error, since a missing optional secret is routine.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Redacts sensitive fields out of evidence before it leaves the
/// observation adapter (spec.md §4.8, §9 "applied before evidence leaves
/// the sandbox boundary"). Implementations must be safe to call from
/// multiple worker tasks concurrently.
pub trait Redactor: Send + Sync {
    fn redact(&self, value: &mut Value);
    fn scrub(&self, text: &str) -> String;
}

/// Optional persistence for a finished [`ExecutionResult`]. Save failures
/// are logged by the engine, never fatal (spec.md §4.9 step 6).
#[async_trait]
pub trait Repository: Send + Sync {
    async fn save(
        &self,
        result: &ExecutionResult,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Bounds the size of an evidence payload, reporting whether truncation
/// occurred so the observation adapter can record a meta marker.
pub trait TruncationStrategy: Send + Sync {
    fn truncate(&self, value: &mut Value, limit_bytes: usize) -> bool;
}

/// Negotiates sandbox capabilities a profile's plugins require before a run
/// starts. Entirely outside the execution hot path.
pub trait CapabilityManager: Send + Sync {
    fn collect_required(&self, profile: &Profile) -> Vec<String>;
    fn grant(&self, required: &[String]) -> Result<(), String>;
}
