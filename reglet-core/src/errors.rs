// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The error taxonomy shared across the profile, filter, and engine layers
//! (spec.md §6 "Error taxonomy", §7 "Error handling design").

use thiserror::Error;

/// Errors produced while validating a [`crate::profile::Profile`].
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("profile name must not be empty")]
    EmptyName,
    #[error("profile version must not be empty")]
    EmptyVersion,
    #[error("duplicate control id `{0}`")]
    DuplicateControlId(String),
    #[error("control `{control}` depends on non-existent control `{target}`")]
    UnknownDependency { control: String, target: String },
    #[error("control `{0}` has no observations")]
    NoObservations(String),
    #[error("invalid severity `{0}`")]
    InvalidSeverity(String),
}

/// Errors produced by the profile compiler (spec.md §4.3).
#[derive(Debug, Error)]
pub enum CompileProfileError {
    #[error("profile validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors produced while resolving the control dependency graph (spec.md §4.5).
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    #[error("control {control} depends on non-existent control {target}")]
    UnknownDependency { control: String, target: String },
    #[error("circular dependency detected among controls: [{}]", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Errors produced while resolving profile `extends` inheritance.
#[derive(Debug, Clone, Error)]
pub enum InheritanceError {
    #[error("circular inheritance detected: {0}")]
    Circular(String),
    #[error("loading parent {path}: {cause}")]
    LoadParent { path: String, cause: String },
}

/// The reason an observation or control stopped before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancellationKind {
    #[error("execution was canceled")]
    Canceled,
    #[error("execution timed out")]
    TimedOut,
}

/// A fatal, run-aborting error returned from [`crate::engine::Engine::execute`].
///
/// Per spec.md §7: only cancellation/deadline-exceeded and fatal setup
/// errors (missing dependencies, cycles) abort a run; everything else
/// surfaces per-observation or per-control inside the `ExecutionResult`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Cancellation(#[from] CancellationKind),
    #[error("dependency resolution failed: {0}")]
    Dependency(#[from] DependencyError),
    #[error("profile was not compiled through Compiler::compile")]
    UncompiledProfile,
}

/// The structured error attached to an [`crate::result::ObservationResult`].
#[derive(Debug, Clone, Error)]
pub enum ObservationError {
    #[error("failed to load plugin `{plugin}`: {message}")]
    PluginLoad { plugin: String, message: String },
    #[error("plugin `{plugin}` execution failed: {message}")]
    PluginExecution { plugin: String, message: String },
    #[error("plugin `{plugin}` returned an invalid result: {message}")]
    InvalidPluginResult { plugin: String, message: String },
    #[error("expression error: {0}")]
    Expression(#[from] reglet_filtering::CompileError),
    #[error("evaluation error: {0}")]
    Evaluation(#[from] reglet_filtering::EvalError),
}

impl ObservationError {
    /// The taxonomy code reported alongside the message (spec.md §6).
    pub fn code(&self) -> &'static str {
        match self {
            ObservationError::PluginLoad { .. } => "plugin_load_error",
            ObservationError::PluginExecution { .. } => "plugin_execution_error",
            ObservationError::InvalidPluginResult { .. } => "invalid_plugin_result",
            ObservationError::Expression(_) => "expression_error",
            ObservationError::Evaluation(_) => "evaluation_error",
        }
    }
}
