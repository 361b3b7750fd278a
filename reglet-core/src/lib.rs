// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reglet execution engine: a concurrent, dependency-aware runner that
//! evaluates a compliance profile's controls against plugin-provided
//! evidence.
//!
//! Modules are layered bottom-up: value objects (C1) and the profile
//! aggregate (C2/C3) have no dependency on execution; the filter (C4) and
//! dependency resolver (C5) operate purely on the profile; the aggregator
//! (C6), retry policy (C7), and observation adapter (C8) are the execution
//! primitives; the engine (C9) and worker pool (C10) compose them; the
//! execution result (C11) is the run's output.

pub mod aggregate;
pub mod context;
pub mod depgraph;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod filter;
pub mod lockfile;
pub mod merge;
pub mod pool;
pub mod ports;
pub mod profile;
pub mod result;
pub mod retry;
pub mod value;

pub use context::ExecutionContext;
pub use engine::{Engine, ExecutionConfig};
pub use errors::EngineError;
pub use filter::{ControlFilter, FilterConfig};
pub use merge::{Compiler, ValidatedProfile};
pub use profile::{Control, ControlDefaults, ObservationDefinition, Profile, ProfileMetadata, RetryConfig};
pub use result::{ControlResult, ExecutionResult, ExpectationResult, ObservationResult, Summary};
pub use retry::RetryStrategy;
pub use value::{ControlId, Digest, ExecutionId, PluginName, Severity, Status};
