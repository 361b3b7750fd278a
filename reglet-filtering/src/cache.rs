// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The process-scoped compiled-program cache.
//!
//! Keyed by raw expression text (spec.md §4.6): a single-writer-many-reader
//! `RwLock<HashMap<...>>`, with compilation happening under the write lock
//! and a re-check on entry so concurrent callers compiling the same
//! expression for the first time converge on exactly one compilation.
//! Invalid expressions are never inserted.

use crate::{compile::EnvSchema, errors::CompileError, Program};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// A process-wide cache of compiled [`Program`]s, shared across all callers
/// that use the same expression text and environment schema.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: RwLock<HashMap<String, Arc<Program>>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of successfully compiled, cached programs.
    pub fn len(&self) -> usize {
        self.programs
            .read()
            .expect("program cache lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached program for `source`, compiling and inserting it
    /// if this is the first time it has been seen. Compilation failures
    /// are returned to the caller and never cached.
    pub fn get_or_compile(
        &self,
        source: &str,
        schema: &EnvSchema,
    ) -> Result<Arc<Program>, CompileError> {
        if let Some(program) = self.programs.read().expect("lock poisoned").get(source) {
            return Ok(Arc::clone(program));
        }

        let mut programs = self.programs.write().expect("lock poisoned");
        // Re-check: another writer may have compiled this expression while
        // we were waiting for the write lock.
        if let Some(program) = programs.get(source) {
            return Ok(Arc::clone(program));
        }

        let program = Arc::new(Program::compile(source, schema)?);
        programs.insert(source.to_string(), Arc::clone(&program));
        Ok(program)
    }
}
