// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The plugin lockfile format (spec.md §3 "Lockfile", §6 "Lockfile
//! format"). Peripheral to the execution engine, but part of the
//! compiler's seam, so it lives alongside the rest of the profile layer.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One pinned plugin entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedPlugin {
    pub requested: String,
    pub resolved: String,
    pub source: String,
    pub sha256: Option<String>,
    pub fetched: DateTime<Utc>,
    pub modified: bool,
}

/// A pinned record of plugin versions and digests for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    pub generated: DateTime<Utc>,
    pub plugins: IndexMap<String, LockedPlugin>,
}

/// Errors produced by [`Lockfile::validate`].
#[derive(Debug, Clone, Error)]
pub enum LockfileError {
    #[error("unsupported lockfile version {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("plugin `{0}` is missing a sha256 digest")]
    MissingDigest(String),
}

impl Lockfile {
    pub fn new() -> Self {
        Self {
            version: 1,
            generated: Utc::now(),
            plugins: IndexMap::new(),
        }
    }

    /// Enforces spec.md §6: `version` must be 1 and every plugin entry
    /// must carry a `sha256` digest.
    pub fn validate(&self) -> Result<(), LockfileError> {
        if self.version != 1 {
            return Err(LockfileError::UnsupportedVersion(self.version));
        }
        for (name, entry) in &self.plugins {
            if entry.sha256.is_none() {
                return Err(LockfileError::MissingDigest(name.clone()));
            }
        }
        Ok(())
    }
}

impl Default for Lockfile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plugin() -> LockedPlugin {
        LockedPlugin {
            requested: "ssh-config@^1".into(),
            resolved: "ssh-config@1.2.0".into(),
            source: "registry".into(),
            sha256: Some("deadbeef".into()),
            fetched: Utc::now(),
            modified: false,
        }
    }

    #[test]
    fn validate_rejects_missing_digest() {
        let mut lock = Lockfile::new();
        let mut plugin = sample_plugin();
        plugin.sha256 = None;
        lock.plugins.insert("ssh-config".into(), plugin);
        assert!(matches!(
            lock.validate(),
            Err(LockfileError::MissingDigest(_))
        ));
    }

    #[test]
    fn serialize_round_trip_preserves_plugins_and_generated() {
        let mut lock = Lockfile::new();
        lock.plugins.insert("ssh-config".into(), sample_plugin());

        let json = serde_json::to_string(&lock).unwrap();
        let parsed: Lockfile = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.plugins, lock.plugins);
        assert_eq!(parsed.generated, lock.generated);
        assert!(parsed.validate().is_ok());
    }
}
