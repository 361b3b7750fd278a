// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validated value objects (spec.md §4.1): [`Status`], [`Severity`],
//! [`ControlId`], [`PluginName`], [`Digest`], and [`ExecutionId`].
//!
//! Each is constructed through a validating factory (`new`/`parse`) rather
//! than being directly constructible, mirroring the teacher's identifier
//! newtypes (`RustBinaryId`, `newtype_uuid`-wrapped `ReportUuid`).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Errors produced while constructing a value object.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValueError {
    #[error("{what} must not be empty")]
    Empty { what: &'static str },
    #[error("{what} `{value}` is not one of the allowed values")]
    NotAllowed { what: &'static str, value: String },
    #[error("plugin name `{0}` contains characters outside [A-Za-z0-9_-], a path separator, `..`, or exceeds 64 characters")]
    InvalidPluginName(String),
}

/// The outcome of a control or observation (spec.md §3 "Status").
///
/// Precedence for aggregation is `fail(3) > error(2) > skipped(1) >
/// pass(0)`; this is *not* used for lexicographic display ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Skipped,
    Error,
    Fail,
}

impl Status {
    /// The aggregation precedence rank; higher wins.
    pub fn rank(self) -> u8 {
        match self {
            Status::Pass => 0,
            Status::Skipped => 1,
            Status::Error => 2,
            Status::Fail => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Error => "error",
            Status::Skipped => "skipped",
        }
    }
}

impl PartialOrd for Status {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Status {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control/observation severity. The empty string is a legal "unset"
/// zero value (spec.md §4.1 "Zero value is empty and must be detectable").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unset,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Result<Self, ValueError> {
        match s.trim() {
            "" => Ok(Severity::Unset),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(ValueError::NotAllowed {
                what: "severity",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_unset(self) -> bool {
        matches!(self, Severity::Unset)
    }

    fn rank(self) -> u8 {
        match self {
            Severity::Unset => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Unset => "",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Unset
    }
}

/// A validated, trimmed, non-empty control identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(String);

impl ControlId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValueError> {
        let trimmed = raw.into().trim().to_string();
        if trimmed.is_empty() {
            return Err(ValueError::Empty { what: "control id" });
        }
        Ok(Self(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ControlId> for String {
    fn from(id: ControlId) -> Self {
        id.0
    }
}

/// A validated plugin name: `[A-Za-z0-9_-]+`, no path separators, no `..`,
/// length <= 64 (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginName(String);

impl PluginName {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValueError> {
        let trimmed = raw.into().trim().to_string();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= 64
            && !trimmed.contains("..")
            && !trimmed.contains('/')
            && !trimmed.contains('\\')
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(trimmed))
        } else {
            Err(ValueError::InvalidPluginName(trimmed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A content digest, e.g. `sha256:<hex>`. Stored and compared as a single
/// string per spec.md §4.1 ("Serialization is a single string").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValueError> {
        let trimmed = raw.into().trim().to_string();
        if trimmed.is_empty() {
            return Err(ValueError::Empty { what: "digest" });
        }
        Ok(Self(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unique identifier for one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_precedence_matches_spec() {
        assert!(Status::Fail > Status::Error);
        assert!(Status::Error > Status::Skipped);
        assert!(Status::Skipped > Status::Pass);
    }

    #[test]
    fn plugin_name_rejects_path_traversal() {
        assert!(PluginName::new("../etc/passwd").is_err());
        assert!(PluginName::new("a/b").is_err());
        assert!(PluginName::new("a".repeat(65)).is_err());
    }

    #[test]
    fn plugin_name_accepts_valid_chars() {
        assert!(PluginName::new("ssh-config_v2").is_ok());
    }

    #[test]
    fn severity_empty_is_unset() {
        assert_eq!(Severity::parse("").unwrap(), Severity::Unset);
        assert!(Severity::parse("").unwrap().is_unset());
    }

    #[test]
    fn severity_rejects_unknown_value() {
        assert!(Severity::parse("apocalyptic").is_err());
    }

    #[test]
    fn control_id_trims_whitespace() {
        assert_eq!(ControlId::new("  ssh-config  ").unwrap().as_str(), "ssh-config");
    }
}
