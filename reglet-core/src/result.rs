// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution result aggregate (spec.md §4.11, §3 "ExecutionResult").
//! `controls` accepts concurrent appends from worker tasks behind a single
//! mutex (spec.md §5 "ExecutionResult: internal mutex around append"), then
//! `finalize` sorts and summarizes once, after every task has joined.

use crate::{
    errors::ObservationError,
    ports::Evidence,
    profile::Control,
    retry::TransportErrorKind,
    value::{ControlId, ExecutionId, PluginName, Severity, Status},
};
use chrono::{DateTime, Utc};
use reglet_filtering::Value;
use std::{
    collections::BTreeSet,
    sync::Mutex,
    time::Duration,
};

/// The outcome of one `expect` entry (spec.md §3 "ExpectationResult").
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationResult {
    pub expression: String,
    pub passed: bool,
    pub message: Option<String>,
}

/// The outcome of one observation (spec.md §3 "ObservationResult").
#[derive(Debug, Clone)]
pub struct ObservationResult {
    pub plugin: PluginName,
    pub config: Value,
    pub status: Status,
    pub evidence: Option<Evidence>,
    pub expectations: Vec<ExpectationResult>,
    pub error: Option<ObservationError>,
    /// The transport failure kind, retained for retry classification
    /// (spec.md §4.8 "record raw_error for retry classification"). Not
    /// itself reported to the user.
    pub raw_error: Option<TransportErrorKind>,
    pub duration: Duration,
    /// Set when [`crate::ports::TruncationStrategy`] truncated the evidence
    /// payload for this observation.
    pub truncated: bool,
}

impl ObservationResult {
    pub fn new(plugin: PluginName, config: Value) -> Self {
        Self {
            plugin,
            config,
            status: Status::Skipped,
            evidence: None,
            expectations: Vec::new(),
            error: None,
            raw_error: None,
            duration: Duration::ZERO,
            truncated: false,
        }
    }
}

/// The outcome of one control (spec.md §3 "ControlResult").
#[derive(Debug, Clone)]
pub struct ControlResult {
    /// The control's position in the profile's definition order; used by
    /// [`ExecutionResult::finalize`] to restore deterministic ordering.
    pub index: usize,
    pub id: ControlId,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub tags: BTreeSet<String>,
    pub status: Status,
    pub message: String,
    pub skip_reason: Option<String>,
    pub observation_results: Vec<ObservationResult>,
    pub duration: Duration,
}

impl ControlResult {
    pub fn new(index: usize, id: ControlId) -> Self {
        Self {
            index,
            id,
            name: String::new(),
            description: String::new(),
            severity: Severity::Unset,
            tags: BTreeSet::new(),
            status: Status::Skipped,
            message: String::new(),
            skip_reason: None,
            observation_results: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Builds a skip pre-check result (spec.md §4.9 "Skip-pre-checks"),
    /// carrying `control`'s display fields the way a run that actually
    /// executed it would.
    pub fn skipped(index: usize, control: &Control, reason: impl Into<String>) -> Self {
        let mut result = Self::new(index, control.id.clone());
        result.name = control.name.clone();
        result.description = control.description.clone();
        result.severity = control.severity;
        result.tags = control.tags.clone();
        result.status = Status::Skipped;
        result.skip_reason = Some(reason.into());
        result.message = control_message(Status::Skipped, 0, None);
        result
    }
}

/// Per-status counts over a finished run (spec.md §4.11 "Compute summary").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_controls: usize,
    pub total_observations: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

/// The run-level aggregate root. `controls` is append-only during a run and
/// is read (sorted, summarized) only after finalization.
#[derive(Debug)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub profile_name: String,
    pub profile_version: String,
    pub engine_version: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    controls: Mutex<Vec<ControlResult>>,
    pub summary: Option<Summary>,
}

impl ExecutionResult {
    pub fn new(profile_name: String, profile_version: String, engine_version: String) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            profile_name,
            profile_version,
            engine_version,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            controls: Mutex::new(Vec::new()),
            summary: None,
        }
    }

    /// Appends one control's result. Safe to call concurrently from worker
    /// tasks (spec.md §5 "internal mutex around append").
    pub fn add_control_result(&self, result: ControlResult) {
        self.controls
            .lock()
            .expect("execution result lock poisoned")
            .push(result);
    }

    /// Looks up a control's status by id, used by dependency pre-checks
    /// (spec.md §4.9 "Skip-pre-checks").
    pub fn get_control_status(&self, id: &ControlId) -> Option<Status> {
        self.controls
            .lock()
            .expect("execution result lock poisoned")
            .iter()
            .find(|c| &c.id == id)
            .map(|c| c.status)
    }

    pub fn control_results(&self) -> Vec<ControlResult> {
        self.controls
            .lock()
            .expect("execution result lock poisoned")
            .clone()
    }

    /// Sorts by `index`, computes the summary, and sets `end_time`/
    /// `duration`. Idempotent only in the sense that the spec calls it
    /// exactly once per run; calling it twice re-derives from current state.
    pub fn finalize(&mut self) {
        let mut controls = self
            .controls
            .lock()
            .expect("execution result lock poisoned");
        controls.sort_by_key(|c| c.index);

        let mut summary = Summary {
            total_controls: controls.len(),
            ..Summary::default()
        };
        for control in controls.iter() {
            summary.total_observations += control.observation_results.len();
            match control.status {
                Status::Pass => summary.passed += 1,
                Status::Fail => summary.failed += 1,
                Status::Error => summary.errored += 1,
                Status::Skipped => summary.skipped += 1,
            }
        }
        drop(controls);

        self.summary = Some(summary);
        let end_time = Utc::now();
        self.end_time = Some(end_time);
        self.duration = (end_time - self.start_time).to_std().ok();
    }
}

/// Builds the human-readable status message for a control (spec.md §4.11
/// "Message generation"), given the count of observations and, for the
/// `error` case, the single errored observation's message if there was
/// exactly one.
pub fn control_message(status: Status, observation_count: usize, single_error: Option<&str>) -> String {
    match status {
        Status::Pass => {
            if observation_count <= 1 {
                "Check passed".to_string()
            } else {
                format!("All {observation_count} checks passed")
            }
        }
        Status::Fail => {
            if observation_count <= 1 {
                "1 check failed".to_string()
            } else {
                format!("{observation_count} checks failed")
            }
        }
        Status::Error => {
            if let Some(message) = single_error {
                message.to_string()
            } else if observation_count <= 1 {
                "Check encountered an error".to_string()
            } else {
                format!("{observation_count} checks encountered errors")
            }
        }
        Status::Skipped => "Skipped due to failed dependency".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_sorts_by_index_and_computes_summary() {
        let mut result = ExecutionResult::new("p".into(), "1.0".into(), "0.1.0".into());
        result.add_control_result(ControlResult {
            status: Status::Fail,
            ..ControlResult::new(2, ControlId::new("c").unwrap())
        });
        result.add_control_result(ControlResult {
            status: Status::Pass,
            ..ControlResult::new(0, ControlId::new("a").unwrap())
        });
        result.add_control_result(ControlResult {
            status: Status::Skipped,
            ..ControlResult::new(1, ControlId::new("b").unwrap())
        });

        result.finalize();

        let controls = result.control_results();
        assert_eq!(
            controls.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        let summary = result.summary.unwrap();
        assert_eq!(summary.total_controls, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert!(result.end_time.is_some());
    }

    #[test]
    fn skipped_carries_the_controls_display_fields() {
        let mut control = Control::new(ControlId::new("a").unwrap());
        control.name = "Some control".to_string();
        control.description = "does a thing".to_string();
        control.severity = Severity::High;
        control.tags = BTreeSet::from(["pci".to_string()]);

        let result = ControlResult::skipped(3, &control, "dependency `b` not found");

        assert_eq!(result.index, 3);
        assert_eq!(result.id, control.id);
        assert_eq!(result.name, "Some control");
        assert_eq!(result.description, "does a thing");
        assert_eq!(result.severity, Severity::High);
        assert_eq!(result.tags, BTreeSet::from(["pci".to_string()]));
        assert_eq!(result.status, Status::Skipped);
        assert_eq!(result.skip_reason.as_deref(), Some("dependency `b` not found"));
    }

    #[test]
    fn get_control_status_looks_up_by_id() {
        let result = ExecutionResult::new("p".into(), "1.0".into(), "0.1.0".into());
        result.add_control_result(ControlResult {
            status: Status::Fail,
            ..ControlResult::new(0, ControlId::new("a").unwrap())
        });
        assert_eq!(
            result.get_control_status(&ControlId::new("a").unwrap()),
            Some(Status::Fail)
        );
        assert_eq!(result.get_control_status(&ControlId::new("ghost").unwrap()), None);
    }

    #[test]
    fn message_uses_plural_phrasing_above_one_observation() {
        assert_eq!(control_message(Status::Pass, 1, None), "Check passed");
        assert_eq!(control_message(Status::Pass, 3, None), "All 3 checks passed");
        assert_eq!(control_message(Status::Fail, 1, None), "1 check failed");
        assert_eq!(control_message(Status::Fail, 2, None), "2 checks failed");
    }

    #[test]
    fn error_message_prefers_the_single_observation_message() {
        assert_eq!(
            control_message(Status::Error, 1, Some("boom")),
            "boom"
        );
        assert_eq!(
            control_message(Status::Error, 2, None),
            "2 checks encountered errors"
        );
    }
}
