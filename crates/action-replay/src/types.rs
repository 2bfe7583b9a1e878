//! Replay options, per-step outcomes and run reports

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webtest_core_types::{StepId, StepKind};

/// Replay timing knobs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Hard deadline for click, type and assert
    pub action_timeout: Duration,

    /// Deadline for navigate steps
    pub navigate_timeout: Duration,

    /// Pause for a waitFor step whose value is absent or not a number
    pub default_wait: Duration,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(5),
            navigate_timeout: Duration::from_secs(30),
            default_wait: Duration::from_secs(1),
        }
    }
}

/// Replay engine state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayState {
    Idle,
    Running,
}

/// Result of executing one step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step_id: StepId,
    pub kind: StepKind,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StepOutcome {
    pub fn succeeded(step_id: StepId, kind: StepKind, elapsed: Duration) -> Self {
        Self {
            step_id,
            kind,
            success: true,
            error: None,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failed(step_id: StepId, kind: StepKind, elapsed: Duration, error: String) -> Self {
        Self {
            step_id,
            kind,
            success: false,
            error: Some(error),
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Report of a run that executed every step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub steps: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ReplayReport {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            steps: Vec::new(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    /// Set finish time and calculate duration
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.duration_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self
    }
}

impl Default for ReplayReport {
    fn default() -> Self {
        Self::new()
    }
}
