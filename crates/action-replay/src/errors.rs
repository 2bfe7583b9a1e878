//! Replay error types

use thiserror::Error;
use webtest_core_types::{Step, StepId, StepKind};

/// Replay errors
#[derive(Debug, Error, Clone)]
pub enum ReplayError {
    /// A step failed; nothing after it ran
    #[error("step {step_id} ({kind}) failed: {message}")]
    StepFailed {
        step_id: StepId,
        kind: StepKind,
        message: String,
        step: Box<Step>,
    },

    /// The run was cancelled between steps
    #[error("replay cancelled after {completed} steps")]
    Cancelled { completed: usize },

    /// The engine is already replaying
    #[error("a replay is already running")]
    AlreadyRunning,
}

impl ReplayError {
    /// The step that failed, if the run stopped on one.
    pub fn failed_step(&self) -> Option<&Step> {
        match self {
            ReplayError::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}
