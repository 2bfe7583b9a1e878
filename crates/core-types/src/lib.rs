//! Shared primitives for the webtest recorder.
//!
//! Everything that crosses a crate boundary lives here: identifiers, the element snapshot and
//! selector candidate model, the step wire shape, the ordered step store and the raw capture
//! records drained from a page.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod capture;
pub mod element;
pub mod step;
pub mod store;

pub use capture::{CaptureKind, CapturedEvent, TargetIdentity};
pub use element::{
    BoundingBox, CandidateKind, ElementSnapshot, SelectorCandidate, SelectorInfo,
    UNIQUENESS_INVALID,
};
pub use step::{SelectorEdit, Step, StepAction, StepEdit, StepKind};
pub use store::StepStore;

/// Errors raised by step store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("step {0} already exists")]
    DuplicateStep(StepId),
    #[error("step {0} not found")]
    StepNotFound(StepId),
    #[error("position {position} is out of range for {len} steps")]
    PositionOutOfRange { position: usize, len: usize },
    #[error("invalid step edit: {0}")]
    InvalidEdit(String),
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
