//! Error handling module
//!
//! [`SessionError`] is what the session layer hands to the transport. It
//! knows its HTTP status and a stable machine-readable code.

use action_locator::LocatorError;
use action_recorder::RecorderError;
use action_replay::ReplayError;
use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;
use webtest_core_types::{CoreError, SessionId, Step, StepId};

#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown or already closed session
    #[error("Session not found")]
    NotFound(SessionId),

    /// The request conflicts with what the session is doing
    #[error("{0}")]
    Precondition(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A replay stopped on this step
    #[error("step {step_id} failed: {message}")]
    StepFailed {
        step_id: StepId,
        message: String,
        step: Box<Step>,
    },

    #[error("replay cancelled after {completed} steps")]
    Cancelled { completed: usize },

    #[error("page unavailable: {0}")]
    PageUnavailable(String),

    #[error(transparent)]
    Steps(#[from] CoreError),

    #[error("browser error: {0}")]
    Surface(AdapterError),

    #[error(transparent)]
    Recorder(RecorderError),
}

impl SessionError {
    pub fn precondition(message: impl Into<String>) -> Self {
        SessionError::Precondition(message.into())
    }

    /// Get HTTP status code
    pub fn http_status(&self) -> u16 {
        match self {
            SessionError::NotFound(_) => 404,
            SessionError::Precondition(_) => 409,
            SessionError::InvalidRequest(_) => 400,
            SessionError::StepFailed { .. } => 422,
            SessionError::Cancelled { .. } => 409,
            SessionError::PageUnavailable(_) => 410,
            SessionError::Steps(CoreError::StepNotFound(_)) => 404,
            SessionError::Steps(_) => 400,
            SessionError::Surface(err) if err.is_timeout() => 504,
            SessionError::Surface(_) => 502,
            SessionError::Recorder(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "session_not_found",
            SessionError::Precondition(_) => "precondition_failed",
            SessionError::InvalidRequest(_) => "invalid_request",
            SessionError::StepFailed { .. } => "step_failed",
            SessionError::Cancelled { .. } => "cancelled",
            SessionError::PageUnavailable(_) => "page_unavailable",
            SessionError::Steps(CoreError::StepNotFound(_)) => "step_not_found",
            SessionError::Steps(_) => "invalid_step",
            SessionError::Surface(_) => "browser_error",
            SessionError::Recorder(_) => "recorder_error",
        }
    }

    /// The offending step of a failed replay.
    pub fn failed_step(&self) -> Option<&Step> {
        match self {
            SessionError::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

impl From<AdapterError> for SessionError {
    fn from(err: AdapterError) -> Self {
        match err.kind {
            AdapterErrorKind::PageClosed => SessionError::PageUnavailable(err.to_string()),
            _ => SessionError::Surface(err),
        }
    }
}

impl From<LocatorError> for SessionError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::PageUnavailable(message) => SessionError::PageUnavailable(message),
            LocatorError::Surface(err) => SessionError::Surface(err),
        }
    }
}

impl From<RecorderError> for SessionError {
    fn from(err: RecorderError) -> Self {
        match err {
            RecorderError::PageUnavailable(message) => SessionError::PageUnavailable(message),
            RecorderError::Surface(err) => SessionError::Surface(err),
            RecorderError::Store(err) => SessionError::Steps(err),
            other => SessionError::Recorder(other),
        }
    }
}

impl From<ReplayError> for SessionError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::StepFailed {
                step_id,
                message,
                step,
                ..
            } => SessionError::StepFailed {
                step_id,
                message,
                step,
            },
            ReplayError::Cancelled { completed } => SessionError::Cancelled { completed },
            ReplayError::AlreadyRunning => {
                SessionError::precondition("a script is already running")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_the_transport_contract() {
        assert_eq!(SessionError::NotFound(SessionId::from("x")).http_status(), 404);
        assert_eq!(SessionError::NotFound(SessionId::from("x")).to_string(), "Session not found");
        assert_eq!(SessionError::precondition("recording").http_status(), 409);
        assert_eq!(
            SessionError::Steps(CoreError::StepNotFound(StepId::from("s"))).code(),
            "step_not_found"
        );
    }

    #[test]
    fn replay_failures_keep_the_step() {
        let step = Step::comment("boom").with_id("s-1");
        let err: SessionError = ReplayError::StepFailed {
            step_id: step.id.clone(),
            kind: step.kind(),
            message: "action timed out".into(),
            step: Box::new(step.clone()),
        }
        .into();
        assert_eq!(err.http_status(), 422);
        assert_eq!(err.failed_step(), Some(&step));
    }

    #[test]
    fn closed_pages_are_page_unavailable() {
        let err: SessionError = AdapterError::new(AdapterErrorKind::PageClosed).into();
        assert_eq!(err.code(), "page_unavailable");
        let err: SessionError = AdapterError::new(AdapterErrorKind::ActionTimeout).into();
        assert_eq!(err.http_status(), 504);
    }
}
