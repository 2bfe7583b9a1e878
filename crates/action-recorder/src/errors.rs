//! Recorder error types

use action_locator::LocatorError;
use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;
use webtest_core_types::CoreError;

/// Recorder errors
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The recorded page is gone
    #[error("page unavailable: {0}")]
    PageUnavailable(String),

    /// Automation surface failure while arming, draining or reading the URL
    #[error("automation surface error: {0}")]
    Surface(AdapterError),

    /// The page returned something that is not a capture batch
    #[error("malformed capture batch: {0}")]
    MalformedBatch(String),

    /// Appending to the step store failed
    #[error("step store rejected step: {0}")]
    Store(#[from] CoreError),
}

impl RecorderError {
    /// Whether the recording loop should give up
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecorderError::PageUnavailable(_))
    }
}

impl From<AdapterError> for RecorderError {
    fn from(err: AdapterError) -> Self {
        match err.kind {
            AdapterErrorKind::PageClosed => RecorderError::PageUnavailable(err.to_string()),
            _ => RecorderError::Surface(err),
        }
    }
}

impl From<LocatorError> for RecorderError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::PageUnavailable(message) => RecorderError::PageUnavailable(message),
            LocatorError::Surface(err) => RecorderError::Surface(err),
        }
    }
}
