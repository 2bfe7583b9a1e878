//! Error types for the locator

use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

/// Locator error enumeration
///
/// Resolution misses are not errors; they surface as `None`. These variants
/// only cover a surface that could not be asked at all.
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// The page behind the session is gone
    #[error("page unavailable: {0}")]
    PageUnavailable(String),

    /// Any other automation surface failure
    #[error("automation surface error: {0}")]
    Surface(AdapterError),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::PageUnavailable(_) => false,
            LocatorError::Surface(err) => err.retriable || err.is_timeout(),
        }
    }
}

impl From<AdapterError> for LocatorError {
    fn from(err: AdapterError) -> Self {
        match err.kind {
            AdapterErrorKind::PageClosed => {
                LocatorError::PageUnavailable(err.hint.unwrap_or_else(|| err.kind.to_string()))
            }
            _ => LocatorError::Surface(err),
        }
    }
}
