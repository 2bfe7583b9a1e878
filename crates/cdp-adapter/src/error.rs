use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// High-level error categories surfaced by the automation surface.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterErrorKind {
    #[error("navigation timed out")]
    NavTimeout,
    #[error("navigation failed")]
    NavFailed,
    #[error("action timed out")]
    ActionTimeout,
    #[error("target element not found")]
    TargetNotFound,
    #[error("target element not visible")]
    NotVisible,
    #[error("invalid selector")]
    InvalidSelector,
    #[error("page closed")]
    PageClosed,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("internal error")]
    Internal,
}

/// Error metadata passed back to higher layers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: false,
            data: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn internal(hint: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Internal).with_hint(hint)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.kind,
            AdapterErrorKind::NavTimeout | AdapterErrorKind::ActionTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_hint() {
        let err = AdapterError::new(AdapterErrorKind::ActionTimeout)
            .with_hint("click '#go' exceeded 5000ms");
        assert_eq!(err.to_string(), "action timed out: click '#go' exceeded 5000ms");
        assert!(err.is_timeout());
    }
}
