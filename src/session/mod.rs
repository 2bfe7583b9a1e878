//! Sessions
//!
//! A [`Session`] binds one browser page to a step store, a recording loop and
//! a replay engine; [`SessionRegistry`] owns the live ones.

mod events;
mod registry;
#[allow(clippy::module_inception)]
mod session;
mod state;

use serde::Deserialize;
use webtest_core_types::{now_millis, Step, StepAction, StepId};

pub use events::SessionEvent;
pub use registry::SessionRegistry;
pub use session::{normalize_url, Session, SessionSettings, SessionSummary};
pub use state::SessionState;

/// A step as clients send it; id and timestamp are filled in when missing.
#[derive(Clone, Debug, Deserialize)]
pub struct StepDraft {
    #[serde(default)]
    pub id: Option<StepId>,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(flatten)]
    pub action: StepAction,
}

impl StepDraft {
    pub fn into_step(self) -> Step {
        Step {
            id: self.id.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_else(now_millis),
            action: self.action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webtest_core_types::StepKind;

    #[test]
    fn drafts_without_id_get_one() {
        let draft: StepDraft =
            serde_json::from_value(json!({"type": "navigate", "url": "https://example.com"}))
                .unwrap();
        let step = draft.into_step();
        assert_eq!(step.kind(), StepKind::Navigate);
        assert!(!step.id.as_str().is_empty());
        assert!(step.timestamp > 0);
    }

    #[test]
    fn drafts_keep_client_ids() {
        let draft: StepDraft = serde_json::from_value(json!({
            "id": "s-1", "timestamp": 5, "type": "waitFor", "value": "250"
        }))
        .unwrap();
        let step = draft.into_step();
        assert_eq!(step.id.as_str(), "s-1");
        assert_eq!(step.timestamp, 5);
        assert_eq!(step.value(), Some("250"));
    }
}
