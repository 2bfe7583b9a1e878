//! Step model and its JSON wire shape.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::{CandidateKind, SelectorCandidate, SelectorInfo};
use crate::{now_millis, CoreError, StepId};

/// Default `waitFor` duration in milliseconds.
pub const DEFAULT_WAIT_MS: &str = "1000";

/// One script instruction.
///
/// Serializes to `{id, type, timestamp, url?, value?, target?}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub timestamp: u64,
    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepAction {
    Navigate {
        url: String,
    },
    Click {
        #[serde(default)]
        target: SelectorInfo,
    },
    Type {
        #[serde(default)]
        target: SelectorInfo,
        #[serde(default)]
        value: String,
    },
    WaitFor {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<SelectorInfo>,
        #[serde(default)]
        value: String,
    },
    Assert {
        #[serde(default)]
        target: SelectorInfo,
    },
    Comment {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Navigate,
    Click,
    Type,
    WaitFor,
    Assert,
    Comment,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Navigate => "navigate",
            StepKind::Click => "click",
            StepKind::Type => "type",
            StepKind::WaitFor => "waitFor",
            StepKind::Assert => "assert",
            StepKind::Comment => "comment",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::Navigate { .. } => StepKind::Navigate,
            StepAction::Click { .. } => StepKind::Click,
            StepAction::Type { .. } => StepKind::Type,
            StepAction::WaitFor { .. } => StepKind::WaitFor,
            StepAction::Assert { .. } => StepKind::Assert,
            StepAction::Comment { .. } => StepKind::Comment,
        }
    }

    pub fn target(&self) -> Option<&SelectorInfo> {
        match self {
            StepAction::Click { target }
            | StepAction::Type { target, .. }
            | StepAction::Assert { target } => Some(target),
            StepAction::WaitFor { target, .. } => target.as_ref(),
            StepAction::Navigate { .. } | StepAction::Comment { .. } => None,
        }
    }

    fn target_mut(&mut self) -> Option<&mut SelectorInfo> {
        match self {
            StepAction::Click { target }
            | StepAction::Type { target, .. }
            | StepAction::Assert { target } => Some(target),
            StepAction::WaitFor { target, .. } => target.as_mut(),
            StepAction::Navigate { .. } | StepAction::Comment { .. } => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            StepAction::Type { value, .. } | StepAction::WaitFor { value, .. } => Some(value),
            StepAction::Comment { value } => value.as_deref(),
            _ => None,
        }
    }

    /// Re-shapes the payload for another kind, carrying over whatever still applies.
    fn into_kind(self, kind: StepKind) -> StepAction {
        if self.kind() == kind {
            return self;
        }
        let (url, target, value) = match self {
            StepAction::Navigate { url } => (Some(url), None, None),
            StepAction::Click { target } | StepAction::Assert { target } => {
                (None, Some(target), None)
            }
            StepAction::Type { target, value } => (None, Some(target), Some(value)),
            StepAction::WaitFor { target, value } => (None, target, Some(value)),
            StepAction::Comment { value } => (None, None, value),
        };
        match kind {
            StepKind::Navigate => StepAction::Navigate {
                url: url.unwrap_or_default(),
            },
            StepKind::Click => StepAction::Click {
                target: target.unwrap_or_default(),
            },
            StepKind::Type => StepAction::Type {
                target: target.unwrap_or_default(),
                value: value.unwrap_or_default(),
            },
            StepKind::WaitFor => StepAction::WaitFor {
                target,
                value: value
                    .filter(|v| v.trim().parse::<u64>().is_ok())
                    .unwrap_or_else(|| DEFAULT_WAIT_MS.to_string()),
            },
            StepKind::Assert => StepAction::Assert {
                target: target.unwrap_or_default(),
            },
            StepKind::Comment => StepAction::Comment { value },
        }
    }
}

impl Step {
    /// Creates a step stamped with a fresh id and the current time.
    pub fn new(action: StepAction) -> Self {
        Self {
            id: StepId::new(),
            timestamp: now_millis(),
            action,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(StepAction::Navigate { url: url.into() })
    }

    pub fn click(target: SelectorInfo) -> Self {
        Self::new(StepAction::Click { target })
    }

    pub fn type_text(target: SelectorInfo, value: impl Into<String>) -> Self {
        Self::new(StepAction::Type {
            target,
            value: value.into(),
        })
    }

    pub fn wait_for(duration_ms: u64) -> Self {
        Self::new(StepAction::WaitFor {
            target: None,
            value: duration_ms.to_string(),
        })
    }

    pub fn assert_visible(target: SelectorInfo) -> Self {
        Self::new(StepAction::Assert { target })
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(StepAction::Comment {
            value: Some(text.into()),
        })
    }

    pub fn with_id(mut self, id: impl Into<StepId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }

    pub fn target(&self) -> Option<&SelectorInfo> {
        self.action.target()
    }

    pub fn value(&self) -> Option<&str> {
        self.action.value()
    }

    pub fn url(&self) -> Option<&str> {
        match &self.action {
            StepAction::Navigate { url } => Some(url),
            _ => None,
        }
    }

    pub fn candidates(&self) -> &[SelectorCandidate] {
        self.target()
            .map(|info| info.candidates.as_slice())
            .unwrap_or(&[])
    }

    /// Applies a user edit in place. The id and timestamp never change.
    pub fn apply_edit(&mut self, edit: StepEdit) -> Result<(), CoreError> {
        if let Some(kind) = edit.kind {
            let action = std::mem::replace(
                &mut self.action,
                StepAction::Comment { value: None },
            );
            self.action = action.into_kind(kind);
        }

        if let Some(new_value) = edit.value {
            match &mut self.action {
                StepAction::Type { value, .. } => *value = new_value,
                StepAction::WaitFor { value, .. } => {
                    if new_value.trim().parse::<u64>().is_err() {
                        return Err(CoreError::InvalidEdit(format!(
                            "waitFor duration must be an integer, got '{new_value}'"
                        )));
                    }
                    *value = new_value.trim().to_string();
                }
                StepAction::Comment { value } => *value = Some(new_value),
                other => {
                    return Err(CoreError::InvalidEdit(format!(
                        "{} steps carry no value",
                        other.kind()
                    )))
                }
            }
        }

        if let Some(new_url) = edit.url {
            match &mut self.action {
                StepAction::Navigate { url } => *url = new_url,
                other => {
                    return Err(CoreError::InvalidEdit(format!(
                        "{} steps carry no url",
                        other.kind()
                    )))
                }
            }
        }

        if let Some(selector) = edit.selector {
            let kind = self.kind();
            let target = self.action.target_mut().ok_or_else(|| {
                CoreError::InvalidEdit(format!("{kind} steps carry no target"))
            })?;
            let len = target.candidates.len();
            if selector.index < len {
                target.candidates[selector.index].selector = selector.selector;
            } else if selector.index == len {
                // a hand-written selector is trusted to be unambiguous
                target.candidates.push(SelectorCandidate::new(
                    selector.selector,
                    CandidateKind::Css,
                    0,
                    1,
                ));
            } else {
                return Err(CoreError::InvalidEdit(format!(
                    "candidate index {} out of range ({len} candidates)",
                    selector.index
                )));
            }
        }

        Ok(())
    }
}

/// In-place modification requested by a user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEdit {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<StepKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<SelectorEdit>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectorEdit {
    #[serde(default)]
    pub index: usize,
    pub selector: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementSnapshot;
    use serde_json::json;

    fn target(selector: &str) -> SelectorInfo {
        SelectorInfo {
            element: ElementSnapshot {
                tag_name: "input".into(),
                ..Default::default()
            },
            candidates: vec![SelectorCandidate::new(selector, CandidateKind::Css, 10, 1)],
        }
    }

    #[test]
    fn serializes_flat_wire_shape() {
        let step = Step::type_text(target("#email"), "hi")
            .with_id("s1")
            .with_timestamp(42);
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["id"], "s1");
        assert_eq!(value["type"], "type");
        assert_eq!(value["timestamp"], 42);
        assert_eq!(value["value"], "hi");
        assert_eq!(value["target"]["candidates"][0]["selector"], "#email");
        assert!(value.get("url").is_none());
    }

    #[test]
    fn parses_wait_for_and_navigate() {
        let wait: Step = serde_json::from_value(json!({
            "id": "w", "type": "waitFor", "timestamp": 1, "value": "250"
        }))
        .unwrap();
        assert_eq!(wait.kind(), StepKind::WaitFor);
        assert_eq!(wait.value(), Some("250"));
        assert!(wait.target().is_none());

        let nav: Step = serde_json::from_value(json!({
            "id": "n", "type": "navigate", "timestamp": 2, "url": "https://example.com"
        }))
        .unwrap();
        assert_eq!(nav.url(), Some("https://example.com"));
    }

    #[test]
    fn click_without_target_parses_with_no_candidates() {
        let step: Step =
            serde_json::from_value(json!({"id": "c", "type": "click", "timestamp": 3})).unwrap();
        assert!(step.candidates().is_empty());
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = serde_json::from_value::<Step>(json!({
            "id": "x", "type": "hover", "timestamp": 1
        }));
        assert!(err.is_err());
    }

    #[test]
    fn edit_changes_kind_and_keeps_target() {
        let mut step = Step::click(target("#go"));
        step.apply_edit(StepEdit {
            kind: Some(StepKind::Type),
            value: Some("hello".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(step.kind(), StepKind::Type);
        assert_eq!(step.value(), Some("hello"));
        assert_eq!(step.candidates()[0].selector, "#go");
    }

    #[test]
    fn edit_rewrites_selector_text_in_place() {
        let mut step = Step::click(target("#go"));
        step.apply_edit(StepEdit {
            selector: Some(SelectorEdit {
                index: 0,
                selector: "#submit".into(),
            }),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(step.candidates()[0].selector, "#submit");
        assert_eq!(step.candidates()[0].score, 10);
    }

    #[test]
    fn edit_rejects_value_on_click() {
        let mut step = Step::click(target("#go"));
        let err = step
            .apply_edit(StepEdit {
                value: Some("x".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidEdit(_)));
    }

    #[test]
    fn converting_to_wait_for_defaults_duration() {
        let mut step = Step::comment("pause here");
        step.apply_edit(StepEdit {
            kind: Some(StepKind::WaitFor),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(step.value(), Some(DEFAULT_WAIT_MS));
    }
}
