//! Raw interaction records drained from a page's capture buffer.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Click,
    Input,
}

/// Minimal identity of the event target at capture time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetIdentity {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One buffered click or (debounced) input event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub kind: CaptureKind,
    pub timestamp: u64,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub target: TargetIdentity,
}

impl CapturedEvent {
    pub fn click(timestamp: u64, x: f64, y: f64, target: TargetIdentity) -> Self {
        Self {
            kind: CaptureKind::Click,
            timestamp,
            x,
            y,
            value: None,
            target,
        }
    }

    pub fn input(
        timestamp: u64,
        x: f64,
        y: f64,
        value: impl Into<String>,
        target: TargetIdentity,
    ) -> Self {
        Self {
            kind: CaptureKind::Input,
            timestamp,
            x,
            y,
            value: Some(value.into()),
            target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_page_buffer_record() {
        let raw = json!({
            "kind": "input",
            "timestamp": 1700000000000u64,
            "x": 120.5,
            "y": 48,
            "value": "hello",
            "target": {"tagName": "input", "id": "email"}
        });
        let event: CapturedEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.kind, CaptureKind::Input);
        assert_eq!(event.value.as_deref(), Some("hello"));
        assert_eq!(event.target.id.as_deref(), Some("email"));
        assert_eq!(event.y, 48.0);
    }
}
