//! Element snapshots and selector candidates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Uniqueness value reported for a selector the document rejected as malformed.
pub const UNIQUENESS_INVALID: u32 = 999;

/// Layout box in viewport pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Point-in-time description of one DOM element.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub tag_name: String,
    #[serde(rename = "outerHTML")]
    pub outer_html: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub text_content: String,
}

impl ElementSnapshot {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Testid,
    Role,
    Text,
    Css,
    Xpath,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Testid => "testid",
            CandidateKind::Role => "role",
            CandidateKind::Text => "text",
            CandidateKind::Css => "css",
            CandidateKind::Xpath => "xpath",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub selector: String,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    pub score: u32,
    pub uniqueness: u32,
}

impl SelectorCandidate {
    pub fn new(selector: impl Into<String>, kind: CandidateKind, score: u32, uniqueness: u32) -> Self {
        Self {
            selector: selector.into(),
            kind,
            score,
            uniqueness,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.uniqueness == 1
    }

    pub fn is_invalid(&self) -> bool {
        self.uniqueness == UNIQUENESS_INVALID
    }
}

/// An element snapshot together with its ranked candidates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorInfo {
    pub element: ElementSnapshot,
    #[serde(default)]
    pub candidates: Vec<SelectorCandidate>,
}
