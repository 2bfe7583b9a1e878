//! Script export
//!
//! Exporters read a [`ScriptDocument`] and render it as text. They never
//! touch a live step store.

mod html;
mod json;
mod script;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use webtest_core_types::Step;

pub use html::HtmlExporter;
pub use json::JsonExporter;
pub use script::ScriptExporter;

use crate::session::Session;

/// The persisted form of a recorded script.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDocument {
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<Step>,
}

impl ScriptDocument {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            created_at: Utc::now(),
            steps,
        }
    }

    /// Snapshot of a session's steps.
    pub fn from_session(session: &Session, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| format!("session-{}", session.id()));
        Self::new(name, session.base_url(), session.steps())
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize script: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Html,
    /// Playwright test source
    Script,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Script => "text/javascript; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Html => "html",
            ExportFormat::Script => "spec.js",
        }
    }

    pub fn exporter(&self) -> Box<dyn Exporter> {
        match self {
            ExportFormat::Json => Box::new(JsonExporter),
            ExportFormat::Html => Box::new(HtmlExporter),
            ExportFormat::Script => Box::new(ScriptExporter::default()),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Json => "json",
            ExportFormat::Html => "html",
            ExportFormat::Script => "script",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "html" => Ok(ExportFormat::Html),
            "script" | "playwright" | "js" => Ok(ExportFormat::Script),
            other => Err(format!("unknown export format '{other}'")),
        }
    }
}

/// Renders a script document as text.
pub trait Exporter: Send + Sync {
    fn format(&self) -> ExportFormat;

    fn export(&self, document: &ScriptDocument) -> Result<String, ExportError>;
}

pub fn export(document: &ScriptDocument, format: ExportFormat) -> Result<String, ExportError> {
    format.exporter().export(document)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use webtest_core_types::{
        CandidateKind, ElementSnapshot, SelectorCandidate, SelectorInfo, Step,
    };

    use super::ScriptDocument;

    pub fn target(selector: &str, text: &str) -> SelectorInfo {
        SelectorInfo {
            element: ElementSnapshot {
                tag_name: "button".into(),
                text_content: text.into(),
                ..ElementSnapshot::default()
            },
            candidates: vec![
                SelectorCandidate::new("button.primary", CandidateKind::Css, 5, 3),
                SelectorCandidate::new(selector, CandidateKind::Testid, 40, 1),
            ],
        }
    }

    pub fn login_script() -> ScriptDocument {
        ScriptDocument::new(
            "login <flow>",
            "https://example.com",
            vec![
                Step::navigate("https://example.com/login").with_id("s1"),
                Step::type_text(target("#email", ""), "ada@example.com").with_id("s2"),
                Step::click(target("[data-testid=\"login-btn\"]", "Log in")).with_id("s3"),
                Step::wait_for(250).with_id("s4"),
                Step::assert_visible(target("text=\"Welcome\"", "Welcome")).with_id("s5"),
                Step::comment("done <ok>").with_id("s6"),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_leniently() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("playwright".parse::<ExportFormat>().unwrap(), ExportFormat::Script);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn every_format_has_an_exporter() {
        let document = fixtures::login_script();
        for format in [ExportFormat::Json, ExportFormat::Html, ExportFormat::Script] {
            let exporter = format.exporter();
            assert_eq!(exporter.format(), format);
            assert!(!export(&document, format).unwrap().is_empty());
        }
    }
}
