use std::fmt::Write as _;

use action_replay::best_selector;
use webtest_core_types::{Step, StepAction};

use super::{ExportError, ExportFormat, Exporter, ScriptDocument};

/// Generates a Playwright test. Each action uses the step's best selector,
/// picked the same way replay picks it.
pub struct ScriptExporter {
    pub action_timeout_ms: u64,
    /// Pause for waitFor steps without a numeric value
    pub default_wait_ms: u64,
}

impl Default for ScriptExporter {
    fn default() -> Self {
        Self {
            action_timeout_ms: 5_000,
            default_wait_ms: 1_000,
        }
    }
}

impl Exporter for ScriptExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Script
    }

    fn export(&self, document: &ScriptDocument) -> Result<String, ExportError> {
        let mut out = String::from("import { test, expect } from '@playwright/test';\n\n");
        let _ = writeln!(out, "test({}, async ({{ page }}) => {{", js(&document.name)?);

        let starts_with_navigation = matches!(
            document.steps.first().map(|step| &step.action),
            Some(StepAction::Navigate { .. })
        );
        if !starts_with_navigation && !document.base_url.is_empty() {
            let _ = writeln!(out, "  await page.goto({});", js(&document.base_url)?);
        }
        for step in &document.steps {
            out.push_str("  ");
            out.push_str(&self.statement(step)?);
            out.push('\n');
        }
        out.push_str("});\n");
        Ok(out)
    }
}

impl ScriptExporter {
    fn statement(&self, step: &Step) -> Result<String, ExportError> {
        let timeout = self.action_timeout_ms;
        let locator = |step: &Step| -> Result<String, ExportError> {
            let selector = step
                .target()
                .map(|info| best_selector(&info.candidates))
                .unwrap_or(action_replay::BODY_FALLBACK);
            Ok(format!("page.locator({})", js(selector)?))
        };
        Ok(match &step.action {
            StepAction::Navigate { url } => format!("await page.goto({});", js(url)?),
            StepAction::Click { .. } => {
                format!("await {}.click({{ timeout: {timeout} }});", locator(step)?)
            }
            StepAction::Type { value, .. } => format!(
                "await {}.fill({}, {{ timeout: {timeout} }});",
                locator(step)?,
                js(value)?
            ),
            StepAction::WaitFor { value, .. } => {
                let ms = value.trim().parse::<u64>().unwrap_or(self.default_wait_ms);
                format!("await page.waitForTimeout({ms});")
            }
            StepAction::Assert { .. } => format!(
                "await expect({}).toBeVisible({{ timeout: {timeout} }});",
                locator(step)?
            ),
            StepAction::Comment { value } => {
                let text = value.as_deref().unwrap_or_default();
                format!("// {}", text.replace(['\r', '\n'], " "))
            }
        })
    }
}

/// A JavaScript string literal.
fn js(value: &str) -> Result<String, ExportError> {
    Ok(serde_json::to_string(value)?)
}
