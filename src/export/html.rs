use std::fmt::Write as _;

use action_replay::best_selector;
use webtest_core_types::Step;

use super::{ExportError, ExportFormat, Exporter, ScriptDocument};

/// Self-contained HTML report, one table row per step.
pub struct HtmlExporter;

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#1f2933}\
table{border-collapse:collapse;width:100%}\
th,td{border:1px solid #d9e2ec;padding:.4rem .6rem;text-align:left;vertical-align:top}\
th{background:#f0f4f8}code{font-size:.9em}.muted{color:#829ab1}";

impl Exporter for HtmlExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Html
    }

    fn export(&self, document: &ScriptDocument) -> Result<String, ExportError> {
        let title = escape(&document.name);
        let mut out = String::new();
        let _ = write!(
            out,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
             <h1>{title}</h1>\n<p class=\"muted\">Base URL: {base} &middot; created {created} &middot; {count} steps</p>\n",
            base = escape(&document.base_url),
            created = document.created_at.to_rfc3339(),
            count = document.steps.len(),
        );
        out.push_str(
            "<table>\n<thead><tr><th>#</th><th>Type</th><th>Target</th><th>Value</th><th>Candidates</th></tr></thead>\n<tbody>\n",
        );
        for (index, step) in document.steps.iter().enumerate() {
            let _ = writeln!(
                out,
                "<tr id=\"step-{id}\"><td>{n}</td><td>{kind}</td><td>{target}</td><td>{value}</td><td>{candidates}</td></tr>",
                id = escape(step.id.as_str()),
                n = index + 1,
                kind = step.kind(),
                target = target_cell(step),
                value = escape(step.url().or(step.value()).unwrap_or_default()),
                candidates = step.candidates().len(),
            );
        }
        out.push_str("</tbody>\n</table>\n</body>\n</html>\n");
        Ok(out)
    }
}

fn target_cell(step: &Step) -> String {
    match step.target() {
        Some(info) => format!("<code>{}</code>", escape(best_selector(&info.candidates))),
        None => String::new(),
    }
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::login_script;

    #[test]
    fn report_escapes_user_content() {
        let html = HtmlExporter.export(&login_script()).unwrap();
        assert!(html.contains("<title>login &lt;flow&gt;</title>"));
        assert!(html.contains("done &lt;ok&gt;"));
        assert!(!html.contains("<flow>"));
        assert!(html.contains("<code>[data-testid=&quot;login-btn&quot;]</code>"));
        assert_eq!(html.matches("<tr id=\"step-").count(), 6);
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
