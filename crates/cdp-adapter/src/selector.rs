//! Selector grammar and the in-page query engine.
//!
//! Besides plain CSS the surface understands `role=<role>[name="<name>"]`,
//! `text="<text>"` and XPath (`xpath=` prefix or a leading `/`).

use serde::Serialize;

use crate::error::{AdapterError, AdapterErrorKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SelectorQuery {
    Css { selector: String },
    Xpath { selector: String },
    Role { role: String, name: Option<String> },
    Text { text: String },
}

impl SelectorQuery {
    pub fn parse(raw: &str) -> Result<Self, AdapterError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AdapterError::new(AdapterErrorKind::InvalidSelector)
                .with_hint("empty selector"));
        }

        if let Some(rest) = trimmed.strip_prefix("role=") {
            return Self::parse_role(rest, raw);
        }

        if let Some(rest) = trimmed.strip_prefix("text=") {
            let text = rest
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(rest);
            return Ok(SelectorQuery::Text {
                text: text.to_string(),
            });
        }

        if let Some(rest) = trimmed.strip_prefix("xpath=") {
            return Ok(SelectorQuery::Xpath {
                selector: rest.to_string(),
            });
        }
        if trimmed.starts_with('/') || trimmed.starts_with("(/") {
            return Ok(SelectorQuery::Xpath {
                selector: trimmed.to_string(),
            });
        }

        Ok(SelectorQuery::Css {
            selector: trimmed.to_string(),
        })
    }

    fn parse_role(rest: &str, raw: &str) -> Result<Self, AdapterError> {
        let (role, filter) = match rest.find('[') {
            Some(idx) => (&rest[..idx], Some(&rest[idx..])),
            None => (rest, None),
        };
        let role = role.trim();
        if role.is_empty() {
            return Err(AdapterError::new(AdapterErrorKind::InvalidSelector)
                .with_hint(format!("missing role in '{raw}'")));
        }

        let name = match filter {
            None => None,
            Some(filter) => {
                let inner = filter
                    .strip_prefix("[name=\"")
                    .and_then(|value| value.strip_suffix("\"]"))
                    .ok_or_else(|| {
                        AdapterError::new(AdapterErrorKind::InvalidSelector)
                            .with_hint(format!("malformed role filter in '{raw}'"))
                    })?;
                Some(inner.to_string())
            }
        };

        Ok(SelectorQuery::Role {
            role: role.to_string(),
            name,
        })
    }

    fn literal(&self) -> Result<String, AdapterError> {
        serde_json::to_string(self).map_err(|err| AdapterError::internal(err.to_string()))
    }
}

/// `(query) => Element[]`, evaluated inside the page.
const QUERY_ENGINE: &str = r#"(query) => {
    const implicitRole = (el) => {
        const explicit = el.getAttribute('role');
        if (explicit) { return explicit; }
        switch (el.tagName.toLowerCase()) {
            case 'button': return 'button';
            case 'a': return 'link';
            case 'input': return 'textbox';
            case 'textarea': return 'textbox';
            case 'select': return 'combobox';
            default: return 'generic';
        }
    };
    const text = (el) => (el.textContent || '').trim();
    const accessibleName = (el) => text(el) || el.getAttribute('aria-label') || '';
    switch (query.kind) {
        case 'css':
            return Array.from(document.querySelectorAll(query.selector));
        case 'xpath': {
            const found = document.evaluate(query.selector, document, null,
                XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
            const out = [];
            for (let i = 0; i < found.snapshotLength; i++) {
                const node = found.snapshotItem(i);
                if (node && node.nodeType === 1) { out.push(node); }
            }
            return out;
        }
        case 'role':
            return Array.from(document.querySelectorAll('*')).filter((el) =>
                implicitRole(el) === query.role &&
                (query.name === null || accessibleName(el) === query.name));
        case 'text':
            return Array.from(document.querySelectorAll('body, body *')).filter((el) =>
                text(el) === query.text &&
                !Array.from(el.children).some((child) => text(child) === query.text));
        default:
            return [];
    }
}"#;

const VISIBLE_FN: &str = r#"(el) => {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    return rect.width > 0 && rect.height > 0 &&
        style.visibility !== 'hidden' && style.display !== 'none';
}"#;

fn wrap(query: &SelectorQuery, body: &str) -> Result<String, AdapterError> {
    Ok(format!(
        "(() => {{\n    const find = {engine};\n    const isVisible = {visible};\n    let matches;\n    try {{\n        matches = find({query});\n    }} catch (err) {{\n        return {{ status: 'invalid', message: String((err && err.message) || err) }};\n    }}\n{body}\n}})()",
        engine = QUERY_ENGINE,
        visible = VISIBLE_FN,
        query = query.literal()?,
        body = body,
    ))
}

/// Resolves to `{status: 'ok', count}` or `{status: 'invalid', message}`.
pub fn count_expression(query: &SelectorQuery) -> Result<String, AdapterError> {
    wrap(query, "    return { status: 'ok', count: matches.length };")
}

/// Scrolls the first match into view and reports its centre point.
pub fn click_point_expression(query: &SelectorQuery) -> Result<String, AdapterError> {
    wrap(
        query,
        r#"    const el = matches[0];
    if (!el) { return { status: 'not-found' }; }
    if (typeof el.scrollIntoView === 'function') {
        el.scrollIntoView({ block: 'center', inline: 'center' });
    }
    if (!isVisible(el)) { return { status: 'hidden' }; }
    const rect = el.getBoundingClientRect();
    return { status: 'ready', x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };"#,
    )
}

/// Sets the first match's value through the native setter and fires `input`/`change`.
pub fn fill_expression(query: &SelectorQuery, value: &str) -> Result<String, AdapterError> {
    let value_literal =
        serde_json::to_string(value).map_err(|err| AdapterError::internal(err.to_string()))?;
    wrap(
        query,
        &format!(
            r#"    const el = matches[0];
    if (!el) {{ return {{ status: 'not-found' }}; }}
    if (!isVisible(el)) {{ return {{ status: 'hidden' }}; }}
    const value = {value};
    if (typeof el.focus === 'function') {{ el.focus(); }}
    const tag = el.tagName.toLowerCase();
    if (tag === 'input' || tag === 'textarea' || tag === 'select') {{
        const proto = Object.getPrototypeOf(el);
        const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
        if (descriptor && descriptor.set) {{ descriptor.set.call(el, value); }} else {{ el.value = value; }}
    }} else if (el.isContentEditable) {{
        el.textContent = value;
    }} else {{
        return {{ status: 'not-editable' }};
    }}
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return {{ status: 'filled' }};"#,
            value = value_literal
        ),
    )
}

/// Reports whether the first match is visible.
pub fn visibility_expression(query: &SelectorQuery) -> Result<String, AdapterError> {
    wrap(
        query,
        r#"    const el = matches[0];
    if (!el) { return { status: 'not-found' }; }
    return { status: isVisible(el) ? 'visible' : 'hidden' };"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_role_with_name() {
        let query = SelectorQuery::parse("role=button[name=\"Log in\"]").unwrap();
        assert_eq!(
            query,
            SelectorQuery::Role {
                role: "button".into(),
                name: Some("Log in".into())
            }
        );
    }

    #[test]
    fn parses_text_and_css() {
        assert_eq!(
            SelectorQuery::parse("text=\"Sign up\"").unwrap(),
            SelectorQuery::Text {
                text: "Sign up".into()
            }
        );
        assert_eq!(
            SelectorQuery::parse("[data-testid=\"login-btn\"]").unwrap(),
            SelectorQuery::Css {
                selector: "[data-testid=\"login-btn\"]".into()
            }
        );
        assert!(matches!(
            SelectorQuery::parse("//div[@id='x']").unwrap(),
            SelectorQuery::Xpath { .. }
        ));
    }

    #[test]
    fn rejects_malformed_role_filter() {
        let err = SelectorQuery::parse("role=button[label=x]").unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::InvalidSelector);
        assert!(SelectorQuery::parse("   ").is_err());
    }

    #[test]
    fn expressions_embed_query_as_json() {
        let query = SelectorQuery::parse("#email").unwrap();
        let expr = fill_expression(&query, "a\"b").unwrap();
        assert!(expr.contains(r##"{"kind":"css","selector":"#email"}"##));
        assert!(expr.contains(r#""a\"b""#));
        assert!(count_expression(&query).unwrap().contains("count: matches.length"));
    }
}
