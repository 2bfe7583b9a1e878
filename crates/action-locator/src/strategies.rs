//! Candidate strategies
//!
//! Five rules in generation order:
//! 1. TestId - dedicated test attributes
//! 2. Role - explicit or implied ARIA role plus accessible name
//! 3. Text - exact visible text
//! 4. Id - `#id`, demoted when the id looks generated
//! 5. Class - `tag.class1.class2`
//!
//! Every applicable rule fires; ranking happens in the synthesizer.

use webtest_core_types::{CandidateKind, ElementSnapshot};

use crate::heuristics::{
    implied_role, is_dynamic_id, js_length, CLASS_SCORE, DYNAMIC_ID_SCORE, ID_SCORE,
    MAX_TEXT_SELECTOR_LEN, ROLE_BEARING_TAGS, ROLE_SCORE, TESTID_SCORE, TEST_ID_ATTRIBUTES,
    TEXT_SCORE,
};

/// How a proposal's uniqueness is established.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Uniqueness {
    /// Count matches in the live document.
    Verify,
    /// Taken as given without asking the document.
    Assumed(u32),
}

/// A selector a strategy would like to offer, before uniqueness is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub selector: String,
    pub kind: CandidateKind,
    pub score: u32,
    pub uniqueness: Uniqueness,
}

impl Proposal {
    fn verified(selector: String, kind: CandidateKind, score: u32) -> Self {
        Self {
            selector,
            kind,
            score,
            uniqueness: Uniqueness::Verify,
        }
    }
}

/// Strategy trait for candidate generation
pub trait CandidateStrategy: Send + Sync {
    /// Proposals for the snapshot, in the order they should be ranked on ties.
    fn propose(&self, snapshot: &ElementSnapshot) -> Vec<Proposal>;

    /// Get strategy name
    fn name(&self) -> &'static str;
}

/// Non-empty attribute value; the page treats an empty value as absent.
fn present<'a>(snapshot: &'a ElementSnapshot, name: &str) -> Option<&'a str> {
    snapshot.attribute(name).filter(|value| !value.is_empty())
}

/// `[data-testid="…"]` and friends
pub struct TestIdStrategy;

impl CandidateStrategy for TestIdStrategy {
    fn propose(&self, snapshot: &ElementSnapshot) -> Vec<Proposal> {
        TEST_ID_ATTRIBUTES
            .iter()
            .filter_map(|attr| {
                present(snapshot, attr).map(|value| {
                    Proposal::verified(
                        format!("[{attr}=\"{value}\"]"),
                        CandidateKind::Testid,
                        TESTID_SCORE,
                    )
                })
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "testid"
    }
}

/// `role=<role>[name="<name>"]`
///
/// Its uniqueness is never checked against the document and is reported as 1.
pub struct RoleStrategy;

impl CandidateStrategy for RoleStrategy {
    fn propose(&self, snapshot: &ElementSnapshot) -> Vec<Proposal> {
        let explicit = present(snapshot, "role");
        if explicit.is_none() && !ROLE_BEARING_TAGS.contains(&snapshot.tag_name.as_str()) {
            return Vec::new();
        }
        let role = explicit.unwrap_or_else(|| implied_role(&snapshot.tag_name));

        let name = if snapshot.text_content.is_empty() {
            present(snapshot, "aria-label")
        } else {
            Some(snapshot.text_content.as_str())
        };
        match name {
            Some(name) => vec![Proposal {
                selector: format!("role={role}[name=\"{name}\"]"),
                kind: CandidateKind::Role,
                score: ROLE_SCORE,
                uniqueness: Uniqueness::Assumed(1),
            }],
            None => Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "role"
    }
}

/// `text="<text>"` for short visible text
pub struct TextStrategy;

impl CandidateStrategy for TextStrategy {
    fn propose(&self, snapshot: &ElementSnapshot) -> Vec<Proposal> {
        let text = snapshot.text_content.as_str();
        if text.is_empty() || js_length(text) >= MAX_TEXT_SELECTOR_LEN {
            return Vec::new();
        }
        vec![Proposal::verified(
            format!("text=\"{text}\""),
            CandidateKind::Text,
            TEXT_SCORE,
        )]
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// `#id`
pub struct IdStrategy;

impl CandidateStrategy for IdStrategy {
    fn propose(&self, snapshot: &ElementSnapshot) -> Vec<Proposal> {
        let Some(id) = present(snapshot, "id") else {
            return Vec::new();
        };
        let score = if is_dynamic_id(id) {
            DYNAMIC_ID_SCORE
        } else {
            ID_SCORE
        };
        vec![Proposal::verified(format!("#{id}"), CandidateKind::Css, score)]
    }

    fn name(&self) -> &'static str {
        "id"
    }
}

/// `tag.class1.class2`, classes in attribute order
pub struct ClassStrategy;

impl CandidateStrategy for ClassStrategy {
    fn propose(&self, snapshot: &ElementSnapshot) -> Vec<Proposal> {
        let Some(class) = present(snapshot, "class") else {
            return Vec::new();
        };
        let classes: Vec<&str> = class.split(' ').filter(|token| !token.is_empty()).collect();
        if classes.is_empty() {
            return Vec::new();
        }
        vec![Proposal::verified(
            format!("{}.{}", snapshot.tag_name, classes.join(".")),
            CandidateKind::Css,
            CLASS_SCORE,
        )]
    }

    fn name(&self) -> &'static str {
        "class"
    }
}

/// The rule set in generation order.
pub fn default_strategies() -> Vec<Box<dyn CandidateStrategy>> {
    vec![
        Box::new(TestIdStrategy),
        Box::new(RoleStrategy),
        Box::new(TextStrategy),
        Box::new(IdStrategy),
        Box::new(ClassStrategy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot(tag: &str, attrs: &[(&str, &str)], text: &str) -> ElementSnapshot {
        ElementSnapshot {
            tag_name: tag.into(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            text_content: text.into(),
            ..ElementSnapshot::default()
        }
    }

    #[test]
    fn testid_rule_covers_all_three_attributes_in_order() {
        let snap = snapshot(
            "div",
            &[("data-test", "c"), ("data-qa", "b"), ("data-testid", "a")],
            "",
        );
        let selectors: Vec<String> = TestIdStrategy
            .propose(&snap)
            .into_iter()
            .map(|p| p.selector)
            .collect();
        assert_eq!(
            selectors,
            vec!["[data-testid=\"a\"]", "[data-qa=\"b\"]", "[data-test=\"c\"]"]
        );
    }

    #[test]
    fn role_rule_uses_text_then_aria_label() {
        let by_text = RoleStrategy.propose(&snapshot("button", &[], "Save"));
        assert_eq!(by_text[0].selector, "role=button[name=\"Save\"]");
        assert_eq!(by_text[0].uniqueness, Uniqueness::Assumed(1));

        let by_label = RoleStrategy.propose(&snapshot("a", &[("aria-label", "Home")], ""));
        assert_eq!(by_label[0].selector, "role=link[name=\"Home\"]");

        let explicit = RoleStrategy.propose(&snapshot("div", &[("role", "tab")], "Inbox"));
        assert_eq!(explicit[0].selector, "role=tab[name=\"Inbox\"]");

        assert!(RoleStrategy.propose(&snapshot("input", &[], "")).is_empty());
        assert!(RoleStrategy.propose(&snapshot("span", &[], "Save")).is_empty());
        // textarea implies a role but is not a role-bearing tag on its own
        assert!(RoleStrategy.propose(&snapshot("textarea", &[], "x")).is_empty());
    }

    #[test]
    fn text_rule_stops_at_fifty() {
        assert_eq!(TextStrategy.propose(&snapshot("p", &[], &"a".repeat(49))).len(), 1);
        assert!(TextStrategy.propose(&snapshot("p", &[], &"a".repeat(50))).is_empty());
        assert!(TextStrategy.propose(&snapshot("p", &[], "")).is_empty());
    }

    #[test]
    fn id_rule_demotes_generated_ids() {
        assert_eq!(IdStrategy.propose(&snapshot("div", &[("id", "main")], ""))[0].score, 10);
        assert_eq!(IdStrategy.propose(&snapshot("div", &[("id", "el-98231")], ""))[0].score, 5);
    }

    #[test]
    fn class_rule_keeps_attribute_order() {
        let proposals = ClassStrategy.propose(&snapshot("button", &[("class", " btn  primary ")], ""));
        assert_eq!(proposals[0].selector, "button.btn.primary");
        assert!(ClassStrategy.propose(&snapshot("div", &[("class", "   ")], "")).is_empty());
    }
}
