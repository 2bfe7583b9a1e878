use std::sync::Arc;
use std::time::Duration;

use action_locator::SelectorSynthesizer;
use cdp_adapter::fake::FakeSurface;
use cdp_adapter::{AutomationSurface, PageId, RawElement, ELEMENT_NODE};
use webtest_core_types::{BoundingBox, CandidateKind, UNIQUENESS_INVALID};

fn element_at(tag: &str, attrs: &[(&str, &str)], text: &str) -> RawElement {
    RawElement {
        node_type: ELEMENT_NODE,
        tag_name: tag.to_uppercase(),
        outer_html: format!("<{tag}>{text}</{tag}>"),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        rect: Some(BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 50.0,
        }),
        text_content: text.to_string(),
    }
}

async fn surface_with(element: RawElement) -> (Arc<FakeSurface>, PageId) {
    let surface = Arc::new(FakeSurface::new());
    surface.place(element);
    let page = surface
        .create_page("https://example.com", Duration::from_secs(1))
        .await
        .expect("page");
    (surface, page)
}

#[tokio::test]
async fn testid_outranks_every_other_rule() {
    let (surface, page) = surface_with(element_at(
        "button",
        &[
            ("data-testid", "login-btn"),
            ("id", "login"),
            ("class", "btn primary"),
        ],
        "Log in",
    ))
    .await;
    surface.set_count("[data-testid=\"login-btn\"]", 1);

    let info = SelectorSynthesizer::new(surface.clone())
        .inspect(page, 20.0, 20.0)
        .await
        .unwrap()
        .expect("element");

    let top = &info.candidates[0];
    assert_eq!(top.selector, "[data-testid=\"login-btn\"]");
    assert_eq!(top.kind, CandidateKind::Testid);
    assert_eq!(top.score, 40);
    assert!(info.candidates[1..].iter().all(|c| c.score < 40));
    let kinds: Vec<CandidateKind> = info.candidates.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CandidateKind::Testid,
            CandidateKind::Role,
            CandidateKind::Text,
            CandidateKind::Css,
            CandidateKind::Css,
        ]
    );
}

#[tokio::test]
async fn generated_ids_score_five() {
    for id in ["item-20240101", "3fa85f64-5717-4562", "a1b2c3d4-e5f6"] {
        let (surface, page) = surface_with(element_at("div", &[("id", id)], "")).await;
        let info = SelectorSynthesizer::new(surface)
            .inspect(page, 5.0, 5.0)
            .await
            .unwrap()
            .expect("element");
        assert_eq!(info.candidates.len(), 1, "{id}");
        assert_eq!(info.candidates[0].score, 5, "{id}");
    }

    let (surface, page) = surface_with(element_at("div", &[("id", "sidebar")], "")).await;
    let info = SelectorSynthesizer::new(surface)
        .inspect(page, 5.0, 5.0)
        .await
        .unwrap()
        .expect("element");
    assert_eq!(info.candidates[0].score, 10);
}

#[tokio::test]
async fn long_text_gets_no_text_candidate() {
    let text = "This paragraph is deliberately longer than fifty chars.";
    let (surface, page) = surface_with(element_at("p", &[("class", "lead")], text)).await;
    let info = SelectorSynthesizer::new(surface)
        .inspect(page, 5.0, 5.0)
        .await
        .unwrap()
        .expect("element");
    assert!(info
        .candidates
        .iter()
        .all(|c| c.kind != CandidateKind::Text));
    assert_eq!(info.candidates[0].selector, "p.lead");
}

#[tokio::test]
async fn failed_uniqueness_queries_become_sentinels() {
    let (surface, page) = surface_with(element_at(
        "span",
        &[("id", "0bad"), ("class", "tag")],
        "Tag",
    ))
    .await;
    surface.reject_selector("#0bad").set_count("text=\"Tag\"", 1);

    let info = SelectorSynthesizer::new(surface)
        .inspect(page, 5.0, 5.0)
        .await
        .unwrap()
        .expect("element");
    let id = info
        .candidates
        .iter()
        .find(|c| c.selector == "#0bad")
        .expect("id candidate");
    assert_eq!(id.uniqueness, UNIQUENESS_INVALID);
    assert_eq!(info.candidates.len(), 3);
}

#[tokio::test]
async fn snapshot_is_normalized() {
    let mut raw = element_at("A", &[("href", "/home"), ("aria-label", "Home")], "   ");
    raw.outer_html = format!("<a href=\"/home\">{}</a>", "x".repeat(800));
    let (surface, page) = surface_with(raw).await;

    let info = SelectorSynthesizer::new(surface)
        .inspect(page, 5.0, 5.0)
        .await
        .unwrap()
        .expect("element");
    assert_eq!(info.element.tag_name, "a");
    assert_eq!(info.element.text_content, "");
    assert_eq!(info.element.outer_html.chars().count(), 500);
    assert_eq!(info.candidates[0].selector, "role=link[name=\"Home\"]");
    assert_eq!(info.candidates[0].uniqueness, 1);
}
