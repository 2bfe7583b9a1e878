#![allow(dead_code)]

use std::sync::Arc;

use cdp_adapter::fake::FakeSurface;
use cdp_adapter::{RawElement, ELEMENT_NODE};
use webtest_cli::{SessionRegistry, SessionSettings};
use webtest_core_types::{BoundingBox, CandidateKind, SelectorCandidate, SelectorInfo};

pub const LOGIN_BUTTON: &str = "[data-testid=\"login-btn\"]";

pub fn placed(tag: &str, attrs: &[(&str, &str)], rect: BoundingBox) -> RawElement {
    RawElement {
        node_type: ELEMENT_NODE,
        tag_name: tag.to_uppercase(),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        rect: Some(rect),
        ..RawElement::default()
    }
}

/// A login button at (0,0)-(120,40) and an email field at (0,100)-(200,130).
pub fn login_surface() -> Arc<FakeSurface> {
    let surface = Arc::new(FakeSurface::new());
    surface
        .place(placed(
            "button",
            &[("data-testid", "login-btn")],
            BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 120.0,
                height: 40.0,
            },
        ))
        .place(placed(
            "input",
            &[("id", "email")],
            BoundingBox {
                x: 0.0,
                y: 100.0,
                width: 200.0,
                height: 30.0,
            },
        ))
        .set_count(LOGIN_BUTTON, 1)
        .set_count("#email", 1);
    surface
}

pub fn registry(surface: &Arc<FakeSurface>) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(
        surface.clone(),
        SessionSettings::default(),
    ))
}

pub fn target(selector: &str) -> SelectorInfo {
    SelectorInfo {
        candidates: vec![SelectorCandidate::new(selector, CandidateKind::Css, 50, 1)],
        ..SelectorInfo::default()
    }
}
