//! Element resolution from viewport coordinates

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{AutomationSurface, PageId, RawElement};
use tracing::debug;
use webtest_core_types::ElementSnapshot;

use crate::errors::LocatorError;
use crate::heuristics::{js_truncate, MARKUP_LIMIT};

/// Element resolver trait
#[async_trait]
pub trait ElementResolver: Send + Sync {
    /// Snapshot of the topmost element at `(x, y)`.
    ///
    /// Points outside the viewport, empty areas and non-element nodes all
    /// resolve to `None`.
    async fn resolve(
        &self,
        page: PageId,
        x: f64,
        y: f64,
    ) -> Result<Option<ElementSnapshot>, LocatorError>;
}

/// Resolver backed by the surface's hit-test
pub struct DefaultElementResolver {
    surface: Arc<dyn AutomationSurface>,
}

impl DefaultElementResolver {
    /// Create a new resolver over the given surface
    pub fn new(surface: Arc<dyn AutomationSurface>) -> Self {
        Self { surface }
    }
}

#[async_trait]
impl ElementResolver for DefaultElementResolver {
    async fn resolve(
        &self,
        page: PageId,
        x: f64,
        y: f64,
    ) -> Result<Option<ElementSnapshot>, LocatorError> {
        let Some(raw) = self.surface.hit_test(page, x, y).await? else {
            debug!(x, y, "no node at point");
            return Ok(None);
        };
        let snapshot = snapshot_from_raw(raw);
        if snapshot.is_none() {
            debug!(x, y, "hit-test landed on a non-element node");
        }
        Ok(snapshot)
    }
}

/// Normalize what the page reported into an [`ElementSnapshot`].
pub fn snapshot_from_raw(raw: RawElement) -> Option<ElementSnapshot> {
    if !raw.is_element() {
        return None;
    }
    let attributes: BTreeMap<String, String> = raw.attributes.into_iter().collect();
    Some(ElementSnapshot {
        tag_name: raw.tag_name.to_lowercase(),
        outer_html: js_truncate(raw.outer_html, MARKUP_LIMIT),
        attributes,
        bounding_box: raw.rect,
        text_content: raw.text_content.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::js_length;
    use cdp_adapter::fake::FakeSurface;
    use cdp_adapter::{AutomationSurface, ELEMENT_NODE};
    use std::time::Duration;
    use webtest_core_types::BoundingBox;

    fn button() -> RawElement {
        RawElement {
            node_type: ELEMENT_NODE,
            tag_name: "BUTTON".into(),
            outer_html: format!("<button>{}</button>", "x".repeat(600)),
            attributes: vec![
                ("class".into(), "btn".into()),
                ("data-testid".into(), "save".into()),
            ],
            rect: Some(BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 100.0,
                height: 40.0,
            }),
            text_content: "  Save \n".into(),
        }
    }

    #[test]
    fn normalizes_raw_elements() {
        let snapshot = snapshot_from_raw(button()).expect("element");
        assert_eq!(snapshot.tag_name, "button");
        assert_eq!(snapshot.text_content, "Save");
        assert_eq!(snapshot.outer_html.chars().count(), 500);
        assert_eq!(snapshot.attribute("data-testid"), Some("save"));
        assert_eq!(snapshot.bounding_box.map(|b| b.width), Some(100.0));
    }

    #[test]
    fn markup_is_cut_at_500_utf16_units() {
        let mut raw = button();
        raw.outer_html = format!("<button>{}</button>", "😀".repeat(300));
        let snapshot = snapshot_from_raw(raw).expect("element");
        assert_eq!(js_length(&snapshot.outer_html), 500);
        assert!(snapshot.outer_html.starts_with("<button>😀"));
    }

    #[test]
    fn text_nodes_are_not_elements() {
        let text = RawElement {
            node_type: 3,
            text_content: "hello".into(),
            ..RawElement::default()
        };
        assert!(snapshot_from_raw(text).is_none());
    }

    #[tokio::test]
    async fn resolves_through_the_surface() {
        let surface = Arc::new(FakeSurface::new());
        surface.place(button());
        let page = surface
            .create_page("about:blank", Duration::from_secs(1))
            .await
            .unwrap();
        let resolver = DefaultElementResolver::new(surface.clone());

        let hit = resolver.resolve(page, 50.0, 30.0).await.unwrap();
        assert_eq!(hit.map(|s| s.tag_name), Some("button".to_string()));

        let miss = resolver.resolve(page, 900.0, 900.0).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn closed_pages_are_unavailable() {
        let surface = Arc::new(FakeSurface::new());
        let page = surface
            .create_page("about:blank", Duration::from_secs(1))
            .await
            .unwrap();
        surface.close_page(page).await.unwrap();
        let resolver = DefaultElementResolver::new(surface);

        let err = resolver.resolve(page, 1.0, 1.0).await.unwrap_err();
        assert!(matches!(err, LocatorError::PageUnavailable(_)));
    }
}
