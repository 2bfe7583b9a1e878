//! The automation surface every upper layer is written against.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use webtest_core_types::BoundingBox;

use crate::error::AdapterError;
use crate::ids::PageId;

/// DOM node type of an element.
pub const ELEMENT_NODE: u32 = 1;

/// Node found by a point hit-test, exactly as the page reported it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawElement {
    pub node_type: u32,
    #[serde(default)]
    pub tag_name: String,
    /// Serialized markup, possibly pre-truncated by the surface.
    #[serde(default, rename = "outerHTML")]
    pub outer_html: String,
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
    #[serde(default)]
    pub rect: Option<BoundingBox>,
    #[serde(default)]
    pub text_content: String,
}

impl RawElement {
    pub fn is_element(&self) -> bool {
        self.node_type == ELEMENT_NODE
    }
}

/// Minimal browser capability surface required by the recorder and replay layers.
///
/// Every method addresses one page; callers are responsible for serializing operations
/// against the same page.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    /// Opens a new page and, unless `url` is blank, loads it.
    async fn create_page(&self, url: &str, deadline: Duration) -> Result<PageId, AdapterError>;

    async fn close_page(&self, page: PageId) -> Result<(), AdapterError>;

    /// Loads `url` and waits until the document's initial load completes.
    async fn navigate(&self, page: PageId, url: &str, deadline: Duration)
        -> Result<(), AdapterError>;

    async fn current_url(&self, page: PageId) -> Result<String, AdapterError>;

    /// Topmost node physically at the viewport point, if any.
    async fn hit_test(&self, page: PageId, x: f64, y: f64)
        -> Result<Option<RawElement>, AdapterError>;

    /// Number of live-document matches. Malformed selectors fail with
    /// [`AdapterErrorKind::InvalidSelector`](crate::AdapterErrorKind::InvalidSelector).
    async fn count_matches(&self, page: PageId, selector: &str) -> Result<usize, AdapterError>;

    async fn click(&self, page: PageId, selector: &str, deadline: Duration)
        -> Result<(), AdapterError>;

    async fn fill(
        &self,
        page: PageId,
        selector: &str,
        value: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError>;

    async fn wait_for_visible(
        &self,
        page: PageId,
        selector: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError>;

    async fn evaluate(&self, page: PageId, expression: &str) -> Result<Value, AdapterError>;

    /// Registers a script that runs in every future document of the page.
    async fn add_init_script(&self, page: PageId, source: &str) -> Result<(), AdapterError>;

    /// PNG screenshot of the viewport.
    async fn screenshot(&self, page: PageId) -> Result<Vec<u8>, AdapterError>;
}
