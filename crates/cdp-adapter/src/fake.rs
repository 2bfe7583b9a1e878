//! In-memory [`AutomationSurface`] for tests.
//!
//! Elements are placed at fixed viewport rectangles for hit-testing, selector
//! match counts come from a table, and every call is appended to a log. Each
//! page also keeps a capture buffer that answers the recorder's in-page module
//! once that module has been evaluated in the current document.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::{AdapterError, AdapterErrorKind};
use crate::ids::PageId;
use crate::surface::{AutomationSurface, RawElement};

/// PNG signature; enough for callers that only forward the bytes.
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Page global the recorder's capture module installs itself under.
pub const CAPTURE_GLOBAL: &str = "__webtestCapture";

#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceCall {
    CreatePage { url: String },
    ClosePage,
    Navigate { url: String, deadline: Duration },
    Click { selector: String, deadline: Duration },
    Fill { selector: String, value: String, deadline: Duration },
    WaitForVisible { selector: String, deadline: Duration },
    AddInitScript,
    Screenshot,
}

#[derive(Default)]
struct FakePage {
    url: String,
    init_scripts: Vec<String>,
    capture: Option<FakeCapture>,
}

struct FakeCapture {
    active: bool,
    records: Vec<Value>,
}

fn is_capture_install(source: &str) -> bool {
    source.contains(CAPTURE_GLOBAL) && source.contains("addEventListener")
}

impl FakePage {
    /// A new document only has the capture module if an init script installs it.
    fn load(&mut self, url: String) {
        self.url = url;
        self.capture = self
            .init_scripts
            .iter()
            .any(|source| is_capture_install(source))
            .then(|| FakeCapture {
                active: true,
                records: Vec::new(),
            });
    }

    fn answer_capture(&mut self, expression: &str) -> Option<Value> {
        if !expression.contains(CAPTURE_GLOBAL) {
            return None;
        }
        if is_capture_install(expression) {
            self.capture.get_or_insert_with(|| FakeCapture {
                active: true,
                records: Vec::new(),
            });
            return Some(Value::Bool(true));
        }
        let Some(capture) = self.capture.as_mut() else {
            return Some(if expression.contains(".drain()") {
                Value::Null
            } else {
                Value::Bool(false)
            });
        };
        if expression.contains(".drain()") {
            let events = std::mem::take(&mut capture.records);
            return Some(json!({ "events": events, "overflow": 0 }));
        }
        if expression.contains(".setActive(") {
            capture.active = expression.contains(".setActive(true)");
            return Some(Value::Bool(capture.active));
        }
        if expression.contains(".isActive()") {
            return Some(Value::Bool(capture.active));
        }
        None
    }
}

#[derive(Default)]
struct FakeState {
    pages: HashMap<PageId, FakePage>,
    calls: Vec<SurfaceCall>,
    elements: Vec<RawElement>,
    counts: HashMap<String, usize>,
    invalid: HashSet<String>,
    unreachable: HashSet<String>,
    failing_urls: HashSet<String>,
    sticky: Vec<(String, Value)>,
    queued: Vec<(String, VecDeque<Value>)>,
    evaluations: Vec<String>,
}

#[derive(Default)]
pub struct FakeSurface {
    state: Mutex<FakeState>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places an element for hit-testing; later placements sit on top.
    pub fn place(&self, element: RawElement) -> &Self {
        self.state.lock().elements.push(element);
        self
    }

    pub fn set_count(&self, selector: impl Into<String>, count: usize) -> &Self {
        self.state.lock().counts.insert(selector.into(), count);
        self
    }

    /// Count queries for this selector fail as malformed.
    pub fn reject_selector(&self, selector: impl Into<String>) -> &Self {
        self.state.lock().invalid.insert(selector.into());
        self
    }

    /// Actions against this selector wait out their deadline and time out.
    pub fn make_unreachable(&self, selector: impl Into<String>) -> &Self {
        self.state.lock().unreachable.insert(selector.into());
        self
    }

    pub fn fail_navigation(&self, url: impl Into<String>) -> &Self {
        self.state.lock().failing_urls.insert(url.into());
        self
    }

    /// Answers every evaluation containing `fragment` with `value`.
    pub fn set_evaluation(&self, fragment: impl Into<String>, value: Value) -> &Self {
        self.state.lock().sticky.push((fragment.into(), value));
        self
    }

    /// Answers the next evaluation containing `fragment` with `value`, ahead of
    /// any sticky answer.
    pub fn queue_evaluation(&self, fragment: impl Into<String>, value: Value) -> &Self {
        let fragment = fragment.into();
        let mut state = self.state.lock();
        match state.queued.iter_mut().find(|(known, _)| *known == fragment) {
            Some((_, values)) => values.push_back(value),
            None => state.queued.push((fragment, VecDeque::from([value]))),
        }
        self
    }

    /// Simulates the user moving the page somewhere without the surface's help.
    pub fn set_url(&self, page: PageId, url: impl Into<String>) {
        if let Some(entry) = self.state.lock().pages.get_mut(&page) {
            entry.load(url.into());
        }
    }

    /// Simulates a capture handler firing in the page. Returns whether the
    /// record was buffered, i.e. the module is installed and active.
    pub fn push_capture(&self, page: PageId, record: Value) -> bool {
        let mut state = self.state.lock();
        match state
            .pages
            .get_mut(&page)
            .and_then(|entry| entry.capture.as_mut())
        {
            Some(capture) if capture.active => {
                capture.records.push(record);
                true
            }
            _ => false,
        }
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.state.lock().calls.clone()
    }

    pub fn evaluations(&self) -> Vec<String> {
        self.state.lock().evaluations.clone()
    }

    pub fn init_scripts(&self, page: PageId) -> Vec<String> {
        self.state
            .lock()
            .pages
            .get(&page)
            .map(|entry| entry.init_scripts.clone())
            .unwrap_or_default()
    }

    pub fn open_pages(&self) -> usize {
        self.state.lock().pages.len()
    }

    fn page_closed(page: PageId) -> AdapterError {
        AdapterError::new(AdapterErrorKind::PageClosed).with_hint(format!("page {page}"))
    }

    fn ensure_page(&self, page: PageId) -> Result<(), AdapterError> {
        if self.state.lock().pages.contains_key(&page) {
            Ok(())
        } else {
            Err(Self::page_closed(page))
        }
    }

    /// Logs the call and reports whether the selector is unreachable.
    fn record_action(&self, page: PageId, call: SurfaceCall, selector: &str) -> Result<bool, AdapterError> {
        let mut state = self.state.lock();
        if !state.pages.contains_key(&page) {
            return Err(Self::page_closed(page));
        }
        state.calls.push(call);
        Ok(state.unreachable.contains(selector))
    }

    async fn time_out(action: &str, selector: &str, deadline: Duration) -> AdapterError {
        tokio::time::sleep(deadline).await;
        AdapterError::new(AdapterErrorKind::ActionTimeout).with_hint(format!(
            "{action} '{selector}' exceeded {}ms",
            deadline.as_millis()
        ))
    }
}

#[async_trait]
impl AutomationSurface for FakeSurface {
    async fn create_page(&self, url: &str, _deadline: Duration) -> Result<PageId, AdapterError> {
        let mut state = self.state.lock();
        state.calls.push(SurfaceCall::CreatePage {
            url: url.to_string(),
        });
        if state.failing_urls.contains(url) {
            return Err(AdapterError::new(AdapterErrorKind::NavFailed).with_hint(url.to_string()));
        }
        let page = PageId::new();
        state.pages.insert(
            page,
            FakePage {
                url: if url.is_empty() { "about:blank".into() } else { url.to_string() },
                ..FakePage::default()
            },
        );
        Ok(page)
    }

    async fn close_page(&self, page: PageId) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if state.pages.remove(&page).is_some() {
            state.calls.push(SurfaceCall::ClosePage);
        }
        Ok(())
    }

    async fn navigate(
        &self,
        page: PageId,
        url: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if !state.pages.contains_key(&page) {
            return Err(Self::page_closed(page));
        }
        state.calls.push(SurfaceCall::Navigate {
            url: url.to_string(),
            deadline,
        });
        if state.failing_urls.contains(url) {
            return Err(AdapterError::new(AdapterErrorKind::NavFailed).with_hint(url.to_string()));
        }
        if let Some(entry) = state.pages.get_mut(&page) {
            entry.load(url.to_string());
        }
        Ok(())
    }

    async fn current_url(&self, page: PageId) -> Result<String, AdapterError> {
        self.state
            .lock()
            .pages
            .get(&page)
            .map(|entry| entry.url.clone())
            .ok_or_else(|| Self::page_closed(page))
    }

    async fn hit_test(
        &self,
        page: PageId,
        x: f64,
        y: f64,
    ) -> Result<Option<RawElement>, AdapterError> {
        self.ensure_page(page)?;
        let state = self.state.lock();
        Ok(state
            .elements
            .iter()
            .rev()
            .find(|element| {
                element.rect.map_or(false, |rect| {
                    x >= rect.x && x <= rect.x + rect.width && y >= rect.y && y <= rect.y + rect.height
                })
            })
            .cloned())
    }

    async fn count_matches(&self, page: PageId, selector: &str) -> Result<usize, AdapterError> {
        self.ensure_page(page)?;
        let state = self.state.lock();
        if state.invalid.contains(selector) {
            return Err(AdapterError::new(AdapterErrorKind::InvalidSelector)
                .with_hint(format!("'{selector}' is not a valid selector")));
        }
        Ok(state.counts.get(selector).copied().unwrap_or(0))
    }

    async fn click(
        &self,
        page: PageId,
        selector: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let call = SurfaceCall::Click {
            selector: selector.to_string(),
            deadline,
        };
        if self.record_action(page, call, selector)? {
            return Err(Self::time_out("click", selector, deadline).await);
        }
        Ok(())
    }

    async fn fill(
        &self,
        page: PageId,
        selector: &str,
        value: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let call = SurfaceCall::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
            deadline,
        };
        if self.record_action(page, call, selector)? {
            return Err(Self::time_out("fill", selector, deadline).await);
        }
        Ok(())
    }

    async fn wait_for_visible(
        &self,
        page: PageId,
        selector: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let call = SurfaceCall::WaitForVisible {
            selector: selector.to_string(),
            deadline,
        };
        if self.record_action(page, call, selector)? {
            return Err(Self::time_out("wait", selector, deadline).await);
        }
        Ok(())
    }

    async fn evaluate(&self, page: PageId, expression: &str) -> Result<Value, AdapterError> {
        let mut state = self.state.lock();
        if !state.pages.contains_key(&page) {
            return Err(Self::page_closed(page));
        }
        state.evaluations.push(expression.to_string());

        let queued = state
            .queued
            .iter_mut()
            .find(|(fragment, values)| expression.contains(fragment.as_str()) && !values.is_empty())
            .and_then(|(_, values)| values.pop_front());
        if let Some(value) = queued {
            return Ok(value);
        }
        let sticky = state
            .sticky
            .iter()
            .rev()
            .find(|(fragment, _)| expression.contains(fragment.as_str()))
            .map(|(_, value)| value.clone());
        if let Some(value) = sticky {
            return Ok(value);
        }
        Ok(state
            .pages
            .get_mut(&page)
            .and_then(|entry| entry.answer_capture(expression))
            .unwrap_or(Value::Null))
    }

    async fn add_init_script(&self, page: PageId, source: &str) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        let entry = state.pages.get_mut(&page).ok_or_else(|| Self::page_closed(page))?;
        entry.init_scripts.push(source.to_string());
        state.calls.push(SurfaceCall::AddInitScript);
        Ok(())
    }

    async fn screenshot(&self, page: PageId) -> Result<Vec<u8>, AdapterError> {
        let mut state = self.state.lock();
        if !state.pages.contains_key(&page) {
            return Err(Self::page_closed(page));
        }
        state.calls.push(SurfaceCall::Screenshot);
        Ok(FAKE_PNG.to_vec())
    }
}
