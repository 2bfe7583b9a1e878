//! [`AutomationSurface`] implementation over a CDP transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tokio::select;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::ids::PageId;
use crate::metrics;
use crate::registry::PageRegistry;
use crate::selector::{self, SelectorQuery};
use crate::surface::{AutomationSurface, RawElement};
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

const PROBE_INTERVAL: Duration = Duration::from_millis(100);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs with `this` bound to the hit node and returns a [`RawElement`] payload.
const DESCRIBE_NODE_FN: &str = r#"function() {
    const node = this;
    const el = node.nodeType === 1 ? node : null;
    const rect = el ? el.getBoundingClientRect() : null;
    const html = el ? el.outerHTML : '';
    return {
        nodeType: node.nodeType,
        tagName: el ? el.tagName : (node.nodeName || ''),
        outerHTML: html.length > 2000 ? html.slice(0, 2000) : html,
        attributes: el ? Array.from(el.attributes).map((attr) => [attr.name, attr.value]) : [],
        rect: rect ? { x: rect.x, y: rect.y, width: rect.width, height: rect.height } : null,
        textContent: node.textContent || '',
    };
}"#;

pub struct CdpAdapter {
    cfg: CdpConfig,
    transport: Arc<dyn CdpTransport>,
    registry: Arc<PageRegistry>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CdpAdapter {
    /// Builds an adapter over a Chromium transport, resolving the browser
    /// binary unless a websocket endpoint was configured.
    pub fn new(mut cfg: CdpConfig) -> Result<Self, AdapterError> {
        if cfg.websocket_url.is_none()
            && (cfg.executable.as_os_str().is_empty() || !cfg.executable.exists())
        {
            cfg.executable = crate::detect_chrome_executable().ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint("Chrome/Chromium executable not found")
                    .with_data(json!({
                        "remediation": "Install Chrome/Chromium or set WEBTEST_CHROME=/path/to/chrome"
                    }))
            })?;
        }
        info!(
            target: "cdp-adapter",
            executable = %cfg.executable.display(),
            headless = cfg.headless,
            "using chromium transport"
        );
        let transport = Arc::new(ChromiumTransport::new(cfg.clone()));
        Ok(Self::with_transport(cfg, transport))
    }

    pub fn with_transport(cfg: CdpConfig, transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            cfg,
            transport,
            registry: Arc::new(PageRegistry::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for `new` followed by `start`.
    pub async fn launch(cfg: CdpConfig) -> Result<Arc<Self>, AdapterError> {
        let adapter = Arc::new(Self::new(cfg)?);
        Arc::clone(&adapter).start().await?;
        Ok(adapter)
    }

    pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return Ok(());
        }
        self.transport.start().await?;
        tasks.push(tokio::spawn(Self::event_loop(Arc::clone(&self))));
        info!(target: "cdp-adapter", "adapter started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        while let Some(handle) = tasks.pop() {
            let _ = handle.await;
        }
    }

    pub fn registry(&self) -> Arc<PageRegistry> {
        Arc::clone(&self.registry)
    }

    fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }

    async fn event_loop(self: Arc<Self>) {
        const MIN_BACKOFF: Duration = Duration::from_millis(100);
        const MAX_BACKOFF: Duration = Duration::from_secs(5);
        let mut backoff = MIN_BACKOFF;

        loop {
            select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.next_event() => match event {
                    Some(event) => {
                        backoff = MIN_BACKOFF;
                        self.process_event(event);
                    }
                    None => {
                        if self.shutdown.is_cancelled() {
                            break;
                        }
                        let dropped = self.registry.len();
                        self.registry.clear();
                        warn!(target: "cdp-adapter", dropped, "transport stream ended; restarting");
                        if let Err(err) = self.transport.start().await {
                            warn!(target: "cdp-adapter", %err, "transport restart failed");
                        }
                        sleep(backoff).await;
                        backoff = (backoff + MIN_BACKOFF).min(MAX_BACKOFF);
                    }
                }
            }
        }
        debug!(target: "cdp-adapter", "event loop exiting");
    }

    fn process_event(&self, event: TransportEvent) {
        metrics::record_event();
        match event.method.as_str() {
            "Target.targetDestroyed" => {
                let target = event.params.get("targetId").and_then(Value::as_str);
                if let Some(page) = target.and_then(|id| self.registry.page_for_target(id)) {
                    self.registry.remove(&page);
                    info!(target: "cdp-adapter", %page, "page target destroyed");
                }
            }
            "Target.detachedFromTarget" => {
                let session = event.params.get("sessionId").and_then(Value::as_str);
                if let Some(page) = session.and_then(|id| self.registry.page_for_session(id)) {
                    self.registry.remove(&page);
                    info!(target: "cdp-adapter", %page, "page detached");
                }
            }
            "Inspector.targetCrashed" => {
                if let Some(page) = event
                    .session_id
                    .as_deref()
                    .and_then(|id| self.registry.page_for_session(id))
                {
                    self.registry.remove(&page);
                    warn!(target: "cdp-adapter", %page, "page crashed");
                }
            }
            "Page.frameNavigated" => {
                let frame = event.params.get("frame");
                let is_main = frame
                    .map(|frame| frame.get("parentId").is_none())
                    .unwrap_or(false);
                let url = frame.and_then(|frame| frame.get("url")).and_then(Value::as_str);
                let page = event
                    .session_id
                    .as_deref()
                    .and_then(|id| self.registry.page_for_session(id));
                if let (true, Some(url), Some(page)) = (is_main, url, page) {
                    debug!(target: "cdp-adapter", %page, url, "main frame navigated");
                    self.registry.set_recent_url(&page, url);
                }
            }
            _ => {}
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let started = Instant::now();
        let result = self
            .transport
            .send_command(target, method, params, deadline)
            .await;
        metrics::record_command(method, started.elapsed(), result.is_ok());
        result
    }

    async fn send_browser_command(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        self.send_command(CommandTarget::Browser, method, params, deadline)
            .await
    }

    async fn send_page_command(
        &self,
        page: PageId,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let target = self.registry.get(&page).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::PageClosed).with_hint(format!("page {page}"))
        })?;
        self.send_command(
            CommandTarget::Session(target.cdp_session),
            method,
            params,
            deadline,
        )
        .await
    }

    async fn evaluate_within(
        &self,
        page: PageId,
        expression: &str,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let response = self
            .send_page_command(
                page,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
                deadline,
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            return Err(AdapterError::internal("script raised an exception").with_data(details.clone()));
        }
        Ok(response
            .get("result")
            .and_then(|result| result.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn wait_for_dom_ready(&self, page: PageId, until: Instant) -> Result<(), AdapterError> {
        loop {
            let now = Instant::now();
            if now >= until {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint("document did not reach DOMContentLoaded"));
            }
            let remaining = (until - now).min(self.default_deadline());
            match self
                .evaluate_within(page, "document.readyState", remaining)
                .await
            {
                Ok(state) if matches!(state.as_str(), Some("interactive" | "complete")) => {
                    return Ok(())
                }
                Ok(_) => {}
                Err(err) if err.kind == AdapterErrorKind::PageClosed => return Err(err),
                // the execution context is replaced mid-navigation
                Err(err) => debug!(target: "cdp-adapter", %err, "readyState probe failed"),
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Re-evaluates a selector probe until it reports a terminal status or the
    /// timeout elapses.
    async fn probe(
        &self,
        page: PageId,
        action: &str,
        raw_selector: &str,
        expression: &str,
        timeout: Duration,
    ) -> Result<Value, AdapterError> {
        let started = Instant::now();
        let mut last_state = String::from("not-found");

        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(AdapterError::new(AdapterErrorKind::ActionTimeout)
                    .with_hint(format!(
                        "{action} '{raw_selector}' exceeded {}ms ({last_state})",
                        timeout.as_millis()
                    ))
                    .with_data(json!({ "selector": raw_selector, "lastState": last_state })));
            }

            match self
                .evaluate_within(page, expression, remaining.min(self.default_deadline()))
                .await
            {
                Ok(outcome) => {
                    let status = outcome
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    match status {
                        "ready" | "filled" | "visible" => return Ok(outcome),
                        "invalid" => {
                            let message = outcome
                                .get("message")
                                .and_then(Value::as_str)
                                .unwrap_or("selector rejected by the page");
                            return Err(AdapterError::new(AdapterErrorKind::InvalidSelector)
                                .with_hint(format!("'{raw_selector}': {message}")));
                        }
                        "not-editable" => {
                            return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                                .with_hint(format!("'{raw_selector}' is not an editable element")))
                        }
                        other => last_state = other.to_string(),
                    }
                }
                Err(err) if err.kind == AdapterErrorKind::PageClosed => return Err(err),
                Err(err) => {
                    debug!(target: "cdp-adapter", %err, action, "selector probe failed");
                    last_state = "evaluation-error".to_string();
                }
            }

            sleep(PROBE_INTERVAL.min(timeout.saturating_sub(started.elapsed()))).await;
        }
    }

    async fn dispatch_click(&self, page: PageId, x: f64, y: f64) -> Result<(), AdapterError> {
        let deadline = self.default_deadline();
        self.send_page_command(
            page,
            "Input.dispatchMouseEvent",
            json!({ "type": "mouseMoved", "x": x, "y": y }),
            deadline,
        )
        .await?;
        for phase in ["mousePressed", "mouseReleased"] {
            self.send_page_command(
                page,
                "Input.dispatchMouseEvent",
                json!({
                    "type": phase,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "buttons": 1,
                    "clickCount": 1,
                }),
                deadline,
            )
            .await?;
        }
        Ok(())
    }

    async fn setup_page(&self, page: PageId, deadline: Duration) -> Result<(), AdapterError> {
        for domain in ["Page.enable", "DOM.enable", "Runtime.enable"] {
            self.send_page_command(page, domain, json!({}), deadline)
                .await?;
        }
        self.send_page_command(
            page,
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": self.cfg.viewport.width,
                "height": self.cfg.viewport.height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
            deadline,
        )
        .await?;
        Ok(())
    }
}

const LOCATION_MISS: &str = "No node found at given location";

fn is_location_miss(err: &AdapterError) -> bool {
    err.kind == AdapterErrorKind::CdpIo
        && err
            .hint
            .as_deref()
            .is_some_and(|hint| hint.contains(LOCATION_MISS))
}

fn required_str<'a>(value: &'a Value, field: &str, method: &str) -> Result<&'a str, AdapterError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::internal(format!("{method} response missing {field}")))
}

#[async_trait]
impl AutomationSurface for CdpAdapter {
    async fn create_page(&self, url: &str, deadline: Duration) -> Result<PageId, AdapterError> {
        let created = self
            .send_browser_command(
                "Target.createTarget",
                json!({ "url": "about:blank" }),
                deadline,
            )
            .await?;
        let target_id = required_str(&created, "targetId", "Target.createTarget")?.to_string();

        let attached = self
            .send_browser_command(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                deadline,
            )
            .await?;
        let cdp_session = required_str(&attached, "sessionId", "Target.attachToTarget")?.to_string();

        let page = PageId::new();
        self.registry.insert(page, target_id, cdp_session);
        metrics::record_page_opened();

        let ready = async {
            self.setup_page(page, deadline).await?;
            if !url.is_empty() && url != "about:blank" {
                self.navigate(page, url, deadline).await?;
            }
            Ok::<(), AdapterError>(())
        };
        if let Err(err) = ready.await {
            warn!(target: "cdp-adapter", %page, %err, "page setup failed; closing");
            let _ = self.close_page(page).await;
            return Err(err);
        }

        info!(target: "cdp-adapter", %page, url, "page opened");
        Ok(page)
    }

    async fn close_page(&self, page: PageId) -> Result<(), AdapterError> {
        let Some(target) = self.registry.remove(&page) else {
            return Ok(());
        };
        if let Err(err) = self
            .send_browser_command(
                "Target.closeTarget",
                json!({ "targetId": target.target_id }),
                self.default_deadline(),
            )
            .await
        {
            warn!(target: "cdp-adapter", %page, %err, "closeTarget failed");
        }
        info!(target: "cdp-adapter", %page, "page closed");
        Ok(())
    }

    async fn navigate(
        &self,
        page: PageId,
        url: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let until = Instant::now() + deadline;
        let response = self
            .send_page_command(page, "Page.navigate", json!({ "url": url }), deadline)
            .await
            .map_err(|err| match err.kind {
                AdapterErrorKind::PageClosed => err,
                _ if err.retriable => AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint(format!("{url}: {}", err.hint.unwrap_or_default())),
                _ => AdapterError::new(AdapterErrorKind::NavFailed)
                    .with_hint(format!("{url}: {}", err.hint.unwrap_or_default())),
            })?;

        if let Some(reason) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(AdapterError::new(AdapterErrorKind::NavFailed)
                .with_hint(format!("{url}: {reason}")));
        }

        self.wait_for_dom_ready(page, until).await?;
        self.registry.set_recent_url(&page, url);
        debug!(target: "cdp-adapter", %page, url, "navigation complete");
        Ok(())
    }

    async fn current_url(&self, page: PageId) -> Result<String, AdapterError> {
        let outcome = self
            .evaluate_within(page, "location.href", self.default_deadline())
            .await;
        if let Ok(Value::String(href)) = outcome {
            return Ok(href);
        }
        if let Some(url) = self.registry.get(&page).and_then(|target| target.recent_url) {
            return Ok(url);
        }
        match outcome {
            Err(err) => Err(err),
            Ok(_) => Err(AdapterError::internal("page url unavailable")),
        }
    }

    async fn hit_test(
        &self,
        page: PageId,
        x: f64,
        y: f64,
    ) -> Result<Option<RawElement>, AdapterError> {
        let deadline = self.default_deadline();
        let located = match self
            .send_page_command(
                page,
                "DOM.getNodeForLocation",
                json!({
                    "x": x.round() as i64,
                    "y": y.round() as i64,
                    "includeUserAgentShadowDOM": false,
                    "ignorePointerEventsNone": true,
                }),
                deadline,
            )
            .await
        {
            Ok(located) => located,
            Err(err) if is_location_miss(&err) => {
                debug!(target: "cdp-adapter", %page, x, y, %err, "hit-test miss");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let Some(backend_node_id) = located.get("backendNodeId").and_then(Value::as_i64) else {
            return Ok(None);
        };

        let resolved = self
            .send_page_command(
                page,
                "DOM.resolveNode",
                json!({ "backendNodeId": backend_node_id }),
                deadline,
            )
            .await?;
        let object_id = resolved
            .get("object")
            .and_then(|object| object.get("objectId"))
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::internal("DOM.resolveNode returned no objectId"))?
            .to_string();

        let described = self
            .send_page_command(
                page,
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": DESCRIBE_NODE_FN,
                    "returnByValue": true,
                }),
                deadline,
            )
            .await;
        if let Err(err) = self
            .send_page_command(
                page,
                "Runtime.releaseObject",
                json!({ "objectId": object_id }),
                deadline,
            )
            .await
        {
            debug!(target: "cdp-adapter", %err, "releaseObject failed");
        }
        let described = described?;

        if let Some(details) = described.get("exceptionDetails") {
            return Err(AdapterError::internal("node description raised an exception")
                .with_data(details.clone()));
        }
        match described.get("result").and_then(|result| result.get("value")) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value::<RawElement>(value.clone())
                .map(Some)
                .map_err(|err| AdapterError::internal(format!("malformed node description: {err}"))),
        }
    }

    async fn count_matches(&self, page: PageId, selector: &str) -> Result<usize, AdapterError> {
        let query = SelectorQuery::parse(selector)?;
        let outcome = self
            .evaluate_within(
                page,
                &selector::count_expression(&query)?,
                self.default_deadline(),
            )
            .await?;
        match outcome.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(outcome.get("count").and_then(Value::as_u64).unwrap_or(0) as usize),
            Some("invalid") => Err(AdapterError::new(AdapterErrorKind::InvalidSelector)
                .with_hint(format!(
                    "'{selector}': {}",
                    outcome
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("rejected by the page")
                ))),
            _ => Err(AdapterError::internal(format!(
                "unexpected count result for '{selector}'"
            ))),
        }
    }

    async fn click(
        &self,
        page: PageId,
        selector: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let query = SelectorQuery::parse(selector)?;
        let point = self
            .probe(
                page,
                "click",
                selector,
                &selector::click_point_expression(&query)?,
                deadline,
            )
            .await?;
        let x = point.get("x").and_then(Value::as_f64).unwrap_or_default();
        let y = point.get("y").and_then(Value::as_f64).unwrap_or_default();
        self.dispatch_click(page, x, y).await
    }

    async fn fill(
        &self,
        page: PageId,
        selector: &str,
        value: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let query = SelectorQuery::parse(selector)?;
        self.probe(
            page,
            "fill",
            selector,
            &selector::fill_expression(&query, value)?,
            deadline,
        )
        .await
        .map(|_| ())
    }

    async fn wait_for_visible(
        &self,
        page: PageId,
        selector: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let query = SelectorQuery::parse(selector)?;
        self.probe(
            page,
            "wait",
            selector,
            &selector::visibility_expression(&query)?,
            deadline,
        )
        .await
        .map(|_| ())
    }

    async fn evaluate(&self, page: PageId, expression: &str) -> Result<Value, AdapterError> {
        self.evaluate_within(page, expression, self.default_deadline())
            .await
    }

    async fn add_init_script(&self, page: PageId, source: &str) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": source }),
            self.default_deadline(),
        )
        .await
        .map(|_| ())
    }

    async fn screenshot(&self, page: PageId) -> Result<Vec<u8>, AdapterError> {
        let response = self
            .send_page_command(
                page,
                "Page.captureScreenshot",
                json!({ "format": "png" }),
                self.default_deadline(),
            )
            .await?;
        let data = required_str(&response, "data", "Page.captureScreenshot")?;
        STANDARD
            .decode(data)
            .map_err(|err| AdapterError::internal(format!("screenshot decode failed: {err}")))
    }
}
