//! Interaction capture
//!
//! Two capture sources feed the poller. [`PageCapture`] installs a small
//! module into every document of the recorded page and drains its queue
//! through the surface; [`EventCapture`] is the same state machine held on the
//! host, fed by input forwarded from a remote live view.
//!
//! Both keep a bounded queue (oldest record dropped when full), a single
//! debounce slot shared by every text field, and an active flag that turns the
//! handlers into no-ops without removing them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{AutomationSurface, PageId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use webtest_core_types::{now_millis, CapturedEvent, TargetIdentity};

use crate::errors::RecorderError;

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_CAPACITY: usize = 1000;

/// Longest text kept in a target identity.
const IDENTITY_TEXT_LIMIT: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub debounce_ms: u64,
    pub capacity: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Result of one atomic read-and-clear.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DrainBatch {
    #[serde(default)]
    pub events: Vec<CapturedEvent>,
    /// Records discarded since the previous drain because the queue was full.
    #[serde(default)]
    pub overflow: u64,
}

impl DrainBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.overflow == 0
    }
}

/// Anything the poller can arm, disarm and drain.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Start recording. Safe to call on an already armed source.
    async fn arm(&self) -> Result<(), RecorderError>;

    /// Stop recording without uninstalling anything.
    async fn disarm(&self) -> Result<(), RecorderError>;

    /// Atomically take every buffered record.
    async fn drain(&self) -> Result<DrainBatch, RecorderError>;

    fn name(&self) -> &'static str;
}

const CAPTURE_TEMPLATE: &str = r#"(() => {
  if (window.__webtestCapture) {
    return true;
  }
  const CAPACITY = __CAPACITY__;
  const DEBOUNCE_MS = __DEBOUNCE_MS__;
  const TEXT_LIMIT = __TEXT_LIMIT__;
  const queue = [];
  let overflow = 0;
  let active = true;
  let pending = null;

  const push = (record) => {
    if (queue.length >= CAPACITY) {
      queue.shift();
      overflow += 1;
    }
    queue.push(record);
  };
  const identity = (el) => {
    if (!(el instanceof Element)) {
      return { tagName: '' };
    }
    const text = (el.textContent || '').trim().slice(0, TEXT_LIMIT);
    return {
      tagName: el.tagName.toLowerCase(),
      id: el.id || undefined,
      className: typeof el.className === 'string' && el.className ? el.className : undefined,
      text: text || undefined,
    };
  };

  document.addEventListener('click', (event) => {
    if (!active) {
      return;
    }
    push({
      kind: 'click',
      timestamp: Date.now(),
      x: event.clientX,
      y: event.clientY,
      target: identity(event.target),
    });
  }, true);

  document.addEventListener('input', (event) => {
    if (!active) {
      return;
    }
    const field = event.target;
    if (!(field instanceof HTMLInputElement || field instanceof HTMLTextAreaElement)) {
      return;
    }
    if (pending !== null) {
      clearTimeout(pending);
    }
    pending = setTimeout(() => {
      pending = null;
      if (!active) {
        return;
      }
      const rect = field.getBoundingClientRect();
      push({
        kind: 'input',
        timestamp: Date.now(),
        x: rect.left + rect.width / 2,
        y: rect.top + rect.height / 2,
        value: field.value,
        target: identity(field),
      });
    }, DEBOUNCE_MS);
  }, true);

  Object.defineProperty(window, '__webtestCapture', {
    value: Object.freeze({
      drain: () => {
        const events = queue.splice(0, queue.length);
        const dropped = overflow;
        overflow = 0;
        return { events, overflow: dropped };
      },
      setActive: (flag) => {
        active = !!flag;
        return active;
      },
      isActive: () => active,
    }),
    configurable: false,
    enumerable: false,
  });
  return true;
})()"#;

/// In-page capture module rendered for `options`.
///
/// Installs once per document; evaluating it again is a no-op.
pub fn capture_script(options: &CaptureOptions) -> String {
    CAPTURE_TEMPLATE
        .replace("__CAPACITY__", &options.capacity.max(1).to_string())
        .replace("__DEBOUNCE_MS__", &options.debounce_ms.to_string())
        .replace("__TEXT_LIMIT__", &IDENTITY_TEXT_LIMIT.to_string())
}

pub const DRAIN_EXPRESSION: &str =
    "window.__webtestCapture ? window.__webtestCapture.drain() : null";

pub fn set_active_expression(active: bool) -> String {
    format!("window.__webtestCapture ? window.__webtestCapture.setActive({active}) : false")
}

/// Parses what [`DRAIN_EXPRESSION`] returned.
///
/// `null` means the module is not installed in the current document, which
/// happens between a navigation and the init script running. Records that do
/// not parse are skipped.
pub fn parse_batch(value: Value) -> Result<DrainBatch, RecorderError> {
    let mut fields = match value {
        Value::Object(fields) => fields,
        Value::Null => return Ok(DrainBatch::default()),
        other => {
            return Err(RecorderError::MalformedBatch(format!(
                "expected an object, got {other}"
            )))
        }
    };
    let overflow = fields
        .get("overflow")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    let raw_events = match fields.remove("events") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(RecorderError::MalformedBatch(format!(
                "events is not an array: {other}"
            )))
        }
    };
    let mut events = Vec::with_capacity(raw_events.len());
    for raw in raw_events {
        match serde_json::from_value::<CapturedEvent>(raw) {
            Ok(event) => events.push(event),
            Err(err) => warn!(target: "recorder", error = %err, "skipping malformed capture record"),
        }
    }
    Ok(DrainBatch { events, overflow })
}

/// Capture installed into the recorded page.
pub struct PageCapture {
    surface: Arc<dyn AutomationSurface>,
    page: PageId,
    script: String,
    hooked: AtomicBool,
}

impl PageCapture {
    pub fn new(surface: Arc<dyn AutomationSurface>, page: PageId, options: &CaptureOptions) -> Self {
        Self {
            surface,
            page,
            script: capture_script(options),
            hooked: AtomicBool::new(false),
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}

#[async_trait]
impl CaptureSource for PageCapture {
    async fn arm(&self) -> Result<(), RecorderError> {
        // future documents pick the module up from the init script
        if !self.hooked.load(Ordering::Acquire) {
            self.surface.add_init_script(self.page, &self.script).await?;
            self.hooked.store(true, Ordering::Release);
        }
        self.surface.evaluate(self.page, &self.script).await?;
        self.surface
            .evaluate(self.page, &set_active_expression(true))
            .await?;
        debug!(target: "recorder", page = %self.page, "page capture armed");
        Ok(())
    }

    async fn disarm(&self) -> Result<(), RecorderError> {
        self.surface
            .evaluate(self.page, &set_active_expression(false))
            .await?;
        debug!(target: "recorder", page = %self.page, "page capture disarmed");
        Ok(())
    }

    async fn drain(&self) -> Result<DrainBatch, RecorderError> {
        let value = self.surface.evaluate(self.page, DRAIN_EXPRESSION).await?;
        parse_batch(value)
    }

    fn name(&self) -> &'static str {
        "page"
    }
}

#[derive(Default)]
struct CaptureBuffer {
    queue: VecDeque<CapturedEvent>,
    overflow: u64,
    active: bool,
}

impl CaptureBuffer {
    fn push(&mut self, event: CapturedEvent, capacity: usize) {
        if self.queue.len() >= capacity {
            self.queue.pop_front();
            self.overflow += 1;
        }
        self.queue.push_back(event);
    }
}

/// Host-side capture state machine.
///
/// Inputs are debounced through one cancelable task: each call replaces the
/// pending one, so a burst of keystrokes yields one record with the final
/// value. Debounced records need a running tokio runtime.
pub struct EventCapture {
    options: CaptureOptions,
    buffer: Arc<Mutex<CaptureBuffer>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl EventCapture {
    pub fn new(options: CaptureOptions) -> Self {
        Self {
            options,
            buffer: Arc::new(Mutex::new(CaptureBuffer::default())),
            pending: Mutex::new(None),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.buffer.lock().active = active;
    }

    pub fn is_active(&self) -> bool {
        self.buffer.lock().active
    }

    /// Buffers a click; returns whether it was recorded.
    pub fn record_click(&self, x: f64, y: f64, target: TargetIdentity) -> bool {
        let mut buffer = self.buffer.lock();
        if !buffer.active {
            return false;
        }
        buffer.push(
            CapturedEvent::click(now_millis(), x, y, target),
            self.options.capacity.max(1),
        );
        true
    }

    /// Restarts the debounce slot with `value`; returns whether it was accepted.
    pub fn record_input(
        &self,
        x: f64,
        y: f64,
        value: impl Into<String>,
        target: TargetIdentity,
    ) -> bool {
        if !self.is_active() {
            return false;
        }
        let value = value.into();
        let buffer = self.buffer.clone();
        let capacity = self.options.capacity.max(1);
        let delay = Duration::from_millis(self.options.debounce_ms);

        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut buffer = buffer.lock();
            if buffer.active {
                buffer.push(CapturedEvent::input(now_millis(), x, y, value, target), capacity);
            }
        }));
        true
    }

    /// Atomically take every buffered record.
    pub fn take(&self) -> DrainBatch {
        let mut buffer = self.buffer.lock();
        DrainBatch {
            events: buffer.queue.drain(..).collect(),
            overflow: std::mem::take(&mut buffer.overflow),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventCapture {
    fn default() -> Self {
        Self::new(CaptureOptions::default())
    }
}

impl Drop for EventCapture {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl CaptureSource for EventCapture {
    async fn arm(&self) -> Result<(), RecorderError> {
        self.set_active(true);
        Ok(())
    }

    async fn disarm(&self) -> Result<(), RecorderError> {
        self.set_active(false);
        Ok(())
    }

    async fn drain(&self) -> Result<DrainBatch, RecorderError> {
        Ok(self.take())
    }

    fn name(&self) -> &'static str {
        "host"
    }
}
