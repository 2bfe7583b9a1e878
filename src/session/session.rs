use std::sync::Arc;
use std::time::Duration;

use action_locator::SelectorSynthesizer;
use action_recorder::{
    CaptureOptions, CaptureSource, EventCapture, HostPoller, PageCapture, PollContext, StepSink,
    DEFAULT_POLL_INTERVAL,
};
use action_replay::{
    best_selector, ReplayEngine, ReplayError, ReplayObserver, ReplayOptions, ReplayReport,
    StepOutcome,
};
use cdp_adapter::{AutomationSurface, PageId};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::{ParseError, Url};
use webtest_core_types::{
    CoreError, ElementSnapshot, SelectorInfo, SessionId, Step, StepEdit, StepId, StepStore,
    TargetIdentity,
};
use webtest_event_bus::InMemoryBus;

use super::events::SessionEvent;
use super::state::SessionState;
use crate::config::Config;
use crate::errors::SessionError;

const EVENT_BUS_CAPACITY: usize = 256;
const IDENTITY_TEXT_LIMIT: usize = 50;

/// Timing knobs every session of a registry shares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub capture: CaptureOptions,
    pub poll_interval: Duration,
    pub replay: ReplayOptions,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            capture: CaptureOptions::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            replay: ReplayOptions::default(),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            capture: config.capture_options(),
            poll_interval: config.poll_interval(),
            replay: config.replay_options(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub base_url: String,
    pub url: Option<String>,
    pub state: SessionState,
    pub recording: bool,
    pub step_count: usize,
    pub created_at: DateTime<Utc>,
}

/// One page of the browser plus everything recorded against it.
///
/// Page operations (navigation, inspection, poll ticks, replay) take the
/// session's page lock, so they never interleave.
pub struct Session {
    id: SessionId,
    base_url: String,
    created_at: DateTime<Utc>,
    page: PageId,
    surface: Arc<dyn AutomationSurface>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    steps: Arc<RwLock<StepStore>>,
    last_url: Arc<RwLock<Option<String>>>,
    page_lock: Arc<AsyncMutex<()>>,
    page_capture: Arc<PageCapture>,
    capture: Arc<EventCapture>,
    synthesizer: Arc<SelectorSynthesizer>,
    replay: ReplayEngine,
    poller: AsyncMutex<Option<HostPoller>>,
    events: Arc<InMemoryBus<SessionEvent>>,
    closed: CancellationToken,
}

impl Session {
    /// Opens a page and loads `url` into it, unless `url` is blank.
    pub async fn open(
        surface: Arc<dyn AutomationSurface>,
        base_url: String,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        let navigate_timeout = settings.replay.navigate_timeout;
        let page = surface.create_page("", navigate_timeout).await?;
        if !base_url.is_empty() {
            if let Err(err) = surface.navigate(page, &base_url, navigate_timeout).await {
                if let Err(close_err) = surface.close_page(page).await {
                    debug!(target: "session", error = %close_err, "closing failed page");
                }
                return Err(err.into());
            }
        }
        let url = surface.current_url(page).await.ok();

        Ok(Self {
            id: SessionId::new(),
            base_url,
            created_at: Utc::now(),
            page,
            settings,
            state: Mutex::new(SessionState::Idle),
            steps: Arc::new(RwLock::new(StepStore::new())),
            last_url: Arc::new(RwLock::new(url)),
            page_lock: Arc::new(AsyncMutex::new(())),
            page_capture: Arc::new(PageCapture::new(surface.clone(), page, &settings.capture)),
            capture: Arc::new(EventCapture::new(settings.capture)),
            synthesizer: Arc::new(SelectorSynthesizer::new(surface.clone())),
            replay: ReplayEngine::new(surface.clone(), settings.replay),
            poller: AsyncMutex::new(None),
            events: InMemoryBus::new(EVENT_BUS_CAPACITY),
            closed: CancellationToken::new(),
            surface,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn current_url(&self) -> Option<String> {
        self.last_url.read().clone()
    }

    pub fn events(&self) -> Arc<InMemoryBus<SessionEvent>> {
        Arc::clone(&self.events)
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.state();
        SessionSummary {
            id: self.id.clone(),
            base_url: self.base_url.clone(),
            url: self.current_url(),
            state,
            recording: state.is_recording(),
            step_count: self.steps.read().len(),
            created_at: self.created_at,
        }
    }

    pub async fn start_recording(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        let mut poller = self.poller.lock().await;
        self.state.lock().start_recording()?;

        let ctx = PollContext {
            surface: self.surface.clone(),
            page: self.page,
            sources: vec![
                self.page_capture.clone() as Arc<dyn CaptureSource>,
                self.capture.clone() as Arc<dyn CaptureSource>,
            ],
            synthesizer: self.synthesizer.clone(),
            sink: Arc::new(SessionSink {
                steps: self.steps.clone(),
                last_url: self.last_url.clone(),
                events: self.events.clone(),
            }),
            page_lock: self.page_lock.clone(),
        };
        match HostPoller::start(ctx, self.settings.poll_interval).await {
            Ok(started) => {
                *poller = Some(started);
                info!(target: "session", session = %self.id, "recording started");
                Ok(())
            }
            Err(err) => {
                self.state.lock().stop_recording().ok();
                warn!(target: "session", session = %self.id, error = %err, "recording failed to start");
                Err(err.into())
            }
        }
    }

    /// Stops the poll loop; a tick already in progress still appends its steps.
    pub async fn stop_recording(&self) -> Result<(), SessionError> {
        let mut poller = self.poller.lock().await;
        if !self.is_recording() {
            return Err(SessionError::precondition("not recording"));
        }
        if let Some(running) = poller.take() {
            running.stop().await;
        }
        self.state.lock().stop_recording()?;
        info!(target: "session", session = %self.id, steps = self.steps.read().len(), "recording stopped");
        Ok(())
    }

    /// Loads `url` and returns the page URL afterwards.
    pub async fn navigate(&self, url: &str) -> Result<String, SessionError> {
        self.ensure_open()?;
        if self.state().is_running() {
            return Err(SessionError::precondition("cannot navigate while a script is running"));
        }
        let url = normalize_url(url)?;
        let _page = self.page_lock.lock().await;
        self.surface
            .navigate(self.page, &url, self.settings.replay.navigate_timeout)
            .await?;
        let current = self.surface.current_url(self.page).await?;
        debug!(target: "session", session = %self.id, url = %current, "navigated");
        Ok(current)
    }

    /// Ad-hoc element inspection at a viewport point; `None` on a miss.
    pub async fn inspect(&self, x: f64, y: f64) -> Result<Option<SelectorInfo>, SessionError> {
        self.ensure_open()?;
        let _page = self.page_lock.lock().await;
        Ok(self.synthesizer.inspect(self.page, x, y).await?)
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>, SessionError> {
        self.ensure_open()?;
        let _page = self.page_lock.lock().await;
        Ok(self.surface.screenshot(self.page).await?)
    }

    /// Screenshot unless another page operation holds the page.
    pub async fn try_screenshot(&self) -> Result<Option<Vec<u8>>, SessionError> {
        self.ensure_open()?;
        let Ok(_page) = self.page_lock.try_lock() else {
            return Ok(None);
        };
        Ok(Some(self.surface.screenshot(self.page).await?))
    }

    /// Clicks whatever is at the point. While recording the click goes
    /// through the host-side capture, so it is recorded exactly once.
    pub async fn remote_click(&self, x: f64, y: f64) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let _page = self.page_lock.lock().await;
        let Some(info) = self.synthesizer.inspect(self.page, x, y).await? else {
            return Ok(false);
        };
        let selector = best_selector(&info.candidates).to_string();
        let deadline = self.settings.replay.action_timeout;
        self.quietly(self.surface.click(self.page, &selector, deadline))
            .await?;
        self.capture.record_click(x, y, identity(&info.element));
        Ok(true)
    }

    /// Fills the field at the point; recorded through the debounced capture.
    pub async fn remote_input(&self, x: f64, y: f64, value: &str) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let _page = self.page_lock.lock().await;
        let Some(info) = self.synthesizer.inspect(self.page, x, y).await? else {
            return Ok(false);
        };
        let selector = best_selector(&info.candidates).to_string();
        let deadline = self.settings.replay.action_timeout;
        self.quietly(self.surface.fill(self.page, &selector, value, deadline))
            .await?;
        self.capture
            .record_input(x, y, value, identity(&info.element));
        Ok(true)
    }

    /// Runs `action` with the in-page capture paused while recording.
    async fn quietly<F>(&self, action: F) -> Result<(), SessionError>
    where
        F: std::future::Future<Output = Result<(), cdp_adapter::AdapterError>>,
    {
        let recording = self.is_recording();
        if recording {
            self.page_capture.disarm().await?;
        }
        let result = action.await;
        if recording {
            self.page_capture.arm().await?;
        }
        Ok(result?)
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps.read().snapshot()
    }

    pub fn step(&self, id: &StepId) -> Option<Step> {
        self.steps.read().get(id).cloned()
    }

    pub fn add_step(&self, step: Step) -> Result<Step, SessionError> {
        Ok(self.steps.write().append(step)?.clone())
    }

    pub fn insert_step(&self, position: usize, step: Step) -> Result<Step, SessionError> {
        self.steps.write().insert_at(position, step.clone())?;
        Ok(step)
    }

    pub fn update_step(&self, id: &StepId, edit: StepEdit) -> Result<Step, SessionError> {
        Ok(self.steps.write().update(id, edit)?.clone())
    }

    /// Edits a step and optionally moves it; a rejected edit leaves the order alone.
    pub fn edit_step(
        &self,
        id: &StepId,
        edit: StepEdit,
        position: Option<usize>,
    ) -> Result<Step, SessionError> {
        Ok(self
            .steps
            .write()
            .update_and_move(id, edit, position)?
            .clone())
    }

    pub fn remove_step(&self, id: &StepId) -> Result<Step, SessionError> {
        Ok(self.steps.write().remove(id)?)
    }

    pub fn move_step(&self, id: &StepId, position: usize) -> Result<(), SessionError> {
        Ok(self.steps.write().move_to(id, position)?)
    }

    /// Replaces every step, e.g. with a loaded script.
    pub fn replace_steps(&self, steps: Vec<Step>) -> Result<(), SessionError> {
        let store = StepStore::from_steps(steps)?;
        *self.steps.write() = store;
        Ok(())
    }

    /// Replays the session's steps, or `steps` when given.
    pub async fn run(&self, steps: Option<Vec<Step>>) -> Result<ReplayReport, SessionError> {
        self.ensure_open()?;
        self.state.lock().start_run()?;
        let _idle = FinishRun(&self.state);

        let steps = steps.unwrap_or_else(|| self.steps());
        let _page = self.page_lock.lock().await;
        let observer = BusObserver {
            events: &self.events,
        };
        let cancel = self.closed.child_token();
        info!(target: "session", session = %self.id, steps = steps.len(), "running script");
        let result: Result<ReplayReport, ReplayError> =
            self.replay.run(self.page, &steps, &observer, &cancel).await;
        Ok(result?)
    }

    /// Stops recording, cancels a replay between steps and closes the page.
    pub async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        if let Some(running) = self.poller.lock().await.take() {
            running.stop().await;
        }
        self.state.lock().stop_recording().ok();
        self.capture.set_active(false);
        if let Err(err) = self.surface.close_page(self.page).await {
            warn!(target: "session", session = %self.id, error = %err, "failed to close page");
        }
        self.events.emit(SessionEvent::Closed);
        info!(target: "session", session = %self.id, "session closed");
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.is_cancelled() {
            Err(SessionError::NotFound(self.id.clone()))
        } else {
            Ok(())
        }
    }
}

/// Adds `https://` when the URL has no scheme; blank and `about:` URLs pass through.
pub fn normalize_url(raw: &str) -> Result<String, SessionError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("about:") {
        return Ok(raw.to_string());
    }
    let invalid = || SessionError::InvalidRequest(format!("'{raw}' is not a URL"));
    match Url::parse(raw) {
        Ok(url) if is_web(&url) => Ok(raw.to_string()),
        // `localhost:3000` parses as scheme `localhost` with path `3000`
        Ok(url) if is_port(url.path()) => with_https(raw).ok_or_else(invalid),
        Err(ParseError::RelativeUrlWithoutBase) if !raw.contains("//") => {
            with_https(raw).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

fn with_https(raw: &str) -> Option<String> {
    let candidate = format!("https://{raw}");
    match Url::parse(&candidate) {
        Ok(url) if is_web(&url) => Some(candidate),
        _ => None,
    }
}

fn is_web(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|host| !host.is_empty())
}

fn is_port(path: &str) -> bool {
    !path.is_empty() && path.bytes().all(|b| b.is_ascii_digit())
}

fn identity(element: &ElementSnapshot) -> TargetIdentity {
    let text: String = element
        .text_content
        .chars()
        .take(IDENTITY_TEXT_LIMIT)
        .collect();
    TargetIdentity {
        tag_name: element.tag_name.clone(),
        id: element.attribute("id").map(str::to_string),
        class_name: element.attribute("class").map(str::to_string),
        text: (!text.is_empty()).then_some(text),
    }
}

struct SessionSink {
    steps: Arc<RwLock<StepStore>>,
    last_url: Arc<RwLock<Option<String>>>,
    events: Arc<InMemoryBus<SessionEvent>>,
}

impl StepSink for SessionSink {
    fn append(&self, step: Step) -> Result<Step, CoreError> {
        let stored = self.steps.write().append(step)?.clone();
        self.events.emit(SessionEvent::StepRecorded(stored.clone()));
        Ok(stored)
    }

    fn url_observed(&self, url: &str) {
        *self.last_url.write() = Some(url.to_string());
    }
}

struct BusObserver<'a> {
    events: &'a InMemoryBus<SessionEvent>,
}

impl ReplayObserver for BusObserver<'_> {
    fn run_started(&self, total: usize) {
        self.events.emit(SessionEvent::ScriptStarted { total });
    }

    fn step_executed(&self, outcome: &StepOutcome, step: &Step) {
        self.events.emit(SessionEvent::StepExecuted {
            outcome: outcome.clone(),
            step: step.clone(),
        });
    }
}

struct FinishRun<'a>(&'a Mutex<SessionState>);

impl Drop for FinishRun<'_> {
    fn drop(&mut self) {
        self.0.lock().finish_run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_without_scheme_get_https() {
        assert_eq!(normalize_url(" example.com ").unwrap(), "https://example.com");
        assert_eq!(normalize_url("http://localhost:3000").unwrap(), "http://localhost:3000");
        assert_eq!(normalize_url("").unwrap(), "");
        assert_eq!(normalize_url("about:blank").unwrap(), "about:blank");
        assert!(normalize_url("not a url").is_err());
        assert_eq!(normalize_url("localhost:3000").unwrap(), "https://localhost:3000");
        assert_eq!(
            normalize_url("example.com/login?next=1").unwrap(),
            "https://example.com/login?next=1"
        );
        for bad in [
            "not a url://",
            "https://",
            "http//example.com",
            "javascript:alert(1)",
            "file:///etc/passwd",
        ] {
            assert!(normalize_url(bad).is_err(), "{bad} was accepted");
        }
    }

    #[test]
    fn identity_keeps_short_text_and_attributes() {
        let mut element = ElementSnapshot {
            tag_name: "button".into(),
            text_content: "x".repeat(80),
            ..ElementSnapshot::default()
        };
        element.attributes.insert("id".into(), "go".into());
        let identity = identity(&element);
        assert_eq!(identity.id.as_deref(), Some("go"));
        assert_eq!(identity.text.map(|t| t.len()), Some(IDENTITY_TEXT_LIMIT));
        assert!(identity.class_name.is_none());
    }
}
