//! Raw DevTools transport: launches (or attaches to) Chromium and multiplexes
//! commands and events over a single websocket connection.

use std::collections::HashMap;
use std::convert::TryInto;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::{future::BoxFuture, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::util::extract_ws_url;

/// Chrome switches applied to every launched browser.
const LAUNCH_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-update",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-sync",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--remote-allow-origins=*",
    "--use-mock-keychain",
];

const HEADLESS_ARGS: &[&str] = &["--headless=new", "--hide-scrollbars", "--mute-audio"];

#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError>;
}

type ConnectionFactory = Arc<
    dyn Fn(CdpConfig) -> BoxFuture<'static, Result<Arc<Connected>, AdapterError>> + Send + Sync,
>;

/// Transport backed by a chromiumoxide websocket connection.
///
/// The browser is (re)connected lazily: a dead connection is replaced on the
/// next command.
#[derive(Clone)]
pub struct ChromiumTransport {
    cfg: CdpConfig,
    current: Arc<Mutex<Option<Arc<Connected>>>>,
    factory: ConnectionFactory,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        let factory: ConnectionFactory = Arc::new(|cfg: CdpConfig| {
            Box::pin(async move { Connected::open(cfg).await.map(Arc::new) })
        });
        Self {
            cfg,
            current: Arc::new(Mutex::new(None)),
            factory,
        }
    }

    async fn connection(&self) -> Result<Arc<Connected>, AdapterError> {
        let mut slot = self.current.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.is_alive() {
                return Ok(Arc::clone(existing));
            }
            warn!(target: "cdp-transport", "browser connection lost; reconnecting");
        }
        let fresh = (self.factory)(self.cfg.clone()).await?;
        *slot = Some(Arc::clone(&fresh));
        Ok(fresh)
    }

    #[cfg(test)]
    fn with_factory(cfg: CdpConfig, factory: ConnectionFactory) -> Self {
        Self {
            cfg,
            current: Arc::new(Mutex::new(None)),
            factory,
        }
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let conn = self.connection().await?;
        conn.call(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            Duration::from_millis(self.cfg.default_deadline_ms),
        )
        .await
        .map(|_| ())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        match self.connection().await {
            Ok(conn) => conn.next_event().await,
            Err(err) => {
                warn!(target: "cdp-transport", %err, "transport not ready");
                None
            }
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        self.connection()
            .await?
            .call(target, method, params, deadline)
            .await
    }
}

type Responder = oneshot::Sender<Result<Value, AdapterError>>;

struct Outgoing {
    target: CommandTarget,
    method: String,
    params: Value,
    responder: Responder,
}

/// One live browser connection plus the tasks that service it.
struct Connected {
    outgoing: mpsc::Sender<Outgoing>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    pump: JoinHandle<()>,
    keepalive: Option<JoinHandle<()>>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl Connected {
    async fn open(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let (child, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => {
                let (child, url) = launch(browser_config(&cfg)?).await?;
                (Some(child), url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;

        let (outgoing, outgoing_rx) = mpsc::channel(128);
        let (events_tx, events_rx) = mpsc::channel(512);
        let alive = Arc::new(AtomicBool::new(true));

        let pump_alive = Arc::clone(&alive);
        let pump = tokio::spawn(async move {
            let outcome = pump_messages(conn, outgoing_rx, events_tx).await;
            pump_alive.store(false, Ordering::Relaxed);
            if let Err(err) = outcome {
                error!(target: "cdp-transport", %err, "connection pump stopped");
            }
        });

        let keepalive = spawn_keepalive(
            outgoing.clone(),
            Arc::clone(&alive),
            Duration::from_millis(cfg.heartbeat_interval_ms),
        );

        info!(target: "cdp-transport", url = %ws_url, "connected to chromium");

        Ok(Self {
            outgoing,
            events: Mutex::new(events_rx),
            pump,
            keepalive,
            child: Mutex::new(child),
            alive,
        })
    }

    #[cfg(test)]
    fn detached() -> (Arc<Self>, Arc<AtomicBool>) {
        let (outgoing, _outgoing_rx) = mpsc::channel(1);
        let (_events_tx, events_rx) = mpsc::channel(1);
        let alive = Arc::new(AtomicBool::new(true));
        let pump = tokio::spawn(futures::future::pending::<()>());
        let conn = Arc::new(Self {
            outgoing,
            events: Mutex::new(events_rx),
            pump,
            keepalive: None,
            child: Mutex::new(None),
            alive: Arc::clone(&alive),
        });
        (conn, alive)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (responder, response) = oneshot::channel();
        self.outgoing
            .send(Outgoing {
                target,
                method: method.to_string(),
                params,
                responder,
            })
            .await
            .map_err(|_| {
                AdapterError::new(AdapterErrorKind::CdpIo).with_hint("connection pump stopped")
            })?;

        match tokio::time::timeout(deadline, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method}: response dropped"))),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method}: no response within {}ms", deadline.as_millis()))
                .retriable(true)),
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }
}

impl Drop for Connected {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.pump.abort();
        if let Some(task) = &self.keepalive {
            task.abort();
        }

        let Ok(mut guard) = self.child.try_lock() else {
            return;
        };
        if let Some(mut child) = guard.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(err) = child.kill().await {
                            warn!(target: "cdp-transport", %err, "failed to stop chromium");
                        }
                    });
                }
                Err(_) => debug!(target: "cdp-transport", "no runtime left to stop chromium"),
            }
        }
    }
}

fn spawn_keepalive(
    outgoing: mpsc::Sender<Outgoing>,
    alive: Arc<AtomicBool>,
    period: Duration,
) -> Option<JoinHandle<()>> {
    if period.is_zero() {
        return None;
    }
    let response_deadline = period.min(Duration::from_secs(5));

    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick completes immediately
        ticker.tick().await;

        while alive.load(Ordering::Relaxed) {
            ticker.tick().await;
            let (responder, response) = oneshot::channel();
            let ping = Outgoing {
                target: CommandTarget::Browser,
                method: "Browser.getVersion".to_string(),
                params: json!({}),
                responder,
            };
            if outgoing.send(ping).await.is_err() {
                break;
            }
            match tokio::time::timeout(response_deadline, response).await {
                Ok(Ok(Ok(_))) => {}
                Ok(Ok(Err(err))) => {
                    warn!(target: "cdp-transport", %err, "keepalive rejected");
                    break;
                }
                Ok(Err(_)) => break,
                Err(_) => {
                    warn!(target: "cdp-transport", "keepalive timed out");
                    break;
                }
            }
        }
    }))
}

fn absolute_profile_dir(cfg: &CdpConfig) -> Result<PathBuf, AdapterError> {
    if cfg.user_data_dir.is_absolute() {
        return Ok(cfg.user_data_dir.clone());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&cfg.user_data_dir))
        .map_err(|err| AdapterError::internal(format!("cannot resolve working directory: {err}")))
}

fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!(
                "chrome executable not found at {}",
                cfg.executable.display()
            ))
            .with_data(json!({
                "expected": cfg.executable,
                "hint": "Set WEBTEST_CHROME to the full path of chrome/chromium."
            })));
    }

    let profile_dir = absolute_profile_dir(cfg)?;
    fs::create_dir_all(&profile_dir)
        .map_err(|err| AdapterError::internal(format!("cannot create profile dir: {err}")))?;

    let mut args: Vec<String> = LAUNCH_ARGS.iter().map(|arg| arg.to_string()).collect();
    if cfg.headless {
        args.extend(HEADLESS_ARGS.iter().map(|arg| arg.to_string()));
    }
    args.push(format!(
        "--window-size={},{}",
        cfg.viewport.width, cfg.viewport.height
    ));

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(Duration::from_secs(20))
        .args(args)
        .user_data_dir(profile_dir);
    if !cfg.headless {
        builder = builder.with_head();
    }
    if cfg.disable_sandbox {
        builder = builder.no_sandbox();
    }
    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }

    builder
        .build()
        .map_err(|err| AdapterError::internal(format!("invalid browser config: {err}")))
}

async fn launch(config: BrowserConfig) -> Result<(Child, String), AdapterError> {
    let mut child = config
        .launch()
        .map_err(|err| AdapterError::internal(format!("failed to launch chromium: {err}")))?;
    let ws_url = extract_ws_url(&mut child)
        .await
        .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;
    Ok((child, ws_url))
}

async fn pump_messages(
    mut conn: Connection<CdpEventMessage>,
    mut outgoing: mpsc::Receiver<Outgoing>,
    events: mpsc::Sender<TransportEvent>,
) -> Result<(), AdapterError> {
    let mut pending: HashMap<CallId, Responder> = HashMap::new();

    loop {
        tokio::select! {
            Some(command) = outgoing.recv() => {
                let session = match command.target {
                    CommandTarget::Browser => None,
                    CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
                };
                let method: MethodId = command.method.into();
                match conn.submit_command(method, session, command.params) {
                    Ok(call_id) => {
                        pending.insert(call_id, command.responder);
                    }
                    Err(err) => {
                        let failure = AdapterError::new(AdapterErrorKind::CdpIo)
                            .with_hint(err.to_string());
                        let _ = command.responder.send(Err(failure.clone()));
                        fail_pending(&mut pending, &failure);
                        return Err(failure);
                    }
                }
            }
            incoming = conn.next() => match incoming {
                Some(Ok(Message::Response(response))) => {
                    if let Some(responder) = pending.remove(&response.id) {
                        let _ = responder.send(response_payload(response));
                    }
                }
                Some(Ok(Message::Event(event))) => {
                    match decode_event(event) {
                        Ok(decoded) => {
                            if events.send(decoded).await.is_err() {
                                debug!(target: "cdp-transport", "event receiver dropped");
                            }
                        }
                        Err(err) => warn!(target: "cdp-transport", %err, "undecodable event"),
                    }
                }
                Some(Err(err)) => {
                    let failure = map_cdp_error(err);
                    fail_pending(&mut pending, &failure);
                    return Err(failure);
                }
                None => {
                    let failure = AdapterError::new(AdapterErrorKind::CdpIo)
                        .with_hint("browser closed the connection");
                    fail_pending(&mut pending, &failure);
                    return Ok(());
                }
            }
        }
    }
}

fn fail_pending(pending: &mut HashMap<CallId, Responder>, failure: &AdapterError) {
    for (_, responder) in pending.drain() {
        let _ = responder.send(Err(failure.clone()));
    }
}

fn decode_event(event: CdpEventMessage) -> Result<TransportEvent, AdapterError> {
    let raw: CdpJsonEventMessage = event
        .try_into()
        .map_err(|err| AdapterError::internal(format!("cannot decode cdp event: {err}")))?;
    Ok(TransportEvent {
        method: raw.method.into_owned(),
        params: raw.params,
        session_id: raw.session_id,
    })
}

fn response_payload(response: Response) -> Result<Value, AdapterError> {
    match (response.result, response.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("cdp error {}: {}", error.code, error.message))
            .with_data(json!({ "code": error.code }))),
        (None, None) => Err(AdapterError::internal("empty cdp response")),
    }
}

fn map_cdp_error(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(hint)
            .retriable(true),
        CdpError::Serde(_) | CdpError::JavascriptException(_) | CdpError::FrameNotFound(_) => {
            AdapterError::internal(hint)
        }
        _ => AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(hint)
            .retriable(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn reconnects_after_connection_dies() {
        let opened = Arc::new(AtomicUsize::new(0));
        let flags = Arc::new(Mutex::new(Vec::<Arc<AtomicBool>>::new()));

        let factory: ConnectionFactory = {
            let opened = Arc::clone(&opened);
            let flags = Arc::clone(&flags);
            Arc::new(move |_cfg: CdpConfig| {
                let opened = Arc::clone(&opened);
                let flags = Arc::clone(&flags);
                Box::pin(async move {
                    opened.fetch_add(1, Ordering::SeqCst);
                    let (conn, alive) = Connected::detached();
                    flags.lock().await.push(alive);
                    Ok(conn)
                })
            })
        };

        let transport = ChromiumTransport::with_factory(CdpConfig::default(), factory);
        let first = transport.connection().await.expect("first connection");
        let again = transport.connection().await.expect("cached connection");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        flags.lock().await[0].store(false, Ordering::SeqCst);
        let second = transport.connection().await.expect("second connection");
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn error_responses_become_cdp_io() {
        let payload: Response = serde_json::from_value(json!({
            "id": 7,
            "error": { "code": -32000, "message": "No node found for given backend id" }
        }))
        .unwrap();
        let err = response_payload(payload).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.hint.unwrap().contains("No node found"));
    }
}
