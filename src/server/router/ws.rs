use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use webtest_core_types::{Step, StepEdit, StepId};
use webtest_event_bus::to_mpsc;

use crate::errors::SessionError;
use crate::server::ServeState;
use crate::session::{Session, SessionEvent, StepDraft};

const SCREENSHOT_REFRESH: Duration = Duration::from_secs(1);
const FORWARD_CAPACITY: usize = 64;

pub(crate) fn router() -> Router<ServeState> {
    Router::new().route("/ws", get(websocket_handler))
}

#[derive(Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionStart {
    #[serde(default)]
    base_url: Option<String>,
}

#[derive(Deserialize)]
struct NavigateData {
    url: String,
}

#[derive(Deserialize)]
struct PointData {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct InputData {
    x: f64,
    y: f64,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct StepAdd {
    step: StepDraft,
    #[serde(default)]
    position: Option<usize>,
}

#[derive(Deserialize)]
struct StepUpdate {
    id: StepId,
    #[serde(flatten)]
    edit: StepEdit,
    #[serde(default)]
    position: Option<usize>,
}

#[derive(Deserialize)]
struct StepRemove {
    id: StepId,
}

#[derive(Default, Deserialize)]
struct ScriptRun {
    #[serde(default)]
    steps: Option<Vec<StepDraft>>,
}

async fn websocket_handler(
    State(state): State<ServeState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state).await;
    })
}

/// `{type, data, timestamp}` as sent to clients.
fn envelope(kind: &str, data: Value) -> Message {
    Message::Text(
        json!({
            "type": kind,
            "data": data,
            "timestamp": Utc::now().timestamp_millis(),
        })
        .to_string(),
    )
}

#[derive(Clone)]
struct Outbox(mpsc::UnboundedSender<Message>);

impl Outbox {
    fn send(&self, kind: &str, data: Value) {
        if self.0.send(envelope(kind, data)).is_err() {
            debug!(target: "ws", kind, "socket gone; message dropped");
        }
    }

    fn error(&self, err: &SessionError) {
        self.send(
            "error",
            json!({
                "message": err.to_string(),
                "code": err.code(),
            }),
        );
    }
}

async fn handle_socket(socket: WebSocket, state: ServeState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut outgoing) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(message) = outgoing.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut connection = Connection {
        state,
        outbox: Outbox(tx),
        attached: None,
    };
    connection.outbox.send(
        "connected",
        json!({
            "serverTime": Utc::now().timestamp_millis(),
            "serverVersion": env!("CARGO_PKG_VERSION"),
        }),
    );

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => connection.dispatch(&text).await,
            Ok(Message::Ping(payload)) => {
                let _ = connection.outbox.0.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                debug!(target: "ws", ?frame, "WebSocket closed by client");
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                error!(target: "ws", ?err, "WebSocket error");
                break;
            }
        }
    }

    connection.detach().await;
    writer.abort();
}

/// The session a socket owns, with the tasks feeding it to the client.
struct Attached {
    session: Arc<Session>,
    stop: CancellationToken,
}

struct Connection {
    state: ServeState,
    outbox: Outbox,
    attached: Option<Attached>,
}

impl Connection {
    async fn dispatch(&mut self, text: &str) {
        let request = match serde_json::from_str::<ClientMessage>(text) {
            Ok(request) => request,
            Err(err) => {
                warn!(target: "ws", error = %err, "Failed to parse client websocket message");
                self.outbox
                    .error(&SessionError::InvalidRequest(format!("malformed message: {err}")));
                return;
            }
        };
        debug!(target: "ws", kind = %request.kind, "client message");
        if let Err(err) = self.handle(&request.kind, request.data).await {
            debug!(target: "ws", kind = %request.kind, error = %err, "request failed");
            self.outbox.error(&err);
        }
    }

    async fn handle(&mut self, kind: &str, data: Value) -> Result<(), SessionError> {
        match kind {
            "ping" => self.outbox.send("pong", json!({})),
            "session:start" => {
                let request: SessionStart = parse_or_default(data)?;
                self.detach().await;
                let session = self
                    .state
                    .sessions
                    .create(request.base_url.as_deref())
                    .await?;
                let screenshot = encoded_screenshot(&session).await;
                self.outbox.send(
                    "session:started",
                    json!({
                        "sessionId": session.id(),
                        "url": session
                            .current_url()
                            .unwrap_or_else(|| session.base_url().to_string()),
                        "screenshot": screenshot,
                    }),
                );
                self.attach(session);
            }
            "session:close" => {
                self.detach().await;
                self.outbox.send("session:closed", json!({}));
            }
            "recorder:start" => {
                self.session()?.start_recording().await?;
                self.outbox.send("recorder:started", json!({}));
            }
            "recorder:stop" => {
                let session = self.session()?;
                session.stop_recording().await?;
                self.outbox
                    .send("recorder:stopped", json!({ "steps": session.steps() }));
            }
            "page:navigate" => {
                let request: NavigateData = parse(data)?;
                let session = self.session()?;
                let url = session.navigate(&request.url).await?;
                let screenshot = encoded_screenshot(&session).await;
                self.outbox.send(
                    "page:navigated",
                    json!({ "url": url, "screenshot": screenshot }),
                );
            }
            "page:screenshot" => {
                let png = self.session()?.screenshot().await?;
                self.outbox
                    .send("page:screenshot", json!({ "screenshot": STANDARD.encode(png) }));
            }
            "page:click" => {
                let point: PointData = parse(data)?;
                let session = self.session()?;
                if !session.remote_click(point.x, point.y).await? {
                    debug!(target: "ws", x = point.x, y = point.y, "click hit nothing");
                }
                self.push_screenshot(&session).await;
            }
            "page:input" => {
                let input: InputData = parse(data)?;
                let session = self.session()?;
                if !session.remote_input(input.x, input.y, &input.value).await? {
                    debug!(target: "ws", x = input.x, y = input.y, "input hit nothing");
                }
                self.push_screenshot(&session).await;
            }
            "element:inspect" => {
                let point: PointData = parse(data)?;
                let info = self.session()?.inspect(point.x, point.y).await?;
                self.outbox.send("element:inspected", json!(info));
            }
            "step:add" => {
                let request: StepAdd = parse(data)?;
                let session = self.session()?;
                let step = request.step.into_step();
                let step = match request.position {
                    Some(position) => session.insert_step(position, step)?,
                    None => session.add_step(step)?,
                };
                self.outbox.send("step:added", json!(step));
            }
            "step:update" => {
                let request: StepUpdate = parse(data)?;
                let session = self.session()?;
                let step = session.edit_step(&request.id, request.edit, request.position)?;
                self.outbox.send(
                    "step:updated",
                    json!({ "step": step, "steps": session.steps() }),
                );
            }
            "step:remove" => {
                let request: StepRemove = parse(data)?;
                self.session()?.remove_step(&request.id)?;
                self.outbox.send("step:removed", json!({ "id": request.id }));
            }
            "script:run" => {
                let request: ScriptRun = parse_or_default(data)?;
                let steps = request
                    .steps
                    .map(|drafts| drafts.into_iter().map(StepDraft::into_step).collect());
                self.spawn_run(self.session()?, steps);
            }
            other => {
                warn!(target: "ws", kind = other, "Unhandled client message");
                return Err(SessionError::InvalidRequest(format!(
                    "unknown message type '{other}'"
                )));
            }
        }
        Ok(())
    }

    fn session(&self) -> Result<Arc<Session>, SessionError> {
        match &self.attached {
            Some(attached) if !attached.session.is_closed() => Ok(attached.session.clone()),
            _ => Err(SessionError::precondition("no active session")),
        }
    }

    fn attach(&mut self, session: Arc<Session>) {
        let stop = CancellationToken::new();
        tokio::spawn(forward_events(
            session.clone(),
            self.outbox.clone(),
            stop.clone(),
        ));
        tokio::spawn(refresh_screenshots(
            session.clone(),
            self.outbox.clone(),
            stop.clone(),
        ));
        info!(target: "ws", session = %session.id(), "socket attached to session");
        self.attached = Some(Attached { session, stop });
    }

    /// Closes the socket's session, if any.
    async fn detach(&mut self) {
        let Some(attached) = self.attached.take() else {
            return;
        };
        attached.stop.cancel();
        if let Err(err) = self.state.sessions.close(attached.session.id()).await {
            debug!(target: "ws", error = %err, "session already gone");
        }
    }

    /// Runs the script in the background so the socket keeps serving messages.
    fn spawn_run(&self, session: Arc<Session>, steps: Option<Vec<Step>>) {
        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            match session.run(steps).await {
                Ok(report) => outbox.send(
                    "script:completed",
                    json!({ "success": true, "report": report }),
                ),
                Err(err) => outbox.send(
                    "script:error",
                    json!({
                        "message": err.to_string(),
                        "code": err.code(),
                        "step": err.failed_step(),
                    }),
                ),
            }
        });
    }

    async fn push_screenshot(&self, session: &Session) {
        if let Ok(Some(png)) = session.try_screenshot().await {
            self.outbox
                .send("page:screenshot", json!({ "screenshot": STANDARD.encode(png) }));
        }
    }
}

fn parse<T: DeserializeOwned>(data: Value) -> Result<T, SessionError> {
    serde_json::from_value(data).map_err(|err| SessionError::InvalidRequest(err.to_string()))
}

fn parse_or_default<T: DeserializeOwned + Default>(data: Value) -> Result<T, SessionError> {
    if data.is_null() {
        Ok(T::default())
    } else {
        parse(data)
    }
}

async fn encoded_screenshot(session: &Session) -> Option<String> {
    match session.screenshot().await {
        Ok(png) => Some(STANDARD.encode(png)),
        Err(err) => {
            warn!(target: "ws", session = %session.id(), error = %err, "screenshot failed");
            None
        }
    }
}

async fn forward_events(session: Arc<Session>, outbox: Outbox, stop: CancellationToken) {
    let mut events = to_mpsc(session.events(), FORWARD_CAPACITY);
    loop {
        let event = tokio::select! {
            _ = stop.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Some(SessionEvent::StepRecorded(step)) => outbox.send("step:recorded", json!(step)),
            Some(SessionEvent::ScriptStarted { total }) => {
                outbox.send("script:started", json!({ "total": total }))
            }
            Some(SessionEvent::StepExecuted { outcome, step }) => outbox.send(
                "step:executed",
                json!({ "outcome": outcome, "step": step }),
            ),
            Some(SessionEvent::Closed) | None => break,
        }
    }
}

/// Best-effort live view. Ticks while the page is busy are skipped.
async fn refresh_screenshots(session: Arc<Session>, outbox: Outbox, stop: CancellationToken) {
    let mut ticker = interval(SCREENSHOT_REFRESH);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if session.is_closed() {
            break;
        }
        match session.try_screenshot().await {
            Ok(Some(png)) => {
                outbox.send("page:screenshot", json!({ "screenshot": STANDARD.encode(png) }))
            }
            Ok(None) => {}
            Err(err) => debug!(target: "ws", session = %session.id(), error = %err, "screenshot refresh failed"),
        }
    }
}
