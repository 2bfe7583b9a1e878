use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::instrument;
use webtest_core_types::{SelectorInfo, SessionId, Step, StepEdit, StepId};

use crate::errors::SessionError;
use crate::export::{self, ExportFormat, ScriptDocument};
use crate::server::ServeState;
use crate::session::{SessionSummary, StepDraft};

pub(crate) fn router() -> Router<ServeState> {
    Router::new()
        .route(
            "/api/sessions",
            get(session_list_handler).post(session_create_handler),
        )
        .route(
            "/api/sessions/:session_id",
            get(session_detail_handler).delete(session_delete_handler),
        )
        .route(
            "/api/sessions/:session_id/steps",
            get(step_list_handler).post(step_add_handler),
        )
        .route(
            "/api/sessions/:session_id/steps/:step_id",
            patch(step_update_handler).delete(step_remove_handler),
        )
        .route(
            "/api/sessions/:session_id/record/start",
            post(record_start_handler),
        )
        .route(
            "/api/sessions/:session_id/record/stop",
            post(record_stop_handler),
        )
        .route("/api/sessions/:session_id/navigate", post(navigate_handler))
        .route("/api/sessions/:session_id/inspect", post(inspect_handler))
        .route("/api/sessions/:session_id/run", post(run_handler))
        .route(
            "/api/sessions/:session_id/screenshot",
            get(screenshot_handler),
        )
        .route("/api/sessions/:session_id/export", get(export_handler))
}

type ApiResult<T> = Result<T, SessionError>;

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    #[serde(default)]
    base_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: SessionId,
    session: SessionSummary,
}

#[derive(Serialize)]
struct SessionDetail {
    #[serde(flatten)]
    summary: SessionSummary,
    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct AddStepRequest {
    step: StepDraft,
    #[serde(default)]
    position: Option<usize>,
}

#[derive(Deserialize)]
struct UpdateStepRequest {
    #[serde(flatten)]
    edit: StepEdit,
    #[serde(default)]
    position: Option<usize>,
}

#[derive(Deserialize)]
struct NavigateRequest {
    url: String,
}

#[derive(Deserialize)]
struct PointRequest {
    x: f64,
    y: f64,
}

#[derive(Serialize)]
struct InspectResponse {
    target: Option<SelectorInfo>,
}

#[derive(Default, Deserialize)]
struct RunRequest {
    #[serde(default)]
    steps: Option<Vec<StepDraft>>,
}

#[derive(Deserialize)]
struct ExportQuery {
    #[serde(default)]
    format: Option<ExportFormat>,
    #[serde(default)]
    name: Option<String>,
}

#[instrument(name = "webtest.sessions.create", skip(state, request))]
async fn session_create_handler(
    State(state): State<ServeState>,
    request: Option<Json<CreateSessionRequest>>,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    let request = request.map(|Json(body)| body).unwrap_or_default();
    let session = state.sessions.create(request.base_url.as_deref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id().clone(),
            session: session.summary(),
        }),
    ))
}

async fn session_list_handler(State(state): State<ServeState>) -> Json<Value> {
    Json(json!({ "sessions": state.sessions.list() }))
}

async fn session_detail_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<SessionDetail>> {
    let session = state.sessions.get(&session_id)?;
    Ok(Json(SessionDetail {
        summary: session.summary(),
        steps: session.steps(),
    }))
}

#[instrument(name = "webtest.sessions.delete", skip(state))]
async fn session_delete_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Value>> {
    state.sessions.close(&session_id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn step_list_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Value>> {
    let session = state.sessions.get(&session_id)?;
    Ok(Json(json!({ "steps": session.steps() })))
}

async fn step_add_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<AddStepRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let session = state.sessions.get(&session_id)?;
    let step = request.step.into_step();
    let step = match request.position {
        Some(position) => session.insert_step(position, step)?,
        None => session.add_step(step)?,
    };
    Ok((StatusCode::CREATED, Json(json!({ "step": step }))))
}

async fn step_update_handler(
    State(state): State<ServeState>,
    Path((session_id, step_id)): Path<(SessionId, StepId)>,
    Json(request): Json<UpdateStepRequest>,
) -> ApiResult<Json<Value>> {
    let session = state.sessions.get(&session_id)?;
    let step = session.edit_step(&step_id, request.edit, request.position)?;
    Ok(Json(json!({ "step": step })))
}

async fn step_remove_handler(
    State(state): State<ServeState>,
    Path((session_id, step_id)): Path<(SessionId, StepId)>,
) -> ApiResult<Json<Value>> {
    let session = state.sessions.get(&session_id)?;
    let step = session.remove_step(&step_id)?;
    Ok(Json(json!({ "step": step })))
}

#[instrument(name = "webtest.record.start", skip(state))]
async fn record_start_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Value>> {
    let session = state.sessions.get(&session_id)?;
    session.start_recording().await?;
    Ok(Json(json!({ "recording": true })))
}

#[instrument(name = "webtest.record.stop", skip(state))]
async fn record_stop_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Value>> {
    let session = state.sessions.get(&session_id)?;
    session.stop_recording().await?;
    Ok(Json(json!({
        "recording": false,
        "steps": session.steps(),
    })))
}

async fn navigate_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<NavigateRequest>,
) -> ApiResult<Json<Value>> {
    let session = state.sessions.get(&session_id)?;
    let url = session.navigate(&request.url).await?;
    Ok(Json(json!({ "url": url })))
}

async fn inspect_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
    Json(point): Json<PointRequest>,
) -> ApiResult<Json<InspectResponse>> {
    let session = state.sessions.get(&session_id)?;
    let target = session.inspect(point.x, point.y).await?;
    Ok(Json(InspectResponse { target }))
}

#[instrument(name = "webtest.run", skip(state, request))]
async fn run_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
    request: Option<Json<RunRequest>>,
) -> ApiResult<Json<Value>> {
    let session = state.sessions.get(&session_id)?;
    let steps = request
        .and_then(|Json(body)| body.steps)
        .map(|drafts| drafts.into_iter().map(StepDraft::into_step).collect());
    let report = session.run(steps).await?;
    Ok(Json(json!({ "success": true, "report": report })))
}

async fn screenshot_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Response> {
    let session = state.sessions.get(&session_id)?;
    let png = session.screenshot().await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn export_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let session = state.sessions.get(&session_id)?;
    let format = query.format.unwrap_or(ExportFormat::Json);
    let document = ScriptDocument::from_session(&session, query.name);
    let body = export::export(&document, format)
        .map_err(|err| SessionError::InvalidRequest(err.to_string()))?;
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        session.id(),
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
