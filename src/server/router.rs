use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use super::state::ServeState;
use crate::metrics;

mod sessions;
mod ws;

pub fn build_router(state: ServeState) -> Router {
    let cors = cors_layer(&state.frontend_url);
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(sessions::router())
        .merge(ws::router())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);
    match HeaderValue::from_str(frontend_url.trim_end_matches('/')) {
        Ok(origin) => layer.allow_origin(origin).allow_credentials(true),
        Err(err) => {
            warn!(?err, frontend_url, "invalid frontend origin; allowing any origin");
            layer.allow_origin(Any)
        }
    }
}

async fn health_handler(State(state): State<ServeState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().timestamp_millis(),
        "sessions": state.sessions.len(),
        "startedAt": state.started_at,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
