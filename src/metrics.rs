use action_recorder::metrics as recorder_metrics;
use action_replay::metrics as replay_metrics;
use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use cdp_adapter::metrics as cdp_metrics;
use lazy_static::lazy_static;
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use tracing::error;

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();

lazy_static! {
    static ref ACTIVE_SESSIONS: IntGauge =
        IntGauge::new("webtest_sessions_active", "Open browser sessions")
            .expect("valid metric definition");
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        cdp_metrics::register_metrics(registry);
        recorder_metrics::register_metrics(registry);
        replay_metrics::register_metrics(registry);
        if let Err(err) = registry.register(Box::new(ACTIVE_SESSIONS.clone())) {
            error!(?err, "failed to register session gauge");
        }
    });
}

pub fn set_active_sessions(count: usize) {
    ACTIVE_SESSIONS.set(count as i64);
}

/// Text exposition of every registered metric.
pub fn render() -> Result<(String, String), prometheus::Error> {
    register_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&global_registry().gather(), &mut buffer)?;
    let body = String::from_utf8(buffer)
        .map_err(|err| prometheus::Error::Msg(format!("metrics are not utf-8: {err}")))?;
    Ok((encoder.format_type().to_string(), body))
}

pub async fn metrics_handler() -> Response {
    match render() {
        Ok((format_type, body)) => match HeaderValue::from_str(&format_type) {
            Ok(value) => ([(CONTENT_TYPE, value)], body).into_response(),
            Err(err) => {
                error!(?err, "failed to build content-type header");
                (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
            }
        },
        Err(err) => {
            error!(?err, "failed to encode prometheus metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
        }
    }
}
