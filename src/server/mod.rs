mod router;
mod state;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

pub use router::build_router;
pub use state::ServeState;

use crate::errors::SessionError;

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let Some(step) = self.failed_step() {
            body["step"] = serde_json::to_value(step).unwrap_or(Value::Null);
        }
        (status, Json(body)).into_response()
    }
}
