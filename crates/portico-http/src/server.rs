//! Axum router serving applied functions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use portico_types::{CallError, ErrorBody};
use serde_json::Value;
use tracing::debug;

use crate::portal::HttpShared;

pub(crate) fn router(shared: Arc<HttpShared>) -> Router {
    Router::new()
        .route("/call/{*name}", post(handle_call))
        .route("/health", get(handle_health))
        .with_state(shared)
}

async fn handle_health() -> StatusCode {
    StatusCode::OK
}

async fn handle_call(
    State(shared): State<Arc<HttpShared>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let Some(function) = shared.local_function(&name) else {
        return error_response(
            StatusCode::NOT_FOUND,
            ErrorBody::new(404, format!("function not found: {name}")),
        );
    };

    // An empty body means "no params", matching the client side.
    let params: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    ErrorBody::new(400, format!("invalid request body: {e}")),
                );
            }
        }
    };

    debug!(function = %name, "inbound http call");
    match function.call(params).await {
        Ok(result) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            result.to_string(),
        )
            .into_response(),
        Err(CallError::Function(body)) => {
            let status = StatusCode::from_u16(u16::try_from(body.code).unwrap_or(500))
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(status, body)
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new(500, e.to_string()),
        ),
    }
}

fn error_response(status: StatusCode, body: ErrorBody) -> Response {
    let payload = serde_json::json!({ "error": body });
    (
        status,
        [("content-type", "application/json")],
        payload.to_string(),
    )
        .into_response()
}
