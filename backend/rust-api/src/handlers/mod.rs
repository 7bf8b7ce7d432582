use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics;
use crate::services::{
    hunt_service::CreateHuntError, progress_engine::TransitionRejection,
    session_service::SessionError, AppState,
};

pub mod achievements;
pub mod hunts;
pub mod sessions;
pub mod sse;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Rejected(TransitionRejection),
    Internal(String),
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Request failed: {:#}", err);
        ApiError::Internal("Internal server error".to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => ApiError::not_found("Session not found"),
            SessionError::HuntNotFound => ApiError::not_found("Hunt not found"),
            SessionError::Forbidden => {
                ApiError::Forbidden("Session belongs to another user".to_string())
            }
            SessionError::Rejected(rejection) => ApiError::Rejected(rejection),
            SessionError::Internal(err) => err.into(),
        }
    }
}

impl From<CreateHuntError> for ApiError {
    fn from(err: CreateHuntError) -> Self {
        match err {
            CreateHuntError::Invalid(e) => ApiError::bad_request(e.to_string()),
            CreateHuntError::Storage(e) => e.into(),
        }
    }
}

fn rejection_details(rejection: &TransitionRejection) -> Value {
    match rejection {
        TransitionRejection::NotActive(status) => json!({ "status": status }),
        TransitionRejection::WrongClue {
            expected,
            submitted,
        } => json!({ "expected": expected, "submitted": submitted }),
        TransitionRejection::TooFar {
            distance_m,
            radius_m,
        } => json!({ "distance_m": distance_m, "radius_m": radius_m }),
        TransitionRejection::WrongAnswer | TransitionRejection::NoHintAvailable => json!({}),
    }
}

fn message_body(status: StatusCode, message: String) -> (StatusCode, Value) {
    (
        status,
        json!({
            "message": message,
            "status": status.as_u16(),
        }),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => message_body(StatusCode::BAD_REQUEST, message),
            ApiError::Forbidden(message) => message_body(StatusCode::FORBIDDEN, message),
            ApiError::NotFound(message) => message_body(StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => message_body(StatusCode::INTERNAL_SERVER_ERROR, message),
            ApiError::Rejected(rejection) => {
                let status = StatusCode::UNPROCESSABLE_ENTITY;
                let body = json!({
                    "code": rejection.code(),
                    "message": rejection.to_string(),
                    "details": rejection_details(&rejection),
                    "status": status.as_u16(),
                });
                (status, body)
            }
        };
        (status, Json(body)).into_response()
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();

    let session_store = check_dependency(
        "Session store",
        Duration::from_secs(1),
        state.session_store.ping(),
    )
    .await;
    let achievement_store = check_dependency(
        "Achievement store",
        Duration::from_millis(500),
        state.achievement_store.ping(),
    )
    .await;

    let all_healthy = [&session_store, &achievement_store]
        .iter()
        .all(|dep| dep.get("status").and_then(|v| v.as_str()) == Some("healthy"));

    dependencies.insert("session_store".to_string(), json!(session_store));
    dependencies.insert("achievement_store".to_string(), json!(achievement_store));

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "treasurehunt-api",
            "version": env!("CARGO_PKG_VERSION"),
            "live_sessions": state.sessions.live_count().await,
            "dependencies": dependencies
        })),
    )
}

async fn check_dependency<F>(
    name: &str,
    timeout: Duration,
    ping: F,
) -> serde_json::Map<String, Value>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let mut result = serde_json::Map::new();

    match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(())) => {
            result.insert("status".to_string(), json!("healthy"));
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{} error: {}", name, e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert(
                "error".to_string(),
                json!(format!("{} timeout after {}ms", name, timeout.as_millis())),
            );
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// HTTP Basic auth for `/metrics`. Expected credentials come from
/// `METRICS_AUTH` as `username:password`.
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    if credentials != expected {
        tracing::warn!("Rejected /metrics request with invalid credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
