use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::{
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        JoinHuntRequest, SessionView, SubmitClueRequest, SubmitClueResponse, UseHintResponse,
    },
    services::AppState,
};

/// POST /api/v1/sessions
///
/// 201 for a fresh attempt, 200 when an active one was resumed.
pub async fn join_hunt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<JoinHuntRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!("User {} joining hunt {}", claims.sub, req.hunt_id);

    let response = state.sessions.join_hunt(&claims.sub, &req.hunt_id).await?;
    let status = if response.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(response)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let view = state.sessions.get_session(&session_id, &claims.sub).await?;
    Ok(Json(view))
}

pub async fn submit_clue(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SubmitClueRequest>,
) -> Result<Json<SubmitClueResponse>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    let response = state
        .sessions
        .submit_clue(&session_id, &claims.sub, &req)
        .await?;

    Ok(Json(response))
}

pub async fn use_hint(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<Json<UseHintResponse>, ApiError> {
    let response = state.sessions.use_hint(&session_id, &claims.sub).await?;
    Ok(Json(response))
}

pub async fn abandon(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let view = state.sessions.abandon(&session_id, &claims.sub).await?;
    Ok(Json(view))
}
