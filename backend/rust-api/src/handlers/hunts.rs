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
    models::{CreateHuntRequest, HuntStatus, HuntSummary, HuntView},
    services::AppState,
};

/// GET /api/v1/hunts
pub async fn list_hunts(State(state): State<Arc<AppState>>) -> Json<Vec<HuntSummary>> {
    Json(state.hunts.list_hunts().await)
}

/// GET /api/v1/hunts/{id}
///
/// Drafts are not visible to players; answers and hint texts are withheld.
pub async fn get_hunt(
    State(state): State<Arc<AppState>>,
    Path(hunt_id): Path<String>,
) -> Result<Json<HuntView>, ApiError> {
    let hunt = state
        .hunts
        .get_hunt(&hunt_id)
        .await
        .filter(|hunt| hunt.status == HuntStatus::Published)
        .ok_or_else(|| ApiError::not_found("Hunt not found"))?;

    Ok(Json(hunt.view()))
}

/// POST /api/v1/organizer/hunts
pub async fn create_hunt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateHuntRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    let hunt = state.hunts.create_hunt(req, &claims.sub).await?;

    Ok((StatusCode::CREATED, Json(hunt.view())))
}
