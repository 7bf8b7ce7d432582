use axum::{
    extract::{Extension, State},
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::{
    middlewares::auth::JwtClaims,
    models::{AchievementDefinition, UserAchievementsResponse},
    services::AppState,
};

/// GET /api/v1/achievements
pub async fn list_achievements(
    State(state): State<Arc<AppState>>,
) -> Json<&'static [AchievementDefinition]> {
    Json(state.achievements.catalog())
}

/// GET /api/v1/users/me/achievements
pub async fn my_achievements(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<UserAchievementsResponse>, ApiError> {
    let summary = state.achievements.user_summary(&claims.sub).await?;
    Ok(Json(summary))
}
