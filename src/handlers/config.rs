// src/handlers/config.rs

use axum::{
    Json,
    extract::{Extension, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam_config::{ExamConfig, UpdateConfigRequest},
        user::{Role, User},
    },
    state::AppState,
    utils::jwt::require_role,
};

/// Returns the singleton exam configuration. Any authenticated role:
/// students need the exam length for their countdown.
pub async fn get_config(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin, Role::Supervisor, Role::Student])?;

    let config = sqlx::query_as::<_, ExamConfig>("SELECT * FROM exam_config LIMIT 1")
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch exam config: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound("Config not found".to_string()))?;

    Ok(Json(config))
}

/// Updates the singleton exam configuration in place. Admin only.
pub async fn update_config(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<UpdateConfigRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let config = sqlx::query_as::<_, ExamConfig>(
        "UPDATE exam_config SET exam_length_in_minutes = $1 RETURNING *",
    )
    .bind(payload.exam_length_in_minutes)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update exam config: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or(AppError::NotFound("Config not found".to_string()))?;

    Ok(Json(config))
}
