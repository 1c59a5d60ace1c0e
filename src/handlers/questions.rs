// src/handlers/questions.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::QUESTIONS_PER_STEP,
    error::AppError,
    models::{
        question::{CreateQuestionRequest, Question, UpdateQuestionRequest},
        submission::Step,
        user::{Role, User},
    },
    state::AppState,
    utils::jwt::require_role,
};

/// Bank-size gate: each step holds at most `QUESTIONS_PER_STEP` questions.
fn check_step_capacity(count: i64) -> Result<(), AppError> {
    if count >= QUESTIONS_PER_STEP {
        return Err(AppError::BadRequest(format!(
            "You can only create a maximum of {} questions for each step.",
            QUESTIONS_PER_STEP,
        )));
    }
    Ok(())
}

async fn count_questions_of_step(
    tx: &mut sqlx::PgConnection,
    step: Step,
) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions WHERE step = $1")
        .bind(step)
        .fetch_one(tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count questions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;
    Ok(count)
}

/// Creates a question. Admin only.
///
/// The per-step cap is checked and the insert performed in one transaction
/// so concurrent creates cannot overshoot it.
pub async fn create_question(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = state.pool.begin().await?;

    let count = count_questions_of_step(&mut tx, payload.step).await?;
    check_step_capacity(count)?;

    let question = sqlx::query_as::<_, Question>(
        "INSERT INTO questions (question, image_url, step, level) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(&payload.question)
    .bind(&payload.image_url)
    .bind(payload.step)
    .bind(payload.level)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Lists the question bank. Admins manage it; students read it to fill in
/// their answer sheets.
pub async fn list_questions(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin, Role::Student])?;

    let questions =
        sqlx::query_as::<_, Question>("SELECT * FROM questions ORDER BY step, created_at")
            .fetch_all(&state.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list questions: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

    Ok(Json(questions))
}

/// Fetches a single question by id. Admin only.
pub async fn get_question(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    let question = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Updates a question. Admin only.
///
/// Moving a question to another step re-checks that step's capacity.
pub async fn update_question(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = state.pool.begin().await?;

    let existing = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    if let Some(step) = payload.step
        && step != existing.step
    {
        let count = count_questions_of_step(&mut tx, step).await?;
        check_step_capacity(count)?;
    }

    let question = sqlx::query_as::<_, Question>(
        "UPDATE questions SET \
            question = COALESCE($1, question), \
            image_url = COALESCE($2, image_url), \
            step = COALESCE($3, step), \
            level = COALESCE($4, level), \
            updated_at = NOW() \
         WHERE id = $5 RETURNING *",
    )
    .bind(&payload.question)
    .bind(&payload.image_url)
    .bind(payload.step)
    .bind(payload.level)
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tx.commit().await?;

    Ok(Json(question))
}

/// Deletes a question. Admin only.
pub async fn delete_question(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    let deleted = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(Json(json!({ "message": "Question deleted successfully" })))
}
