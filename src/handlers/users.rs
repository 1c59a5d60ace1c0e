// src/handlers/users.rs

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
    error::AppError,
    models::user::{CreateUserRequest, Role, UpdateUserRequest, User},
    state::AppState,
    utils::jwt::require_role,
};

/// Creates a user with an explicit role. Admin only.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.trim().to_lowercase();

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, name, role) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&email)
    .bind(&payload.name)
    .bind(payload.role)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        // Postgres error code for unique violation is 23505
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Email '{}' already exists", email))
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Lists all users. Admin only.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list users: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(users))
}

/// Fetches a single user by id. Admin only.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Updates a user record.
///
/// Admins may update anyone, including role and active status. Students and
/// supervisors may only update their own name and email.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin, Role::Student, Role::Supervisor])?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if actor.role != Role::Admin {
        if actor.id != id {
            return Err(AppError::Forbidden(
                "You do not have permission to update this user".to_string(),
            ));
        }
        if payload.role.is_some() || payload.active.is_some() {
            return Err(AppError::Forbidden(
                "Only administrators can change role or active status".to_string(),
            ));
        }
    }

    let email = payload.email.as_deref().map(|e| e.trim().to_lowercase());

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET \
            email = COALESCE($1, email), \
            name = COALESCE($2, name), \
            role = COALESCE($3, role), \
            active = COALESCE($4, active) \
         WHERE id = $5 RETURNING *",
    )
    .bind(email)
    .bind(&payload.name)
    .bind(payload.role)
    .bind(payload.active)
    .bind(id)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict("Email already exists".to_string())
        } else {
            tracing::error!("Failed to update user: {:?}", e);
            AppError::from(e)
        }
    })?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Deactivates a user. Admin only.
///
/// Deletion is logical: the row stays so submission foreign keys keep
/// resolving, but the user can no longer log in.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    let updated = sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to deactivate user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(Json(json!({ "message": "User deleted successfully" })))
}
