// src/handlers/submissions.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam_config::ExamConfig,
        submission::{
            CreateSubmissionRequest, Level, QuestionAnswer, Step, Submission,
            UpdateSubmissionRequest,
        },
        user::{Role, User},
    },
    state::AppState,
    utils::{jwt::require_role, notify::CertificateNotice},
};

/// Maps a graded answer set to a competency level.
///
/// Percentage is normalized by the number of submitted answers; the
/// intervals are half-open with an inclusive lower bound. Pure function.
fn compute_level(answers: &[QuestionAnswer]) -> Level {
    let total = answers.len();
    if total == 0 {
        return Level::Fail;
    }

    let correct = answers.iter().filter(|a| a.correct == Some(true)).count();
    let percentage = (correct as f64 / total as f64) * 100.0;

    if percentage < 25.0 {
        Level::Fail
    } else if percentage < 50.0 {
        Level::One
    } else if percentage < 75.0 {
        Level::Two
    } else {
        Level::ReadyToProceed
    }
}

/// Step-progression gate for a new attempt.
///
/// `existing` is the live submission for this (student, step), if any:
/// `Some(None)` means ungraded, `Some(Some(level))` graded. `prerequisite_level`
/// is the graded level of the prior step, if that submission exists.
fn check_step_eligibility(
    step: Step,
    existing: Option<Option<Level>>,
    prerequisite_level: Option<Level>,
) -> Result<(), AppError> {
    match existing {
        Some(None) => {
            return Err(AppError::BadRequest(
                "You cannot resubmit before evaluation".to_string(),
            ));
        }
        // A failed step A is terminal; there is no retake path.
        Some(Some(Level::Fail)) if step == Step::A => {
            return Err(AppError::BadRequest(
                "You cannot resubmit after failing step A. Contact your instructor for further assistance."
                    .to_string(),
            ));
        }
        _ => {}
    }

    if let Some(prerequisite) = step.prerequisite()
        && prerequisite_level != Some(Level::ReadyToProceed)
    {
        return Err(AppError::BadRequest(format!(
            "You are not eligible to submit step {}. Please ensure you have completed step {} with ready to proceed level.",
            step.label(),
            prerequisite.label(),
        )));
    }

    Ok(())
}

/// Deadline Enforcer: the student's window closes a configurable number of
/// minutes after the submission was created.
fn is_past_deadline(
    created_at: DateTime<Utc>,
    exam_length_in_minutes: i32,
    now: DateTime<Utc>,
) -> bool {
    now > created_at + Duration::minutes(i64::from(exam_length_in_minutes))
}

/// Creates a submission for the current student.
///
/// Checks step eligibility against prior submissions, then replaces any
/// existing attempt for the same step atomically: the delete and the insert
/// share one transaction, so a failed insert leaves the old attempt intact.
pub async fn create_submission(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<CreateSubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Student])?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = state.pool.begin().await?;

    let existing = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE submitted_by = $1 AND step = $2 FOR UPDATE",
    )
    .bind(actor.id)
    .bind(payload.step)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch existing submission: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let prerequisite_level = match payload.step.prerequisite() {
        Some(prerequisite) => sqlx::query_scalar::<_, Option<Level>>(
            "SELECT level FROM submissions WHERE submitted_by = $1 AND step = $2",
        )
        .bind(actor.id)
        .bind(prerequisite)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch prerequisite submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .flatten(),
        None => None,
    };

    check_step_eligibility(
        payload.step,
        existing.as_ref().map(|s| s.level),
        prerequisite_level,
    )?;

    // Retake: replace the prior attempt all-or-nothing.
    if let Some(existing) = &existing {
        sqlx::query("DELETE FROM submissions WHERE id = $1")
            .bind(existing.id)
            .execute(&mut *tx)
            .await?;
    }

    let submission = sqlx::query_as::<_, Submission>(
        "INSERT INTO submissions (submitted_by, step, questions_and_answers) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(actor.id)
    .bind(payload.step)
    .bind(sqlx::types::Json(&payload.questions_and_answers))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create submission: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(submission)))
}

/// Lists submissions. Students see only their own; supervisors and admins
/// see everything.
pub async fn list_submissions(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin, Role::Supervisor, Role::Student])?;

    let submissions = if actor.role == Role::Student {
        sqlx::query_as::<_, Submission>(
            "SELECT * FROM submissions WHERE submitted_by = $1 ORDER BY created_at DESC",
        )
        .bind(actor.id)
        .fetch_all(&state.pool)
        .await
    } else {
        sqlx::query_as::<_, Submission>("SELECT * FROM submissions ORDER BY created_at DESC")
            .fetch_all(&state.pool)
            .await
    }
    .map_err(|e| {
        tracing::error!("Failed to list submissions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(submissions))
}

/// Fetches a single submission by id. Admin only.
pub async fn get_submission(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;

    let submission = sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound("Submission not found".to_string()))?;

    Ok(Json(submission))
}

/// Updates a submission.
///
/// Students may replace their own answer list while the exam window is
/// open, and never with correctness flags. Supervisors grade: the incoming
/// flags (or the stored ones) drive the level, and level, corrections and
/// examiner are persisted together.
pub async fn update_submission(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Student, Role::Supervisor])?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    // Row-locked transaction: the checks and the write must see the same
    // submission, and a concurrent delete must surface as NotFound, not as
    // a failed update.
    let mut tx = state.pool.begin().await?;

    let submission =
        sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch submission: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?
            .ok_or(AppError::NotFound("Submission not found".to_string()))?;

    let updated = match actor.role {
        Role::Student => {
            let self_grading = payload
                .questions_and_answers
                .as_deref()
                .is_some_and(|qa| qa.iter().any(|a| a.correct == Some(true)));

            if submission.submitted_by != actor.id || self_grading {
                return Err(AppError::Forbidden(
                    "You do not have permission to update this submission".to_string(),
                ));
            }

            // Config is read at every mutation; it may have changed since
            // the submission was created.
            let config = sqlx::query_as::<_, ExamConfig>("SELECT * FROM exam_config LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(AppError::InternalServerError(
                    "Exam config is not seeded".to_string(),
                ))?;

            if is_past_deadline(submission.created_at, config.exam_length_in_minutes, Utc::now()) {
                return Err(AppError::Forbidden(
                    "The exam window for this submission has closed".to_string(),
                ));
            }

            let answers = payload
                .questions_and_answers
                .ok_or(AppError::BadRequest("No changes supplied".to_string()))?;

            sqlx::query_as::<_, Submission>(
                "UPDATE submissions SET questions_and_answers = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
            )
            .bind(sqlx::types::Json(&answers))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?
        }
        Role::Supervisor => {
            let answers = payload
                .questions_and_answers
                .unwrap_or_else(|| submission.questions_and_answers.0.clone());

            let level = compute_level(&answers);

            // One statement: corrections, level and examiner land together.
            sqlx::query_as::<_, Submission>(
                "UPDATE submissions SET questions_and_answers = $1, level = $2, examined_by = $3, updated_at = NOW() WHERE id = $4 RETURNING *",
            )
            .bind(sqlx::types::Json(&answers))
            .bind(level)
            .bind(actor.id)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?
        }
        // The role gate above rejects admins; kept for exhaustiveness.
        Role::Admin => {
            return Err(AppError::Forbidden(
                "You do not have permission to update this submission".to_string(),
            ));
        }
    };

    tx.commit().await?;

    Ok(Json(updated))
}

/// Deletes a submission unconditionally. Supervisor/Admin.
pub async fn delete_submission(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Supervisor, Role::Admin])?;

    let deleted = sqlx::query("DELETE FROM submissions WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("Submission not found".to_string()));
    }

    Ok(Json(json!({ "message": "Submission deleted successfully" })))
}

/// Triggers the certificate notification for a finalized, passing
/// submission owned by the current student. Delivery is the notifier's job;
/// this handler only decides whether it may happen.
pub async fn send_certificate(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&actor, &[Role::Student])?;

    let submission = sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound("Submission not found".to_string()))?;

    if submission.submitted_by != actor.id {
        return Err(AppError::Forbidden(
            "You do not have permission to access this submission".to_string(),
        ));
    }

    let level = match submission.level {
        None => {
            return Err(AppError::BadRequest(
                "Submission has not been evaluated yet".to_string(),
            ));
        }
        Some(Level::Fail) => {
            return Err(AppError::BadRequest(
                "No certificate is issued for a failed submission".to_string(),
            ));
        }
        Some(level) => level,
    };

    let examiner_name = match submission.examined_by {
        Some(examiner_id) => {
            sqlx::query_scalar::<_, Option<String>>("SELECT name FROM users WHERE id = $1")
                .bind(examiner_id)
                .fetch_optional(&state.pool)
                .await?
                .flatten()
        }
        None => None,
    };

    state
        .notifier
        .send_certificate(CertificateNotice {
            recipient_email: actor.email.clone(),
            recipient_name: actor.name.clone(),
            step: submission.step.label(),
            level: level.label(),
            examiner_name,
        })
        .await?;

    Ok(Json(json!({ "message": "Certificate sent successfully" })))
}
