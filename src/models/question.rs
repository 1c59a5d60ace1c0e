// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::submission::{Level, Step};

/// Represents the 'questions' table in the database.
/// The admin-managed bank students draw their answer sheets from; each step
/// holds at most `QUESTIONS_PER_STEP` of them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Question {
    pub id: Uuid,
    pub question: String,
    pub image_url: Option<String>,
    pub step: Step,
    /// Competency level this question targets.
    pub level: Level,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating a question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, message = "Question text is required."))]
    pub question: String,
    #[validate(url(message = "Image reference must be a valid URL."))]
    pub image_url: Option<String>,
    pub step: Step,
    pub level: Level,
}

/// DTO for patching a question.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, message = "Question text is required."))]
    pub question: Option<String>,
    #[validate(url(message = "Image reference must be a valid URL."))]
    pub image_url: Option<String>,
    pub step: Option<Step>,
    pub level: Option<Level>,
}
