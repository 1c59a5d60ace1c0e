// src/models/submission.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Sequential evaluation stages. B requires a passing A, C a passing B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "evaluation_step")]
pub enum Step {
    A,
    B,
    C,
}

impl Step {
    /// The step whose result gates entry into this one.
    pub fn prerequisite(self) -> Option<Step> {
        match self {
            Step::A => None,
            Step::B => Some(Step::A),
            Step::C => Some(Step::B),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::A => "A",
            Step::B => "B",
            Step::C => "C",
        }
    }
}

/// Graded outcome of a submission, computed from the correctness percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "evaluation_level")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Fail,
    One,
    Two,
    ReadyToProceed,
}

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Level::Fail => "FAIL",
            Level::One => "ONE",
            Level::Two => "TWO",
            Level::ReadyToProceed => "READY_TO_PROCEED",
        }
    }
}

/// One question/answer pair inside a submission.
/// `correct` stays `None` until a supervisor marks it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
}

/// Represents the 'submissions' table in the database.
/// One evaluation attempt for one (student, step) pair.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Submission {
    pub id: Uuid,
    pub submitted_by: Uuid,
    pub step: Step,
    pub questions_and_answers: sqlx::types::Json<Vec<QuestionAnswer>>,
    /// Set only after a supervisor grades the attempt.
    pub level: Option<Level>,
    pub examined_by: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for a student starting a step.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubmissionRequest {
    pub step: Step,
    #[validate(length(min = 1, message = "At least one answer is required."))]
    pub questions_and_answers: Vec<QuestionAnswer>,
}

/// DTO for patching a submission. Students replace the answer list;
/// supervisors additionally set correctness flags, which drive the level.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSubmissionRequest {
    #[validate(length(min = 1, message = "At least one answer is required."))]
    pub questions_and_answers: Option<Vec<QuestionAnswer>>,
}
