// src/models/exam_config.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Represents the singleton 'exam_config' row.
/// Seeded once at startup; updates apply in place.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExamConfig {
    pub id: Uuid,
    pub exam_length_in_minutes: i32,
}

/// DTO for updating the exam configuration.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateConfigRequest {
    #[validate(range(min = 1, message = "Exam length must be a positive number of minutes."))]
    pub exam_length_in_minutes: i32,
}
