// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Authorization roles. Every permission check in the system is a
/// set-membership test against this enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Supervisor,
    Student,
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,

    /// Unique email, stored lowercased.
    pub email: String,

    pub name: Option<String>,

    pub role: Role,

    /// Logical-delete flag. Inactive users cannot log in but their
    /// submissions remain readable.
    pub active: bool,

    /// Argon2 hash of the pending OTP. Set together with `otp_expires_at`,
    /// cleared together on successful login.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub otp: Option<String>,

    #[serde(skip)]
    pub otp_expires_at: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(skip)]
    pub failed_otp_attempts: i32,

    #[serde(skip)]
    pub locked_until: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for requesting a one-time passcode.
#[derive(Debug, Deserialize, Validate)]
pub struct RequestOtpRequest {
    #[validate(email(message = "Invalid email format."))]
    pub email: String,
}

/// DTO for logging in with a previously requested OTP.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format."))]
    pub email: String,
    #[validate(length(equal = 5, message = "OTP must be 5 digits."))]
    pub otp: String,
}

/// DTO for Admin creating a user (can specify role).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format."))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters."))]
    pub name: Option<String>,
    pub role: Role,
}

/// DTO for updating a user. Non-admin callers may only touch their own
/// name and email; `role` and `active` are admin-only fields.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Invalid email format."))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters."))]
    pub name: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}
