// src/config.rs

use dotenvy::dotenv;
use std::env;

/// OTP validity window.
pub const OTP_TTL_MINUTES: i64 = 3;
/// Failed verifications that trigger a lockout.
pub const OTP_MAX_FAILED_ATTEMPTS: i32 = 5;
/// Lockout duration once the threshold is reached.
pub const OTP_LOCKOUT_MINUTES: i64 = 10;

/// Question-bank cap per step. A full step is also the grading rubric's
/// nominal size, so a complete answer set has this many entries.
pub const QUESTIONS_PER_STEP: i64 = 44;

/// Access token validity for a fresh login.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
/// Refresh token validity.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;
/// Validity of an access token minted from a refresh token.
/// Short on purpose: it is reissued automatically on every request.
pub const REFRESHED_ACCESS_TOKEN_TTL_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub rust_log: String,
    pub admin_email: Option<String>,
    /// When true, `request_otp` returns the plaintext code in the response
    /// body. Demo-grade behavior; keep off anywhere real.
    pub expose_otp: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let access_token_secret =
            env::var("ACCESS_TOKEN_SECRET").expect("ACCESS_TOKEN_SECRET must be set");

        let refresh_token_secret =
            env::var("REFRESH_TOKEN_SECRET").expect("REFRESH_TOKEN_SECRET must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let admin_email = env::var("ADMIN_EMAIL").ok();

        let expose_otp = env::var("EXPOSE_OTP")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            database_url,
            access_token_secret,
            refresh_token_secret,
            rust_log,
            admin_email,
            expose_otp,
        }
    }
}
