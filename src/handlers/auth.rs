// src/handlers/auth.rs

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::SET_COOKIE},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::json;
use validator::Validate;

use crate::{
    config::{
        ACCESS_TOKEN_TTL_SECS, OTP_LOCKOUT_MINUTES, OTP_MAX_FAILED_ATTEMPTS, OTP_TTL_MINUTES,
        REFRESH_TOKEN_TTL_SECS,
    },
    error::AppError,
    models::user::{LoginRequest, RequestOtpRequest, User},
    state::AppState,
    utils::{
        hash::{hash_otp, verify_otp},
        jwt::{refresh_cookie, sign_token},
    },
};

/// Emails are matched case-insensitively; the stored form is canonical.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Lockout policy: after the threshold, suspend logins for a fixed window
/// counted from the failing attempt.
fn lockout_expiry(failed_attempts: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (failed_attempts >= OTP_MAX_FAILED_ATTEMPTS)
        .then(|| now + Duration::minutes(OTP_LOCKOUT_MINUTES))
}

/// Issues a one-time passcode for the given email.
///
/// Unknown emails are auto-registered as students. The code is stored as an
/// Argon2 hash with a 3-minute expiry, replacing any pending OTP. The
/// failed-attempt counter is untouched: requesting codes is not a strike.
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<RequestOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = normalize_email(&payload.email);

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up user for OTP request: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let user = match user {
        Some(user) => user,
        None => sqlx::query_as::<_, User>("INSERT INTO users (email) VALUES ($1) RETURNING *")
            .bind(&email)
            .fetch_one(&state.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to auto-register user: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?,
    };

    let otp = format!("{}", rand::thread_rng().gen_range(10000..=99999));
    let hashed_otp = hash_otp(&otp)?;

    sqlx::query("UPDATE users SET otp = $1, otp_expires_at = $2 WHERE id = $3")
        .bind(&hashed_otp)
        .bind(Utc::now() + Duration::minutes(OTP_TTL_MINUTES))
        .bind(user.id)
        .execute(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store OTP: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    tracing::info!(email = %email, "OTP issued");

    // TODO: deliver the code out-of-band; the demo flag below is the only
    // delivery path right now.
    if state.config.expose_otp {
        return Ok(Json(json!({
            "message": "OTP generated successfully",
            "otp": otp,
        })));
    }

    Ok(Json(json!({
        "message": "OTP generated successfully",
    })))
}

/// Verifies an OTP and opens a session.
///
/// The whole verification is one row-locked transaction so that concurrent
/// attempts serialize against the lockout counter. Ordering matters: the
/// lockout check runs first, then an expired lock resets the attempt window,
/// then expiry, then the hash comparison. OTP fields are cleared only on
/// success so expiry still applies to retries.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = normalize_email(&payload.email);
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;

    let mut user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE email = $1 AND active = TRUE FOR UPDATE",
    )
    .bind(&email)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    if let Some(locked_until) = user.locked_until {
        if now < locked_until {
            return Err(AppError::LockedOut(
                "Too many failed attempts. Try again later.".to_string(),
            ));
        }
        // Lock has expired: the next attempt starts a fresh window,
        // counted from zero.
        sqlx::query("UPDATE users SET failed_otp_attempts = 0, locked_until = NULL WHERE id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        user.failed_otp_attempts = 0;
        user.locked_until = None;
    }

    let otp_hash = match (&user.otp, user.otp_expires_at) {
        (Some(hash), Some(expires_at)) if now <= expires_at => hash.clone(),
        _ => {
            // Persist the window reset even though this attempt fails.
            tx.commit().await?;
            return Err(AppError::AuthError("OTP expired".to_string()));
        }
    };

    if !verify_otp(&payload.otp, &otp_hash)? {
        let failed_attempts = user.failed_otp_attempts + 1;
        let locked_until = lockout_expiry(failed_attempts, now);

        sqlx::query("UPDATE users SET failed_otp_attempts = $1, locked_until = $2 WHERE id = $3")
            .bind(failed_attempts)
            .bind(locked_until)
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    // Success: clear the OTP and the lockout state together.
    sqlx::query(
        "UPDATE users SET otp = NULL, otp_expires_at = NULL, failed_otp_attempts = 0, locked_until = NULL WHERE id = $1",
    )
    .bind(user.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let access_token = sign_token(user.id, &state.config.access_token_secret, ACCESS_TOKEN_TTL_SECS)?;
    let refresh_token = sign_token(
        user.id,
        &state.config.refresh_token_secret,
        REFRESH_TOKEN_TTL_SECS,
    )?;

    // The refresh token travels only in an HttpOnly cookie, never in a body.
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, refresh_cookie(&refresh_token)?);

    tracing::info!(user_id = %user.id, "Login successful");

    Ok((
        headers,
        Json(json!({
            "access_token": access_token,
            "user": {
                "id": user.id,
                "name": user.name,
                "email": user.email,
                "role": user.role,
            },
        })),
    ))
}
