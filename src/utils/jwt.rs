// src/utils/jwt.rs

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{REFRESH_TOKEN_TTL_SECS, REFRESHED_ACCESS_TOKEN_TTL_SECS},
    error::AppError,
    models::user::{Role, User},
    state::AppState,
};

/// Cookie carrying the refresh token. HttpOnly, never read by handlers.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Response header carrying an access token minted from a refresh token.
pub const X_ACCESS_TOKEN: &str = "x-access-token";

/// JWT Claims structure. Both token kinds carry the same payload and are
/// told apart only by the secret that signed them.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// Expiration time as Unix timestamp.
    pub exp: i64,
}

/// Signs a token bound to `user_id`, expiring `ttl_secs` from now.
pub fn sign_token(user_id: Uuid, secret: &str, ttl_secs: i64) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a token string.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Builds the Set-Cookie value for the refresh token.
/// SameSite=None (the frontend is a separate origin) requires Secure.
pub fn refresh_cookie(token: &str) -> Result<HeaderValue, AppError> {
    let cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; Secure; SameSite=None; Max-Age={REFRESH_TOKEN_TTL_SECS}"
    );
    HeaderValue::from_str(&cookie).map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Pulls the refresh token out of the Cookie header, if present.
fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == REFRESH_COOKIE_NAME).then(|| value.to_string())
    })
}

/// Single authorization check for an operation entry point: a
/// set-membership test of the caller's role.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&user.role) {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "You do not have permission to access this resource".to_string(),
    ))
}

/// Resolves token claims to a live user row. Soft-deleted users are gone.
async fn resolve_user(pool: &sqlx::PgPool, claims: &Claims) -> Result<User, AppError> {
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND active = TRUE")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to resolve token user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    user.ok_or(AppError::NotFound("User not found".to_string()))
}

/// Axum Middleware: Authentication with transparent refresh.
///
/// Validates the 'Authorization: Bearer <token>' header and injects the
/// resolved `User` into the request extensions. When the access token is
/// absent or stale, falls back to the refresh cookie and, on success, mints
/// a short-lived replacement access token returned to the caller in the
/// `x-access-token` response header. No new session boundary is created.
pub async fn authorize(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    if let Some(token) = bearer
        && let Ok(claims) = verify_token(&token, &state.config.access_token_secret)
    {
        let user = resolve_user(&state.pool, &claims).await?;
        req.extensions_mut().insert(user);
        return Ok(next.run(req).await);
    }

    // Access token missing or stale: fall back to the refresh cookie.
    let refresh = extract_refresh_token(req.headers())
        .ok_or(AppError::AuthError("Access token is required".to_string()))?;

    let claims = verify_token(&refresh, &state.config.refresh_token_secret)
        .map_err(|_| AppError::AuthError("Invalid refresh token, re-authenticate".to_string()))?;

    let user = resolve_user(&state.pool, &claims).await?;

    let new_access_token = sign_token(
        user.id,
        &state.config.access_token_secret,
        REFRESHED_ACCESS_TOKEN_TTL_SECS,
    )?;

    req.extensions_mut().insert(user);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&new_access_token) {
        response.headers_mut().insert(X_ACCESS_TOKEN, value);
    }
    Ok(response)
}
