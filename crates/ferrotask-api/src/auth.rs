//! Account registration, session auth, and the magic-link flow.
//!
//! Sessions are opaque random tokens stored server-side; protected routes
//! resolve the bearer token to a `user_id` or answer 401. The sync core
//! only ever sees that `user_id`.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Path, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::routes::AppState;

/// Identity attached to a request once its session resolves.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    email: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    token: String,
    expires_at: String,
    user_id: String,
}

#[derive(Debug, Serialize)]
pub struct MagicLinkResponse {
    message: &'static str,
    /// Handed back directly; this relay does not deliver mail.
    token: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let username = request.username.trim();
    let email = request.email.trim();
    if username.is_empty() || email.is_empty() || request.password.is_empty() {
        return Err(AppError::bad_request(
            "username, email, and password required",
        ));
    }
    if request.password.len() < state.config.min_password_len {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            state.config.min_password_len
        )));
    }

    let hash = hash_password(&request.password)?;
    let user_id = state.store.create_user(username, email, &hash)?;
    tracing::info!(username, "user registered");

    let (token, expires_at) = issue_session(&state, &user_id)?;
    Ok(Json(AuthResponse {
        token,
        expires_at: expires_at.to_rfc3339(),
        user_id,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state
        .store
        .user_by_username(request.username.trim())?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    tracing::info!(username = %user.username, "user logged in");
    let (token, expires_at) = issue_session(&state, &user.id)?;
    Ok(Json(AuthResponse {
        token,
        expires_at: expires_at.to_rfc3339(),
        user_id: user.id,
    }))
}

/// Create a magic link for passwordless login, auto-registering unknown
/// emails.
pub async fn magic_link(
    State(state): State<AppState>,
    Json(request): Json<MagicLinkRequest>,
) -> Result<Json<MagicLinkResponse>, AppError> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(AppError::bad_request("email required"));
    }

    let token = new_token();
    if state.store.user_by_email(email)?.is_none() {
        let username = email.split('@').next().unwrap_or(email);
        tracing::info!(username, "auto-registering magic-link user");
        // Sentinel hash: never verifies, so the account is magic-link only.
        state
            .store
            .create_user(username, email, &format!("MAGIC_LINK_ONLY_{}", &token[..16]))?;
    }

    let expires_at = Utc::now()
        + Duration::from_std(state.config.magic_link_ttl)
            .map_err(|error| AppError::internal(error.to_string()))?;
    state.store.create_magic_link(email, &token, expires_at)?;
    tracing::info!(email, "magic link generated");

    Ok(Json(MagicLinkResponse {
        message: "if email exists, a magic link will be sent",
        token,
    }))
}

pub async fn magic_link_verify(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = state.store.redeem_magic_link(&token)?;
    let user = state
        .store
        .user_by_email(&email)?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

    tracing::info!(email, "magic link login");
    let (session_token, expires_at) = issue_session(&state, &user.id)?;
    Ok(Json(AuthResponse {
        token: session_token,
        expires_at: expires_at.to_rfc3339(),
        user_id: user.id,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = extract_bearer_token(&headers)?;
    state.store.delete_session(token)?;
    Ok(Json(serde_json::json!({ "message": "logged out" })))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = state
        .store
        .user_by_id(&user.user_id)?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
    Ok(Json(serde_json::json!({
        "id": record.id,
        "username": record.username,
        "email": record.email,
    })))
}

/// Middleware guarding the sync endpoints: resolve the bearer session or 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user_id = state
        .store
        .session_user(token)?
        .ok_or_else(|| AppError::unauthorized("invalid or expired token"))?;
    request
        .extensions_mut()
        .insert(AuthenticatedUser { user_id });
    Ok(next.run(request).await)
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

fn issue_session(state: &AppState, user_id: &str) -> Result<(String, DateTime<Utc>), AppError> {
    let token = new_token();
    let expires_at = Utc::now()
        + Duration::from_std(state.config.session_ttl)
            .map_err(|error| AppError::internal(error.to_string()))?;
    state.store.create_session(user_id, &token, expires_at)?;
    Ok((token, expires_at))
}

/// 32 random bytes, hex encoded.
fn new_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AppError::internal(format!("password hashing failed: {error}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_extractor_accepts_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abcdef"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abcdef");
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn bearer_token_extractor_rejects_empty_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn magic_link_sentinel_hash_never_verifies() {
        assert!(!verify_password("anything", "MAGIC_LINK_ONLY_0123456789abcdef"));
    }

    #[test]
    fn tokens_are_unique_and_hex() {
        let a = new_token();
        let b = new_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
