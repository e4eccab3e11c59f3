//! User accounts and bearer-token authentication.
//!
//! Tokens are HS256 JWTs carrying the user id and username, valid for seven
//! days. Passwords are bcrypt-hashed; the hash never leaves this module.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::{error::AppError, state::AppState};

const TOKEN_TTL_DAYS: i64 = 7;
const BCRYPT_COST: u32 = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub exp: i64,
}

pub fn issue_token(secret: &str, user_id: i64, username: &str) -> Result<String, AppError> {
    let claims = Claims {
        user_id,
        username: username.to_string(),
        exp: (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Store(anyhow::anyhow!("failed to sign token: {e}")))
}

fn verify_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::InvalidToken)
}

/// The authenticated caller, extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::MissingToken)?;

        let token = header.strip_prefix("Bearer ").ok_or(AppError::MissingToken)?;
        let claims = verify_token(&state.config.secret_key, token)?;

        Ok(AuthUser {
            id: claims.user_id,
            username: claims.username,
        })
    }
}

#[derive(Deserialize)]
pub struct RegisterPayload {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (Some(username), Some(email), Some(password)) =
        (payload.username, payload.email, payload.password)
    else {
        return Err(AppError::Validation("All fields are required".to_string()));
    };

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::Validation("All fields are required".to_string()));
    }

    if state.db.user_exists(username.clone(), email.clone()).await? {
        return Err(AppError::Validation("User already exists".to_string()));
    }

    let hash = bcrypt::hash(&password, BCRYPT_COST)
        .map_err(|e| AppError::Store(anyhow::anyhow!("failed to hash password: {e}")))?;

    let user_id = state.db.insert_user(username.clone(), email, hash).await?;
    let token = issue_token(&state.config.secret_key, user_id, &username)?;

    info!("Registered user {username}");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Successfully registered",
            "success": true,
            "token": token,
        })),
    ))
}

#[derive(Deserialize)]
pub struct LoginPayload {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<Value>, AppError> {
    let Some(password) = payload.password else {
        return Err(AppError::Validation(
            "Username or email and password required".to_string(),
        ));
    };

    let user = match (payload.username, payload.email) {
        (Some(username), _) if !username.is_empty() => {
            state.db.find_user_by_username(username).await?
        }
        (_, Some(email)) if !email.is_empty() => state.db.find_user_by_email(email).await?,
        _ => {
            return Err(AppError::Validation(
                "Username or email and password required".to_string(),
            ))
        }
    };

    let Some(user) = user else {
        return Err(AppError::Unauthorized("User does not exist".to_string()));
    };

    let matches = bcrypt::verify(&password, &user.password_hash)
        .map_err(|e| AppError::Store(anyhow::anyhow!("failed to verify password: {e}")))?;
    if !matches {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = issue_token(&state.config.secret_key, user.id, &user.username)?;

    Ok(Json(json!({
        "message": "Login successful",
        "success": true,
        "token": token,
    })))
}

pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let Some(user) = state.db.find_user_by_id(user.id).await? else {
        return Err(AppError::NotFound("User not found".to_string()));
    };

    Ok(Json(json!({
        "user": {
            "id": user.id,
            "username": user.username,
            "email": user.email,
        }
    })))
}

pub async fn logout_handler() -> Json<Value> {
    Json(json!({ "message": "Logged out (stateless)" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips() {
        let token = issue_token("test-secret", 7, "alice").unwrap();
        let claims = verify_token("test-secret", &token).unwrap();

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "alice");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("test-secret", 7, "alice").unwrap();
        assert!(matches!(
            verify_token("other-secret", &token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(matches!(
            verify_token("test-secret", "not.a.jwt"),
            Err(AppError::InvalidToken)
        ));
    }
}
