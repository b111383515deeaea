use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};

use parlor_core::coordinator::Coordinator;
use parlor_core::error::ChatError;
use parlor_db::Database;
use parlor_db::queries::UserInsert;
use parlor_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use parlor_types::models::UserId;

use crate::error::{ApiError, validation};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub coordinator: Arc<Coordinator>,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(validation("username must be between 3 and 32 characters"));
    }
    if req.password.len() < 8 {
        return Err(validation("password must be at least 8 characters"));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("password hashing failed: {e}")))?
        .to_string();

    let user_id = match state
        .db
        .create_user(&req.username, &password_hash)
        .map_err(ChatError::Storage)?
    {
        UserInsert::Created(id) => id,
        UserInsert::UsernameTaken => {
            return Err(ChatError::Conflict("username already taken").into());
        }
    };

    let token = create_token(&state.jwt_secret, user_id, &req.username)
        .map_err(ChatError::Storage)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_username(&req.username)
        .map_err(ChatError::Storage)?
        .ok_or(ChatError::Unauthenticated)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("stored password hash corrupt: {e}")))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ChatError::Unauthenticated)?;

    let token =
        create_token(&state.jwt_secret, user.id, &user.username).map_err(ChatError::Storage)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}

/// Tokens are valid for 30 days.
pub(crate) fn create_token(
    secret: &str,
    user_id: UserId,
    username: &str,
) -> anyhow::Result<String> {
    let exp = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(30))
        .ok_or_else(|| anyhow::anyhow!("clock overflow computing token expiry"))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::verify_token;

    #[test]
    fn token_roundtrip_preserves_claims() {
        let token = create_token("secret", 42, "alice").unwrap();
        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let token = create_token("secret", 7, "bob").unwrap();
        assert!(verify_token("other-secret", &token).is_none());
        assert!(verify_token("secret", "not-a-token").is_none());
        assert!(verify_token("secret", "").is_none());
    }
}
