use std::future::Future;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap},
};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::models::{Role, User};
use crate::error::AppError;
use crate::routes::{created, ok, ok_message, ApiResult};
use crate::validation::{is_valid_email, is_valid_phone, Checks, Payload};
use crate::{db, AppState};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    exp: usize,
}

/// Caller identity taken from a verified bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    fn from_request_parts(parts: &mut Parts, state: &AppState) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Authentication("Access token is required".to_string()))
            .and_then(|token| verify_token(&state.config.jwt_secret, token));
        async move { result }
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    fn from_request_parts(parts: &mut Parts, state: &AppState) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let user = AuthenticatedUser::from_request_parts(parts, state);
        async move {
            let user = user.await?;
            if !user.is_admin() {
                return Err(AppError::Authorization(
                    "You do not have permission to access this resource".to_string(),
                ));
            }
            Ok(AdminUser(user))
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn issue_token(secret: &str, ttl: std::time::Duration, user_id: &str, role: Role) -> Result<String, AppError> {
    let exp = Utc::now().timestamp() as u64 + ttl.as_secs();
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: exp as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).map_err(|e| {
        tracing::error!("JWT creation failed: {}", e);
        AppError::Internal("Failed to create token".to_string())
    })
}

pub fn verify_token(secret: &str, token: &str) -> Result<AuthenticatedUser, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => {
            tracing::debug!("Token error: {}", e);
            AppError::InvalidToken
        }
    })?;
    Ok(AuthenticatedUser {
        id: data.claims.sub,
        role: data.claims.role,
    })
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("Password task failed: {}", e)))?
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    user_id: String,
    token: String,
    role: Role,
    name: String,
    email: String,
}

fn auth_response(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    let token = issue_token(
        &state.config.jwt_secret,
        state.config.jwt_expires_in,
        &user.id,
        user.role,
    )?;
    Ok(AuthResponse {
        user_id: user.id,
        token,
        role: user.role,
        name: user.name,
        email: user.email,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Payload(payload): Payload<RegisterRequest>,
) -> ApiResult {
    let name = payload.name.unwrap_or_default().trim().to_string();
    let email = payload.email.unwrap_or_default().trim().to_lowercase();
    let phone = payload.phone.unwrap_or_default().trim().to_string();
    let password = payload.password.unwrap_or_default();

    Checks::new()
        .char_len(&name, "name", 2, 100)
        .require(is_valid_email(&email), "email", "Please provide a valid email")
        .require(is_valid_phone(&phone), "phone", "Phone number must be 10 digits")
        .require(
            password.chars().count() >= 6,
            "password",
            "Password must be at least 6 characters",
        )
        .finish()?;

    if db::users::find_user_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }

    let password_hash = run_blocking(move || hash_password(&password)).await?;
    // Self-registration never grants admin.
    let user = db::users::create_user(&state.db, &name, &email, &phone, &password_hash, Role::Donor).await?;
    tracing::info!(user_id = %user.id, "Registered new donor");

    Ok(created(auth_response(&state, user)?, "User registered successfully"))
}

pub async fn login(
    State(state): State<AppState>,
    Payload(payload): Payload<LoginRequest>,
) -> ApiResult {
    let email = payload.email.unwrap_or_default().trim().to_lowercase();
    let password = payload.password.unwrap_or_default();

    Checks::new()
        .require(is_valid_email(&email), "email", "Please provide a valid email")
        .require(!password.is_empty(), "password", "Password is required")
        .finish()?;

    let invalid = || AppError::Authentication("Invalid email or password".to_string());
    let user = db::users::find_user_by_email(&state.db, &email)
        .await?
        .ok_or_else(invalid)?;

    let stored = user.password_hash.clone();
    let matches = run_blocking(move || Ok(verify_password(&password, &stored))).await?;
    if !matches {
        tracing::info!(user_id = %user.id, "Rejected login with wrong password");
        return Err(invalid());
    }

    Ok(ok_message(auth_response(&state, user)?, "Login successful"))
}

pub async fn me(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult {
    let profile = db::users::find_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(ok(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn token_round_trip_keeps_role() {
        let token = issue_token(SECRET, Duration::from_secs(3600), "u1", Role::Admin).expect("token");
        let user = verify_token(SECRET, &token).expect("valid token");
        assert_eq!(user.id, "u1");
        assert!(user.is_admin());
    }

    #[test]
    fn wrong_secret_and_expiry_are_distinguished() {
        let token = issue_token(SECRET, Duration::from_secs(3600), "u1", Role::Donor).expect("token");
        assert!(matches!(verify_token("other", &token), Err(AppError::InvalidToken)));

        let claims = Claims {
            sub: "u1".into(),
            role: Role::Donor,
            exp: (Utc::now().timestamp() - 3_600) as usize,
        };
        let expired = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes()))
            .expect("encode");
        assert!(matches!(verify_token(SECRET, &expired), Err(AppError::TokenExpired)));
        assert!(matches!(verify_token(SECRET, "garbage"), Err(AppError::InvalidToken)));
    }

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("s3cret-pass").expect("hash");
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret-pass", "not-a-hash"));
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Token abc".parse().expect("header"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().expect("header"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
