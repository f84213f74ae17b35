use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{entity::Users, error::AppError, state::AppState};

#[derive(Debug, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
    /// Login session id; tokens minted without one share a session per user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
    pub session_id: String,
}

/// An authenticated user who is allowed to buy.
#[derive(Debug, Clone)]
pub struct Customer(pub AuthUser);

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, "admin")
}

/// Decode the bearer token in `headers`.
pub fn authenticate(headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err(AppError::Unauthorized("Invalid Authorization scheme".into()));
    };

    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

    let decoded = decode::<Claims>(
        token.trim(),
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

    let session_id = decoded
        .claims
        .sid
        .filter(|sid| !sid.is_empty())
        .unwrap_or_else(|| decoded.claims.sub.clone());

    Ok(AuthUser {
        user_id,
        role: decoded.claims.role,
        session_id,
    })
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers)
    }
}

impl FromRequestParts<AppState> for Customer {
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let account = Users::find_by_id(user.user_id).one(&state.orm).await?;
        match account {
            Some(account) if !account.banned => Ok(Customer(user)),
            Some(_) => Err(AppError::Forbidden),
            None => Err(AppError::Unauthorized("Unknown user".into())),
        }
    }
}
