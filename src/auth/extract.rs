use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::models::Profile;
use crate::state::AppState;
use crate::utils::error::AppError;

/// Raw `Authorization: Bearer <token>` value.
pub struct BearerToken(pub String);

fn bearer(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer(parts)
            .map(BearerToken)
            .ok_or_else(|| AppError::AuthError("Missing bearer token".into()))
    }
}

/// The signed-in profile. Rejects the request with 401 otherwise.
pub struct CurrentUser(pub Profile);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)
            .ok_or_else(|| AppError::AuthError("Missing bearer token".into()))?;
        state
            .identity
            .current_user(&token)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| AppError::AuthError("Session expired or invalid".into()))
    }
}

/// The signed-in profile when a valid token is present.
pub struct MaybeUser(pub Option<Profile>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer(parts) {
            Some(token) => Ok(MaybeUser(state.identity.current_user(&token).await?)),
            None => Ok(MaybeUser(None)),
        }
    }
}
