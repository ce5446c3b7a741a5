use axum::extract::State;
use axum::response::Response;
use axum::Json;

use crate::auth::{BearerToken, CurrentUser, SignIn, SignUp};
use crate::models::ProfilePatch;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

pub async fn sign_up(
    State(state): State<AppState>,
    Json(input): Json<SignUp>,
) -> Result<Response, AppError> {
    let session = state.identity.sign_up(input).await?;
    Ok(created(session, "Account created"))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(input): Json<SignIn>,
) -> Result<Response, AppError> {
    let session = state.identity.sign_in(input).await?;
    Ok(success(session, "Signed in"))
}

pub async fn sign_out(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Response, AppError> {
    state.identity.sign_out(&token).await?;
    Ok(empty_success("Signed out"))
}

pub async fn me(CurrentUser(profile): CurrentUser) -> Response {
    success(profile, "Current user")
}

pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
    Json(patch): Json<ProfilePatch>,
) -> Result<Response, AppError> {
    let profile = state.identity.update_profile(profile.id, patch).await?;
    Ok(success(profile, "Profile updated"))
}
