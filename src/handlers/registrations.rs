use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Default, Deserialize)]
pub struct RsvpRequest {
    pub notes: Option<String>,
}

/// The body is optional; a missing or non-JSON body means "no notes", but a
/// JSON body that does not parse is rejected.
pub async fn register(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<Uuid>,
    body: Result<Json<RsvpRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let notes = match body {
        Ok(Json(req)) => req.notes,
        Err(JsonRejection::MissingJsonContentType(_)) => None,
        Err(rejection) => return Err(AppError::ValidationError(rejection.body_text())),
    };
    let registration = state
        .registrations
        .register_for_event(event_id, user.id, notes)
        .await?;
    Ok(created(registration, "Registered for event"))
}

pub async fn registration_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let check = state
        .registrations
        .is_user_registered(event_id, user.id)
        .await?;
    Ok(success(check, "Registration status retrieved"))
}

pub async fn event_registrations(
    State(state): State<AppState>,
    CurrentUser(organizer): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let registrations = state
        .registrations
        .get_event_registrations(&organizer, event_id)
        .await?;
    Ok(success(registrations, "Registrations retrieved"))
}

pub async fn my_registrations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let registrations = state.registrations.get_user_registrations(user.id).await?;
    Ok(success(registrations, "Registrations retrieved"))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let registration = state.registrations.cancel_registration(&actor, id).await?;
    Ok(success(registration, "Registration cancelled"))
}

pub async fn mark_attended(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let registration = state.registrations.mark_attended(&actor, id).await?;
    Ok(success(registration, "Attendance recorded"))
}
