use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{CurrentUser, MaybeUser};
use crate::models::{EventPatch, NewEvent};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    pub q: Option<String>,
    pub category: Option<String>,
}

/// Published events; `q` searches, `category` filters. `q` wins when both are set.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Result<Response, AppError> {
    let events = match (query.q, query.category) {
        (Some(q), _) => state.events.search_events(&q).await?,
        (None, Some(category)) => state.events.filter_events_by_category(&category).await?,
        (None, None) => state.events.get_published_events().await?,
    };
    Ok(success(events, "Events retrieved"))
}

pub async fn get_event(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = state.events.get_event_by_id(id, viewer.as_ref()).await?;
    Ok(success(event, "Event retrieved"))
}

pub async fn create_event(
    State(state): State<AppState>,
    CurrentUser(organizer): CurrentUser,
    Json(input): Json<NewEvent>,
) -> Result<Response, AppError> {
    let event = state.events.create_event(&organizer, input).await?;
    Ok(created(event, "Event created"))
}

pub async fn update_event(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<EventPatch>,
) -> Result<Response, AppError> {
    let event = state.events.update_event(&actor, id, patch).await?;
    Ok(success(event, "Event updated"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    state.events.delete_event(&actor, id).await?;
    Ok(empty_success("Event deleted successfully"))
}

#[derive(Debug, Deserialize)]
pub struct ImageUpload {
    pub file_name: String,
}

pub async fn upload_image(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Query(upload): Query<ImageUpload>,
    body: Bytes,
) -> Result<Response, AppError> {
    let event = state
        .events
        .upload_event_image(&actor, id, &upload.file_name, &body)
        .await?;
    Ok(success(event, "Image uploaded"))
}

pub async fn delete_image(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = state.events.delete_event_image(&actor, id).await?;
    Ok(success(event, "Image removed"))
}

pub async fn list_categories(State(state): State<AppState>) -> Result<Response, AppError> {
    let categories = state.events.get_categories().await?;
    Ok(success(categories, "Categories retrieved"))
}

#[derive(Debug, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
}

pub async fn create_category(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<NewCategory>,
) -> Result<Response, AppError> {
    if !actor.is_organizer() {
        return Err(AppError::Forbidden(
            "Only organizers can add categories".into(),
        ));
    }
    let category = state
        .events
        .create_category(&input.name, input.description)
        .await?;
    Ok(created(category, "Category created"))
}
