use axum::extract::State;
use axum::response::Response;

use crate::auth::CurrentUser;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn my_events(
    State(state): State<AppState>,
    CurrentUser(organizer): CurrentUser,
) -> Result<Response, AppError> {
    let events = state.events.get_organizer_events(organizer.id).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn summary(
    State(state): State<AppState>,
    CurrentUser(organizer): CurrentUser,
) -> Result<Response, AppError> {
    let summary = state.dashboard.get_organizer_summary(organizer.id).await?;
    Ok(success(summary, "Summary retrieved"))
}

pub async fn event_stats(
    State(state): State<AppState>,
    CurrentUser(organizer): CurrentUser,
) -> Result<Response, AppError> {
    let stats = state.dashboard.get_event_stats(organizer.id).await?;
    Ok(success(stats, "Event statistics retrieved"))
}
