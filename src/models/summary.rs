use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::event::{Event, EventStatus};
use super::registration::{Registration, RegistrationStatus};

/// Dashboard counters for one organizer.
///
/// Each counter comes from its own query, so the four values are not a
/// point-in-time snapshot when writes happen concurrently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrganizerSummary {
    pub total_events: i64,
    pub published_events: i64,
    pub total_registrations: i64,
    pub upcoming_events: i64,
}

/// Per-event registration breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventStats {
    pub id: Uuid,
    pub title: String,
    pub organizer_id: Uuid,
    pub event_date: DateTime<Utc>,
    pub status: EventStatus,
    pub capacity: Option<i32>,
    pub total_registrations: i64,
    pub active_registrations: i64,
    pub cancelled_registrations: i64,
    pub attendees: i64,
    pub capacity_percentage: f64,
}

impl EventStats {
    pub fn from_registrations(event: &Event, registrations: &[Registration]) -> Self {
        let count = |status: RegistrationStatus| {
            registrations.iter().filter(|r| r.status == status).count() as i64
        };
        let active = count(RegistrationStatus::Registered);
        let capacity_percentage = match event.capacity {
            Some(capacity) if capacity > 0 => {
                ((active as f64 / capacity as f64) * 10000.0).round() / 100.0
            }
            _ => 0.0,
        };

        Self {
            id: event.id,
            title: event.title.clone(),
            organizer_id: event.organizer_id,
            event_date: event.event_date,
            status: event.status,
            capacity: event.capacity,
            total_registrations: registrations.len() as i64,
            active_registrations: active,
            cancelled_registrations: count(RegistrationStatus::Cancelled),
            attendees: count(RegistrationStatus::Attended),
            capacity_percentage,
        }
    }
}
