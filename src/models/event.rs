use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::profile::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub venue: Option<String>,
    pub event_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// `None` means unlimited seats.
    pub capacity: Option<i32>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub image_path: Option<String>,
    pub status: EventStatus,
    pub rsvp_enabled: bool,
    pub rsvp_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_owned_by(&self, profile_id: Uuid) -> bool {
        self.organizer_id == profile_id
    }

    /// Whether the RSVP window is still open at `now`.
    pub fn accepts_rsvp_at(&self, now: DateTime<Utc>) -> bool {
        self.rsvp_enabled && self.rsvp_deadline.map_or(true, |deadline| now <= deadline)
    }
}

/// Event joined with its organizer's profile.
#[derive(Debug, Clone, Serialize)]
pub struct EventWithOrganizer {
    #[serde(flatten)]
    pub event: Event,
    pub organizer: Option<Profile>,
}

/// Organizer input for a new event.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub venue: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub price: Option<Decimal>,
    pub status: Option<EventStatus>,
    pub rsvp_enabled: Option<bool>,
    pub rsvp_deadline: Option<DateTime<Utc>>,
}

/// Partial update of an event. Outer `None` leaves a field untouched; for
/// nullable columns `Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub category: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub location: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub venue: Option<Option<String>>,
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default, with = "double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "double_option")]
    pub capacity: Option<Option<i32>>,
    pub price: Option<Decimal>,
    pub status: Option<EventStatus>,
    pub rsvp_enabled: Option<bool>,
    #[serde(default, with = "double_option")]
    pub rsvp_deadline: Option<Option<DateTime<Utc>>>,
}

impl EventPatch {
    pub fn apply_to(self, event: &mut Event) {
        if let Some(title) = self.title {
            event.title = title;
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(category) = self.category {
            event.category = category;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(venue) = self.venue {
            event.venue = venue;
        }
        if let Some(event_date) = self.event_date {
            event.event_date = event_date;
        }
        if let Some(end_date) = self.end_date {
            event.end_date = end_date;
        }
        if let Some(capacity) = self.capacity {
            event.capacity = capacity;
        }
        if let Some(price) = self.price {
            event.price = price;
        }
        if let Some(status) = self.status {
            event.status = status;
        }
        if let Some(rsvp_enabled) = self.rsvp_enabled {
            event.rsvp_enabled = rsvp_enabled;
        }
        if let Some(rsvp_deadline) = self.rsvp_deadline {
            event.rsvp_deadline = rsvp_deadline;
        }
    }
}

/// Distinguishes an absent JSON field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_event() -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            title: "Rust meetup".to_string(),
            description: Some("Monthly talks".to_string()),
            category: Some("tech".to_string()),
            location: None,
            venue: None,
            event_date: now + Duration::days(7),
            end_date: None,
            capacity: Some(50),
            price: Decimal::ZERO,
            image_url: None,
            image_path: None,
            status: EventStatus::Draft,
            rsvp_enabled: true,
            rsvp_deadline: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_patch_distinguishes_missing_and_null() {
        let patch: EventPatch =
            serde_json::from_str(r#"{"title":"Renamed","capacity":null}"#).unwrap();
        assert_eq!(patch.title.as_deref(), Some("Renamed"));
        assert_eq!(patch.capacity, Some(None));
        assert!(patch.description.is_none());

        let mut event = sample_event();
        patch.apply_to(&mut event);
        assert_eq!(event.title, "Renamed");
        assert_eq!(event.capacity, None);
        assert_eq!(event.description.as_deref(), Some("Monthly talks"));
    }

    #[test]
    fn test_rsvp_window() {
        let now = Utc::now();
        let mut event = sample_event();
        assert!(event.accepts_rsvp_at(now));

        event.rsvp_deadline = Some(now - Duration::hours(1));
        assert!(!event.accepts_rsvp_at(now));

        event.rsvp_deadline = None;
        event.rsvp_enabled = false;
        assert!(!event.accepts_rsvp_at(now));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&EventStatus::Published).unwrap();
        assert_eq!(json, "\"published\"");
        assert_eq!(EventStatus::Cancelled.as_str(), "cancelled");
    }
}
