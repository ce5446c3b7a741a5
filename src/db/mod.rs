//! Persistence port and its adapters.
//!
//! Services depend only on [`Store`]. Uniqueness of active registrations and
//! seat capacity are enforced here, inside the adapter, so that concurrent
//! requests cannot race past them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Category, Credential, Event, EventStatus, Profile, Registration, RegistrationStatus,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("event has no seats left (capacity {capacity})")]
    CapacityReached { capacity: i32 },

    #[error("registration is {} and cannot change", current.as_str())]
    StatusMismatch { current: RegistrationStatus },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Backend(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // 23505 = unique_violation
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some("23505") {
                return StoreError::UniqueViolation {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound { entity: "row" },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Backend(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Constraint name reported when a second active registration is inserted.
pub const ACTIVE_REGISTRATION_CONSTRAINT: &str = "registrations_active_unique";
/// Constraint name reported when an email is already taken.
pub const EMAIL_CONSTRAINT: &str = "credentials_email_key";

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub organizer_id: Option<Uuid>,
    pub status: Option<EventStatus>,
    pub category: Option<String>,
    /// Case-insensitive substring over title, description and category.
    pub text: Option<String>,
    pub starts_from: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn published() -> Self {
        Self {
            status: Some(EventStatus::Published),
            ..Self::default()
        }
    }

    pub fn owned_by(organizer_id: Uuid) -> Self {
        Self {
            organizer_id: Some(organizer_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        if self.organizer_id.is_some_and(|id| id != event.organizer_id) {
            return false;
        }
        if self.status.is_some_and(|status| status != event.status) {
            return false;
        }
        if let Some(category) = &self.category {
            if event.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if self.starts_from.is_some_and(|from| event.event_date < from) {
            return false;
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let hit = |field: Option<&str>| {
                field.is_some_and(|value| value.to_lowercase().contains(&needle))
            };
            if !(hit(Some(&event.title))
                || hit(event.description.as_deref())
                || hit(event.category.as_deref()))
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventOrder {
    #[default]
    StartAsc,
    StartDesc,
}

/// Registrations are always listed newest first.
#[derive(Debug, Clone, Default)]
pub struct RegistrationFilter {
    pub event_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<RegistrationStatus>,
}

impl RegistrationFilter {
    pub fn matches(&self, registration: &Registration) -> bool {
        self.event_id.map_or(true, |id| id == registration.event_id)
            && self.user_id.map_or(true, |id| id == registration.user_id)
            && self.status.map_or(true, |s| s == registration.status)
    }
}

/// Typed capability interface over the managed database.
///
/// Services compute ids, timestamps and validation; the store persists and
/// enforces storage-level constraints.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_event(&self, event: Event) -> StoreResult<Event>;
    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>>;
    async fn list_events(&self, filter: &EventFilter, order: EventOrder)
        -> StoreResult<Vec<Event>>;
    async fn count_events(&self, filter: &EventFilter) -> StoreResult<i64>;
    /// Replace an existing event row (by `event.id`).
    async fn update_event(&self, event: Event) -> StoreResult<Event>;
    /// Delete an event and, by cascade, its registrations.
    async fn delete_event(&self, id: Uuid) -> StoreResult<()>;

    /// Insert a new active registration.
    ///
    /// Fails with `UniqueViolation` when the pair already holds an active
    /// registration and with `CapacityReached` when the event is full.
    async fn insert_registration(&self, registration: Registration)
        -> StoreResult<Registration>;
    async fn find_registration(&self, id: Uuid) -> StoreResult<Option<Registration>>;
    async fn find_active_registration(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Registration>>;
    async fn list_registrations(&self, filter: &RegistrationFilter)
        -> StoreResult<Vec<Registration>>;
    /// Compare-and-set on the status column. Fails with `StatusMismatch`
    /// when the row is not currently in `from`.
    async fn transition_registration(
        &self,
        id: Uuid,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreResult<Registration>;
    /// Registrations of any status on events owned by `organizer_id`.
    async fn count_organizer_registrations(&self, organizer_id: Uuid) -> StoreResult<i64>;

    /// Insert a profile together with its credential.
    async fn create_account(&self, profile: Profile, credential: Credential)
        -> StoreResult<Profile>;
    async fn find_credential(&self, email: &str) -> StoreResult<Option<Credential>>;
    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>>;
    async fn find_profiles(&self, ids: &[Uuid]) -> StoreResult<Vec<Profile>>;
    async fn update_profile(&self, profile: Profile) -> StoreResult<Profile>;

    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn insert_category(&self, category: Category) -> StoreResult<Category>;
}
