use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::event::Event;
use super::profile::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "registration_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Registered,
    Cancelled,
    Attended,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::Attended => "attended",
        }
    }

    /// `cancelled` and `attended` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RegistrationStatus::Registered)
    }

    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        matches!(
            (self, next),
            (
                RegistrationStatus::Registered,
                RegistrationStatus::Cancelled | RegistrationStatus::Attended
            )
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub status: RegistrationStatus,
    pub payment_status: PaymentStatus,
    pub registered_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl Registration {
    pub fn new(event_id: Uuid, user_id: Uuid, notes: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            user_id,
            status: RegistrationStatus::Registered,
            payment_status: PaymentStatus::Pending,
            registered_at: Utc::now(),
            notes,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RegistrationStatus::Registered
    }
}

/// A registration joined with its event, as an attendee sees it.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationWithEvent {
    #[serde(flatten)]
    pub registration: Registration,
    pub event: Option<Event>,
}

/// A registration joined with the attendee, as an organizer sees it.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationWithUser {
    #[serde(flatten)]
    pub registration: Registration,
    pub user: Option<Profile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationCheck {
    pub is_registered: bool,
    pub registration: Option<Registration>,
}
