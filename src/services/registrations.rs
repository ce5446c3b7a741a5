use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{RegistrationFilter, Store, StoreError};
use crate::models::{
    Event, EventStatus, Profile, Registration, RegistrationCheck, RegistrationStatus,
    RegistrationWithEvent, RegistrationWithUser,
};
use crate::utils::error::AppError;

/// RSVP lifecycle: `registered` is the only non-terminal state and the only
/// one a registration can be created in.
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn Store>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create an active registration.
    ///
    /// Duplicate and capacity checks happen atomically inside the store; a
    /// second concurrent call for the same pair fails with
    /// [`AppError::AlreadyRegistered`].
    #[instrument(
        name = "registrations.register",
        skip_all,
        fields(event_id = %event_id, user_id = %user_id)
    )]
    pub async fn register_for_event(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        notes: Option<String>,
    ) -> Result<Registration, AppError> {
        let event = self.find_event(event_id).await?;
        if event.status != EventStatus::Published {
            return Err(AppError::ValidationError(format!(
                "Event is {} and not open for registration",
                event.status.as_str()
            )));
        }
        if !event.rsvp_enabled {
            return Err(AppError::ValidationError(
                "RSVP is disabled for this event".into(),
            ));
        }
        if !event.accepts_rsvp_at(Utc::now()) {
            return Err(AppError::ValidationError(
                "The RSVP deadline has passed".into(),
            ));
        }

        let notes = notes.filter(|n| !n.trim().is_empty());
        let registration = self
            .store
            .insert_registration(Registration::new(event_id, user_id, notes))
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation { .. } => AppError::AlreadyRegistered,
                other => other.into(),
            })?;

        info!(registration_id = %registration.id, "Registered for event");
        Ok(registration)
    }

    /// `registered → cancelled`, by the attendee or the event's organizer.
    #[instrument(name = "registrations.cancel", skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn cancel_registration(
        &self,
        actor: &Profile,
        registration_id: Uuid,
    ) -> Result<Registration, AppError> {
        let registration = self.find_registration(registration_id).await?;
        if registration.user_id != actor.id {
            let event = self.find_event(registration.event_id).await?;
            if !event.is_owned_by(actor.id) {
                return Err(AppError::Forbidden(
                    "Only the attendee or the organizer can cancel this registration".into(),
                ));
            }
        }
        self.transition(&registration, RegistrationStatus::Cancelled)
            .await
    }

    /// `registered → attended`, by the event's organizer.
    #[instrument(name = "registrations.attend", skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn mark_attended(
        &self,
        actor: &Profile,
        registration_id: Uuid,
    ) -> Result<Registration, AppError> {
        let registration = self.find_registration(registration_id).await?;
        let event = self.find_event(registration.event_id).await?;
        if !event.is_owned_by(actor.id) {
            return Err(AppError::Forbidden(
                "Only the organizer can mark attendance".into(),
            ));
        }
        self.transition(&registration, RegistrationStatus::Attended)
            .await
    }

    pub async fn is_user_registered(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<RegistrationCheck, AppError> {
        let registration = self
            .store
            .find_active_registration(event_id, user_id)
            .await?;
        Ok(RegistrationCheck {
            is_registered: registration.is_some(),
            registration,
        })
    }

    pub async fn get_user_registrations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RegistrationWithEvent>, AppError> {
        let registrations = self
            .store
            .list_registrations(&RegistrationFilter {
                user_id: Some(user_id),
                ..RegistrationFilter::default()
            })
            .await?;

        let mut events: HashMap<Uuid, Option<Event>> = HashMap::new();
        let mut joined = Vec::with_capacity(registrations.len());
        for registration in registrations {
            if !events.contains_key(&registration.event_id) {
                let event = self.store.find_event(registration.event_id).await?;
                events.insert(registration.event_id, event);
            }
            joined.push(RegistrationWithEvent {
                event: events.get(&registration.event_id).cloned().flatten(),
                registration,
            });
        }
        Ok(joined)
    }

    /// Organizer view of everyone who registered for `event_id`.
    pub async fn get_event_registrations(
        &self,
        actor: &Profile,
        event_id: Uuid,
    ) -> Result<Vec<RegistrationWithUser>, AppError> {
        let event = self.find_event(event_id).await?;
        if !event.is_owned_by(actor.id) {
            return Err(AppError::Forbidden(
                "Only the organizer can view registrations".into(),
            ));
        }

        let registrations = self
            .store
            .list_registrations(&RegistrationFilter {
                event_id: Some(event_id),
                ..RegistrationFilter::default()
            })
            .await?;
        let user_ids: Vec<Uuid> = registrations.iter().map(|r| r.user_id).collect();
        let users: HashMap<Uuid, Profile> = self
            .store
            .find_profiles(&user_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(registrations
            .into_iter()
            .map(|registration| RegistrationWithUser {
                user: users.get(&registration.user_id).cloned(),
                registration,
            })
            .collect())
    }

    /// Checks `current.status → to` against the status table, then applies it
    /// as a compare-and-set so a concurrent change in between is rejected too.
    async fn transition(
        &self,
        current: &Registration,
        to: RegistrationStatus,
    ) -> Result<Registration, AppError> {
        if !current.status.can_transition_to(to) {
            return Err(AppError::InvalidTransition(if current.status.is_terminal() {
                format!("registration is already {}", current.status.as_str())
            } else {
                format!(
                    "registration cannot move from {} to {}",
                    current.status.as_str(),
                    to.as_str()
                )
            }));
        }
        let registration = self
            .store
            .transition_registration(current.id, current.status, to)
            .await?;
        info!(
            registration_id = %registration.id,
            status = registration.status.as_str(),
            "Registration status changed"
        );
        Ok(registration)
    }

    async fn find_registration(&self, id: Uuid) -> Result<Registration, AppError> {
        self.store
            .find_registration(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Registration with id '{id}' was not found")))
    }

    async fn find_event(&self, id: Uuid) -> Result<Event, AppError> {
        self.store
            .find_event(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event with id '{id}' was not found")))
    }
}
