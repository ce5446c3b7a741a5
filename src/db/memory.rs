use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    EventFilter, EventOrder, RegistrationFilter, Store, StoreError, StoreResult,
    ACTIVE_REGISTRATION_CONSTRAINT, EMAIL_CONSTRAINT,
};
use crate::models::{
    Category, Credential, Event, Profile, Registration, RegistrationStatus,
};

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    registrations: HashMap<Uuid, Registration>,
    profiles: HashMap<Uuid, Profile>,
    credentials: HashMap<String, Credential>,
    categories: HashMap<Uuid, Category>,
}

/// Process-local store used when no database is configured, and in tests.
///
/// Every mutation runs under one write lock, which gives the same
/// uniqueness and capacity guarantees as the Postgres constraints.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_events(events: &mut [Event], order: EventOrder) {
    match order {
        EventOrder::StartAsc => events.sort_by(|a, b| a.event_date.cmp(&b.event_date)),
        EventOrder::StartDesc => events.sort_by(|a, b| b.event_date.cmp(&a.event_date)),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_event(&self, event: Event) -> StoreResult<Event> {
        let mut tables = self.tables.write().await;
        if tables.events.contains_key(&event.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "events_pkey".to_string(),
            });
        }
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        order: EventOrder,
    ) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        sort_events(&mut events, order);
        Ok(events)
    }

    async fn count_events(&self, filter: &EventFilter) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.events.values().filter(|e| filter.matches(e)).count() as i64)
    }

    async fn update_event(&self, event: Event) -> StoreResult<Event> {
        let mut tables = self.tables.write().await;
        match tables.events.get_mut(&event.id) {
            Some(row) => {
                *row = event.clone();
                Ok(event)
            }
            None => Err(StoreError::NotFound { entity: "event" }),
        }
    }

    async fn delete_event(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.events.remove(&id).is_none() {
            return Err(StoreError::NotFound { entity: "event" });
        }
        tables.registrations.retain(|_, r| r.event_id != id);
        Ok(())
    }

    async fn insert_registration(&self, registration: Registration) -> StoreResult<Registration> {
        let mut tables = self.tables.write().await;
        let capacity = tables
            .events
            .get(&registration.event_id)
            .ok_or(StoreError::NotFound { entity: "event" })?
            .capacity;

        let mut active = 0i64;
        for existing in tables.registrations.values() {
            if existing.event_id != registration.event_id || !existing.is_active() {
                continue;
            }
            if existing.user_id == registration.user_id {
                return Err(StoreError::UniqueViolation {
                    constraint: ACTIVE_REGISTRATION_CONSTRAINT.to_string(),
                });
            }
            active += 1;
        }
        if let Some(capacity) = capacity {
            if active >= i64::from(capacity) {
                return Err(StoreError::CapacityReached { capacity });
            }
        }

        tables
            .registrations
            .insert(registration.id, registration.clone());
        Ok(registration)
    }

    async fn find_registration(&self, id: Uuid) -> StoreResult<Option<Registration>> {
        Ok(self.tables.read().await.registrations.get(&id).cloned())
    }

    async fn find_active_registration(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Registration>> {
        let tables = self.tables.read().await;
        Ok(tables
            .registrations
            .values()
            .find(|r| r.event_id == event_id && r.user_id == user_id && r.is_active())
            .cloned())
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> StoreResult<Vec<Registration>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Registration> = tables
            .registrations
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        Ok(rows)
    }

    async fn transition_registration(
        &self,
        id: Uuid,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreResult<Registration> {
        let mut tables = self.tables.write().await;
        let row = tables
            .registrations
            .get_mut(&id)
            .ok_or(StoreError::NotFound {
                entity: "registration",
            })?;
        if row.status != from {
            return Err(StoreError::StatusMismatch {
                current: row.status,
            });
        }
        row.status = to;
        Ok(row.clone())
    }

    async fn count_organizer_registrations(&self, organizer_id: Uuid) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        let count = tables
            .registrations
            .values()
            .filter(|r| {
                tables
                    .events
                    .get(&r.event_id)
                    .is_some_and(|e| e.organizer_id == organizer_id)
            })
            .count();
        Ok(count as i64)
    }

    async fn create_account(
        &self,
        profile: Profile,
        credential: Credential,
    ) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        if tables.credentials.contains_key(&credential.email) {
            return Err(StoreError::UniqueViolation {
                constraint: EMAIL_CONSTRAINT.to_string(),
            });
        }
        tables
            .credentials
            .insert(credential.email.clone(), credential);
        tables.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn find_credential(&self, email: &str) -> StoreResult<Option<Credential>> {
        Ok(self.tables.read().await.credentials.get(email).cloned())
    }

    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> StoreResult<Vec<Profile>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).cloned())
            .collect())
    }

    async fn update_profile(&self, profile: Profile) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        match tables.profiles.get_mut(&profile.id) {
            Some(row) => {
                *row = profile.clone();
                Ok(profile)
            }
            None => Err(StoreError::NotFound { entity: "profile" }),
        }
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let tables = self.tables.read().await;
        let mut categories: Vec<Category> = tables.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn insert_category(&self, category: Category) -> StoreResult<Category> {
        let mut tables = self.tables.write().await;
        if tables.categories.values().any(|c| c.name == category.name) {
            return Err(StoreError::UniqueViolation {
                constraint: "categories_name_key".to_string(),
            });
        }
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, PaymentStatus};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn event_with_capacity(capacity: Option<i32>) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            title: "Workshop".to_string(),
            description: None,
            category: None,
            location: None,
            venue: None,
            event_date: now + Duration::days(3),
            end_date: None,
            capacity,
            price: Decimal::ZERO,
            image_url: None,
            image_path: None,
            status: EventStatus::Published,
            rsvp_enabled: true,
            rsvp_deadline: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_concurrent_inserts_leave_one_active_row() {
        let store = Arc::new(MemoryStore::new());
        let event = store.insert_event(event_with_capacity(None)).await.unwrap();
        let event_id = event.id;
        let user = Uuid::new_v4();

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .insert_registration(Registration::new(event_id, user, None))
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .insert_registration(Registration::new(event_id, user, None))
                    .await
            })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(StoreError::UniqueViolation { .. }))));

        let active = store
            .list_registrations(&RegistrationFilter {
                event_id: Some(event.id),
                status: Some(RegistrationStatus::Registered),
                ..RegistrationFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_counts_only_active_rows() {
        let store = MemoryStore::new();
        let event = store
            .insert_event(event_with_capacity(Some(1)))
            .await
            .unwrap();

        let first = store
            .insert_registration(Registration::new(event.id, Uuid::new_v4(), None))
            .await
            .unwrap();
        let err = store
            .insert_registration(Registration::new(event.id, Uuid::new_v4(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CapacityReached { capacity: 1 }));

        store
            .transition_registration(
                first.id,
                RegistrationStatus::Registered,
                RegistrationStatus::Cancelled,
            )
            .await
            .unwrap();
        let second = store
            .insert_registration(Registration::new(event.id, Uuid::new_v4(), None))
            .await
            .unwrap();
        assert_eq!(second.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = MemoryStore::new();
        let event = store.insert_event(event_with_capacity(None)).await.unwrap();
        let reg = store
            .insert_registration(Registration::new(event.id, Uuid::new_v4(), None))
            .await
            .unwrap();

        store
            .transition_registration(
                reg.id,
                RegistrationStatus::Registered,
                RegistrationStatus::Attended,
            )
            .await
            .unwrap();
        let err = store
            .transition_registration(
                reg.id,
                RegistrationStatus::Registered,
                RegistrationStatus::Cancelled,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusMismatch {
                current: RegistrationStatus::Attended
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_event_cascades_registrations() {
        let store = MemoryStore::new();
        let event = store.insert_event(event_with_capacity(None)).await.unwrap();
        let reg = store
            .insert_registration(Registration::new(event.id, Uuid::new_v4(), None))
            .await
            .unwrap();

        store.delete_event(event.id).await.unwrap();
        assert!(store.find_registration(reg.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_event(event.id).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
