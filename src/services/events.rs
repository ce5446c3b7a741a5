use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::{EventFilter, EventOrder, Store};
use crate::models::{
    Category, Event, EventPatch, EventStatus, EventWithOrganizer, NewEvent, Profile,
};
use crate::storage::{ObjectStore, EVENT_IMAGES_BUCKET};
use crate::utils::error::AppError;

const MIN_TITLE_LEN: usize = 3;
const MIN_DESCRIPTION_LEN: usize = 5;
const MAX_EXTENSION_LEN: usize = 8;

/// Event catalog: listing, search and organizer-side CRUD.
#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn Store>,
    objects: Arc<dyn ObjectStore>,
}

impl EventService {
    pub fn new(store: Arc<dyn Store>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }

    pub async fn get_published_events(&self) -> Result<Vec<EventWithOrganizer>, AppError> {
        self.list_with_organizers(EventFilter::published()).await
    }

    pub async fn search_events(&self, query: &str) -> Result<Vec<EventWithOrganizer>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return self.get_published_events().await;
        }
        self.list_with_organizers(EventFilter {
            text: Some(query.to_string()),
            ..EventFilter::published()
        })
        .await
    }

    pub async fn filter_events_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<EventWithOrganizer>, AppError> {
        self.list_with_organizers(EventFilter {
            category: Some(category.to_string()),
            ..EventFilter::published()
        })
        .await
    }

    /// Drafts and other unpublished events are only visible to their organizer.
    pub async fn get_event_by_id(
        &self,
        id: Uuid,
        viewer: Option<&Profile>,
    ) -> Result<EventWithOrganizer, AppError> {
        let event = self.find_event(id).await?;
        let is_owner = viewer.is_some_and(|p| event.is_owned_by(p.id));
        if event.status == EventStatus::Draft && !is_owner {
            return Err(not_found(id));
        }

        let organizer = self.store.find_profile(event.organizer_id).await?;
        Ok(EventWithOrganizer { event, organizer })
    }

    pub async fn get_organizer_events(&self, organizer_id: Uuid) -> Result<Vec<Event>, AppError> {
        Ok(self
            .store
            .list_events(&EventFilter::owned_by(organizer_id), EventOrder::StartDesc)
            .await?)
    }

    #[instrument(
        name = "events.create",
        skip(self, organizer, input),
        fields(organizer_id = %organizer.id, title = %input.title)
    )]
    pub async fn create_event(&self, organizer: &Profile, input: NewEvent) -> Result<Event, AppError> {
        if !organizer.is_organizer() {
            return Err(AppError::Forbidden(
                "Only organizers can create events".into(),
            ));
        }
        let event_date = input
            .event_date
            .ok_or_else(|| AppError::ValidationError("Date is required".into()))?;

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id: organizer.id,
            title: input.title.trim().to_string(),
            description: input.description,
            category: input.category,
            location: input.location,
            venue: input.venue,
            event_date,
            end_date: input.end_date,
            capacity: input.capacity,
            price: input.price.unwrap_or(Decimal::ZERO),
            image_url: None,
            image_path: None,
            status: input.status.unwrap_or(EventStatus::Draft),
            rsvp_enabled: input.rsvp_enabled.unwrap_or(true),
            rsvp_deadline: input.rsvp_deadline,
            created_at: now,
            updated_at: now,
        };
        validate_event(&event)?;

        let event = self.store.insert_event(event).await?;
        info!(event_id = %event.id, status = event.status.as_str(), "Event created");
        Ok(event)
    }

    #[instrument(name = "events.update", skip(self, actor, patch), fields(event_id = %id))]
    pub async fn update_event(
        &self,
        actor: &Profile,
        id: Uuid,
        patch: EventPatch,
    ) -> Result<Event, AppError> {
        let mut event = self.owned_event(actor, id).await?;
        patch.apply_to(&mut event);
        event.title = event.title.trim().to_string();
        event.updated_at = Utc::now();
        validate_event(&event)?;

        let event = self.store.update_event(event).await?;
        info!(status = event.status.as_str(), "Event updated");
        Ok(event)
    }

    #[instrument(name = "events.delete", skip(self, actor), fields(event_id = %id))]
    pub async fn delete_event(&self, actor: &Profile, id: Uuid) -> Result<(), AppError> {
        let event = self.owned_event(actor, id).await?;
        self.store.delete_event(id).await?;
        if let Some(path) = event.image_path {
            self.remove_image(&path).await;
        }
        info!("Event deleted");
        Ok(())
    }

    #[instrument(
        name = "events.upload_image",
        skip(self, actor, bytes),
        fields(event_id = %id, size = bytes.len())
    )]
    pub async fn upload_event_image(
        &self,
        actor: &Profile,
        id: Uuid,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Event, AppError> {
        let mut event = self.owned_event(actor, id).await?;
        if bytes.is_empty() {
            return Err(AppError::ValidationError("Image body is empty".into()));
        }
        let path = image_path(id, file_name, Utc::now().timestamp_millis())?;

        let url = self.objects.put(EVENT_IMAGES_BUCKET, &path, bytes).await?;
        let previous = event.image_path.replace(path.clone());
        event.image_url = Some(url);
        event.updated_at = Utc::now();
        let event = match self.store.update_event(event).await {
            Ok(event) => event,
            Err(err) => {
                // Nothing references the new object yet.
                self.remove_image(&path).await;
                return Err(err.into());
            }
        };

        if let Some(previous) = previous {
            self.remove_image(&previous).await;
        }
        info!(path = event.image_path.as_deref(), "Event image stored");
        Ok(event)
    }

    #[instrument(name = "events.delete_image", skip(self, actor), fields(event_id = %id))]
    pub async fn delete_event_image(&self, actor: &Profile, id: Uuid) -> Result<Event, AppError> {
        let mut event = self.owned_event(actor, id).await?;
        let Some(path) = event.image_path.take() else {
            return Ok(event);
        };

        self.objects.delete(EVENT_IMAGES_BUCKET, &path).await?;
        event.image_url = None;
        event.updated_at = Utc::now();
        Ok(self.store.update_event(event).await?)
    }

    pub async fn get_categories(&self) -> Result<Vec<Category>, AppError> {
        Ok(self.store.list_categories().await?)
    }

    pub async fn create_category(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Category, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Category name is required".into()));
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            created_at: Utc::now(),
        };
        Ok(self.store.insert_category(category).await?)
    }

    /// Load an event and require `actor` to be its organizer.
    pub async fn owned_event(&self, actor: &Profile, id: Uuid) -> Result<Event, AppError> {
        let event = self.find_event(id).await?;
        if !event.is_owned_by(actor.id) {
            return Err(AppError::Forbidden(
                "Only the event's organizer can change it".into(),
            ));
        }
        Ok(event)
    }

    async fn find_event(&self, id: Uuid) -> Result<Event, AppError> {
        self.store.find_event(id).await?.ok_or_else(|| not_found(id))
    }

    async fn list_with_organizers(
        &self,
        filter: EventFilter,
    ) -> Result<Vec<EventWithOrganizer>, AppError> {
        let events = self.store.list_events(&filter, EventOrder::StartAsc).await?;

        let mut ids: Vec<Uuid> = events.iter().map(|e| e.organizer_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let organizers: HashMap<Uuid, Profile> = self
            .store
            .find_profiles(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        debug!(count = events.len(), "Listed events");
        Ok(events
            .into_iter()
            .map(|event| EventWithOrganizer {
                organizer: organizers.get(&event.organizer_id).cloned(),
                event,
            })
            .collect())
    }

    async fn remove_image(&self, path: &str) {
        if let Err(e) = self.objects.delete(EVENT_IMAGES_BUCKET, path).await {
            warn!(path, error = %e, "Failed to remove stale event image");
        }
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Event with id '{id}' was not found"))
}

/// `{event_id}/{event_id}-{unix_millis}.{ext}`
fn image_path(event_id: Uuid, file_name: &str, millis: i64) -> Result<String, AppError> {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .ok_or_else(|| {
            AppError::ValidationError(format!("File '{file_name}' needs an image extension"))
        })?;
    Ok(format!("{event_id}/{event_id}-{millis}.{ext}"))
}

pub(crate) fn validate_event(event: &Event) -> Result<(), AppError> {
    let invalid = |msg: &str| Err(AppError::ValidationError(msg.to_string()));

    if event.title.chars().count() < MIN_TITLE_LEN {
        return invalid("Title must be at least 3 characters");
    }
    if event
        .description
        .as_deref()
        .is_some_and(|d| d.trim().chars().count() < MIN_DESCRIPTION_LEN)
    {
        return invalid("Description must be at least 5 characters");
    }
    if event.end_date.is_some_and(|end| end < event.event_date) {
        return invalid("End date must not be before the start date");
    }
    if event.capacity.is_some_and(|c| c <= 0) {
        return invalid("Capacity must be positive");
    }
    if event.price < Decimal::ZERO {
        return invalid("Price cannot be negative");
    }
    if event.rsvp_deadline.is_some_and(|d| d > event.event_date) {
        return invalid("RSVP deadline must not be after the start date");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, RegistrationFilter, StoreError, StoreResult};
    use crate::models::{Credential, Registration, RegistrationStatus, Role};
    use crate::storage::LocalObjectStore;
    use chrono::Duration;

    fn profile(role: Role) -> Profile {
        let now = Utc::now();
        Profile {
            id: Uuid::new_v4(),
            email: format!("{}@example.com", Uuid::new_v4().simple()),
            full_name: None,
            role,
            avatar_url: None,
            bio: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn new_event(title: &str) -> NewEvent {
        NewEvent {
            title: title.to_string(),
            description: Some("A great evening".to_string()),
            category: Some("music".to_string()),
            location: None,
            venue: None,
            event_date: Some(Utc::now() + Duration::days(2)),
            end_date: None,
            capacity: None,
            price: None,
            status: Some(EventStatus::Published),
            rsvp_enabled: None,
            rsvp_deadline: None,
        }
    }

    fn service(dir: &tempfile::TempDir) -> EventService {
        EventService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(LocalObjectStore::new(dir.path(), "http://cdn")),
        )
    }

    #[test]
    fn test_image_path_layout() {
        let id = Uuid::nil();
        assert_eq!(
            image_path(id, "Poster.PNG", 42).unwrap(),
            format!("{id}/{id}-42.png")
        );
        assert!(image_path(id, "no-extension", 1).is_err());
        assert!(image_path(id, "bad.ex/t", 1).is_err());
    }

    #[tokio::test]
    async fn test_only_organizers_create_and_defaults_apply() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let attendee = profile(Role::Attendee);
        let err = svc
            .create_event(&attendee, new_event("Gig"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        let organizer = profile(Role::Organizer);
        let mut input = new_event("Gig night");
        input.status = None;
        let event = svc.create_event(&organizer, input).await.unwrap();
        assert_eq!(event.status, EventStatus::Draft);
        assert_eq!(event.price, Decimal::ZERO);
        assert!(event.rsvp_enabled);
    }

    #[tokio::test]
    async fn test_validation_rules() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let organizer = profile(Role::Organizer);

        let err = svc
            .create_event(&organizer, new_event("Go"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Title must be at least 3 characters");

        let mut input = new_event("Meetup");
        input.event_date = None;
        assert_eq!(
            svc.create_event(&organizer, input).await.unwrap_err().to_string(),
            "Validation error: Date is required"
        );

        let mut input = new_event("Meetup");
        input.capacity = Some(0);
        assert!(svc.create_event(&organizer, input).await.is_err());

        let mut input = new_event("Meetup");
        input.price = Some(Decimal::new(-500, 2));
        assert!(svc.create_event(&organizer, input).await.is_err());
    }

    #[tokio::test]
    async fn test_drafts_hidden_from_others() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let organizer = profile(Role::Organizer);
        let mut input = new_event("Secret party");
        input.status = Some(EventStatus::Draft);
        let draft = svc.create_event(&organizer, input).await.unwrap();

        assert!(svc.get_event_by_id(draft.id, Some(&organizer)).await.is_ok());
        let err = svc.get_event_by_id(draft.id, None).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(svc.get_published_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_and_category_only_return_published() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let organizer = profile(Role::Organizer);

        svc.create_event(&organizer, new_event("Jazz night")).await.unwrap();
        let mut talk = new_event("Rust talk");
        talk.category = Some("tech".into());
        svc.create_event(&organizer, talk).await.unwrap();
        let mut draft = new_event("Jazz rehearsal");
        draft.status = Some(EventStatus::Draft);
        svc.create_event(&organizer, draft).await.unwrap();

        let hits = svc.search_events("jazz").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].event.title, "Jazz night");

        let tech = svc.filter_events_by_category("tech").await.unwrap();
        assert_eq!(tech.len(), 1);
        assert_eq!(tech[0].event.title, "Rust talk");

        assert_eq!(svc.search_events("  ").await.unwrap().len(), 2);
        assert_eq!(svc.get_organizer_events(organizer.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_only_owner_updates_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let organizer = profile(Role::Organizer);
        let other = profile(Role::Organizer);
        let event = svc.create_event(&organizer, new_event("Book club")).await.unwrap();

        let patch = EventPatch {
            title: Some("Book club v2".into()),
            ..EventPatch::default()
        };
        let err = svc
            .update_event(&other, event.id, patch.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        let updated = svc.update_event(&organizer, event.id, patch).await.unwrap();
        assert_eq!(updated.title, "Book club v2");

        assert_eq!(
            svc.delete_event(&other, event.id).await.unwrap_err().code(),
            "FORBIDDEN"
        );
        svc.delete_event(&organizer, event.id).await.unwrap();
        assert_eq!(
            svc.get_event_by_id(event.id, None).await.unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_image_upload_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let organizer = profile(Role::Organizer);
        let event = svc.create_event(&organizer, new_event("Art show")).await.unwrap();

        let first = svc
            .upload_event_image(&organizer, event.id, "a.jpg", b"one")
            .await
            .unwrap();
        let first_path = first.image_path.clone().unwrap();
        assert!(first.image_url.unwrap().starts_with("http://cdn/event-images/"));

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = svc
            .upload_event_image(&organizer, event.id, "b.png", b"two")
            .await
            .unwrap();
        assert_ne!(second.image_path.as_deref(), Some(first_path.as_str()));
        assert!(!dir.path().join("event-images").join(&first_path).exists());

        let cleared = svc.delete_event_image(&organizer, event.id).await.unwrap();
        assert!(cleared.image_path.is_none());
        assert!(cleared.image_url.is_none());
    }

    #[tokio::test]
    async fn test_categories_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        svc.create_category("Tech", None).await.unwrap();
        svc.create_category("Music", None).await.unwrap();

        let names: Vec<String> = svc
            .get_categories()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["Music", "Tech"]);
        assert_eq!(
            svc.create_category("Tech", None).await.unwrap_err().code(),
            "CONFLICT"
        );
    }

    /// Memory store whose event updates fail as if the database went away.
    struct UpdatesUnavailable(Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl Store for UpdatesUnavailable {
        async fn insert_event(&self, event: Event) -> StoreResult<Event> {
            self.0.insert_event(event).await
        }
        async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
            self.0.find_event(id).await
        }
        async fn list_events(
            &self,
            filter: &EventFilter,
            order: EventOrder,
        ) -> StoreResult<Vec<Event>> {
            self.0.list_events(filter, order).await
        }
        async fn count_events(&self, filter: &EventFilter) -> StoreResult<i64> {
            self.0.count_events(filter).await
        }
        async fn update_event(&self, _event: Event) -> StoreResult<Event> {
            Err(StoreError::Unavailable("connection reset".into()))
        }
        async fn delete_event(&self, id: Uuid) -> StoreResult<()> {
            self.0.delete_event(id).await
        }
        async fn insert_registration(
            &self,
            registration: Registration,
        ) -> StoreResult<Registration> {
            self.0.insert_registration(registration).await
        }
        async fn find_registration(&self, id: Uuid) -> StoreResult<Option<Registration>> {
            self.0.find_registration(id).await
        }
        async fn find_active_registration(
            &self,
            event_id: Uuid,
            user_id: Uuid,
        ) -> StoreResult<Option<Registration>> {
            self.0.find_active_registration(event_id, user_id).await
        }
        async fn list_registrations(
            &self,
            filter: &RegistrationFilter,
        ) -> StoreResult<Vec<Registration>> {
            self.0.list_registrations(filter).await
        }
        async fn transition_registration(
            &self,
            id: Uuid,
            from: RegistrationStatus,
            to: RegistrationStatus,
        ) -> StoreResult<Registration> {
            self.0.transition_registration(id, from, to).await
        }
        async fn count_organizer_registrations(&self, organizer_id: Uuid) -> StoreResult<i64> {
            self.0.count_organizer_registrations(organizer_id).await
        }
        async fn create_account(
            &self,
            profile: Profile,
            credential: Credential,
        ) -> StoreResult<Profile> {
            self.0.create_account(profile, credential).await
        }
        async fn find_credential(&self, email: &str) -> StoreResult<Option<Credential>> {
            self.0.find_credential(email).await
        }
        async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
            self.0.find_profile(id).await
        }
        async fn find_profiles(&self, ids: &[Uuid]) -> StoreResult<Vec<Profile>> {
            self.0.find_profiles(ids).await
        }
        async fn update_profile(&self, profile: Profile) -> StoreResult<Profile> {
            self.0.update_profile(profile).await
        }
        async fn list_categories(&self) -> StoreResult<Vec<Category>> {
            self.0.list_categories().await
        }
        async fn insert_category(&self, category: Category) -> StoreResult<Category> {
            self.0.insert_category(category).await
        }
    }

    #[tokio::test]
    async fn test_failed_image_update_removes_uploaded_object() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = profile(Role::Organizer);
        let inner = Arc::new(MemoryStore::new());
        let objects = Arc::new(LocalObjectStore::new(dir.path(), "http://cdn"));
        let event = EventService::new(inner.clone(), objects.clone())
            .create_event(&organizer, new_event("Gallery opening"))
            .await
            .unwrap();

        let svc = EventService::new(Arc::new(UpdatesUnavailable(inner)), objects);
        let err = svc
            .upload_event_image(&organizer, event.id, "poster.png", b"png")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");

        let event_dir = dir.path().join("event-images").join(event.id.to_string());
        let leftovers = std::fs::read_dir(&event_dir)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }
}
