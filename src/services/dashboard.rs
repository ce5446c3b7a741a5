use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::db::{EventFilter, EventOrder, RegistrationFilter, Store};
use crate::models::{EventStats, EventStatus, OrganizerSummary};
use crate::utils::error::AppError;

/// Organizer-facing aggregates. Nothing here is cached.
#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn Store>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_organizer_summary(
        &self,
        organizer_id: Uuid,
    ) -> Result<OrganizerSummary, AppError> {
        self.organizer_summary_at(organizer_id, Utc::now()).await
    }

    /// Four independent count queries. They are not run in one transaction,
    /// so concurrent writes can make the counters disagree with each other.
    pub async fn organizer_summary_at(
        &self,
        organizer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<OrganizerSummary, AppError> {
        let owned = EventFilter::owned_by(organizer_id);
        let published = EventFilter {
            status: Some(EventStatus::Published),
            ..owned.clone()
        };
        let upcoming = EventFilter {
            starts_from: Some(now),
            ..published.clone()
        };

        let (total_events, published_events, total_registrations, upcoming_events) = tokio::try_join!(
            self.store.count_events(&owned),
            self.store.count_events(&published),
            self.store.count_organizer_registrations(organizer_id),
            self.store.count_events(&upcoming),
        )?;

        let summary = OrganizerSummary {
            total_events,
            published_events,
            total_registrations,
            upcoming_events,
        };
        debug!(%organizer_id, ?summary, "Computed organizer summary");
        Ok(summary)
    }

    /// Per-event registration breakdown, newest event first.
    pub async fn get_event_stats(&self, organizer_id: Uuid) -> Result<Vec<EventStats>, AppError> {
        let events = self
            .store
            .list_events(&EventFilter::owned_by(organizer_id), EventOrder::StartDesc)
            .await?;

        let mut stats = Vec::with_capacity(events.len());
        for event in &events {
            let registrations = self
                .store
                .list_registrations(&RegistrationFilter {
                    event_id: Some(event.id),
                    ..RegistrationFilter::default()
                })
                .await?;
            stats.push(EventStats::from_registrations(event, &registrations));
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Event, Registration, RegistrationStatus};
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn event(organizer_id: Uuid, status: EventStatus, starts_in: Duration) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            organizer_id,
            title: "Event".into(),
            description: None,
            category: None,
            location: None,
            venue: None,
            event_date: now + starts_in,
            end_date: None,
            capacity: Some(4),
            price: Decimal::ZERO,
            image_url: None,
            image_path: None,
            status,
            rsvp_enabled: true,
            rsvp_deadline: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_summary_is_zero_without_events() {
        let service = DashboardService::new(Arc::new(MemoryStore::new()));
        let summary = service.get_organizer_summary(Uuid::new_v4()).await.unwrap();
        assert_eq!(summary, OrganizerSummary::default());
    }

    #[tokio::test]
    async fn test_summary_counts_registrations_of_any_status() {
        let store = Arc::new(MemoryStore::new());
        let service = DashboardService::new(store.clone());
        let organizer = Uuid::new_v4();

        let busy = store
            .insert_event(event(organizer, EventStatus::Published, Duration::days(1)))
            .await
            .unwrap();
        store
            .insert_event(event(organizer, EventStatus::Draft, Duration::days(2)))
            .await
            .unwrap();
        // Someone else's event must not leak into the counts.
        let foreign = store
            .insert_event(event(Uuid::new_v4(), EventStatus::Published, Duration::days(1)))
            .await
            .unwrap();
        store
            .insert_registration(Registration::new(foreign.id, Uuid::new_v4(), None))
            .await
            .unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let reg = store
                .insert_registration(Registration::new(busy.id, Uuid::new_v4(), None))
                .await
                .unwrap();
            ids.push(reg.id);
        }
        store
            .transition_registration(ids[0], RegistrationStatus::Registered, RegistrationStatus::Cancelled)
            .await
            .unwrap();
        store
            .transition_registration(ids[1], RegistrationStatus::Registered, RegistrationStatus::Attended)
            .await
            .unwrap();

        let summary = service.get_organizer_summary(organizer).await.unwrap();
        assert_eq!(
            summary,
            OrganizerSummary {
                total_events: 2,
                published_events: 1,
                total_registrations: 3,
                upcoming_events: 1,
            }
        );

        let stats = service.get_event_stats(organizer).await.unwrap();
        assert_eq!(stats.len(), 2);
        let busy_stats = stats.iter().find(|s| s.id == busy.id).unwrap();
        assert_eq!(busy_stats.total_registrations, 3);
        assert_eq!(busy_stats.active_registrations, 1);
        assert_eq!(busy_stats.cancelled_registrations, 1);
        assert_eq!(busy_stats.attendees, 1);
        assert_eq!(busy_stats.capacity_percentage, 25.0);
    }

    #[tokio::test]
    async fn test_past_published_events_are_not_upcoming() {
        let store = Arc::new(MemoryStore::new());
        let service = DashboardService::new(store.clone());
        let organizer = Uuid::new_v4();
        let past = store
            .insert_event(event(organizer, EventStatus::Published, Duration::days(-1)))
            .await
            .unwrap();

        let summary = service.get_organizer_summary(organizer).await.unwrap();
        assert_eq!(summary.published_events, 1);
        assert_eq!(summary.upcoming_events, 0);

        // An event starting exactly now still counts.
        let at_start = service
            .organizer_summary_at(organizer, past.event_date)
            .await
            .unwrap();
        assert_eq!(at_start.upcoming_events, 1);
    }
}
