use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    EventFilter, EventOrder, RegistrationFilter, Store, StoreError, StoreResult,
    ACTIVE_REGISTRATION_CONSTRAINT,
};
use crate::models::{
    Category, Credential, Event, Profile, Registration, RegistrationStatus,
};

const EVENT_COLUMNS: &str = "id, organizer_id, title, description, category, location, venue, \
     event_date, end_date, capacity, price, image_url, image_path, status, rsvp_enabled, \
     rsvp_deadline, created_at, updated_at";

const REGISTRATION_COLUMNS: &str =
    "id, event_id, user_id, status, payment_status, registered_at, notes";

const PROFILE_COLUMNS: &str =
    "id, email, full_name, role, avatar_url, bio, created_at, updated_at";

/// Postgres adapter. Uniqueness of active registrations is backed by the
/// `registrations_active_unique` partial index.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))
    }
}

fn push_event_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
    qb.push(" WHERE TRUE");
    if let Some(organizer_id) = filter.organizer_id {
        qb.push(" AND organizer_id = ").push_bind(organizer_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(from) = filter.starts_from {
        qb.push(" AND event_date >= ").push_bind(from);
    }
    if let Some(text) = &filter.text {
        let pattern = format!("%{}%", escape_like(text));
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR category ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl Store for PgStore {
    async fn insert_event(&self, event: Event) -> StoreResult<Event> {
        let sql = format!(
            "INSERT INTO events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Event>(&sql)
            .bind(event.id)
            .bind(event.organizer_id)
            .bind(event.title)
            .bind(event.description)
            .bind(event.category)
            .bind(event.location)
            .bind(event.venue)
            .bind(event.event_date)
            .bind(event.end_date)
            .bind(event.capacity)
            .bind(event.price)
            .bind(event.image_url)
            .bind(event.image_path)
            .bind(event.status)
            .bind(event.rsvp_enabled)
            .bind(event.rsvp_deadline)
            .bind(event.created_at)
            .bind(event.updated_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let row = sqlx::query_as::<_, Event>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        order: EventOrder,
    ) -> StoreResult<Vec<Event>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {EVENT_COLUMNS} FROM events"));
        push_event_filter(&mut qb, filter);
        qb.push(match order {
            EventOrder::StartAsc => " ORDER BY event_date ASC",
            EventOrder::StartDesc => " ORDER BY event_date DESC",
        });
        let rows = qb.build_query_as::<Event>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn count_events(&self, filter: &EventFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM events");
        push_event_filter(&mut qb, filter);
        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_event(&self, event: Event) -> StoreResult<Event> {
        let sql = format!(
            "UPDATE events SET title = $2, description = $3, category = $4, location = $5, \
             venue = $6, event_date = $7, end_date = $8, capacity = $9, price = $10, \
             image_url = $11, image_path = $12, status = $13, rsvp_enabled = $14, \
             rsvp_deadline = $15, updated_at = $16 \
             WHERE id = $1 RETURNING {EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&sql)
            .bind(event.id)
            .bind(event.title)
            .bind(event.description)
            .bind(event.category)
            .bind(event.location)
            .bind(event.venue)
            .bind(event.event_date)
            .bind(event.end_date)
            .bind(event.capacity)
            .bind(event.price)
            .bind(event.image_url)
            .bind(event.image_path)
            .bind(event.status)
            .bind(event.rsvp_enabled)
            .bind(event.rsvp_deadline)
            .bind(event.updated_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "event" })
    }

    async fn delete_event(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "event" });
        }
        Ok(())
    }

    async fn insert_registration(&self, registration: Registration) -> StoreResult<Registration> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the event serializes concurrent registrations for it.
        let capacity: Option<i32> =
            sqlx::query_scalar("SELECT capacity FROM events WHERE id = $1 FOR UPDATE")
                .bind(registration.event_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::NotFound { entity: "event" })?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM registrations \
             WHERE event_id = $1 AND user_id = $2 AND status = 'registered'",
        )
        .bind(registration.event_id)
        .bind(registration.user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: ACTIVE_REGISTRATION_CONSTRAINT.to_string(),
            });
        }

        if let Some(capacity) = capacity {
            let active: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status = 'registered'",
            )
            .bind(registration.event_id)
            .fetch_one(&mut *tx)
            .await?;
            if active >= i64::from(capacity) {
                return Err(StoreError::CapacityReached { capacity });
            }
        }

        let sql = format!(
            "INSERT INTO registrations ({REGISTRATION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {REGISTRATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Registration>(&sql)
            .bind(registration.id)
            .bind(registration.event_id)
            .bind(registration.user_id)
            .bind(registration.status)
            .bind(registration.payment_status)
            .bind(registration.registered_at)
            .bind(registration.notes)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn find_registration(&self, id: Uuid) -> StoreResult<Option<Registration>> {
        let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1");
        let row = sqlx::query_as::<_, Registration>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_active_registration(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Registration>> {
        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE event_id = $1 AND user_id = $2 AND status = 'registered'"
        );
        let row = sqlx::query_as::<_, Registration>(&sql)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> StoreResult<Vec<Registration>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE TRUE"
        ));
        if let Some(event_id) = filter.event_id {
            qb.push(" AND event_id = ").push_bind(event_id);
        }
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        qb.push(" ORDER BY registered_at DESC");
        let rows = qb
            .build_query_as::<Registration>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn transition_registration(
        &self,
        id: Uuid,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreResult<Registration> {
        let sql = format!(
            "UPDATE registrations SET status = $3 WHERE id = $1 AND status = $2 \
             RETURNING {REGISTRATION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Registration>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = updated {
            return Ok(row);
        }

        let current: Option<RegistrationStatus> =
            sqlx::query_scalar("SELECT status FROM registrations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match current {
            Some(current) => Err(StoreError::StatusMismatch { current }),
            None => Err(StoreError::NotFound {
                entity: "registration",
            }),
        }
    }

    async fn count_organizer_registrations(&self, organizer_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registrations r \
             JOIN events e ON e.id = r.event_id \
             WHERE e.organizer_id = $1",
        )
        .bind(organizer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn create_account(
        &self,
        profile: Profile,
        credential: Credential,
    ) -> StoreResult<Profile> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO profiles ({PROFILE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Profile>(&sql)
            .bind(profile.id)
            .bind(profile.email)
            .bind(profile.full_name)
            .bind(profile.role)
            .bind(profile.avatar_url)
            .bind(profile.bio)
            .bind(profile.created_at)
            .bind(profile.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO credentials (profile_id, email, password_hash) VALUES ($1, $2, $3)")
            .bind(credential.profile_id)
            .bind(credential.email)
            .bind(credential.password_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn find_credential(&self, email: &str) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, Credential>(
            "SELECT profile_id, email, password_hash FROM credentials WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        let row = sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> StoreResult<Vec<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, Profile>(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update_profile(&self, profile: Profile) -> StoreResult<Profile> {
        let sql = format!(
            "UPDATE profiles SET full_name = $2, avatar_url = $3, bio = $4, updated_at = $5 \
             WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        );
        sqlx::query_as::<_, Profile>(&sql)
            .bind(profile.id)
            .bind(profile.full_name)
            .bind(profile.avatar_url)
            .bind(profile.bio)
            .bind(profile.updated_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "profile" })
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_category(&self, category: Category) -> StoreResult<Category> {
        let row = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, description, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, description, created_at",
        )
        .bind(category.id)
        .bind(category.name)
        .bind(category.description)
        .bind(category.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
