//! `PostgreSQL` repository.
//!
//! Schema lives in `iamin/migrations`; [`PostgresRepository::migrate`] runs
//! it. Rows are read into private `*Row` structs and converted into domain
//! types, so the SQL column types stay out of the domain model.

use super::{
    AttendeeRepository, EventRepository, PageRange, Repository, RepositoryError,
    WaitlistRepository,
};
use crate::types::{
    Attendee, AttendeeId, Currency, Event, EventId, OwnerId, PaymentMethods, Price,
    WaitlistEntry, WaitlistEntryId,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use iamin_postgres::unique_violation;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

const EVENT_COLUMNS: &str = "id, slug, owner_id, owner_email, title, description, starts_at, \
     location, price_cents, currency, max_spots, password, enabled, payment_methods, created_at";

const ATTENDEE_COLUMNS: &str = "id, event_id, full_name, phone, paid, registered_at";

const WAITLIST_COLUMNS: &str = "id, event_id, name, phone, message, created_at";

/// SQL-backed [`Repository`].
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns error if a migration fails to apply.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn map_sqlx(error: sqlx::Error) -> RepositoryError {
    if let Some(constraint) = unique_violation(&error) {
        return RepositoryError::UniqueViolation {
            constraint: constraint.to_string(),
        };
    }
    tracing::error!(error = %error, "Database query failed");
    RepositoryError::Database(error.to_string())
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    slug: String,
    owner_id: Uuid,
    owner_email: String,
    title: String,
    description: String,
    starts_at: DateTime<Utc>,
    location: String,
    price_cents: Option<i64>,
    currency: Option<String>,
    max_spots: Option<i32>,
    password: Option<String>,
    enabled: bool,
    payment_methods: Json<PaymentMethods>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = RepositoryError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let price = match (row.price_cents, row.currency) {
            (Some(amount_cents), Some(currency)) => Some(Price {
                amount_cents,
                currency: currency
                    .parse::<Currency>()
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            }),
            _ => None,
        };
        let max_spots = row
            .max_spots
            .map(u32::try_from)
            .transpose()
            .map_err(|e| RepositoryError::Decode(format!("max_spots: {e}")))?;

        Ok(Self {
            id: EventId::from_uuid(row.id),
            slug: row.slug,
            owner_id: OwnerId::from_uuid(row.owner_id),
            owner_email: row.owner_email,
            title: row.title,
            description: row.description,
            starts_at: row.starts_at,
            location: row.location,
            price,
            max_spots,
            password: row.password,
            enabled: row.enabled,
            payment_methods: row.payment_methods.0,
            created_at: row.created_at,
        })
    }
}

fn events_from_rows(rows: Vec<EventRow>) -> Result<Vec<Event>, RepositoryError> {
    rows.into_iter().map(Event::try_from).collect()
}

fn max_spots_column(event: &Event) -> Result<Option<i32>, RepositoryError> {
    event
        .max_spots
        .map(i32::try_from)
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("max_spots: {e}")))
}

#[derive(sqlx::FromRow)]
struct AttendeeRow {
    id: Uuid,
    event_id: Uuid,
    full_name: String,
    phone: String,
    paid: bool,
    registered_at: DateTime<Utc>,
}

impl From<AttendeeRow> for Attendee {
    fn from(row: AttendeeRow) -> Self {
        Self {
            id: AttendeeId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            full_name: row.full_name,
            phone: row.phone,
            paid: row.paid,
            registered_at: row.registered_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WaitlistRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    phone: String,
    message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<WaitlistRow> for WaitlistEntry {
    fn from(row: WaitlistRow) -> Self {
        Self {
            id: WaitlistEntryId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            name: row.name,
            phone: row.phone,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

impl EventRepository for PostgresRepository {
    fn insert_event(&self, event: Event) -> BoxFuture<'_, Result<Event, RepositoryError>> {
        Box::pin(async move {
            let max_spots = max_spots_column(&event)?;
            let sql = format!(
                "INSERT INTO events ({EVENT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
                 RETURNING {EVENT_COLUMNS}"
            );
            let row: EventRow = sqlx::query_as(&sql)
                .bind(event.id.as_uuid())
                .bind(&event.slug)
                .bind(event.owner_id.as_uuid())
                .bind(&event.owner_email)
                .bind(&event.title)
                .bind(&event.description)
                .bind(event.starts_at)
                .bind(&event.location)
                .bind(event.price.map(|p| p.amount_cents))
                .bind(event.price.map(|p| p.currency.code()))
                .bind(max_spots)
                .bind(&event.password)
                .bind(event.enabled)
                .bind(Json(&event.payment_methods))
                .bind(event.created_at)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;

            tracing::debug!(event_id = %event.id, slug = %event.slug, "Inserted event");
            Event::try_from(row)
        })
    }

    fn update_event(&self, event: Event) -> BoxFuture<'_, Result<Event, RepositoryError>> {
        Box::pin(async move {
            let max_spots = max_spots_column(&event)?;
            let sql = format!(
                "UPDATE events SET title = $2, description = $3, starts_at = $4, location = $5, \
                 price_cents = $6, currency = $7, max_spots = $8, password = $9, enabled = $10, \
                 payment_methods = $11 \
                 WHERE id = $1 RETURNING {EVENT_COLUMNS}"
            );
            let row: Option<EventRow> = sqlx::query_as(&sql)
                .bind(event.id.as_uuid())
                .bind(&event.title)
                .bind(&event.description)
                .bind(event.starts_at)
                .bind(&event.location)
                .bind(event.price.map(|p| p.amount_cents))
                .bind(event.price.map(|p| p.currency.code()))
                .bind(max_spots)
                .bind(&event.password)
                .bind(event.enabled)
                .bind(Json(&event.payment_methods))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

            row.map_or_else(
                || {
                    Err(RepositoryError::NotFound {
                        entity: "Event",
                        id: event.id.to_string(),
                    })
                },
                Event::try_from,
            )
        })
    }

    fn delete_event(&self, id: EventId) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM events WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound {
                    entity: "Event",
                    id: id.to_string(),
                });
            }
            Ok(())
        })
    }

    fn event_by_id(&self, id: EventId) -> BoxFuture<'_, Result<Option<Event>, RepositoryError>> {
        Box::pin(async move {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
            let row: Option<EventRow> = sqlx::query_as(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            row.map(Event::try_from).transpose()
        })
    }

    fn event_by_slug(
        &self,
        slug: String,
    ) -> BoxFuture<'_, Result<Option<Event>, RepositoryError>> {
        Box::pin(async move {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE slug = $1");
            let row: Option<EventRow> = sqlx::query_as(&sql)
                .bind(&slug)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            row.map(Event::try_from).transpose()
        })
    }

    fn events_by_owner(
        &self,
        owner: OwnerId,
    ) -> BoxFuture<'_, Result<Vec<Event>, RepositoryError>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE owner_id = $1 ORDER BY created_at DESC"
            );
            let rows: Vec<EventRow> = sqlx::query_as(&sql)
                .bind(owner.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
            events_from_rows(rows)
        })
    }

    fn public_events(
        &self,
        range: PageRange,
    ) -> BoxFuture<'_, Result<Vec<Event>, RepositoryError>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE enabled \
                 ORDER BY starts_at ASC, id ASC OFFSET $1 LIMIT $2"
            );
            let rows: Vec<EventRow> = sqlx::query_as(&sql)
                .bind(i64::from(range.offset))
                .bind(i64::from(range.limit))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
            events_from_rows(rows)
        })
    }
}

impl AttendeeRepository for PostgresRepository {
    fn insert_attendee(
        &self,
        attendee: Attendee,
    ) -> BoxFuture<'_, Result<Attendee, RepositoryError>> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO attendees ({ATTENDEE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING {ATTENDEE_COLUMNS}"
            );
            let row: AttendeeRow = sqlx::query_as(&sql)
                .bind(attendee.id.as_uuid())
                .bind(attendee.event_id.as_uuid())
                .bind(&attendee.full_name)
                .bind(&attendee.phone)
                .bind(attendee.paid)
                .bind(attendee.registered_at)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(row.into())
        })
    }

    fn attendee_by_id(
        &self,
        id: AttendeeId,
    ) -> BoxFuture<'_, Result<Option<Attendee>, RepositoryError>> {
        Box::pin(async move {
            let sql = format!("SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE id = $1");
            let row: Option<AttendeeRow> = sqlx::query_as(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(row.map(Attendee::from))
        })
    }

    fn attendees_for_event(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Vec<Attendee>, RepositoryError>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE event_id = $1 \
                 ORDER BY registered_at DESC"
            );
            let rows: Vec<AttendeeRow> = sqlx::query_as(&sql)
                .bind(event_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(rows.into_iter().map(Attendee::from).collect())
        })
    }

    fn count_attendees(&self, event_id: EventId) -> BoxFuture<'_, Result<u64, RepositoryError>> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendees WHERE event_id = $1")
                .bind(event_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
            u64::try_from(count).map_err(|e| RepositoryError::Decode(e.to_string()))
        })
    }

    fn set_paid(
        &self,
        id: AttendeeId,
        paid: bool,
    ) -> BoxFuture<'_, Result<Attendee, RepositoryError>> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE attendees SET paid = $2 WHERE id = $1 RETURNING {ATTENDEE_COLUMNS}"
            );
            let row: Option<AttendeeRow> = sqlx::query_as(&sql)
                .bind(id.as_uuid())
                .bind(paid)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            row.map(Attendee::from).ok_or_else(|| RepositoryError::NotFound {
                entity: "Attendee",
                id: id.to_string(),
            })
        })
    }

    fn delete_attendee(&self, id: AttendeeId) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM attendees WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound {
                    entity: "Attendee",
                    id: id.to_string(),
                });
            }
            Ok(())
        })
    }
}

impl WaitlistRepository for PostgresRepository {
    fn insert_waitlist_entry(
        &self,
        entry: WaitlistEntry,
    ) -> BoxFuture<'_, Result<WaitlistEntry, RepositoryError>> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO waitlist_entries ({WAITLIST_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING {WAITLIST_COLUMNS}"
            );
            let row: WaitlistRow = sqlx::query_as(&sql)
                .bind(entry.id.as_uuid())
                .bind(entry.event_id.as_uuid())
                .bind(&entry.name)
                .bind(&entry.phone)
                .bind(&entry.message)
                .bind(entry.created_at)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(row.into())
        })
    }

    fn waitlist_for_event(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Vec<WaitlistEntry>, RepositoryError>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {WAITLIST_COLUMNS} FROM waitlist_entries WHERE event_id = $1 \
                 ORDER BY created_at DESC"
            );
            let rows: Vec<WaitlistRow> = sqlx::query_as(&sql)
                .bind(event_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(rows.into_iter().map(WaitlistEntry::from).collect())
        })
    }
}

impl Repository for PostgresRepository {
    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(map_sqlx)
        })
    }
}
