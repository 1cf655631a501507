//! Process-local repository.
//!
//! Mirrors the `PostgreSQL` schema closely enough for tests and local runs:
//! the same unique constraints, cascading deletes, and attendee
//! insert/update notifications published on an [`InMemoryChangeFeed`].

use super::{
    ATTENDEE_PHONE_UNIQUE, AttendeeRepository, EVENT_SLUG_UNIQUE, EventRepository, PageRange,
    Repository, RepositoryError, WaitlistRepository,
};
use crate::realtime::ATTENDEES_TABLE;
use crate::types::{Attendee, AttendeeId, Event, EventId, OwnerId, WaitlistEntry};
use futures::future::BoxFuture;
use iamin_core::change_feed::ChangeEvent;
use iamin_testing::InMemoryChangeFeed;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    attendees: HashMap<AttendeeId, Attendee>,
    waitlist: Vec<WaitlistEntry>,
}

/// In-memory [`Repository`].
///
/// Cloning shares the tables and the feed.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    tables: Arc<RwLock<Tables>>,
    feed: InMemoryChangeFeed<Attendee>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new(InMemoryChangeFeed::default())
    }
}

impl MemoryRepository {
    /// Create an empty repository publishing attendee changes on `feed`.
    #[must_use]
    pub fn new(feed: InMemoryChangeFeed<Attendee>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            feed,
        }
    }

    /// The feed attendee changes are published on.
    #[must_use]
    pub const fn change_feed(&self) -> &InMemoryChangeFeed<Attendee> {
        &self.feed
    }

    /// Number of stored waitlist entries, across all events.
    pub async fn waitlist_len(&self) -> usize {
        self.tables.read().await.waitlist.len()
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> RepositoryError {
    RepositoryError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn newest_first<T>(rows: &mut [T], key: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
}

impl EventRepository for MemoryRepository {
    fn insert_event(&self, event: Event) -> BoxFuture<'_, Result<Event, RepositoryError>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if tables.events.values().any(|e| e.slug == event.slug) {
                return Err(RepositoryError::UniqueViolation {
                    constraint: EVENT_SLUG_UNIQUE.to_string(),
                });
            }
            tables.events.insert(event.id, event.clone());
            Ok(event)
        })
    }

    fn update_event(&self, event: Event) -> BoxFuture<'_, Result<Event, RepositoryError>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let stored = tables
                .events
                .get_mut(&event.id)
                .ok_or_else(|| not_found("Event", event.id))?;

            let slug = stored.slug.clone();
            let created_at = stored.created_at;
            *stored = Event {
                slug,
                created_at,
                ..event
            };
            Ok(stored.clone())
        })
    }

    fn delete_event(&self, id: EventId) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            tables
                .events
                .remove(&id)
                .ok_or_else(|| not_found("Event", id))?;
            tables.attendees.retain(|_, a| a.event_id != id);
            tables.waitlist.retain(|w| w.event_id != id);
            Ok(())
        })
    }

    fn event_by_id(&self, id: EventId) -> BoxFuture<'_, Result<Option<Event>, RepositoryError>> {
        Box::pin(async move { Ok(self.tables.read().await.events.get(&id).cloned()) })
    }

    fn event_by_slug(
        &self,
        slug: String,
    ) -> BoxFuture<'_, Result<Option<Event>, RepositoryError>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables.events.values().find(|e| e.slug == slug).cloned())
        })
    }

    fn events_by_owner(
        &self,
        owner: OwnerId,
    ) -> BoxFuture<'_, Result<Vec<Event>, RepositoryError>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut events: Vec<Event> = tables
                .events
                .values()
                .filter(|e| e.owner_id == owner)
                .cloned()
                .collect();
            newest_first(&mut events, |e| e.created_at);
            Ok(events)
        })
    }

    fn public_events(
        &self,
        range: PageRange,
    ) -> BoxFuture<'_, Result<Vec<Event>, RepositoryError>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut events: Vec<Event> =
                tables.events.values().filter(|e| e.enabled).cloned().collect();
            events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.cmp(&b.id)));
            Ok(events
                .into_iter()
                .skip(range.offset as usize)
                .take(range.limit as usize)
                .collect())
        })
    }
}

impl AttendeeRepository for MemoryRepository {
    fn insert_attendee(
        &self,
        attendee: Attendee,
    ) -> BoxFuture<'_, Result<Attendee, RepositoryError>> {
        Box::pin(async move {
            {
                let mut tables = self.tables.write().await;
                if !tables.events.contains_key(&attendee.event_id) {
                    return Err(RepositoryError::Database(format!(
                        "attendee references missing event {}",
                        attendee.event_id
                    )));
                }
                let duplicate = tables
                    .attendees
                    .values()
                    .any(|a| a.event_id == attendee.event_id && a.phone == attendee.phone);
                if duplicate {
                    return Err(RepositoryError::UniqueViolation {
                        constraint: ATTENDEE_PHONE_UNIQUE.to_string(),
                    });
                }
                tables.attendees.insert(attendee.id, attendee.clone());
            }

            self.feed
                .publish(ATTENDEES_TABLE, ChangeEvent::Inserted(attendee.clone()));
            Ok(attendee)
        })
    }

    fn attendee_by_id(
        &self,
        id: AttendeeId,
    ) -> BoxFuture<'_, Result<Option<Attendee>, RepositoryError>> {
        Box::pin(async move { Ok(self.tables.read().await.attendees.get(&id).cloned()) })
    }

    fn attendees_for_event(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Vec<Attendee>, RepositoryError>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut attendees: Vec<Attendee> = tables
                .attendees
                .values()
                .filter(|a| a.event_id == event_id)
                .cloned()
                .collect();
            newest_first(&mut attendees, |a| a.registered_at);
            Ok(attendees)
        })
    }

    fn count_attendees(&self, event_id: EventId) -> BoxFuture<'_, Result<u64, RepositoryError>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables
                .attendees
                .values()
                .filter(|a| a.event_id == event_id)
                .count() as u64)
        })
    }

    fn set_paid(
        &self,
        id: AttendeeId,
        paid: bool,
    ) -> BoxFuture<'_, Result<Attendee, RepositoryError>> {
        Box::pin(async move {
            let updated = {
                let mut tables = self.tables.write().await;
                let attendee = tables
                    .attendees
                    .get_mut(&id)
                    .ok_or_else(|| not_found("Attendee", id))?;
                attendee.paid = paid;
                attendee.clone()
            };

            self.feed
                .publish(ATTENDEES_TABLE, ChangeEvent::Updated(updated.clone()));
            Ok(updated)
        })
    }

    fn delete_attendee(&self, id: AttendeeId) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            self.tables
                .write()
                .await
                .attendees
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| not_found("Attendee", id))
        })
    }
}

impl WaitlistRepository for MemoryRepository {
    fn insert_waitlist_entry(
        &self,
        entry: WaitlistEntry,
    ) -> BoxFuture<'_, Result<WaitlistEntry, RepositoryError>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if !tables.events.contains_key(&entry.event_id) {
                return Err(RepositoryError::Database(format!(
                    "waitlist entry references missing event {}",
                    entry.event_id
                )));
            }
            tables.waitlist.push(entry.clone());
            Ok(entry)
        })
    }

    fn waitlist_for_event(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Vec<WaitlistEntry>, RepositoryError>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut entries: Vec<WaitlistEntry> = tables
                .waitlist
                .iter()
                .filter(|w| w.event_id == event_id)
                .cloned()
                .collect();
            newest_first(&mut entries, |w| w.created_at);
            Ok(entries)
        })
    }
}

impl Repository for MemoryRepository {
    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethods, WaitlistEntryId};
    use chrono::{Duration, TimeZone, Utc};
    use futures::StreamExt;
    use iamin_core::change_feed::{ChangeFeed, ChangeFilter};

    fn event(slug: &str) -> Event {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        Event {
            id: EventId::new(),
            slug: slug.to_string(),
            owner_id: OwnerId::new(),
            owner_email: "host@example.com".to_string(),
            title: "Party".to_string(),
            description: String::new(),
            starts_at: at,
            location: String::new(),
            price: None,
            max_spots: None,
            password: None,
            enabled: true,
            payment_methods: PaymentMethods::default(),
            created_at: at,
        }
    }

    fn attendee(event_id: EventId, phone: &str, minutes: i64) -> Attendee {
        Attendee {
            id: AttendeeId::new(),
            event_id,
            full_name: "Guest".to_string(),
            phone: phone.to_string(),
            paid: false,
            registered_at: Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn slug_is_unique() {
        let repo = MemoryRepository::default();
        repo.insert_event(event("party")).await.unwrap();

        let err = repo.insert_event(event("party")).await.unwrap_err();
        assert!(err.is_unique_violation(EVENT_SLUG_UNIQUE));
    }

    #[tokio::test]
    async fn phone_is_unique_per_event() {
        let repo = MemoryRepository::default();
        let first = repo.insert_event(event("a")).await.unwrap();
        let second = repo.insert_event(event("b")).await.unwrap();

        repo.insert_attendee(attendee(first.id, "+15550001", 0))
            .await
            .unwrap();
        let err = repo
            .insert_attendee(attendee(first.id, "+15550001", 1))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(ATTENDEE_PHONE_UNIQUE));

        repo.insert_attendee(attendee(second.id, "+15550001", 2))
            .await
            .unwrap();
        assert_eq!(repo.count_attendees(first.id).await.unwrap(), 1);
        assert_eq!(repo.count_attendees(second.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_keeps_slug() {
        let repo = MemoryRepository::default();
        let stored = repo.insert_event(event("fixed")).await.unwrap();

        let mut changed = stored.clone();
        changed.slug = "moved".to_string();
        changed.title = "Renamed".to_string();
        let updated = repo.update_event(changed).await.unwrap();

        assert_eq!(updated.slug, "fixed");
        assert_eq!(updated.title, "Renamed");
    }

    #[tokio::test]
    async fn delete_cascades() {
        let repo = MemoryRepository::default();
        let stored = repo.insert_event(event("gone")).await.unwrap();
        repo.insert_attendee(attendee(stored.id, "+15550002", 0))
            .await
            .unwrap();
        repo.insert_waitlist_entry(WaitlistEntry {
            id: WaitlistEntryId::new(),
            event_id: stored.id,
            name: "Jane".to_string(),
            phone: "+1234567890".to_string(),
            message: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        repo.delete_event(stored.id).await.unwrap();

        assert_eq!(repo.count_attendees(stored.id).await.unwrap(), 0);
        assert_eq!(repo.waitlist_len().await, 0);
        assert!(repo.event_by_slug("gone".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn attendees_listed_newest_first() {
        let repo = MemoryRepository::default();
        let stored = repo.insert_event(event("list")).await.unwrap();
        for (i, phone) in ["+1555001", "+1555002", "+1555003"].iter().enumerate() {
            repo.insert_attendee(attendee(stored.id, phone, i as i64))
                .await
                .unwrap();
        }

        let phones: Vec<String> = repo
            .attendees_for_event(stored.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.phone)
            .collect();
        assert_eq!(phones, ["+1555003", "+1555002", "+1555001"]);
    }

    #[tokio::test]
    async fn catalog_skips_disabled_and_paginates() {
        let repo = MemoryRepository::default();
        for i in 0..5 {
            let mut e = event(&format!("e{i}"));
            e.starts_at += Duration::days(i);
            e.enabled = i != 2;
            repo.insert_event(e).await.unwrap();
        }

        let first = repo.public_events(PageRange::page(0, 2)).await.unwrap();
        let second = repo.public_events(PageRange::page(1, 2)).await.unwrap();

        let slugs: Vec<&str> = first
            .iter()
            .chain(second.iter())
            .map(|e| e.slug.as_str())
            .collect();
        assert_eq!(slugs, ["e0", "e1", "e3", "e4"]);
    }

    #[tokio::test]
    async fn writes_publish_attendee_changes() {
        let repo = MemoryRepository::default();
        let stored = repo.insert_event(event("live")).await.unwrap();
        let mut sub = repo
            .change_feed()
            .subscribe(ChangeFilter::table(ATTENDEES_TABLE).eq("event_id", stored.id))
            .await
            .unwrap();

        let guest = repo
            .insert_attendee(attendee(stored.id, "+1555009", 0))
            .await
            .unwrap();
        repo.set_paid(guest.id, true).await.unwrap();

        let inserted = sub.next().await.unwrap().unwrap();
        let updated = sub.next().await.unwrap().unwrap();
        assert_eq!(inserted, ChangeEvent::Inserted(guest.clone()));
        assert!(matches!(updated, ChangeEvent::Updated(ref a) if a.paid && a.id == guest.id));
    }
}
