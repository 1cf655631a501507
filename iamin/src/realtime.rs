//! Realtime channel adapter: attendee changes for one event.
//!
//! Wraps a [`ChangeFeed`] and scopes every subscription to the `attendees`
//! table, INSERT and UPDATE, filtered by `event_id`. Delivery is
//! at-least-once in transport order. A broken transport ends the stream
//! with an error and is not retried here; clients reconnect and receive a
//! fresh snapshot.

use crate::types::{Attendee, EventId};
use iamin_core::change_feed::{
    ChangeFeed, ChangeFeedError, ChangeFilter, ChangeKind, Subscription,
};
use std::sync::Arc;

/// Table the roster listens to.
pub const ATTENDEES_TABLE: &str = "attendees";

/// Filter for one event's attendee inserts and updates.
#[must_use]
pub fn roster_filter(event_id: EventId) -> ChangeFilter {
    ChangeFilter::table(ATTENDEES_TABLE)
        .kinds(&[ChangeKind::Insert, ChangeKind::Update])
        .eq("event_id", event_id)
}

/// Opens roster subscriptions.
#[derive(Clone)]
pub struct RealtimeChannel {
    feed: Arc<dyn ChangeFeed<Attendee>>,
}

impl RealtimeChannel {
    /// Create a channel adapter over `feed`.
    #[must_use]
    pub fn new(feed: Arc<dyn ChangeFeed<Attendee>>) -> Self {
        Self { feed }
    }

    /// Subscribe to attendee changes of `event_id`.
    ///
    /// Dropping the returned [`Subscription`] or calling
    /// [`Subscription::unsubscribe`] releases the channel.
    ///
    /// # Errors
    ///
    /// Returns the feed's error if the subscription cannot be opened.
    pub async fn subscribe_roster(
        &self,
        event_id: EventId,
    ) -> Result<Subscription<Attendee>, ChangeFeedError> {
        let subscription = self.feed.subscribe(roster_filter(event_id)).await?;
        tracing::debug!(
            event_id = %event_id,
            subscription_id = %subscription.id(),
            "Roster subscription opened"
        );
        Ok(subscription)
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::AttendeeId;
    use chrono::Utc;
    use futures::StreamExt;
    use iamin_core::change_feed::ChangeEvent;
    use iamin_testing::InMemoryChangeFeed;
    use std::time::Duration;

    fn guest(event_id: EventId) -> Attendee {
        Attendee {
            id: AttendeeId::new(),
            event_id,
            full_name: "Guest".to_string(),
            phone: "+15550000".to_string(),
            paid: false,
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn only_the_subscribed_event_is_delivered() {
        let feed = InMemoryChangeFeed::<Attendee>::default();
        let channel = RealtimeChannel::new(Arc::new(feed.clone()));
        let mine = EventId::new();
        let other = EventId::new();

        let mut sub = channel.subscribe_roster(mine).await.unwrap();

        feed.publish(ATTENDEES_TABLE, ChangeEvent::Inserted(guest(other)));
        feed.publish("waitlist_entries", ChangeEvent::Inserted(guest(mine)));
        let expected = guest(mine);
        feed.publish(ATTENDEES_TABLE, ChangeEvent::Inserted(expected.clone()));

        let got = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got, ChangeEvent::Inserted(expected));
    }

    #[tokio::test]
    async fn dropping_the_subscription_releases_it() {
        let feed = InMemoryChangeFeed::<Attendee>::default();
        let channel = RealtimeChannel::new(Arc::new(feed.clone()));

        let first = channel.subscribe_roster(EventId::new()).await.unwrap();
        let second = channel.subscribe_roster(EventId::new()).await.unwrap();
        assert_eq!(feed.subscriber_count(), 2);

        first.unsubscribe();
        drop(second);
        assert_eq!(feed.subscriber_count(), 0);
    }
}
