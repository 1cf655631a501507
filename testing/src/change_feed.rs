//! In-memory change feed for tests and local runs.
//!
//! Backed by a `tokio::sync::broadcast` channel. Every published change is
//! offered to every subscriber, and each subscription applies its
//! [`ChangeFilter`] against the JSON form of the row.

use iamin_core::change_feed::{
    ChangeEvent, ChangeFeed, ChangeFeedError, ChangeFilter, ChangeStream, Subscription,
};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// A published change, tagged with the table it happened on.
#[derive(Clone, Debug)]
struct TableChange<T> {
    table: String,
    event: ChangeEvent<T>,
}

/// Broadcast-backed [`ChangeFeed`].
///
/// Cloning shares the underlying channel.
#[derive(Debug)]
pub struct InMemoryChangeFeed<T> {
    sender: broadcast::Sender<TableChange<T>>,
    subscribers: Arc<AtomicUsize>,
}

impl<T> Clone for InMemoryChangeFeed<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for InMemoryChangeFeed<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(256)
    }
}

impl<T> InMemoryChangeFeed<T>
where
    T: Clone + Send + 'static,
{
    /// Create a feed that buffers up to `capacity` changes per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a change on `table`.
    ///
    /// Returns the number of open channels it was offered to.
    pub fn publish(&self, table: &str, event: ChangeEvent<T>) -> usize {
        let change = TableChange {
            table: table.to_string(),
            event,
        };
        self.sender.send(change).unwrap_or(0)
    }

    /// Number of subscriptions that have not been released.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }
}

impl<T> ChangeFeed<T> for InMemoryChangeFeed<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    fn subscribe(
        &self,
        filter: ChangeFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription<T>, ChangeFeedError>> + Send + '_>> {
        Box::pin(async move {
            let mut rx = self.sender.subscribe();
            let stream_filter = filter.clone();

            let stream: ChangeStream<T> = Box::pin(async_stream::stream! {
                loop {
                    match rx.recv().await {
                        Ok(change) => {
                            let row = match serde_json::to_value(change.event.record()) {
                                Ok(row) => row,
                                Err(e) => {
                                    yield Err(ChangeFeedError::DeserializationFailed(e.to_string()));
                                    continue;
                                },
                            };
                            if stream_filter.matches(&change.table, change.event.kind(), &row) {
                                yield Ok(change.event);
                            }
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "In-memory change feed subscriber lagged");
                            yield Err(ChangeFeedError::Lagged(skipped));
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            self.subscribers.fetch_add(1, Ordering::SeqCst);
            let subscribers = Arc::clone(&self.subscribers);

            tracing::debug!(table = filter.table_name(), "Opened in-memory change subscription");

            Ok(Subscription::new(filter, stream, move || {
                subscribers.fetch_sub(1, Ordering::SeqCst);
            }))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use iamin_core::change_feed::ChangeKind;
    use serde::Serialize;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq, Serialize)]
    struct Row {
        id: u32,
        group: String,
    }

    fn row(id: u32, group: &str) -> Row {
        Row {
            id,
            group: group.to_string(),
        }
    }

    #[tokio::test]
    async fn delivers_only_matching_rows() {
        let feed = InMemoryChangeFeed::<Row>::default();
        let mut sub = feed
            .subscribe(ChangeFilter::table("rows").eq("group", "a"))
            .await
            .unwrap();

        feed.publish("rows", ChangeEvent::Inserted(row(1, "b")));
        feed.publish("other", ChangeEvent::Inserted(row(2, "a")));
        feed.publish("rows", ChangeEvent::Inserted(row(3, "a")));
        feed.publish("rows", ChangeEvent::Updated(row(3, "a")));

        let first = sub.next().await.unwrap().unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(first, ChangeEvent::Inserted(row(3, "a")));
        assert_eq!(second, ChangeEvent::Updated(row(3, "a")));
    }

    #[tokio::test]
    async fn kinds_filter_skips_updates() {
        let feed = InMemoryChangeFeed::<Row>::default();
        let mut sub = feed
            .subscribe(ChangeFilter::table("rows").kinds(&[ChangeKind::Insert]))
            .await
            .unwrap();

        feed.publish("rows", ChangeEvent::Updated(row(1, "a")));
        feed.publish("rows", ChangeEvent::Inserted(row(2, "a")));

        let next = sub.next().await.unwrap().unwrap();
        assert_eq!(next, ChangeEvent::Inserted(row(2, "a")));
    }

    #[tokio::test]
    async fn unsubscribe_and_drop_release_the_channel() {
        let feed = InMemoryChangeFeed::<Row>::default();
        let first = feed.subscribe(ChangeFilter::table("rows")).await.unwrap();
        let second = feed.subscribe(ChangeFilter::table("rows")).await.unwrap();
        assert_eq!(feed.subscriber_count(), 2);

        first.unsubscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(second);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_lag_error() {
        let feed = InMemoryChangeFeed::<Row>::new(1);
        let mut sub = feed.subscribe(ChangeFilter::table("rows")).await.unwrap();

        feed.publish("rows", ChangeEvent::Inserted(row(1, "a")));
        feed.publish("rows", ChangeEvent::Inserted(row(2, "a")));

        let next = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(next, Err(ChangeFeedError::Lagged(1))));
    }
}
