//! Change feed over `PostgreSQL` `LISTEN/NOTIFY`.
//!
//! A row trigger publishes every insert/update with `pg_notify(channel, payload)`
//! where the payload is a JSON [`NotifyPayload`]:
//!
//! ```json
//! {"table": "attendees", "type": "INSERT", "record": { ...row... }}
//! ```
//!
//! Each [`Subscription`] owns a dedicated [`PgListener`] connection. The
//! filter is applied on the receiving side; dropping the subscription drops
//! the listener, which closes its connection and with it the `LISTEN`.
//!
//! Delivery follows the transport: a broken connection ends the stream with
//! an error and is not re-established here.

use iamin_core::change_feed::{
    ChangeEvent, ChangeFeed, ChangeFeedError, ChangeFilter, ChangeKind, ChangeStream,
    Subscription,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgListener, PgPool};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// JSON payload emitted by the notify trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyPayload {
    /// Table the change happened on
    pub table: String,
    /// `INSERT` or `UPDATE`
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// The post-change row
    pub record: serde_json::Value,
}

impl NotifyPayload {
    /// Decode a raw notification payload.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeFeedError::DeserializationFailed`] if the payload is not a
    /// well-formed [`NotifyPayload`].
    pub fn parse(raw: &str) -> Result<Self, ChangeFeedError> {
        serde_json::from_str(raw).map_err(|e| ChangeFeedError::DeserializationFailed(e.to_string()))
    }

    /// Apply `filter` and decode the row, yielding `None` when filtered out.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeFeedError::DeserializationFailed`] if a matching row
    /// does not decode into `T`.
    pub fn into_event<T: DeserializeOwned>(
        self,
        filter: &ChangeFilter,
    ) -> Result<Option<ChangeEvent<T>>, ChangeFeedError> {
        if !filter.matches(&self.table, self.kind, &self.record) {
            return Ok(None);
        }
        let row = serde_json::from_value(self.record)
            .map_err(|e| ChangeFeedError::DeserializationFailed(e.to_string()))?;
        Ok(Some(ChangeEvent::from_kind(self.kind, row)))
    }
}

/// `LISTEN/NOTIFY`-backed [`ChangeFeed`].
pub struct PgChangeFeed<T> {
    pool: PgPool,
    channel: String,
    _row: PhantomData<fn() -> T>,
}

impl<T> PgChangeFeed<T> {
    /// Create a feed listening on `channel`.
    #[must_use]
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
            _row: PhantomData,
        }
    }

    /// The notification channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl<T> Clone for PgChangeFeed<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            channel: self.channel.clone(),
            _row: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for PgChangeFeed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgChangeFeed")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl<T> ChangeFeed<T> for PgChangeFeed<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn subscribe(
        &self,
        filter: ChangeFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription<T>, ChangeFeedError>> + Send + '_>> {
        Box::pin(async move {
            let mut listener = PgListener::connect_with(&self.pool)
                .await
                .map_err(|e| ChangeFeedError::ConnectionFailed(e.to_string()))?;

            listener
                .listen(&self.channel)
                .await
                .map_err(|e| ChangeFeedError::SubscriptionFailed {
                    table: filter.table_name().to_string(),
                    reason: e.to_string(),
                })?;

            tracing::debug!(
                channel = %self.channel,
                table = filter.table_name(),
                "Opened LISTEN subscription"
            );
            metrics::gauge!("change_feed_listeners_active").increment(1.0);

            let stream_filter = filter.clone();
            let stream: ChangeStream<T> = Box::pin(async_stream::stream! {
                loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            let decoded = NotifyPayload::parse(notification.payload())
                                .and_then(|payload| payload.into_event(&stream_filter));
                            match decoded {
                                Ok(Some(event)) => yield Ok(event),
                                Ok(None) => {},
                                Err(e) => {
                                    tracing::warn!(error = %e, "Dropping undecodable notification");
                                    yield Err(e);
                                },
                            }
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "LISTEN connection failed");
                            yield Err(ChangeFeedError::TransportError(e.to_string()));
                            break;
                        },
                    }
                }
            });

            let channel = self.channel.clone();
            Ok(Subscription::new(filter, stream, move || {
                metrics::gauge!("change_feed_listeners_active").decrement(1.0);
                tracing::debug!(channel = %channel, "Released LISTEN subscription");
            }))
        })
    }
}
