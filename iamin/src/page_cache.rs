//! Short-lived cache of rendered public event pages, keyed by slug.
//!
//! Registrations and owner edits invalidate the entry for their event so
//! the next page load shows the new roster.

use iamin_core::Clock;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct Entry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// Slug-keyed page cache with a fixed time-to-live.
pub struct PageCache<V> {
    entries: Arc<RwLock<HashMap<String, Entry<V>>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V> Clone for PageCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<V: Clone> PageCache<V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    /// Cached page for `slug`, if present and fresh.
    pub async fn get(&self, slug: &str) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(slug)
            .filter(|entry| now - entry.stored_at < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Store the page for `slug`.
    pub async fn put(&self, slug: &str, value: V) {
        let stored_at = self.clock.now();
        self.entries
            .write()
            .await
            .insert(slug.to_string(), Entry { value, stored_at });
    }

    /// Drop the page for `slug`.
    pub async fn invalidate(&self, slug: &str) {
        if self.entries.write().await.remove(slug).is_some() {
            tracing::debug!(slug, "Page cache entry invalidated");
        }
    }

    /// Number of stored entries, fresh or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// `true` when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<V> std::fmt::Debug for PageCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
