//! In-process tracking store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{store_key, StoreError, TrackedPost, TrackingStore, DEFAULT_NAMESPACE, DEFAULT_TTL};
use crate::domain::Fingerprint;

#[derive(Debug, Clone)]
struct Entry {
    post: TrackedPost,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// `DashMap`-backed store with per-entry expiry.
///
/// State lives only as long as the process; use [`super::SqliteStore`] when
/// records must survive restarts.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    namespace: String,
    ttl: Duration,
}

impl MemoryStore {
    /// Create a store with the default namespace and 7-day TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_NAMESPACE, DEFAULT_TTL)
    }

    /// Create a store with a custom namespace and TTL.
    #[must_use]
    pub fn with_ttl(namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            namespace: namespace.into(),
            ttl,
        }
    }

    /// Drop expired entries.
    pub fn evict_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn save(&self, fingerprint: &Fingerprint, post: &TrackedPost) -> Result<(), StoreError> {
        let key = store_key(&self.namespace, fingerprint);
        self.entries.insert(
            key,
            Entry {
                post: post.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<TrackedPost>, StoreError> {
        let key = store_key(&self.namespace, fingerprint);
        let found = self.entries.get(&key).and_then(|entry| {
            if entry.is_expired() {
                None
            } else {
                Some(entry.post.clone())
            }
        });
        if found.is_none() {
            // Expired entries are removed lazily on lookup.
            self.entries.remove_if(&key, |_, entry| entry.is_expired());
        }
        Ok(found)
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let key = store_key(&self.namespace, fingerprint);
        if self.entries.remove(&key).is_none() {
            debug!(fingerprint = %fingerprint, "Delete of untracked fingerprint");
        }
        Ok(())
    }

    async fn find_all_active(&self) -> Result<Vec<TrackedPost>, StoreError> {
        self.evict_expired();
        let prefix = format!("{}:", self.namespace);
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.value().post.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use chrono::Utc;

    fn post(fp: &str) -> TrackedPost {
        TrackedPost::new(
            format!("msg-{fp}"),
            "chan".to_string(),
            Fingerprint::parse(fp).unwrap(),
            "Disk Full".to_string(),
            Severity::Warning,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let store = MemoryStore::new();
        let p = post("fp-1");

        store.save(&p.fingerprint, &p).await.unwrap();
        let found = store.find_by_fingerprint(&p.fingerprint).await.unwrap();
        assert_eq!(found, Some(p));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = MemoryStore::new();
        let mut p = post("fp-1");
        store.save(&p.fingerprint, &p).await.unwrap();

        p.set_assignee("bob");
        store.save(&p.fingerprint, &p).await.unwrap();

        assert_eq!(store.len(), 1);
        let found = store.find_by_fingerprint(&p.fingerprint).await.unwrap().unwrap();
        assert_eq!(found.last_known_assignee, "bob");
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let store = MemoryStore::new();
        let fp = Fingerprint::parse("nope").unwrap();
        assert!(store.find_by_fingerprint(&fp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let p = post("fp-1");
        store.save(&p.fingerprint, &p).await.unwrap();

        store.delete(&p.fingerprint).await.unwrap();
        store.delete(&p.fingerprint).await.unwrap();
        assert!(store.find_by_fingerprint(&p.fingerprint).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let store = MemoryStore::with_ttl("ns", Duration::from_millis(1));
        let p = post("fp-1");
        store.save(&p.fingerprint, &p).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(store.find_by_fingerprint(&p.fingerprint).await.unwrap().is_none());
        assert!(store.find_all_active().await.unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_find_all_active() {
        let store = MemoryStore::new();
        for fp in ["a", "b", "c"] {
            let p = post(fp);
            store.save(&p.fingerprint, &p).await.unwrap();
        }

        let mut all: Vec<_> = store
            .find_all_active()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.fingerprint.to_string())
            .collect();
        all.sort();
        assert_eq!(all, vec!["a", "b", "c"]);
    }
}
