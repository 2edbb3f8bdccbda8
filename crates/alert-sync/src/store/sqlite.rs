//! SQLite-backed tracking store.
//!
//! One row per tracked alert:
//!
//! ```text
//! tracked_posts(key TEXT PRIMARY KEY, payload TEXT NOT NULL, expires_at INTEGER NOT NULL)
//! ```
//!
//! `payload` is the JSON-encoded [`TrackedPost`]; `expires_at` is a unix
//! timestamp in seconds. Rows past their expiry are ignored by reads and
//! purged during full scans.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{store_key, StoreError, TrackedPost, TrackingStore, DEFAULT_NAMESPACE, DEFAULT_TTL};
use crate::domain::Fingerprint;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS tracked_posts (
    key TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    expires_at INTEGER NOT NULL
)";

/// Durable store on a local SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
    ttl: Duration,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot
    /// be created.
    pub fn open(
        path: &Path,
        namespace: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        info!(path = %path.display(), "Opened tracking store");
        Self::from_connection(conn, namespace.into(), ttl)
    }

    /// Open a private in-memory database (tests, ephemeral runs).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, DEFAULT_NAMESPACE.to_string(), DEFAULT_TTL)
    }

    fn from_connection(
        conn: Connection,
        namespace: String,
        ttl: Duration,
    ) -> Result<Self, StoreError> {
        conn.execute(SCHEMA, [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tracked_posts_expiry ON tracked_posts(expires_at)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            namespace,
            ttl,
        })
    }

    /// Write a raw payload under `key`, bypassing encoding.
    ///
    /// Exposed so operators and tests can seed or repair rows directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn put_raw(&self, key: String, payload: String) -> Result<(), StoreError> {
        let expires_at = self.expiry();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tracked_posts (key, payload, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, expires_at = excluded.expires_at",
                params![key, payload, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    fn expiry(&self) -> i64 {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        Utc::now().timestamp().saturating_add(ttl)
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl TrackingStore for SqliteStore {
    async fn save(&self, fingerprint: &Fingerprint, post: &TrackedPost) -> Result<(), StoreError> {
        let payload = serde_json::to_string(post)?;
        self.put_raw(store_key(&self.namespace, fingerprint), payload)
            .await
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<TrackedPost>, StoreError> {
        let key = store_key(&self.namespace, fingerprint);
        let now = Utc::now().timestamp();
        let payload: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT payload FROM tracked_posts WHERE key = ?1 AND expires_at > ?2",
                        params![key, now],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?)
            })
            .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(post) => Ok(Some(post)),
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Dropping malformed tracked post");
                self.delete(fingerprint).await?;
                Ok(None)
            }
        }
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let key = store_key(&self.namespace, fingerprint);
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute("DELETE FROM tracked_posts WHERE key = ?1", params![key])?)
            })
            .await?;
        if removed == 0 {
            debug!(fingerprint = %fingerprint, "Delete of untracked fingerprint");
        }
        Ok(())
    }

    async fn find_all_active(&self) -> Result<Vec<TrackedPost>, StoreError> {
        let prefix = format!("{}:", self.namespace);
        let prefix_len = i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX);
        let now = Utc::now().timestamp();
        let rows: Vec<(String, String)> = self
            .with_conn(move |conn| {
                let purged = conn.execute(
                    "DELETE FROM tracked_posts WHERE expires_at <= ?1",
                    params![now],
                )?;
                if purged > 0 {
                    debug!(purged, "Purged expired tracked posts");
                }

                let mut stmt = conn.prepare(
                    "SELECT key, payload FROM tracked_posts \
                     WHERE substr(key, 1, ?1) = ?2 AND expires_at > ?3",
                )?;
                let rows: Vec<(String, String)> = stmt
                    .query_map(params![prefix_len, prefix, now], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut posts = Vec::with_capacity(rows.len());
        for (key, payload) in rows {
            match serde_json::from_str::<TrackedPost>(&payload) {
                Ok(post) => posts.push(post),
                Err(e) => warn!(key = %key, error = %e, "Skipping malformed tracked post"),
            }
        }
        Ok(posts)
    }
}
