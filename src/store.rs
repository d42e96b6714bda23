//! Per-session storage for analysis payloads.
//!
//! The analytics core never holds sessions itself; callers inject one of
//! these stores. Each key is written atomically as a whole; there is no
//! locking across keys and no guarantee that an entry survives eviction
//! while it is being read (a vanished entry reads as `None`).

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::transport::SessionPayload;

const PAYLOAD_FILE: &str = "session.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid session key: {0:?}")]
    InvalidKey(String),

    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session payload could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("session database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("session schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Opaque session identifier, safe to use as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn generate() -> Self {
        SessionKey(Uuid::new_v4().to_string())
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        let valid = !value.is_empty()
            && value.len() <= 128
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(SessionKey(value.to_string()))
        } else {
            Err(StoreError::InvalidKey(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[allow(async_fn_in_trait)]
pub trait SessionStore {
    /// Creates or overwrites the entry for `key`.
    async fn put(&self, key: &SessionKey, payload: &SessionPayload) -> Result<(), StoreError>;

    async fn get(&self, key: &SessionKey) -> Result<Option<SessionPayload>, StoreError>;

    /// Returns whether an entry was removed.
    async fn remove(&self, key: &SessionKey) -> Result<bool, StoreError>;

    /// Drops every entry last written more than `max_age` ago and returns
    /// how many went.
    async fn evict_older_than(&self, max_age: Duration) -> Result<usize, StoreError>;
}

fn is_older(written: SystemTime, max_age: Duration, now: SystemTime) -> bool {
    now.duration_since(written)
        .map(|age| age > max_age)
        .unwrap_or(false)
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<SessionKey, (SystemTime, SessionPayload)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    async fn put(&self, key: &SessionKey, payload: &SessionPayload) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(key.clone(), (SystemTime::now(), payload.clone()));
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<SessionPayload>, StoreError> {
        Ok(self.entries.read().get(key).map(|(_, payload)| payload.clone()))
    }

    async fn remove(&self, key: &SessionKey) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn evict_older_than(&self, max_age: Duration) -> Result<usize, StoreError> {
        let now = SystemTime::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, (written, _)| !is_older(*written, max_age, now));
        Ok(before - entries.len())
    }
}

/// One directory per session under `root`, holding `session.json` next to
/// whatever else was uploaded for that session.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, key: &SessionKey) -> PathBuf {
        self.root.join(key.as_str())
    }
}

impl SessionStore for FileSessionStore {
    async fn put(&self, key: &SessionKey, payload: &SessionPayload) -> Result<(), StoreError> {
        let dir = self.session_dir(key);
        tokio::fs::create_dir_all(&dir).await?;

        let encoded = serde_json::to_vec(payload)?;
        let staging = dir.join(format!("{PAYLOAD_FILE}.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&staging, encoded).await?;
        tokio::fs::rename(&staging, dir.join(PAYLOAD_FILE)).await?;
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<SessionPayload>, StoreError> {
        let path = self.session_dir(key).join(PAYLOAD_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn remove(&self, key: &SessionKey) -> Result<bool, StoreError> {
        match tokio::fs::remove_dir_all(self.session_dir(key)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Reading `root` is the only failure that is reported; entries that
    /// cannot be inspected or removed are logged and skipped.
    async fn evict_older_than(&self, max_age: Duration) -> Result<usize, StoreError> {
        let now = SystemTime::now();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0usize;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let modified = match entry.metadata().await {
                Ok(metadata) if metadata.is_dir() => metadata.modified(),
                Ok(_) => continue,
                Err(err) => Err(err),
            };
            let modified = match modified {
                Ok(modified) => modified,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "cannot read session age");
                    continue;
                }
            };
            if !is_older(modified, max_age, now) {
                continue;
            }

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "removed stale session");
                    removed += 1;
                }
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove stale session"),
            }
        }

        Ok(removed)
    }
}

/// Sessions kept in Postgres, see `migrations/`.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

impl SessionStore for PgSessionStore {
    async fn put(&self, key: &SessionKey, payload: &SessionPayload) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO progress_analytics.sessions (key, payload, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key.as_str())
        .bind(sqlx::types::Json(payload))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<SessionPayload>, StoreError> {
        let row: Option<(sqlx::types::Json<SessionPayload>,)> =
            sqlx::query_as("SELECT payload FROM progress_analytics.sessions WHERE key = $1")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(payload,)| payload.0))
    }

    async fn remove(&self, key: &SessionKey) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM progress_analytics.sessions WHERE key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn evict_older_than(&self, max_age: Duration) -> Result<usize, StoreError> {
        let result = sqlx::query(
            "DELETE FROM progress_analytics.sessions WHERE updated_at < now() - make_interval(secs => $1)",
        )
        .bind(max_age.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }
}
