//! Key/value storage that survives page reloads.
//!
//! Entries are either session-scoped (gone once the hosting session ends) or
//! durable. Writes are last-writer-wins; multi-key writes are not atomic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

/// Keys owned by the session coordinator.
pub mod keys {
    /// Bearer token (session-scoped).
    pub const AUTH_TOKEN: &str = "auth_token";
    /// Expiry as decimal epoch milliseconds (durable).
    pub const AUTH_EXP: &str = "auth_exp";
    /// Cached user JSON (durable).
    pub const AUTH_USER: &str = "auth_user";
    /// Selected profile id (durable).
    pub const AUTH_CURRENT_ROLE: &str = "auth_current_role";

    pub const ALL: [&str; 4] = [AUTH_TOKEN, AUTH_EXP, AUTH_USER, AUTH_CURRENT_ROLE];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScope {
    /// Cleared when the hosting session ends.
    Session,
    /// Kept across reloads until explicitly removed.
    Durable,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(format!("{err:#}"))
    }
}

#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, scope: StoreScope) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every key, attempting all of them even if some fail.
    ///
    /// Returns the first failure.
    async fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut first_err = None;
        for key in keys {
            if let Err(err) = self.remove(key).await {
                tracing::warn!(key = %key, "failed to remove store entry: {err}");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Encode an expiry the way `auth_exp` stores it.
pub fn encode_expiry(at: DateTime<Utc>) -> String {
    at.timestamp_millis().to_string()
}

/// Decode an `auth_exp` value; `None` if it is not decimal epoch milliseconds.
pub fn decode_expiry(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local store, mainly for tests and embedded hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, StoreScope)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all session-scoped entries, as if the hosting session ended.
    pub fn end_session(&self) {
        self.lock().retain(|_, (_, scope)| *scope == StoreScope::Durable);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, StoreScope)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).map(|(v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: &str, scope: StoreScope) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), (value.to_string(), scope));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed store. Durable entries live in the database file;
/// session-scoped entries are held in memory only.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    pool: Arc<tokio::sync::Mutex<Option<SqlitePool>>>,
    session: Arc<Mutex<HashMap<String, String>>>,
}

impl SqliteStore {
    /// Store at `{app_data_dir}/gatehouse/session.db`.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::at_path(default_db_path()?))
    }

    /// Store at an explicit path. The database is opened lazily on first use.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: Arc::new(tokio::sync::Mutex::new(None)),
            session: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the pool, initializing the database if necessary.
    async fn get_pool(&self) -> anyhow::Result<SqlitePool> {
        let mut pool_guard = self.pool.lock().await;
        if let Some(pool) = pool_guard.as_ref() {
            return Ok(pool.clone());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory at {parent:?}"))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open session store at {:?}", self.path))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv table")?;

        *pool_guard = Some(pool.clone());
        Ok(pool)
    }

    fn session_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delete_durable(&self, key: &str) -> anyhow::Result<()> {
        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM kv WHERE key = ?1")
            .bind(key)
            .execute(&pool)
            .await
            .with_context(|| format!("failed to delete {key:?}"))?;
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.session_entries().get(key).cloned() {
            return Ok(Some(value));
        }

        let pool = self.get_pool().await?;
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&pool)
            .await
            .with_context(|| format!("failed to read {key:?}"))?;

        match row {
            Some(row) => {
                let value: String = row.try_get("value").context("malformed kv row")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, scope: StoreScope) -> Result<(), StoreError> {
        match scope {
            StoreScope::Session => {
                self.delete_durable(key).await?;
                self.session_entries().insert(key.to_string(), value.to_string());
            }
            StoreScope::Durable => {
                let pool = self.get_pool().await?;
                sqlx::query(
                    r#"
                    INSERT INTO kv (key, value, updated_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(key)
                .bind(value)
                .bind(Utc::now().to_rfc3339())
                .execute(&pool)
                .await
                .with_context(|| format!("failed to write {key:?}"))?;
                self.session_entries().remove(key);
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.session_entries().remove(key);
        self.delete_durable(key).await?;
        Ok(())
    }
}

/// Resolve `{app_data_dir}/gatehouse/session.db`.
fn default_db_path() -> anyhow::Result<PathBuf> {
    let mut dir = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    dir.push("gatehouse");
    dir.push("session.db");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> PathBuf {
        std::env::temp_dir().join(format!("gatehouse-test-{}.db", uuid::Uuid::now_v7()))
    }

    #[test]
    fn expiry_encoding_is_epoch_millis() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(encode_expiry(at), "1700000000123");
        assert_eq!(decode_expiry("1700000000123"), Some(at));
        assert_eq!(decode_expiry("tomorrow"), None);
    }

    #[tokio::test]
    async fn memory_store_session_entries_end_with_the_session() {
        let store = MemoryStore::new();
        store.set(keys::AUTH_TOKEN, "t", StoreScope::Session).await.unwrap();
        store.set(keys::AUTH_EXP, "1", StoreScope::Durable).await.unwrap();

        store.end_session();

        assert_eq!(store.get(keys::AUTH_TOKEN).await.unwrap(), None);
        assert_eq!(store.get(keys::AUTH_EXP).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn remove_all_clears_every_key() {
        let store = MemoryStore::new();
        for key in keys::ALL {
            store.set(key, "x", StoreScope::Durable).await.unwrap();
        }
        store.remove_all(&keys::ALL).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sqlite_store_persists_durable_entries_across_instances() {
        let path = temp_db();

        let first = SqliteStore::at_path(&path);
        first.set(keys::AUTH_EXP, "42", StoreScope::Durable).await.unwrap();
        first.set(keys::AUTH_TOKEN, "secret", StoreScope::Session).await.unwrap();
        assert_eq!(first.get(keys::AUTH_TOKEN).await.unwrap().as_deref(), Some("secret"));

        // A fresh instance models a reload: durable survives, session does not.
        let second = SqliteStore::at_path(&path);
        assert_eq!(second.get(keys::AUTH_EXP).await.unwrap().as_deref(), Some("42"));
        assert_eq!(second.get(keys::AUTH_TOKEN).await.unwrap(), None);

        second.remove(keys::AUTH_EXP).await.unwrap();
        assert_eq!(first.get(keys::AUTH_EXP).await.unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn sqlite_store_scope_switch_does_not_leave_stale_copies() {
        let path = temp_db();
        let store = SqliteStore::at_path(&path);

        store.set(keys::AUTH_USER, "durable", StoreScope::Durable).await.unwrap();
        store.set(keys::AUTH_USER, "session", StoreScope::Session).await.unwrap();
        assert_eq!(store.get(keys::AUTH_USER).await.unwrap().as_deref(), Some("session"));

        store.remove(keys::AUTH_USER).await.unwrap();
        assert_eq!(store.get(keys::AUTH_USER).await.unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }
}
