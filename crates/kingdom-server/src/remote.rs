use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::RemoteConfig;
use crate::redis_store::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store command failed: {0}")]
    Command(String),
    #[error("remote store misconfigured: {0}")]
    Config(String),
}

/// One checked-out connection to the remote key-value store.
pub trait RemoteConnection {
    fn exists(&mut self, key: &str) -> Result<bool, StoreError>;

    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// A pool of connections to the remote key-value store.
pub trait RemoteStore: Send + Sync {
    /// Check out a connection. It is returned to the pool when dropped.
    fn connection(&self) -> Result<Box<dyn RemoteConnection + '_>, StoreError>;
}

/// Pick the remote store for `config`: Redis when a URL is set, otherwise
/// (or when the URL is unusable) an in-process [`MemoryStore`].
pub fn open_store(config: &RemoteConfig) -> Arc<dyn RemoteStore> {
    let Some(url) = config.url.as_deref() else {
        tracing::warn!("No remote.url configured, player records are kept in memory only");
        return Arc::new(MemoryStore::new());
    };
    match RedisStore::open(url, config) {
        Ok(store) => {
            tracing::info!(pool_size = config.pool_size, "Using Redis remote store");
            Arc::new(store)
        },
        Err(e) => {
            tracing::warn!(error = %e, "Falling back to in-memory remote store");
            Arc::new(MemoryStore::new())
        },
    }
}

/// In-process [`RemoteStore`], used when no external store is configured and
/// in tests. Tracks checked-out connections so callers can verify release.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
    open: AtomicUsize,
    acquired: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.records().insert(key.into(), value.into());
    }

    pub fn record(&self, key: &str) -> Option<String> {
        self.records().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Connections currently checked out.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Connections checked out over the store's lifetime.
    pub fn total_acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Make every command on subsequently used connections fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RemoteStore for MemoryStore {
    fn connection(&self) -> Result<Box<dyn RemoteConnection + '_>, StoreError> {
        self.open.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection { store: self }))
    }
}

struct MemoryConnection<'a> {
    store: &'a MemoryStore,
}

impl MemoryConnection<'_> {
    fn check(&self) -> Result<(), StoreError> {
        if self.store.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Command("store is failing".to_string()));
        }
        Ok(())
    }
}

impl RemoteConnection for MemoryConnection<'_> {
    fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.store.records().contains_key(key))
    }

    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.store.records().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.store
            .records()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl Drop for MemoryConnection<'_> {
    fn drop(&mut self) {
        self.store.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_is_released_on_drop() {
        let store = MemoryStore::new();
        {
            let mut conn = store.connection().unwrap();
            conn.set("k", "v").unwrap();
            assert_eq!(store.open_connections(), 1);
        }
        assert_eq!(store.open_connections(), 0);
        assert_eq!(store.total_acquired(), 1);
        assert_eq!(store.record("k").as_deref(), Some("v"));
    }

    #[test]
    fn open_store_without_url_is_in_memory() {
        let store = open_store(&RemoteConfig::default());
        let mut conn = store.connection().unwrap();
        conn.set("player_alice", "rank=1\n").unwrap();
        assert!(conn.exists("player_alice").unwrap());
    }

    #[test]
    fn open_store_with_bad_url_falls_back() {
        let config = RemoteConfig {
            url: Some("nonsense".to_string()),
            ..RemoteConfig::default()
        };
        let store = open_store(&config);
        let mut conn = store.connection().unwrap();
        assert!(!conn.exists("player_alice").unwrap());
    }

    #[test]
    fn failing_store_rejects_commands() {
        let store = MemoryStore::new();
        store.insert("k", "v");
        store.set_failing(true);
        let mut conn = store.connection().unwrap();
        assert!(conn.exists("k").is_err());
        assert!(conn.get("k").is_err());
        assert!(conn.set("k", "w").is_err());
        drop(conn);
        assert_eq!(store.record("k").as_deref(), Some("v"));
    }
}
