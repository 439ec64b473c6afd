//! [`RemoteStore`] backed by Redis through an r2d2 connection pool.

use redis::{Commands, RedisError};

use kingdom_core::properties::decode_text;

use crate::config::RemoteConfig;
use crate::remote::{RemoteConnection, RemoteStore, StoreError};

pub struct RedisStore {
    pool: r2d2::Pool<redis::Client>,
}

impl RedisStore {
    /// Build the pool for `url`. No connection is made until the first
    /// checkout, so an unreachable server is reported per request.
    pub fn open(url: &str, config: &RemoteConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Config(format!("invalid redis url: {e}")))?;
        let pool = r2d2::Pool::builder()
            .max_size(config.pool_size.max(1))
            .min_idle(Some(0))
            .connection_timeout(config.connect_timeout())
            .build_unchecked(client);
        Ok(Self { pool })
    }
}

impl RemoteStore for RedisStore {
    fn connection(&self) -> Result<Box<dyn RemoteConnection + '_>, StoreError> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Box::new(RedisConnection { conn }))
    }
}

/// Pooled connection; dropping it hands it back to the pool.
struct RedisConnection {
    conn: r2d2::PooledConnection<redis::Client>,
}

impl RemoteConnection for RedisConnection {
    fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        let conn: &mut redis::Connection = &mut self.conn;
        conn.exists(key).map_err(store_error)
    }

    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let conn: &mut redis::Connection = &mut self.conn;
        let raw: Option<Vec<u8>> = conn.get(key).map_err(store_error)?;
        Ok(raw.map(|bytes| decode_text(&bytes).into_owned()))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn: &mut redis::Connection = &mut self.conn;
        conn.set::<_, _, ()>(key, value).map_err(store_error)
    }
}

fn store_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::attributes::RemoteAttributes;

    fn unreachable_config() -> RemoteConfig {
        RemoteConfig {
            url: Some("redis://127.0.0.1:1/".to_string()),
            pool_size: 1,
            connect_timeout_ms: 200,
        }
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let err = RedisStore::open("not a url", &RemoteConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Config(_)), "{err}");
    }

    #[test]
    fn unreachable_server_fails_checkout() {
        let config = unreachable_config();
        let store = RedisStore::open(config.url.as_deref().unwrap(), &config).unwrap();
        let started = Instant::now();
        let err = store.connection().err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn unreachable_server_fails_attribute_writes() {
        let config = unreachable_config();
        let store = RedisStore::open(config.url.as_deref().unwrap(), &config).unwrap();
        let remote = RemoteAttributes::new(Arc::new(store));
        assert!(remote.try_write_value("alice", "rank", "2").is_err());
    }
}
