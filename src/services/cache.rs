//! Redis-backed read-side cache for list/search queries
//!
//! Entries expire by TTL only; there is no write invalidation. Every failure
//! on the cache path (unreachable Redis, serialization error) degrades to a
//! miss or a no-op — the cache must never fail the surrounding request.

use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

#[derive(Clone)]
pub struct CacheService {
    client: Option<redis::Client>,
    ttl_seconds: u64,
}

impl CacheService {
    /// Create a cache service. Connection problems are logged, not fatal:
    /// the service starts degraded and every lookup is a miss.
    pub async fn connect(url: &str, ttl_seconds: u64) -> Self {
        let client = match redis::Client::open(url) {
            Ok(client) => {
                match client.get_multiplexed_async_connection().await {
                    Ok(mut conn) => {
                        if let Err(e) = redis::cmd("PING").query_async::<_, String>(&mut conn).await
                        {
                            tracing::warn!("Redis ping failed, cache degraded: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Redis unreachable, cache degraded: {}", e);
                    }
                }
                Some(client)
            }
            Err(e) => {
                tracing::warn!("Invalid Redis URL, cache disabled: {}", e);
                None
            }
        };

        Self {
            client,
            ttl_seconds,
        }
    }

    /// Fetch and deserialize a cached value. Any failure is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let client = self.client.as_ref()?;
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!("Cache get skipped ({}): {}", key, e);
                return None;
            }
        };

        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("Cache get failed ({}): {}", key, e);
                return None;
            }
        };

        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    /// Serialize and store a value with the configured TTL. Failures are
    /// ignored.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        let Ok(payload) = serde_json::to_string(value) else {
            return;
        };

        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!("Cache put skipped ({}): {}", key, e);
                return;
            }
        };

        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, payload, self.ttl_seconds)
            .await
        {
            tracing::debug!("Cache put failed ({}): {}", key, e);
        }
    }
}
