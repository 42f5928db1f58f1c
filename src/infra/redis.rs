//! Redis-backed remote cache tier.
//!
//! Entries are plain string values with EX; each tag is a Redis set of entry
//! keys, written in the same MULTI as the entry so the index never lags the
//! data. Generation counters are INCR'd integers.
//!
//! The connection is a `ConnectionManager`: a dropped connection fails the
//! command in flight and is re-established in the background, so the store
//! recovers from a server restart without a process restart.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::info;

use crate::cache::{RemoteStore, RemoteStoreError};

const SCAN_COUNT: usize = 200;

pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisStore {
    /// Parses the URL. The connection is opened lazily on first use; a failed
    /// first attempt is retried by the next call.
    pub fn open(url: &str) -> Result<Self, RemoteStoreError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, RemoteStoreError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let connection = self
                    .client
                    .get_connection_manager()
                    .await
                    .map_err(map_redis_error)?;
                info!("Connected to remote cache");
                Ok::<_, RemoteStoreError>(connection)
            })
            .await?;
        Ok(connection.clone())
    }

    pub async fn ping(&self) -> Result<(), RemoteStoreError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

fn map_redis_error(err: redis::RedisError) -> RemoteStoreError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        RemoteStoreError::connection(err.to_string())
    } else {
        RemoteStoreError::command(err.to_string())
    }
}

/// Escapes glob metacharacters so the prefix matches literally.
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteStoreError> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn set_tagged(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        tag_sets: &[String],
    ) -> Result<(), RemoteStoreError> {
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);

        let mut pipe = redis::pipe();
        pipe.atomic().set_ex(key, value, ttl_secs).ignore();
        for tag_set in tag_sets {
            pipe.sadd(tag_set, key)
                .ignore()
                .expire(tag_set, ttl_secs as i64)
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, RemoteStoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        conn.del(keys).await.map_err(map_redis_error)
    }

    async fn tag_members(&self, tag_set: &str) -> Result<Vec<String>, RemoteStoreError> {
        let mut conn = self.connection().await?;
        conn.smembers(tag_set).await.map_err(map_redis_error)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, RemoteStoreError> {
        let mut conn = self.connection().await?;
        let pattern = scan_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            keys.extend(batch);

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn generations(&self, counters: &[String]) -> Result<Vec<u64>, RemoteStoreError> {
        if counters.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let values: Vec<Option<u64>> = redis::cmd("MGET")
            .arg(counters)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(values.into_iter().map(Option::unwrap_or_default).collect())
    }

    async fn bump_generations(
        &self,
        counters: &[String],
        ttl: Duration,
    ) -> Result<(), RemoteStoreError> {
        if counters.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1) as i64;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for counter in counters {
            pipe.incr(counter, 1_u64)
                .ignore()
                .expire(counter, ttl_secs)
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_pattern_escapes_glob_characters() {
        assert_eq!(scan_pattern("vitrine:"), "vitrine:*");
        assert_eq!(scan_pattern("shop[eu]*:"), "shop\\[eu\\]\\*:*");
    }

    #[test]
    fn open_rejects_malformed_url() {
        assert!(RedisStore::open("not a url").is_err());
        assert!(RedisStore::open("redis://127.0.0.1:6379/0").is_ok());
    }

    /// Needs a disposable Redis at `VITRINE_TEST_REDIS_URL`.
    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn recovers_after_server_side_disconnect() {
        let Ok(url) = std::env::var("VITRINE_TEST_REDIS_URL") else {
            return;
        };
        let store = RedisStore::open(&url).expect("valid url");
        store.ping().await.expect("initial ping");

        let admin = redis::Client::open(url.as_str()).expect("valid url");
        let mut admin = admin
            .get_multiplexed_async_connection()
            .await
            .expect("admin connection");
        let _: u64 = redis::cmd("CLIENT")
            .arg("KILL")
            .arg("TYPE")
            .arg("normal")
            .arg("SKIPME")
            .arg("yes")
            .query_async(&mut admin)
            .await
            .expect("kill clients");

        let mut recovered = false;
        for _ in 0..20 {
            if store.ping().await.is_ok() {
                recovered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(recovered, "store should reconnect after the server dropped it");
    }
}
