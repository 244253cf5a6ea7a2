//! Redis-backed store for multi-process coordination.
//!
//! Work-sets are native Redis SETs (SCARD/SADD/SPOP); the visited-set is the
//! flat key space (SET/EXISTS, SCAN+DEL for reset).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{StoreBackend, StoreError, StoreResult};

/// Redis store handle. Cloning shares the underlying connection manager.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the store at `redis_url` (e.g. "redis://127.0.0.1/").
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Backend(format!("redis connection manager error: {}", e))
        })?;

        Ok(Self { conn })
    }
}

fn backend_err(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl StoreBackend for RedisStore {
    async fn set_size(&self, set: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        conn.scard(set).await.map_err(backend_err)
    }

    async fn set_add(&self, set: &str, entries: Vec<String>) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(set, entries)
            .await
            .map_err(backend_err)
    }

    async fn set_pop(&self, set: &str, count: usize) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("SPOP")
            .arg(set)
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)
    }

    async fn mark_visited(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, 1).await.map_err(backend_err)
    }

    async fn is_visited(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(backend_err)
    }

    async fn clear_visited(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .query_async(&mut conn)
                .await
                .map_err(backend_err)?;

            // The work-sets live in the same database; leave them alone.
            let victims: Vec<String> = keys
                .into_iter()
                .filter(|key| !key.starts_with("set:"))
                .collect();
            if !victims.is_empty() {
                conn.del::<_, ()>(victims).await.map_err(backend_err)?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(())
    }
}
