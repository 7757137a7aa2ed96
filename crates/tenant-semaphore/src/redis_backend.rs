//! Redis-backed [`SemaphoreBackend`]: a per-team sorted set keyed by
//! `holder_id`, scored by `expires_at` (ms since epoch). `acquire`'s
//! "evict-expired-then-check-and-insert" must be indivisible even under
//! concurrent callers, so it rides on a single Lua `EVAL` the same way the
//! teacher's `RedisRateLimiter` wraps its sliding-window/token-bucket logic
//! in `redis::Script`s rather than round-tripping multiple commands.

use crate::backend::{AcquireAttempt, SemaphoreBackend};
use crate::error::{Result, SemaphoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

/// Evict expired holders, then admit the caller if the remaining cardinality
/// is below `limit`. Returns `{granted, count, removed}`.
fn acquire_script() -> Script {
    Script::new(
        r#"
        local key = KEYS[1]
        local holder = ARGV[1]
        local now = tonumber(ARGV[2])
        local expires_at = tonumber(ARGV[3])
        local limit = tonumber(ARGV[4])

        local removed = redis.call('ZREMRANGEBYSCORE', key, '-inf', now)
        local current = redis.call('ZCARD', key)

        if current < limit then
            redis.call('ZADD', key, expires_at, holder)
            return {1, current + 1, removed}
        else
            return {0, current, removed}
        end
        "#,
    )
}

/// Extend `holder`'s score iff it is still a member. Returns `1`/`0`.
fn heartbeat_script() -> Script {
    Script::new(
        r#"
        local key = KEYS[1]
        local holder = ARGV[1]
        local expires_at = tonumber(ARGV[2])

        if redis.call('ZSCORE', key, holder) then
            redis.call('ZADD', key, expires_at, holder)
            return 1
        else
            return 0
        end
        "#,
    )
}

pub struct RedisSemaphoreBackend {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisSemaphoreBackend {
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| SemaphoreError::StoreUnavailable(anyhow::anyhow!(e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SemaphoreError::StoreUnavailable(anyhow::anyhow!(e)))?;
        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, team_id: &str) -> String {
        format!("{}:semaphore:{}", self.key_prefix, team_id)
    }
}

fn store_err(e: redis::RedisError) -> SemaphoreError {
    SemaphoreError::StoreUnavailable(anyhow::anyhow!(e))
}

#[async_trait]
impl SemaphoreBackend for RedisSemaphoreBackend {
    async fn acquire(&self, team_id: &str, holder_id: &str, limit: u32, ttl_ms: i64) -> Result<AcquireAttempt> {
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = now + ttl_ms;
        let mut conn = self.conn.clone();
        let result: Vec<i64> = acquire_script()
            .key(self.key(team_id))
            .arg(holder_id)
            .arg(now)
            .arg(expires_at)
            .arg(limit)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(AcquireAttempt {
            granted: result[0] == 1,
            count: result[1] as u64,
            removed: result[2] as u64,
        })
    }

    async fn heartbeat(&self, team_id: &str, holder_id: &str, ttl_ms: i64) -> Result<bool> {
        let expires_at = chrono::Utc::now().timestamp_millis() + ttl_ms;
        let mut conn = self.conn.clone();
        let result: i64 = heartbeat_script()
            .key(self.key(team_id))
            .arg(holder_id)
            .arg(expires_at)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(result == 1)
    }

    async fn release(&self, team_id: &str, holder_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.zrem(self.key(team_id), holder_id).await.map_err(store_err)?;
        Ok(())
    }

    async fn count(&self, team_id: &str) -> Result<u64> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();
        let key = self.key(team_id);
        let _: i64 = conn.zrembyscore(&key, "-inf", now).await.map_err(store_err)?;
        let count: u64 = conn.zcard(&key).await.map_err(store_err)?;
        Ok(count)
    }
}
