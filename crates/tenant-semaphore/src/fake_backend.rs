//! In-memory [`SemaphoreBackend`] used by this crate's own tests so the
//! acquire/heartbeat/backoff logic in [`crate::TenantSemaphore`] can be
//! exercised without a live Redis, mirroring `queue-core::fake_backend`.

use crate::backend::{AcquireAttempt, SemaphoreBackend};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    // team_id -> holder_id -> expires_at_ms
    teams: HashMap<String, HashMap<String, i64>>,
}

pub struct FakeSemaphoreBackend {
    inner: Mutex<Inner>,
    now_override: Mutex<Option<i64>>,
}

impl FakeSemaphoreBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            now_override: Mutex::new(None),
        }
    }

    /// Pin "now" for deterministic expiry tests instead of racing the clock.
    pub fn set_now(&self, now_ms: i64) {
        *self.now_override.lock().unwrap() = Some(now_ms);
    }

    fn now(&self) -> i64 {
        self.now_override
            .lock()
            .unwrap()
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
    }
}

impl Default for FakeSemaphoreBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SemaphoreBackend for FakeSemaphoreBackend {
    async fn acquire(&self, team_id: &str, holder_id: &str, limit: u32, ttl_ms: i64) -> Result<AcquireAttempt> {
        let now = self.now();
        let mut inner = self.inner.lock().unwrap();
        let holders = inner.teams.entry(team_id.to_string()).or_default();

        let before = holders.len();
        holders.retain(|_, expires_at| *expires_at > now);
        let removed = (before - holders.len()) as u64;

        if (holders.len() as u32) < limit {
            holders.insert(holder_id.to_string(), now + ttl_ms);
            Ok(AcquireAttempt {
                granted: true,
                count: holders.len() as u64,
                removed,
            })
        } else {
            Ok(AcquireAttempt {
                granted: false,
                count: holders.len() as u64,
                removed,
            })
        }
    }

    async fn heartbeat(&self, team_id: &str, holder_id: &str, ttl_ms: i64) -> Result<bool> {
        let now = self.now();
        let mut inner = self.inner.lock().unwrap();
        let holders = inner.teams.entry(team_id.to_string()).or_default();
        if let Some(expires_at) = holders.get_mut(holder_id) {
            *expires_at = now + ttl_ms;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release(&self, team_id: &str, holder_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(holders) = inner.teams.get_mut(team_id) {
            holders.remove(holder_id);
        }
        Ok(())
    }

    async fn count(&self, team_id: &str) -> Result<u64> {
        let now = self.now();
        let mut inner = self.inner.lock().unwrap();
        let holders = inner.teams.entry(team_id.to_string()).or_default();
        holders.retain(|_, expires_at| *expires_at > now);
        Ok(holders.len() as u64)
    }
}
