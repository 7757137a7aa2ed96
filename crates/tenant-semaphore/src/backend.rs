//! The semaphore's storage seam, mirroring `queue-core`'s `QueueBackend`
//! split: one real implementation ([`crate::redis_backend::RedisSemaphoreBackend`])
//! and one in-memory fake ([`crate::fake_backend::FakeSemaphoreBackend`]) used
//! by this crate's tests, both implementing the same trait so tests exercise
//! the real retry/heartbeat logic in [`crate::TenantSemaphore`] above the seam.

use crate::error::Result;
use async_trait::async_trait;

/// Outcome of a single (non-blocking) acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireAttempt {
    pub granted: bool,
    /// Cardinality of the team's holder set *after* this call (including the
    /// new holder if granted).
    pub count: u64,
    /// Expired holders evicted as part of this call's atomic check-and-insert.
    pub removed: u64,
}

#[async_trait]
pub trait SemaphoreBackend: Send + Sync + 'static {
    /// Atomically: evict holders whose lease expired, then admit
    /// `holder_id` if the surviving cardinality is below `limit`.
    async fn acquire(&self, team_id: &str, holder_id: &str, limit: u32, ttl_ms: i64) -> Result<AcquireAttempt>;

    /// Extend `holder_id`'s lease to `now + ttl_ms` iff it is still a member
    /// of `team_id`'s holder set. Returns whether the holder was still
    /// present (and thus extended).
    async fn heartbeat(&self, team_id: &str, holder_id: &str, ttl_ms: i64) -> Result<bool>;

    /// Remove `holder_id` from `team_id`'s holder set unconditionally.
    async fn release(&self, team_id: &str, holder_id: &str) -> Result<()>;

    /// Non-expired holder count for `team_id`, after evicting anything past
    /// its lease. Used for diagnostics and the `Lease liveness` property.
    async fn count(&self, team_id: &str) -> Result<u64>;
}
