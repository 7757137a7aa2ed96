//! At-most-N-concurrent-holders semaphore per tenant (`spec.md` §4.G),
//! layered over a single [`SemaphoreBackend`] storage seam the same way
//! `queue-core::QueueCore` layers its claim arbiter over `QueueBackend`.
//!
//! A held slot is kept alive by a background heartbeat task; if the
//! heartbeat is ever rejected (another process reclaimed the slot, or this
//! process stalled past its TTL), [`TenantSemaphore::with_semaphore`] cancels
//! the guarded work and surfaces [`SemaphoreError::LeaseLost`] rather than
//! letting it run unbounded outside its granted concurrency slot.

pub mod backend;
pub mod error;
pub mod fake_backend;
pub mod redis_backend;

pub use backend::{AcquireAttempt, SemaphoreBackend};
pub use error::{Result, SemaphoreError};

/// Outcome of [`TenantSemaphore::acquire_blocking`]: the granting attempt
/// plus whether the caller was ever turned away before it succeeded
/// (`spec.md` §6's `semaphore.acquire_blocking` result: "limited, removed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingAcquireResult {
    pub attempt: AcquireAttempt,
    pub limited: bool,
}

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Base delay for `acquire_blocking`'s retry backoff. Mirrors
/// `queue-core::claim::POP_BACKOFF_BASE` — both are "poll a contended shared
/// resource until a slot frees up" loops and there's no reason for their
/// jitter shapes to diverge.
const ACQUIRE_BACKOFF_BASE: Duration = Duration::from_millis(50);
const ACQUIRE_BACKOFF_CAP: Duration = Duration::from_secs(1);

fn backoff_delay(attempt: u32) -> Duration {
    let exp = ACQUIRE_BACKOFF_BASE.as_millis().saturating_mul(1u128 << attempt.min(20));
    let capped = exp.min(ACQUIRE_BACKOFF_CAP.as_millis());
    let jittered = rand::thread_rng().gen_range(capped / 2..=capped.max(1));
    Duration::from_millis(jittered as u64)
}

/// Default heartbeat cadence as a fraction of the lease TTL; keeps at least
/// two heartbeats in flight before a lease could expire from a single missed
/// beat.
const HEARTBEAT_TTL_FRACTION: u32 = 2;
const HEARTBEAT_MIN_INTERVAL: Duration = Duration::from_millis(50);

pub struct TenantSemaphore<B: SemaphoreBackend> {
    backend: Arc<B>,
    /// Single-tenant deployments (`spec.md` §4.G Non-goals) run with no
    /// contention to arbitrate; `bypass` makes every acquire an immediate,
    /// backend-free grant instead of forcing callers to configure a fake
    /// limit of `u32::MAX`.
    bypass: bool,
}

impl<B: SemaphoreBackend> Clone for TenantSemaphore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            bypass: self.bypass,
        }
    }
}

impl<B: SemaphoreBackend> TenantSemaphore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend, bypass: false }
    }

    /// Construct a semaphore that grants every acquire immediately without
    /// touching the backend, for single-tenant/self-hosted deployments where
    /// there is no cross-tenant contention to arbitrate.
    pub fn bypassed(backend: Arc<B>) -> Self {
        Self { backend, bypass: true }
    }

    /// One non-blocking attempt to admit `holder_id` into `team_id`'s set of
    /// concurrent holders.
    pub async fn acquire(&self, team_id: &str, holder_id: &str, limit: u32, ttl_ms: i64) -> Result<AcquireAttempt> {
        if self.bypass {
            return Ok(AcquireAttempt {
                granted: true,
                count: 1,
                removed: 0,
            });
        }
        self.backend.acquire(team_id, holder_id, limit, ttl_ms).await
    }

    /// Retry [`Self::acquire`] with capped exponential backoff until granted,
    /// `deadline` elapses, or `cancel` fires. `limited` is set whenever at
    /// least one attempt along the way came back refused, so a caller that
    /// eventually succeeds can still tell it had to wait out contention.
    pub async fn acquire_blocking(
        &self,
        team_id: &str,
        holder_id: &str,
        limit: u32,
        ttl_ms: i64,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<BlockingAcquireResult> {
        if self.bypass {
            let attempt = self.acquire(team_id, holder_id, limit, ttl_ms).await?;
            return Ok(BlockingAcquireResult { attempt, limited: false });
        }

        let started = Instant::now();
        let mut attempt_no = 0u32;
        let mut limited = false;
        loop {
            if cancel.is_cancelled() {
                return Err(SemaphoreError::Cancelled { team: team_id.to_string() });
            }

            let result = self.backend.acquire(team_id, holder_id, limit, ttl_ms).await?;
            if result.granted {
                return Ok(BlockingAcquireResult { attempt: result, limited });
            }
            limited = true;

            if started.elapsed() >= deadline {
                return Err(SemaphoreError::Timeout { team: team_id.to_string() });
            }

            let remaining = deadline.saturating_sub(started.elapsed());
            let delay = backoff_delay(attempt_no).min(remaining);
            attempt_no += 1;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(SemaphoreError::Cancelled { team: team_id.to_string() });
                }
            }
        }
    }

    pub async fn heartbeat(&self, team_id: &str, holder_id: &str, ttl_ms: i64) -> Result<bool> {
        if self.bypass {
            return Ok(true);
        }
        self.backend.heartbeat(team_id, holder_id, ttl_ms).await
    }

    pub async fn release(&self, team_id: &str, holder_id: &str) -> Result<()> {
        if self.bypass {
            return Ok(());
        }
        self.backend.release(team_id, holder_id).await
    }

    pub async fn count(&self, team_id: &str) -> Result<u64> {
        if self.bypass {
            return Ok(0);
        }
        self.backend.count(team_id).await
    }

    /// Acquire a slot, run `f` while a background task keeps the lease alive,
    /// and release the slot on every exit path (success, lease loss,
    /// cancellation, or `f`'s own panic-free completion).
    ///
    /// If the heartbeat is ever rejected, `f` is abandoned (not polled again)
    /// and [`SemaphoreError::LeaseLost`] is returned instead of `f`'s output.
    pub async fn with_semaphore<F, Fut, T>(
        &self,
        team_id: &str,
        holder_id: &str,
        limit: u32,
        ttl_ms: i64,
        deadline: Duration,
        cancel: CancellationToken,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire_blocking(team_id, holder_id, limit, ttl_ms, deadline, cancel.clone())
            .await?;

        if self.bypass {
            return Ok(f().await);
        }

        let heartbeat_cancel = CancellationToken::new();
        let lease_lost = Arc::new(tokio::sync::Notify::new());

        let heartbeat_handle = {
            let backend = Arc::clone(&self.backend);
            let team = team_id.to_string();
            let holder = holder_id.to_string();
            let lease_lost = Arc::clone(&lease_lost);
            let hb_cancel = heartbeat_cancel.clone();
            let interval = (Duration::from_millis(ttl_ms.max(0) as u64) / HEARTBEAT_TTL_FRACTION).max(HEARTBEAT_MIN_INTERVAL);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = hb_cancel.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {
                            match backend.heartbeat(&team, &holder, ttl_ms).await {
                                Ok(true) => {}
                                Ok(false) | Err(_) => {
                                    lease_lost.notify_one();
                                    break;
                                }
                            }
                        }
                    }
                }
            })
        };

        let result = tokio::select! {
            out = f() => Ok(out),
            _ = lease_lost.notified() => Err(SemaphoreError::LeaseLost {
                team: team_id.to_string(),
                holder: holder_id.to_string(),
            }),
            _ = cancel.cancelled() => Err(SemaphoreError::Cancelled { team: team_id.to_string() }),
        };

        heartbeat_cancel.cancel();
        let _ = heartbeat_handle.await;
        let _ = self.backend.release(team_id, holder_id).await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_backend::FakeSemaphoreBackend;

    fn semaphore() -> TenantSemaphore<FakeSemaphoreBackend> {
        TenantSemaphore::new(Arc::new(FakeSemaphoreBackend::new()))
    }

    /// `spec.md` §8: semaphore cap — the (limit+1)th concurrent holder is
    /// refused while the first `limit` remain held.
    #[tokio::test]
    async fn semaphore_cap_refuses_the_limit_plus_first_holder() {
        let sem = semaphore();
        for i in 0..3 {
            let attempt = sem.acquire("team-a", &format!("holder-{i}"), 3, 30_000).await.unwrap();
            assert!(attempt.granted);
        }
        let refused = sem.acquire("team-a", "holder-3", 3, 30_000).await.unwrap();
        assert!(!refused.granted);
        assert_eq!(refused.count, 3);
    }

    #[tokio::test]
    async fn release_frees_a_slot_for_the_next_acquirer() {
        let sem = semaphore();
        sem.acquire("team-a", "holder-0", 1, 30_000).await.unwrap();
        assert!(!sem.acquire("team-a", "holder-1", 1, 30_000).await.unwrap().granted);

        sem.release("team-a", "holder-0").await.unwrap();
        assert!(sem.acquire("team-a", "holder-1", 1, 30_000).await.unwrap().granted);
    }

    /// `spec.md` §8: lease liveness — an expired, un-heartbeated holder is
    /// evicted on the next acquire attempt for that team.
    #[tokio::test]
    async fn expired_lease_is_evicted_on_next_acquire() {
        let backend = Arc::new(FakeSemaphoreBackend::new());
        backend.set_now(0);
        let sem = TenantSemaphore::new(Arc::clone(&backend));

        sem.acquire("team-a", "holder-0", 1, 100).await.unwrap();
        backend.set_now(500);

        let attempt = sem.acquire("team-a", "holder-1", 1, 100).await.unwrap();
        assert!(attempt.granted);
        assert_eq!(attempt.removed, 1);
    }

    #[tokio::test]
    async fn heartbeat_extends_a_live_lease_and_rejects_a_foreign_holder() {
        let sem = semaphore();
        sem.acquire("team-a", "holder-0", 1, 30_000).await.unwrap();
        assert!(sem.heartbeat("team-a", "holder-0", 30_000).await.unwrap());
        assert!(!sem.heartbeat("team-a", "holder-not-held", 30_000).await.unwrap());
    }

    /// `spec.md` §8 scenario 5: team limit 3, more workers than slots, all
    /// eventually acquire within a generous deadline as earlier holders
    /// release.
    #[tokio::test(start_paused = true)]
    async fn acquire_blocking_admits_waiters_as_slots_free_up() {
        let sem = Arc::new(semaphore());
        for i in 0..3 {
            sem.acquire("team-a", &format!("holder-{i}"), 3, 30_000).await.unwrap();
        }

        let waiter = {
            let sem = Arc::clone(&sem);
            tokio::spawn(async move {
                sem.acquire_blocking(
                    "team-a",
                    "holder-waiter",
                    3,
                    30_000,
                    Duration::from_secs(5),
                    CancellationToken::new(),
                )
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        sem.release("team-a", "holder-0").await.unwrap();

        let result = waiter.await.unwrap().unwrap();
        assert!(result.attempt.granted);
        assert!(result.limited, "the waiter was refused at least once before the slot freed up");
    }

    #[tokio::test]
    async fn acquire_blocking_times_out_when_no_slot_frees_up() {
        let sem = semaphore();
        sem.acquire("team-a", "holder-0", 1, 30_000).await.unwrap();

        let result = sem
            .acquire_blocking(
                "team-a",
                "holder-1",
                1,
                30_000,
                Duration::from_millis(30),
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(SemaphoreError::Timeout { .. })));
    }

    #[tokio::test]
    async fn acquire_blocking_honors_cancellation() {
        let sem = semaphore();
        sem.acquire("team-a", "holder-0", 1, 30_000).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sem
            .acquire_blocking("team-a", "holder-1", 1, 30_000, Duration::from_secs(5), cancel)
            .await;
        assert!(matches!(result, Err(SemaphoreError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn with_semaphore_releases_the_slot_after_the_guarded_work_completes() {
        let sem = semaphore();
        let out = sem
            .with_semaphore(
                "team-a",
                "holder-0",
                1,
                30_000,
                Duration::from_secs(1),
                CancellationToken::new(),
                || async { 42 },
            )
            .await
            .unwrap();
        assert_eq!(out, 42);

        // Slot released, so a fresh holder can acquire immediately.
        assert!(sem.acquire("team-a", "holder-1", 1, 30_000).await.unwrap().granted);
    }

    #[tokio::test]
    async fn bypassed_semaphore_always_grants_without_touching_the_backend() {
        let sem = TenantSemaphore::bypassed(Arc::new(FakeSemaphoreBackend::new()));
        let attempt = sem.acquire("solo-team", "holder-0", 1, 30_000).await.unwrap();
        assert!(attempt.granted);
        // A "second" holder is granted too: bypass mode does not arbitrate.
        let attempt2 = sem.acquire("solo-team", "holder-1", 1, 30_000).await.unwrap();
        assert!(attempt2.granted);
    }
}
