//! Janitor (`spec.md` §4.F): periodic, independently-schedulable maintenance
//! sweeps. Each task is bounded per invocation and safe to run concurrently
//! across replicas, since every mutation it issues is its own backend
//! transaction.
//!
//! Scheduling policy (interval, jitter, graceful shutdown) is deliberately
//! left to the caller — `queue-service` owns a `tokio::spawn`ed loop per
//! task, the same split the teacher repo draws between `JobStore` (policy-
//! free claim primitive) and `JobWorker` (the poll-loop policy that uses it).

use crate::backend::QueueBackend;
use crate::error::Result;
use crate::model::{ActiveScope, CounterKind};
use crate::QueueCore;

/// Queue-entry TTL sweep batch size (`spec.md` §4.F.1).
pub const TTL_SWEEP_BATCH_SIZE: usize = 100;
/// Max TTL-sweep batches processed per invocation, bounding work per tick.
pub const TTL_SWEEP_MAX_BATCHES_PER_TICK: usize = 10;
/// Active-record expiry sweep batch size (`spec.md` §4.F.2).
pub const ACTIVE_SWEEP_BATCH_SIZE: usize = 100;
/// Orphan-claim sweep batch size (`spec.md` §4.F.5).
pub const ORPHAN_CLAIM_SWEEP_BATCH_SIZE: usize = 100;

/// Summary of one janitor tick, returned so the caller can log/metric it
/// without the janitor itself owning an observability dependency beyond
/// `tracing`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JanitorTickReport {
    pub expired_queue_entries: usize,
    pub expired_team_active: usize,
    pub expired_crawl_active: usize,
    pub orphaned_claims: usize,
}

impl<B: QueueBackend> QueueCore<B> {
    /// TTL sweep: scan the TTL index from the minimum key up to `now`,
    /// deleting expired queue entries in batches until a batch comes back
    /// empty or the per-tick batch ceiling is hit. Returns the total removed.
    pub async fn cleanup_expired_jobs(&self) -> Result<usize> {
        let mut total = 0usize;
        for _ in 0..TTL_SWEEP_MAX_BATCHES_PER_TICK {
            let removed = self.backend.sweep_expired_queue_entries(TTL_SWEEP_BATCH_SIZE).await?;
            total += removed;
            if removed < TTL_SWEEP_BATCH_SIZE {
                break;
            }
        }
        if total > 0 {
            tracing::debug!(removed = total, "TTL sweep removed expired queue entries");
        }
        Ok(total)
    }

    /// Active-expiry sweep for both team and crawl scopes (`spec.md` §4.F.2).
    pub async fn cleanup_expired_active_jobs(&self) -> Result<usize> {
        let team_removed = self
            .backend
            .sweep_expired_active(ActiveScope::Team, ACTIVE_SWEEP_BATCH_SIZE)
            .await?;
        let crawl_removed = self
            .backend
            .sweep_expired_active(ActiveScope::Crawl, ACTIVE_SWEEP_BATCH_SIZE)
            .await?;
        let total = team_removed + crawl_removed;
        if total > 0 {
            tracing::debug!(team_removed, crawl_removed, "active-expiry sweep removed stale records");
        }
        Ok(total)
    }

    /// Orphan-claim sweep (`spec.md` §4.F.5): remove claim records whose
    /// queue entry is gone, or whose age exceeds `older_than_ms`.
    pub async fn cleanup_orphaned_claims(&self, older_than_ms: i64) -> Result<usize> {
        let removed = self
            .backend
            .sweep_orphan_claims(older_than_ms, ORPHAN_CLAIM_SWEEP_BATCH_SIZE)
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "orphan-claim sweep removed stale claim records");
        }
        Ok(removed)
    }

    /// Counter reconciliation (`spec.md` §4.F.3): paginate every id of
    /// `kind` once, reconciling each against its ground-truth range. Returns
    /// the number of counters whose value was corrected.
    pub async fn reconcile_all(&self, kind: CounterKind) -> Result<usize> {
        let mut cursor = None;
        let mut corrected = 0usize;
        loop {
            let (ids, next_cursor) = self.backend.list_counter_ids(kind, cursor, 100).await?;
            for id in &ids {
                if self.reconcile(kind, id).await? != 0 {
                    corrected += 1;
                }
            }
            match next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(corrected)
    }

    /// Stale-counter cleanup (`spec.md` §4.F.4): delete counter keys of
    /// `kind` whose ground-truth range is empty, paginating to completion.
    pub async fn sweep_all_stale_counters(&self, kind: CounterKind) -> Result<usize> {
        let mut cursor = None;
        let mut total = 0usize;
        loop {
            let (deleted, next_cursor) = self.sweep_stale_counters(kind, cursor).await?;
            total += deleted;
            match next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(total)
    }

    /// Run one round of every bounded sweep (excluding the full-keyspace
    /// reconciliation/stale-counter passes, which `queue-service` schedules
    /// on their own, longer-period tick). Used by the janitor's main loop.
    pub async fn janitor_tick(&self, orphan_claim_age_ms: i64) -> Result<JanitorTickReport> {
        let expired_queue_entries = self.cleanup_expired_jobs().await?;
        let team_removed = self
            .backend
            .sweep_expired_active(ActiveScope::Team, ACTIVE_SWEEP_BATCH_SIZE)
            .await?;
        let crawl_removed = self
            .backend
            .sweep_expired_active(ActiveScope::Crawl, ACTIVE_SWEEP_BATCH_SIZE)
            .await?;
        let orphaned_claims = self.cleanup_orphaned_claims(orphan_claim_age_ms).await?;
        Ok(JanitorTickReport {
            expired_queue_entries,
            expired_team_active: team_removed,
            expired_crawl_active: crawl_removed,
            orphaned_claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_backend::FakeBackend;
    use crate::model::Job;
    use std::sync::Arc;

    fn core() -> QueueCore<FakeBackend> {
        QueueCore::new(Arc::new(FakeBackend::new()))
    }

    /// `spec.md` §8 scenario 3: TTL expiry.
    #[tokio::test]
    async fn ttl_sweep_removes_expired_job_and_zeroes_counters() {
        let core = core();
        let now = chrono::Utc::now().timestamp_millis();
        let job = Job {
            job_id: "j0".into(),
            team_id: "team-a".into(),
            data: b"payload".to_vec(),
            priority: 0,
            created_at: now,
            listenable: false,
            listen_channel_id: None,
            crawl_id: None,
        };
        core.push(&job, Some(50)).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let removed = core.cleanup_expired_jobs().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(core.queue_count(CounterKind::TeamQueue, "team-a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reconcile_all_corrects_every_id_of_a_kind() {
        let core = core();
        for team in ["team-a", "team-b"] {
            core.push(
                &Job {
                    job_id: format!("{team}-job"),
                    team_id: team.into(),
                    data: vec![],
                    priority: 0,
                    created_at: 0,
                    listenable: false,
                    listen_channel_id: None,
                    crawl_id: None,
                },
                None,
            )
            .await
            .unwrap();
        }
        let corrected = core.reconcile_all(CounterKind::TeamQueue).await.unwrap();
        // Counters were never allowed to drift in this test, so nothing to correct.
        assert_eq!(corrected, 0);
    }

    #[tokio::test]
    async fn janitor_tick_reports_zero_on_an_empty_queue() {
        let core = core();
        let report = core.janitor_tick(5 * 60_000).await.unwrap();
        assert_eq!(report, JanitorTickReport::default());
    }
}
