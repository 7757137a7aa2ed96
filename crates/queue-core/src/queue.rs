//! Queue store operations (`spec.md` §4.C): `push`, `enumerate_candidates`,
//! `remove`, `cancel_crawl`. Thin wrappers over [`QueueBackend`] — the
//! interesting logic (batch iteration, counters, indexes) lives in the
//! backend implementation, since it has to happen inside the same
//! transaction as the write it's paired with.

use crate::backend::QueueBackend;
use crate::error::Result;
use crate::model::{CounterKind, Job, QueueCandidate, QueueKeyRef};
use crate::QueueCore;

/// Crawl cancellation deletes at most this many entries per transaction, so
/// a crawl with many thousands of jobs doesn't blow a single transaction's
/// size/time budget.
pub const CANCEL_CRAWL_BATCH_SIZE: usize = 100;

impl<B: QueueBackend> QueueCore<B> {
    /// Push `job` onto its team's queue, optionally with a TTL and/or a
    /// crawl association. Jobs with a `crawl_id` never receive a TTL
    /// (crawls control their own lifetime, per `spec.md` §4.C).
    pub async fn push(&self, job: &Job, timeout_ms: Option<i64>) -> Result<()> {
        tracing::debug!(job_id = %job.job_id, team_id = %job.team_id, priority = job.priority, "pushing job");
        self.backend.push(job, timeout_ms).await
    }

    /// Snapshot scan of up to `limit` candidates for `team_id`, in
    /// `(priority, created_at, job_id)` order.
    pub async fn enumerate_candidates(&self, team_id: &str, limit: usize) -> Result<Vec<QueueCandidate>> {
        self.backend.enumerate_candidates(team_id, limit).await
    }

    /// Delete a queue entry (and its indexes/counters) outright, without
    /// going through the claim protocol. Used by TTL expiry and crawl
    /// cancellation paths that don't need arbitration.
    pub async fn remove(&self, key: &QueueKeyRef) -> Result<bool> {
        self.backend.remove_queue_entry(key).await
    }

    /// Cancel every queued job belonging to `crawl_id`, batching deletes so
    /// each transaction stays bounded. Returns the total number removed.
    pub async fn cancel_crawl(&self, crawl_id: &str) -> Result<usize> {
        let mut total = 0usize;
        loop {
            let removed = self
                .backend
                .cancel_crawl_batch(crawl_id, CANCEL_CRAWL_BATCH_SIZE)
                .await?;
            total += removed;
            if removed == 0 {
                break;
            }
        }
        tracing::info!(crawl_id, removed = total, "cancelled crawl");
        Ok(total)
    }

    /// Current team-queue or crawl-queue depth, per `spec.md` §6's
    /// `queue.count` operation.
    pub async fn queue_count(&self, kind: CounterKind, scope_id: &str) -> Result<i64> {
        self.backend.counter_get(kind, scope_id).await
    }
}
