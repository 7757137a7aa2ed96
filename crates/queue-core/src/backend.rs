//! The storage seam. `QueueBackend` is implemented once against a real
//! FoundationDB cluster ([`crate::fdb_backend::FdbBackend`]) and once as an
//! in-memory fake ([`crate::fake_backend::FakeBackend`]) used by this
//! crate's own test suite and by `queue-service`'s integration tests.
//!
//! Each method here corresponds to one transactional unit of work from
//! `spec.md` §4.B-§4.F: implementors are responsible for committing their
//! own transaction (or simulating the equivalent atomicity, for the fake).
//! The domain layer in [`crate::QueueCore`] composes these into the
//! higher-level operations in `spec.md` §6 — retry loops, backoff, and
//! cross-cutting logging live there, not in the backend.

use crate::error::Result;
use crate::model::{
    ActiveScope, ClaimAttemptOutcome, CounterKind, Job, QueueCandidate, QueueKeyRef,
};
use async_trait::async_trait;

#[async_trait]
pub trait QueueBackend: Send + Sync + 'static {
    // ---- Queue store (spec.md §4.C) ----

    /// Write the queue entry, the TTL index entry (if `timeout_ms` is set
    /// and positive), and the crawl index entry (if `job.crawl_id` is set),
    /// incrementing the matching counters, all in one transaction.
    async fn push(&self, job: &Job, timeout_ms: Option<i64>) -> Result<()>;

    /// Snapshot range scan over `(team_id, *)`, up to `limit` entries, in
    /// `(priority, created_at, job_id)` order. Must not create a read
    /// conflict range, so concurrent pop attempts on the same team don't
    /// serialize against each other.
    async fn enumerate_candidates(&self, team_id: &str, limit: usize) -> Result<Vec<QueueCandidate>>;

    /// Delete the queue entry plus its TTL/crawl index entries and
    /// decrement the matching counters, if the entry still exists. Returns
    /// whether it existed.
    async fn remove_queue_entry(&self, key: &QueueKeyRef) -> Result<bool>;

    /// Delete up to `batch_size` crawl-indexed queue entries for
    /// `crawl_id`, decrementing counters. Returns the number removed; the
    /// caller repeats until it returns 0.
    async fn cancel_crawl_batch(&self, crawl_id: &str, batch_size: usize) -> Result<usize>;

    // ---- Counter service (spec.md §4.B) ----

    async fn counter_get(&self, kind: CounterKind, id: &str) -> Result<i64>;

    /// Paginate the ids of every counter key of `kind` starting after
    /// `cursor`, for the janitor's reconciliation sweep. Returns `(ids,
    /// next_cursor)`; `next_cursor` is `None` once exhausted.
    async fn list_counter_ids(
        &self,
        kind: CounterKind,
        cursor: Option<String>,
        batch_size: usize,
    ) -> Result<(Vec<String>, Option<String>)>;

    /// Scan the ground-truth range for `(kind, id)` and set the counter to
    /// the observed count in a follow-up transaction. Returns the
    /// correction delta (new value minus the value observed before the
    /// reconciliation).
    async fn counter_reconcile(&self, kind: CounterKind, id: &str) -> Result<i64>;

    /// Paginate counter keys of `kind` starting after `cursor`, deleting
    /// any whose ground-truth range is empty. Returns `(deleted_count,
    /// next_cursor)`; `next_cursor` is `None` once the kind's keyspace is
    /// exhausted.
    async fn sweep_stale_counters(
        &self,
        kind: CounterKind,
        cursor: Option<String>,
        batch_size: usize,
    ) -> Result<(usize, Option<String>)>;

    // ---- Claim arbiter (spec.md §4.D) ----

    /// Confirm the candidate's queue entry still exists, then write a
    /// versionstamped claim record for it. Returns `GoneAlready` if the
    /// entry is missing; otherwise the claim write always succeeds (claim
    /// writes cannot conflict with each other by construction).
    async fn write_claim(&self, candidate: &QueueCandidate, worker_id: &str) -> Result<ClaimAttemptOutcome>;

    /// Read the minimal-versionstamp claim record for `job_id` and report
    /// whether it belongs to `worker_id`.
    async fn arbitrate_claim(&self, job_id: &str, worker_id: &str) -> Result<ClaimAttemptOutcome>;

    /// Re-verify the queue entry still exists, delete it and its indexes,
    /// decrement counters, and delete all other claim records for the job.
    /// Returns whether the entry still existed (i.e. whether the pop
    /// actually committed).
    async fn commit_pop(&self, candidate: &QueueCandidate, worker_id: &str) -> Result<bool>;

    /// Delete every outstanding claim record for `job_id`, without
    /// touching the queue entry.
    async fn release_claims(&self, job_id: &str) -> Result<()>;

    /// Delete claim records whose referenced queue entry no longer exists,
    /// or whose `claimed_at` predates `older_than_ms`. Returns the number
    /// removed.
    async fn sweep_orphan_claims(&self, older_than_ms: i64, batch_size: usize) -> Result<usize>;

    // ---- Active-job tracker (spec.md §4.E) ----

    async fn active_push(&self, scope: ActiveScope, scope_id: &str, job_id: &str, ttl_ms: i64) -> Result<()>;

    async fn active_remove(&self, scope: ActiveScope, scope_id: &str, job_id: &str) -> Result<bool>;

    async fn active_list(&self, scope: ActiveScope, scope_id: &str) -> Result<Vec<String>>;

    async fn active_count(&self, scope: ActiveScope, scope_id: &str) -> Result<i64>;

    /// Delete active records past expiry for `scope`, decrementing the
    /// matching counter. Returns the number removed.
    async fn sweep_expired_active(&self, scope: ActiveScope, batch_size: usize) -> Result<usize>;

    // ---- TTL sweep (spec.md §4.F.1) ----

    /// Delete queue entries (+ counters + indexes) whose TTL has expired,
    /// scanning the TTL index from the minimum key up to `now`. Returns the
    /// number removed.
    async fn sweep_expired_queue_entries(&self, batch_size: usize) -> Result<usize>;
}
