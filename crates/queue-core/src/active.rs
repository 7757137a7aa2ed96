//! Active-job tracker (`spec.md` §4.E): per-team/crawl bookkeeping of
//! currently-executing jobs, with its own expiry independent of the claim
//! record that produced them.

use crate::backend::QueueBackend;
use crate::error::Result;
use crate::model::ActiveScope;
use crate::QueueCore;

impl<B: QueueBackend> QueueCore<B> {
    /// Record `job_id` as actively running under `scope_id`, expiring in
    /// `ttl_ms` unless refreshed. Increments the matching active counter.
    pub async fn active_push(&self, scope: ActiveScope, scope_id: &str, job_id: &str, ttl_ms: i64) -> Result<()> {
        self.backend.active_push(scope, scope_id, job_id, ttl_ms).await
    }

    /// Remove an active-job record, decrementing its counter. Returns
    /// whether it existed.
    pub async fn active_remove(&self, scope: ActiveScope, scope_id: &str, job_id: &str) -> Result<bool> {
        self.backend.active_remove(scope, scope_id, job_id).await
    }

    /// List non-expired active job ids under `scope_id`.
    pub async fn active_list(&self, scope: ActiveScope, scope_id: &str) -> Result<Vec<String>> {
        self.backend.active_list(scope, scope_id).await
    }

    /// Approximate count of active jobs under `scope_id`, clamped to `>= 0`.
    /// The janitor's active-expiry sweep and counter reconciliation keep
    /// this exact between drift windows.
    pub async fn active_count(&self, scope: ActiveScope, scope_id: &str) -> Result<i64> {
        self.backend.active_count(scope, scope_id).await
    }
}
