//! Counter service (`spec.md` §4.B): reconciliation and stale-key cleanup
//! live here; `add`/`get` are implemented inline wherever a transaction
//! needs them (see [`crate::backend::QueueBackend::counter_get`] and the
//! `counter_add` helper private to each backend), since `add` must always
//! ride inside the caller's own transaction rather than open its own.

use crate::backend::QueueBackend;
use crate::error::Result;
use crate::model::CounterKind;
use crate::QueueCore;

/// Default page size for `sweep_stale_counters` cursor pagination.
pub const STALE_COUNTER_SWEEP_BATCH_SIZE: usize = 100;

impl<B: QueueBackend> QueueCore<B> {
    pub async fn counter_get(&self, kind: CounterKind, id: &str) -> Result<i64> {
        self.backend.counter_get(kind, id).await
    }

    /// Recompute `(kind, id)`'s counter from its ground-truth range and
    /// write the corrected value. Returns the correction delta; 0 means the
    /// counter was already exact.
    pub async fn reconcile(&self, kind: CounterKind, id: &str) -> Result<i64> {
        let delta = self.backend.counter_reconcile(kind, id).await?;
        if delta != 0 {
            tracing::warn!(?kind, id, delta, "counter drift corrected by reconciliation");
        }
        Ok(delta)
    }

    /// Delete counter keys of `kind` whose ground-truth range is empty,
    /// paginating with a cursor across calls. Returns `(deleted, next
    /// cursor)`.
    pub async fn sweep_stale_counters(
        &self,
        kind: CounterKind,
        cursor: Option<String>,
    ) -> Result<(usize, Option<String>)> {
        self.backend
            .sweep_stale_counters(kind, cursor, STALE_COUNTER_SWEEP_BATCH_SIZE)
            .await
    }
}
