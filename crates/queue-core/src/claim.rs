//! Claim arbiter (`spec.md` §4.D) — the central design of the queue engine.
//!
//! A naive read-candidate-then-delete-it approach serializes every
//! concurrent pop attempt against a single conflicting transaction. Instead,
//! candidate discovery is a snapshot read (no conflict range), and winner
//! selection rides on the store's versionstamped-key write: concurrent claim
//! writes for the same job never conflict with each other, so every
//! concurrent attempt commits *something*; arbitration afterward picks the
//! minimum-versionstamp record as the winner.

use crate::backend::QueueBackend;
use crate::error::Result;
use crate::model::{ClaimAttemptOutcome, ClaimedJob, Job, PopOutcome, QueueCandidate};
use crate::QueueCore;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How many candidates a single `pop` discovery round pulls.
pub const DISCOVER_BATCH_SIZE: usize = 50;
/// Base backoff delay between pop rounds when no candidate could be claimed.
pub const POP_BACKOFF_BASE: Duration = Duration::from_millis(50);
/// Backoff delay ceiling.
pub const POP_BACKOFF_CAP: Duration = Duration::from_secs(1);
/// Pop rounds to attempt before giving up and returning "none available".
pub const POP_ATTEMPT_CEILING: u32 = 100;

fn backoff_delay(attempt: u32) -> Duration {
    let exp = POP_BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(POP_BACKOFF_CAP);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2 + 1);
    capped.saturating_sub(Duration::from_millis(jitter_ms))
}

impl<B: QueueBackend> QueueCore<B> {
    /// Pop a job for `team_id` on behalf of `worker_id`. `blocked_crawl_ids`
    /// lets the caller veto candidates whose crawl has hit a
    /// concurrency cap the queue engine itself has no notion of.
    pub async fn pop(
        &self,
        team_id: &str,
        worker_id: &str,
        blocked_crawl_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<PopOutcome> {
        for attempt in 0..POP_ATTEMPT_CEILING {
            if cancel.is_cancelled() {
                return Ok(PopOutcome::NoneAvailable);
            }

            let candidates = self.backend.enumerate_candidates(team_id, DISCOVER_BATCH_SIZE).await?;
            let now = chrono::Utc::now().timestamp_millis();

            for candidate in &candidates {
                if candidate.is_expired(now) {
                    continue;
                }
                if let Some(crawl_id) = &candidate.crawl_id {
                    if blocked_crawl_ids.iter().any(|b| b == crawl_id.as_str()) {
                        continue;
                    }
                }

                match self.try_claim_candidate(candidate, worker_id).await? {
                    Some(claimed) => return Ok(PopOutcome::Claimed(claimed)),
                    None => continue,
                }
            }

            if candidates.is_empty() {
                // Nothing to try this round; still back off so a tight
                // empty-queue poll loop doesn't spin the store.
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff_delay(attempt)) => {}
                _ = cancel.cancelled() => return Ok(PopOutcome::NoneAvailable),
            }
        }

        tracing::debug!(team_id, worker_id, "pop attempt budget exhausted");
        Ok(PopOutcome::NoneAvailable)
    }

    /// One candidate through the claim-attempt/arbitration/commit sequence
    /// (`spec.md` §4.D steps 3-5). Returns `Some(claimed)` on a win, `None`
    /// if this worker lost or the candidate was already gone.
    async fn try_claim_candidate(&self, candidate: &QueueCandidate, worker_id: &str) -> Result<Option<ClaimedJob>> {
        match self.backend.write_claim(candidate, worker_id).await? {
            ClaimAttemptOutcome::GoneAlready => return Ok(None),
            ClaimAttemptOutcome::Won | ClaimAttemptOutcome::Lost => {}
        }

        match self
            .backend
            .arbitrate_claim(&candidate.queue_key.job_id.0, worker_id)
            .await?
        {
            ClaimAttemptOutcome::Lost | ClaimAttemptOutcome::GoneAlready => {
                return Ok(None);
            }
            ClaimAttemptOutcome::Won => {}
        }

        let committed = self.backend.commit_pop(candidate, worker_id).await?;
        if !committed {
            // The queue entry vanished between arbitration and commit (TTL
            // swept it, or another path removed it); treat as a loss.
            return Ok(None);
        }

        Ok(Some(ClaimedJob {
            job: Job {
                job_id: candidate.queue_key.job_id.clone(),
                team_id: candidate.queue_key.team_id.clone(),
                data: candidate.data.clone(),
                priority: candidate.queue_key.priority,
                created_at: candidate.queue_key.created_at,
                listenable: candidate.listenable,
                listen_channel_id: candidate.listen_channel_id.clone(),
                crawl_id: candidate.crawl_id.clone(),
            },
            queue_key: candidate.queue_key.clone(),
        }))
    }

    /// Release any outstanding claim records for `job_id` without deleting
    /// the queue entry, so another worker can re-discover it. Used when a
    /// worker wins the claim but then discovers it cannot run the job.
    pub async fn release(&self, job_id: &str) -> Result<()> {
        self.backend.release_claims(job_id).await
    }

    /// Delete claim records whose referenced queue entry is gone, or whose
    /// age exceeds `older_than_ms`. Returns the number removed.
    pub async fn sweep_orphan_claims(&self, older_than_ms: i64, batch_size: usize) -> Result<usize> {
        self.backend.sweep_orphan_claims(older_than_ms, batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_cap() {
        for attempt in 0..200 {
            assert!(backoff_delay(attempt) <= POP_BACKOFF_CAP);
        }
    }

    #[test]
    fn backoff_grows_with_attempt_before_capping() {
        let early = backoff_delay(0);
        let later = backoff_delay(3);
        assert!(later >= early || later == POP_BACKOFF_CAP);
    }
}
