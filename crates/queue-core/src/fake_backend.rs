//! In-memory [`QueueBackend`] used by this crate's tests and by
//! `queue-service`'s test suite, so neither needs a live FoundationDB
//! cluster to exercise the domain logic above the storage seam.
//!
//! Atomicity here is simulated with a single `tokio::sync::Mutex` guarding
//! all state — coarser than FDB's per-key conflict ranges, but every
//! operation above this seam only assumes *serializability*, which a global
//! lock trivially provides.

use crate::backend::QueueBackend;
use crate::error::{QueueCoreError, Result};
use crate::model::{
    ActiveScope, ClaimAttemptOutcome, CounterKind, CrawlIndexValue, Job, QueueCandidate, QueueKeyRef, TtlIndexValue,
};
use async_trait::async_trait;
use key_codec::{ClaimKeyPrefix, CrawlIndexKey, CounterKey, QueueKey, TtlIndexKey, Versionstamp};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
struct QueueEntryValue {
    data: Vec<u8>,
    times_out_at: Option<i64>,
    crawl_id: Option<String>,
    listenable: bool,
    listen_channel_id: Option<String>,
}

#[derive(Debug, Clone)]
struct ClaimValue {
    worker_id: String,
    queue_key: QueueKeyRef,
    #[allow(dead_code)]
    claimed_at: i64,
}

#[derive(Default)]
struct Inner {
    queue: BTreeMap<Vec<u8>, QueueEntryValue>,
    crawl_index: BTreeMap<Vec<u8>, CrawlIndexValue>,
    ttl_index: BTreeMap<Vec<u8>, TtlIndexValue>,
    active_team: BTreeMap<Vec<u8>, i64>,
    active_crawl: BTreeMap<Vec<u8>, i64>,
    counters: BTreeMap<Vec<u8>, i64>,
    claims: BTreeMap<Vec<u8>, ClaimValue>,
}

/// An in-memory stand-in for the FoundationDB-backed queue store.
pub struct FakeBackend {
    inner: Mutex<Inner>,
    versionstamp_counter: AtomicU64,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            versionstamp_counter: AtomicU64::new(0),
        }
    }

    fn next_versionstamp(&self) -> Versionstamp {
        let n = self.versionstamp_counter.fetch_add(1, Ordering::SeqCst);
        let mut stamp = [0u8; 10];
        stamp[2..10].copy_from_slice(&n.to_be_bytes());
        stamp
    }

    fn counter_delta(inner: &mut Inner, kind: CounterKind, id: &str, delta: i64) {
        let key = CounterKey {
            kind,
            id: id.to_owned(),
        }
        .encode();
        let entry = inner.counters.entry(key).or_insert(0);
        *entry += delta;
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for FakeBackend {
    async fn push(&self, job: &Job, timeout_ms: Option<i64>) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let qkey = QueueKey {
            team_id: job.team_id.0.clone(),
            priority: job.priority,
            created_at: job.created_at,
            job_id: job.job_id.0.clone(),
        };
        let times_out_at = match timeout_ms {
            Some(ms) if ms > 0 && job.crawl_id.is_none() => Some(job.created_at + ms),
            _ => None,
        };
        inner.queue.insert(
            qkey.encode(),
            QueueEntryValue {
                data: job.data.clone(),
                times_out_at,
                crawl_id: job.crawl_id.as_ref().map(|c| c.0.clone()),
                listenable: job.listenable,
                listen_channel_id: job.listen_channel_id.clone(),
            },
        );
        Self::counter_delta(&mut inner, CounterKind::TeamQueue, &job.team_id.0, 1);

        if let Some(expires_at) = times_out_at {
            let ttl_key = TtlIndexKey {
                expires_at,
                team_id: job.team_id.0.clone(),
                job_id: job.job_id.0.clone(),
            };
            inner.ttl_index.insert(
                ttl_key.encode(),
                TtlIndexValue {
                    priority: job.priority,
                    created_at: job.created_at,
                    crawl_id: job.crawl_id.as_ref().map(|c| c.0.clone()),
                },
            );
        }

        if let Some(crawl_id) = &job.crawl_id {
            let crawl_key = CrawlIndexKey {
                crawl_id: crawl_id.0.clone(),
                job_id: job.job_id.0.clone(),
            };
            inner.crawl_index.insert(
                crawl_key.encode(),
                CrawlIndexValue {
                    team_id: job.team_id.0.clone(),
                    priority: job.priority,
                    created_at: job.created_at,
                },
            );
            Self::counter_delta(&mut inner, CounterKind::CrawlQueue, &crawl_id.0, 1);
        }

        Ok(())
    }

    async fn enumerate_candidates(&self, team_id: &str, limit: usize) -> Result<Vec<QueueCandidate>> {
        let inner = self.inner.lock().await;
        let prefix = QueueKey::team_prefix(team_id);
        let mut out = Vec::with_capacity(limit);
        for (k, v) in inner.queue.range(prefix.clone()..) {
            if !k.starts_with(&prefix) {
                break;
            }
            if out.len() >= limit {
                break;
            }
            let qk = QueueKey::decode(k).map_err(|e| QueueCoreError::Structural(e.into()))?;
            out.push(QueueCandidate {
                queue_key: QueueKeyRef {
                    team_id: qk.team_id.into(),
                    priority: qk.priority,
                    created_at: qk.created_at,
                    job_id: qk.job_id.into(),
                },
                times_out_at: v.times_out_at,
                crawl_id: v.crawl_id.clone().map(Into::into),
                data: v.data.clone(),
                listenable: v.listenable,
                listen_channel_id: v.listen_channel_id.clone(),
            });
        }
        Ok(out)
    }

    async fn remove_queue_entry(&self, key: &QueueKeyRef) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let qkey = QueueKey {
            team_id: key.team_id.0.clone(),
            priority: key.priority,
            created_at: key.created_at,
            job_id: key.job_id.0.clone(),
        }
        .encode();
        let Some(value) = inner.queue.remove(&qkey) else {
            return Ok(false);
        };
        Self::counter_delta(&mut inner, CounterKind::TeamQueue, &key.team_id.0, -1);

        if let Some(expires_at) = value.times_out_at {
            let ttl_key = TtlIndexKey {
                expires_at,
                team_id: key.team_id.0.clone(),
                job_id: key.job_id.0.clone(),
            }
            .encode();
            inner.ttl_index.remove(&ttl_key);
        }
        if let Some(crawl_id) = &value.crawl_id {
            let crawl_key = CrawlIndexKey {
                crawl_id: crawl_id.clone(),
                job_id: key.job_id.0.clone(),
            }
            .encode();
            inner.crawl_index.remove(&crawl_key);
            Self::counter_delta(&mut inner, CounterKind::CrawlQueue, crawl_id, -1);
        }
        Ok(true)
    }

    async fn cancel_crawl_batch(&self, crawl_id: &str, batch_size: usize) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let prefix = CrawlIndexKey::crawl_prefix(crawl_id);
        let batch: Vec<(Vec<u8>, String, CrawlIndexValue)> = inner
            .crawl_index
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .take(batch_size)
            .map(|(k, v)| {
                let job_id = CrawlIndexKey::decode(k).expect("valid crawl index key").job_id;
                (k.clone(), job_id, v.clone())
            })
            .collect();

        let mut removed = 0;
        for (crawl_key_bytes, job_id, value) in batch {
            inner.crawl_index.remove(&crawl_key_bytes);
            Self::counter_delta(&mut inner, CounterKind::CrawlQueue, crawl_id, -1);

            let qkey_bytes = QueueKey {
                team_id: value.team_id.clone(),
                priority: value.priority,
                created_at: value.created_at,
                job_id: job_id.clone(),
            }
            .encode();
            let Some(queue_value) = inner.queue.remove(&qkey_bytes) else {
                continue;
            };
            Self::counter_delta(&mut inner, CounterKind::TeamQueue, &value.team_id, -1);
            if let Some(expires_at) = queue_value.times_out_at {
                let ttl_key = TtlIndexKey {
                    expires_at,
                    team_id: value.team_id.clone(),
                    job_id,
                }
                .encode();
                inner.ttl_index.remove(&ttl_key);
            }
            removed += 1;
        }
        Ok(removed)
    }

    async fn counter_get(&self, kind: CounterKind, id: &str) -> Result<i64> {
        let inner = self.inner.lock().await;
        let key = CounterKey {
            kind,
            id: id.to_owned(),
        }
        .encode();
        Ok(inner.counters.get(&key).copied().unwrap_or(0).max(0))
    }

    async fn list_counter_ids(
        &self,
        kind: CounterKind,
        cursor: Option<String>,
        batch_size: usize,
    ) -> Result<(Vec<String>, Option<String>)> {
        let inner = self.inner.lock().await;
        let prefix = CounterKey::kind_prefix(kind);
        let start = match &cursor {
            Some(c) => CounterKey {
                kind,
                id: c.clone(),
            }
            .encode(),
            None => prefix.clone(),
        };
        let ids: Vec<String> = inner
            .counters
            .range(start..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .skip(if cursor.is_some() { 1 } else { 0 })
            .take(batch_size)
            .map(|(k, _)| CounterKey::decode(k).expect("valid counter key").id)
            .collect();
        let next_cursor = if ids.len() == batch_size {
            ids.last().cloned()
        } else {
            None
        };
        Ok((ids, next_cursor))
    }

    async fn counter_reconcile(&self, kind: CounterKind, id: &str) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        let before = {
            let key = CounterKey {
                kind,
                id: id.to_owned(),
            }
            .encode();
            inner.counters.get(&key).copied().unwrap_or(0)
        };
        let ground_truth = match kind {
            CounterKind::TeamQueue => {
                let prefix = QueueKey::team_prefix(id);
                inner.queue.keys().filter(|k| k.starts_with(&prefix)).count() as i64
            }
            CounterKind::CrawlQueue => {
                let prefix = CrawlIndexKey::crawl_prefix(id);
                inner
                    .crawl_index
                    .keys()
                    .filter(|k| k.starts_with(&prefix))
                    .count() as i64
            }
            CounterKind::TeamActive => {
                let prefix = key_codec::ActiveKey::scope_prefix(ActiveScope::Team, id);
                let now = now_ms();
                inner
                    .active_team
                    .iter()
                    .filter(|(k, expires_at)| k.starts_with(&prefix) && **expires_at > now)
                    .count() as i64
            }
            CounterKind::CrawlActive => {
                let prefix = key_codec::ActiveKey::scope_prefix(ActiveScope::Crawl, id);
                let now = now_ms();
                inner
                    .active_crawl
                    .iter()
                    .filter(|(k, expires_at)| k.starts_with(&prefix) && **expires_at > now)
                    .count() as i64
            }
        };
        let key = CounterKey {
            kind,
            id: id.to_owned(),
        }
        .encode();
        inner.counters.insert(key, ground_truth);
        Ok(ground_truth - before)
    }

    async fn sweep_stale_counters(
        &self,
        kind: CounterKind,
        cursor: Option<String>,
        batch_size: usize,
    ) -> Result<(usize, Option<String>)> {
        let mut inner = self.inner.lock().await;
        let prefix = CounterKey::kind_prefix(kind);
        let start = match &cursor {
            Some(c) => CounterKey {
                kind,
                id: c.clone(),
            }
            .encode(),
            None => prefix.clone(),
        };

        let ids: Vec<String> = inner
            .counters
            .range(start..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .skip(if cursor.is_some() { 1 } else { 0 })
            .take(batch_size)
            .map(|(k, _)| CounterKey::decode(k).expect("valid counter key").id)
            .collect();

        let next_cursor = if ids.len() == batch_size {
            ids.last().cloned()
        } else {
            None
        };

        let mut deleted = 0;
        for id in &ids {
            let ground_truth = match kind {
                CounterKind::TeamQueue => {
                    let p = QueueKey::team_prefix(id);
                    inner.queue.keys().any(|k| k.starts_with(&p))
                }
                CounterKind::CrawlQueue => {
                    let p = CrawlIndexKey::crawl_prefix(id);
                    inner.crawl_index.keys().any(|k| k.starts_with(&p))
                }
                CounterKind::TeamActive => {
                    let p = key_codec::ActiveKey::scope_prefix(ActiveScope::Team, id);
                    inner.active_team.keys().any(|k| k.starts_with(&p))
                }
                CounterKind::CrawlActive => {
                    let p = key_codec::ActiveKey::scope_prefix(ActiveScope::Crawl, id);
                    inner.active_crawl.keys().any(|k| k.starts_with(&p))
                }
            };
            if !ground_truth {
                let key = CounterKey {
                    kind,
                    id: id.clone(),
                }
                .encode();
                inner.counters.remove(&key);
                deleted += 1;
            }
        }
        Ok((deleted, next_cursor))
    }

    async fn write_claim(&self, candidate: &QueueCandidate, worker_id: &str) -> Result<ClaimAttemptOutcome> {
        let mut inner = self.inner.lock().await;
        let qkey = QueueKey {
            team_id: candidate.queue_key.team_id.0.clone(),
            priority: candidate.queue_key.priority,
            created_at: candidate.queue_key.created_at,
            job_id: candidate.queue_key.job_id.0.clone(),
        }
        .encode();
        if !inner.queue.contains_key(&qkey) {
            return Ok(ClaimAttemptOutcome::GoneAlready);
        }
        let stamp = self.next_versionstamp();
        let mut claim_key = ClaimKeyPrefix {
            job_id: candidate.queue_key.job_id.0.clone(),
        }
        .encode();
        claim_key.extend_from_slice(&stamp);
        inner.claims.insert(
            claim_key,
            ClaimValue {
                worker_id: worker_id.to_owned(),
                queue_key: candidate.queue_key.clone(),
                claimed_at: now_ms(),
            },
        );
        Ok(ClaimAttemptOutcome::Won)
    }

    async fn arbitrate_claim(&self, job_id: &str, worker_id: &str) -> Result<ClaimAttemptOutcome> {
        let inner = self.inner.lock().await;
        let prefix = ClaimKeyPrefix::job_prefix(job_id);
        let winner = inner
            .claims
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .next();
        match winner {
            Some((_, v)) if v.worker_id == worker_id => Ok(ClaimAttemptOutcome::Won),
            Some(_) => Ok(ClaimAttemptOutcome::Lost),
            None => Ok(ClaimAttemptOutcome::GoneAlready),
        }
    }

    async fn commit_pop(&self, candidate: &QueueCandidate, worker_id: &str) -> Result<bool> {
        let existed = self.remove_queue_entry(&candidate.queue_key).await?;
        self.release_claims(&candidate.queue_key.job_id.0).await?;
        let _ = worker_id;
        Ok(existed)
    }

    async fn release_claims(&self, job_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let prefix = ClaimKeyPrefix::job_prefix(job_id);
        let keys: Vec<Vec<u8>> = inner
            .claims
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            inner.claims.remove(&k);
        }
        Ok(())
    }

    async fn sweep_orphan_claims(&self, older_than_ms: i64, batch_size: usize) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let cutoff = now_ms() - older_than_ms;
        let mut to_delete = Vec::new();
        for (k, v) in inner.claims.iter() {
            if to_delete.len() >= batch_size {
                break;
            }
            let job_exists = inner.queue.keys().any(|qk| {
                QueueKey::decode(qk)
                    .map(|q| q.job_id == v.queue_key.job_id.0)
                    .unwrap_or(false)
            });
            if !job_exists || v.claimed_at < cutoff {
                to_delete.push(k.clone());
            }
        }
        let removed = to_delete.len();
        for k in to_delete {
            inner.claims.remove(&k);
        }
        Ok(removed)
    }

    async fn active_push(&self, scope: ActiveScope, scope_id: &str, job_id: &str, ttl_ms: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let key = key_codec::ActiveKey {
            scope,
            scope_id: scope_id.to_owned(),
            job_id: job_id.to_owned(),
        }
        .encode();
        let expires_at = now_ms() + ttl_ms;
        match scope {
            ActiveScope::Team => {
                inner.active_team.insert(key, expires_at);
                Self::counter_delta(&mut inner, CounterKind::TeamActive, scope_id, 1);
            }
            ActiveScope::Crawl => {
                inner.active_crawl.insert(key, expires_at);
                Self::counter_delta(&mut inner, CounterKind::CrawlActive, scope_id, 1);
            }
        }
        Ok(())
    }

    async fn active_remove(&self, scope: ActiveScope, scope_id: &str, job_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let key = key_codec::ActiveKey {
            scope,
            scope_id: scope_id.to_owned(),
            job_id: job_id.to_owned(),
        }
        .encode();
        let existed = match scope {
            ActiveScope::Team => inner.active_team.remove(&key).is_some(),
            ActiveScope::Crawl => inner.active_crawl.remove(&key).is_some(),
        };
        if existed {
            let kind = match scope {
                ActiveScope::Team => CounterKind::TeamActive,
                ActiveScope::Crawl => CounterKind::CrawlActive,
            };
            Self::counter_delta(&mut inner, kind, scope_id, -1);
        }
        Ok(existed)
    }

    async fn active_list(&self, scope: ActiveScope, scope_id: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let prefix = key_codec::ActiveKey::scope_prefix(scope, scope_id);
        let now = now_ms();
        let map = match scope {
            ActiveScope::Team => &inner.active_team,
            ActiveScope::Crawl => &inner.active_crawl,
        };
        Ok(map
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(_, expires_at)| **expires_at > now)
            .map(|(k, _)| key_codec::ActiveKey::decode(k, scope).expect("valid active key").job_id)
            .collect())
    }

    async fn active_count(&self, scope: ActiveScope, scope_id: &str) -> Result<i64> {
        let kind = match scope {
            ActiveScope::Team => CounterKind::TeamActive,
            ActiveScope::Crawl => CounterKind::CrawlActive,
        };
        self.counter_get(kind, scope_id).await
    }

    async fn sweep_expired_active(&self, scope: ActiveScope, batch_size: usize) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let now = now_ms();
        let map = match scope {
            ActiveScope::Team => &inner.active_team,
            ActiveScope::Crawl => &inner.active_crawl,
        };
        let expired: Vec<(Vec<u8>, String, String)> = map
            .iter()
            .filter(|(_, expires_at)| **expires_at < now)
            .take(batch_size)
            .map(|(k, _)| {
                let decoded = key_codec::ActiveKey::decode(k, scope).expect("valid active key");
                (k.clone(), decoded.scope_id, decoded.job_id)
            })
            .collect();
        let removed = expired.len();
        for (k, scope_id, _job_id) in expired {
            match scope {
                ActiveScope::Team => {
                    inner.active_team.remove(&k);
                    Self::counter_delta(&mut inner, CounterKind::TeamActive, &scope_id, -1);
                }
                ActiveScope::Crawl => {
                    inner.active_crawl.remove(&k);
                    Self::counter_delta(&mut inner, CounterKind::CrawlActive, &scope_id, -1);
                }
            }
        }
        Ok(removed)
    }

    async fn sweep_expired_queue_entries(&self, batch_size: usize) -> Result<usize> {
        let now = now_ms();
        let upper = TtlIndexKey::sweep_upper_bound(now);
        let start = TtlIndexKey::subspace_start();

        // The TTL value carries the queue entry's remaining key fields, so
        // the target can be addressed directly without scanning the whole
        // queue for it.
        let targets: Vec<QueueKeyRef> = {
            let inner = self.inner.lock().await;
            inner
                .ttl_index
                .range(start..upper)
                .take(batch_size)
                .map(|(k, v)| {
                    let decoded = TtlIndexKey::decode(k).expect("valid ttl index key");
                    QueueKeyRef {
                        team_id: decoded.team_id.into(),
                        priority: v.priority,
                        created_at: v.created_at,
                        job_id: decoded.job_id.into(),
                    }
                })
                .collect()
        };

        let mut removed = 0;
        for target in targets {
            if self.remove_queue_entry(&target).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
