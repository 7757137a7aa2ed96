//! FoundationDB-backed [`QueueBackend`].
//!
//! Follows the transaction idiom used for the store handle elsewhere in the
//! corpus: an `Arc<Database>` owned by the caller (network initialization
//! via `foundationdb::boot()` happens once in the service binary, not here),
//! `db.run(...)` for the automatic commit-conflict retry loop, and
//! `RangeOption` prefix scans. Versionstamped claim writes use
//! `MutationType::SetVersionstampedKey`, the only FDB primitive that makes
//! concurrent claim attempts conflict-free by construction.

use crate::backend::QueueBackend;
use crate::error::{QueueCoreError, Result};
use crate::model::{
    ActiveScope, ClaimAttemptOutcome, CounterKind, CrawlIndexValue, Job, QueueCandidate, QueueKeyRef, TtlIndexValue,
};
use async_trait::async_trait;
use foundationdb::options::MutationType;
use foundationdb::{Database, RangeOption, Transaction};
use key_codec::{
    decode_counter_value, encode_counter_value, ActiveKey, ClaimKeyPrefix, CounterKey, CrawlIndexKey, QueueKey,
    TtlIndexKey,
};
use std::sync::Arc;

pub struct FdbBackend {
    db: Arc<Database>,
}

impl FdbBackend {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

/// Smallest byte string greater than every string prefixed by `prefix`,
/// used as the exclusive end of a prefix range scan.
fn strinc(prefix: &[u8]) -> Vec<u8> {
    let mut out = prefix.to_vec();
    while let Some(&last) = out.last() {
        if last == 0xFF {
            out.pop();
        } else {
            *out.last_mut().unwrap() += 1;
            return out;
        }
    }
    // All 0xFF (or empty): there's no finite successor, but FDB's key space
    // is bounded, so the literal high key works as an end selector here.
    vec![0xFF; prefix.len() + 1]
}

fn prefix_range(prefix: &[u8]) -> RangeOption<'static> {
    RangeOption::from(prefix.to_vec()..strinc(prefix))
}

/// Read every key/value pair under `prefix`, paginating in 10k-row pages so
/// scopes with more entries than a single `get_range` call returns are still
/// counted/listed in full rather than silently truncated.
async fn scan_all(
    trx: &Transaction,
    prefix: &[u8],
) -> std::result::Result<Vec<(Vec<u8>, Vec<u8>)>, FdbBindingError> {
    const PAGE_SIZE: i32 = 10_000;
    let end = strinc(prefix);
    let mut out = Vec::new();
    let mut cursor = prefix.to_vec();
    loop {
        let range = RangeOption::from(cursor..end.clone());
        let page = trx.get_range(&range, PAGE_SIZE, true).await?;
        let page_len = page.len();
        out.extend(page.iter().map(|kv| (kv.key().to_vec(), kv.value().to_vec())));
        if page_len < PAGE_SIZE as usize {
            break;
        }
        cursor = {
            let mut next = page.iter().last().expect("page_len == PAGE_SIZE implies non-empty").key().to_vec();
            next.push(0);
            next
        };
    }
    Ok(out)
}

fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> QueueCoreError {
    QueueCoreError::StoreUnavailable(anyhow::anyhow!(e))
}

fn structural<E: std::fmt::Display>(context: &str, e: E) -> QueueCoreError {
    QueueCoreError::Structural(anyhow::anyhow!("{context}: {e}"))
}

async fn counter_add(trx: &Transaction, kind: CounterKind, id: &str, delta: i64) {
    let key = CounterKey {
        kind,
        id: id.to_owned(),
    }
    .encode();
    trx.atomic_op(&key, &encode_counter_value(delta), MutationType::Add);
}

#[async_trait]
impl QueueBackend for FdbBackend {
    async fn push(&self, job: &Job, timeout_ms: Option<i64>) -> Result<()> {
        let job = job.clone();
        self.db
            .run(|trx, _maybe_committed| {
                let job = job.clone();
                async move {
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
                    let value = serde_json::to_vec(&QueueEntryValue {
                        data: job.data.clone(),
                        times_out_at,
                        crawl_id: job.crawl_id.as_ref().map(|c| c.0.clone()),
                        listenable: job.listenable,
                        listen_channel_id: job.listen_channel_id.clone(),
                    })
                    .expect("queue entry value is always serializable");
                    trx.set(&qkey.encode(), &value);
                    counter_add(&trx, CounterKind::TeamQueue, &job.team_id.0, 1).await;

                    if let Some(expires_at) = times_out_at {
                        let ttl_key = TtlIndexKey {
                            expires_at,
                            team_id: job.team_id.0.clone(),
                            job_id: job.job_id.0.clone(),
                        };
                        let ttl_value = serde_json::to_vec(&TtlIndexValue {
                            priority: job.priority,
                            created_at: job.created_at,
                            crawl_id: job.crawl_id.as_ref().map(|c| c.0.clone()),
                        })
                        .expect("ttl index value is always serializable");
                        trx.set(&ttl_key.encode(), &ttl_value);
                    }
                    if let Some(crawl_id) = &job.crawl_id {
                        let crawl_key = CrawlIndexKey {
                            crawl_id: crawl_id.0.clone(),
                            job_id: job.job_id.0.clone(),
                        };
                        let crawl_value = serde_json::to_vec(&CrawlIndexValue {
                            team_id: job.team_id.0.clone(),
                            priority: job.priority,
                            created_at: job.created_at,
                        })
                        .expect("crawl index value is always serializable");
                        trx.set(&crawl_key.encode(), &crawl_value);
                        counter_add(&trx, CounterKind::CrawlQueue, &crawl_id.0, 1).await;
                    }
                    Ok(())
                }
            })
            .await
            .map_err(store_err)
    }

    async fn enumerate_candidates(&self, team_id: &str, limit: usize) -> Result<Vec<QueueCandidate>> {
        let trx = self.db.create_trx().map_err(store_err)?;
        let prefix = QueueKey::team_prefix(team_id);
        let range = prefix_range(&prefix);
        // Snapshot read: candidate discovery must not create a read
        // conflict range, so concurrent pop attempts on the same team don't
        // serialize against each other.
        let kvs = trx
            .get_range(&range, limit as i32, true)
            .await
            .map_err(store_err)?;
        let mut out = Vec::with_capacity(kvs.len());
        for kv in kvs.iter() {
            let qk = QueueKey::decode(kv.key()).map_err(|e| structural("decode queue key", e))?;
            let value: QueueEntryValue =
                serde_json::from_slice(kv.value()).map_err(|e| structural("decode queue value", e))?;
            out.push(QueueCandidate {
                queue_key: QueueKeyRef {
                    team_id: qk.team_id.into(),
                    priority: qk.priority,
                    created_at: qk.created_at,
                    job_id: qk.job_id.into(),
                },
                times_out_at: value.times_out_at,
                crawl_id: value.crawl_id.map(Into::into),
                data: value.data,
                listenable: value.listenable,
                listen_channel_id: value.listen_channel_id,
            });
        }
        Ok(out)
    }

    async fn remove_queue_entry(&self, key: &QueueKeyRef) -> Result<bool> {
        let key = key.clone();
        self.db
            .run(|trx, _| {
                let key = key.clone();
                async move { remove_queue_entry_in_txn(&trx, &key).await }
            })
            .await
            .map_err(store_err)
    }

    async fn cancel_crawl_batch(&self, crawl_id: &str, batch_size: usize) -> Result<usize> {
        let crawl_id = crawl_id.to_owned();
        self.db
            .run(|trx, _| {
                let crawl_id = crawl_id.clone();
                async move {
                    let prefix = CrawlIndexKey::crawl_prefix(&crawl_id);
                    let range = prefix_range(&prefix);
                    let kvs = trx
                        .get_range(&range, batch_size as i32, false)
                        .await?;
                    let mut removed = 0usize;
                    for kv in kvs.iter() {
                        let crawl_entry = CrawlIndexKey::decode(kv.key())
                            .map_err(|e| FdbBindingError::custom(format!("decode crawl index key: {e}")))?;
                        let value: CrawlIndexValue = serde_json::from_slice(kv.value())
                            .map_err(|e| FdbBindingError::custom(format!("decode crawl index value: {e}")))?;
                        trx.clear(kv.key());
                        counter_add(&trx, CounterKind::CrawlQueue, &crawl_id, -1).await;

                        let qkey = QueueKey {
                            team_id: value.team_id.clone(),
                            priority: value.priority,
                            created_at: value.created_at,
                            job_id: crawl_entry.job_id.clone(),
                        }
                        .encode();
                        if let Some(existing) = trx.get(&qkey, false).await? {
                            let queue_value: QueueEntryValue = serde_json::from_slice(&existing).map_err(|e| {
                                FdbBindingError::custom(format!("decode queue entry value: {e}"))
                            })?;
                            trx.clear(&qkey);
                            counter_add(&trx, CounterKind::TeamQueue, &value.team_id, -1).await;
                            if let Some(expires_at) = queue_value.times_out_at {
                                let ttl_key = TtlIndexKey {
                                    expires_at,
                                    team_id: value.team_id.clone(),
                                    job_id: crawl_entry.job_id.clone(),
                                }
                                .encode();
                                trx.clear(&ttl_key);
                            }
                            removed += 1;
                        }
                    }
                    Ok(removed)
                }
            })
            .await
            .map_err(store_err)
    }

    async fn counter_get(&self, kind: CounterKind, id: &str) -> Result<i64> {
        let trx = self.db.create_trx().map_err(store_err)?;
        let key = CounterKey {
            kind,
            id: id.to_owned(),
        }
        .encode();
        match trx.get(&key, true).await.map_err(store_err)? {
            Some(v) => decode_counter_value(&v).map_err(|e| structural("decode counter value", e)),
            None => Ok(0),
        }
    }

    async fn counter_reconcile(&self, kind: CounterKind, id: &str) -> Result<i64> {
        let id = id.to_owned();
        self.db
            .run(|trx, _| {
                let id = id.clone();
                async move {
                    let key = CounterKey { kind, id: id.clone() }.encode();
                    let before = match trx.get(&key, false).await? {
                        Some(v) => i64::from_le_bytes(v.as_ref().try_into().unwrap_or([0; 8])),
                        None => 0,
                    };
                    let ground_truth_prefix = match kind {
                        CounterKind::TeamQueue => QueueKey::team_prefix(&id),
                        CounterKind::CrawlQueue => CrawlIndexKey::crawl_prefix(&id),
                        CounterKind::TeamActive => ActiveKey::scope_prefix(ActiveScope::Team, &id),
                        CounterKind::CrawlActive => ActiveKey::scope_prefix(ActiveScope::Crawl, &id),
                    };
                    let entries = scan_all(&trx, &ground_truth_prefix).await?;
                    let count = match kind {
                        // `spec.md` §4.E: active counters reconcile against
                        // non-expired entries only, not every unswept record.
                        CounterKind::TeamActive | CounterKind::CrawlActive => {
                            let now = chrono::Utc::now().timestamp_millis();
                            entries
                                .iter()
                                .filter(|(_, v)| i64::from_be_bytes(v.as_slice().try_into().unwrap_or([0; 8])) > now)
                                .count() as i64
                        }
                        CounterKind::TeamQueue | CounterKind::CrawlQueue => entries.len() as i64,
                    };
                    trx.set(&key, &count.to_le_bytes());
                    Ok(count - before)
                }
            })
            .await
            .map_err(store_err)
    }

    async fn sweep_stale_counters(
        &self,
        kind: CounterKind,
        cursor: Option<String>,
        batch_size: usize,
    ) -> Result<(usize, Option<String>)> {
        let prefix = CounterKey::kind_prefix(kind);
        let start = match &cursor {
            Some(c) => CounterKey {
                kind,
                id: c.clone(),
            }
            .encode(),
            None => prefix.clone(),
        };
        let end = strinc(&prefix);
        let trx = self.db.create_trx().map_err(store_err)?;
        let range = RangeOption::from(start..end);
        let kvs = trx
            .get_range(&range, batch_size as i32 + 1, true)
            .await
            .map_err(store_err)?;
        let mut ids = Vec::with_capacity(batch_size);
        for kv in kvs.iter().skip(if cursor.is_some() { 1 } else { 0 }).take(batch_size) {
            let decoded = CounterKey::decode(kv.key()).map_err(|e| structural("decode counter key", e))?;
            ids.push(decoded.id);
        }
        let next_cursor = if ids.len() == batch_size {
            ids.last().cloned()
        } else {
            None
        };

        let mut deleted = 0usize;
        for id in &ids {
            let ground_truth_prefix = match kind {
                CounterKind::TeamQueue => QueueKey::team_prefix(id),
                CounterKind::CrawlQueue => CrawlIndexKey::crawl_prefix(id),
                CounterKind::TeamActive => ActiveKey::scope_prefix(ActiveScope::Team, id),
                CounterKind::CrawlActive => ActiveKey::scope_prefix(ActiveScope::Crawl, id),
            };
            let range = prefix_range(&ground_truth_prefix);
            let any = trx.get_range(&range, 1, true).await.map_err(store_err)?;
            if any.is_empty() {
                let key = CounterKey {
                    kind,
                    id: id.clone(),
                }
                .encode();
                trx.clear(&key);
                deleted += 1;
            }
        }
        trx.commit().await.map_err(|e| store_err(e))?;
        Ok((deleted, next_cursor))
    }

    async fn write_claim(&self, candidate: &QueueCandidate, worker_id: &str) -> Result<ClaimAttemptOutcome> {
        let candidate = candidate.clone();
        let worker_id = worker_id.to_owned();
        self.db
            .run(|trx, _| {
                let candidate = candidate.clone();
                let worker_id = worker_id.clone();
                async move {
                    let qkey = QueueKey {
                        team_id: candidate.queue_key.team_id.0.clone(),
                        priority: candidate.queue_key.priority,
                        created_at: candidate.queue_key.created_at,
                        job_id: candidate.queue_key.job_id.0.clone(),
                    }
                    .encode();
                    // Reading the single candidate key creates a conflict
                    // range on that key alone, not the whole team prefix.
                    if trx.get(&qkey, false).await?.is_none() {
                        return Ok(ClaimAttemptOutcome::GoneAlready);
                    }

                    let claim_prefix = ClaimKeyPrefix {
                        job_id: candidate.queue_key.job_id.0.clone(),
                    }
                    .encode();
                    let offset = claim_prefix.len() as u32;
                    let mut key_with_placeholder = claim_prefix;
                    key_with_placeholder.extend_from_slice(&[0u8; 10]);
                    key_with_placeholder.extend_from_slice(&offset.to_le_bytes());

                    let value = serde_json::to_vec(&ClaimValue {
                        worker_id: worker_id.clone(),
                        claimed_at: chrono::Utc::now().timestamp_millis(),
                        queue_key: candidate.queue_key.clone(),
                    })
                    .expect("claim value is always serializable");

                    trx.atomic_op(&key_with_placeholder, &value, MutationType::SetVersionstampedKey);
                    Ok(ClaimAttemptOutcome::Won)
                }
            })
            .await
            .map_err(store_err)
    }

    async fn arbitrate_claim(&self, job_id: &str, worker_id: &str) -> Result<ClaimAttemptOutcome> {
        let trx = self.db.create_trx().map_err(store_err)?;
        let prefix = ClaimKeyPrefix::job_prefix(job_id);
        let range = prefix_range(&prefix);
        let kvs = trx.get_range(&range, 1, true).await.map_err(store_err)?;
        match kvs.iter().next() {
            None => Ok(ClaimAttemptOutcome::GoneAlready),
            Some(kv) => {
                let value: ClaimValue =
                    serde_json::from_slice(kv.value()).map_err(|e| structural("decode claim value", e))?;
                if value.worker_id == worker_id {
                    Ok(ClaimAttemptOutcome::Won)
                } else {
                    Ok(ClaimAttemptOutcome::Lost)
                }
            }
        }
    }

    async fn commit_pop(&self, candidate: &QueueCandidate, worker_id: &str) -> Result<bool> {
        let candidate = candidate.clone();
        let _ = worker_id;
        self.db
            .run(|trx, _| {
                let candidate = candidate.clone();
                async move {
                    let existed = remove_queue_entry_in_txn(&trx, &candidate.queue_key).await?;
                    let claim_prefix = ClaimKeyPrefix::job_prefix(&candidate.queue_key.job_id.0);
                    trx.clear_range(&claim_prefix, &strinc(&claim_prefix));
                    Ok(existed)
                }
            })
            .await
            .map_err(store_err)
    }

    async fn release_claims(&self, job_id: &str) -> Result<()> {
        let job_id = job_id.to_owned();
        self.db
            .run(|trx, _| {
                let job_id = job_id.clone();
                async move {
                    let prefix = ClaimKeyPrefix::job_prefix(&job_id);
                    trx.clear_range(&prefix, &strinc(&prefix));
                    Ok(())
                }
            })
            .await
            .map_err(store_err)
    }

    async fn sweep_orphan_claims(&self, older_than_ms: i64, batch_size: usize) -> Result<usize> {
        let trx = self.db.create_trx().map_err(store_err)?;
        let prefix = vec![key_codec_prefix_claim()];
        let range = prefix_range(&prefix);
        let kvs = trx
            .get_range(&range, batch_size as i32, true)
            .await
            .map_err(store_err)?;
        let cutoff = chrono::Utc::now().timestamp_millis() - older_than_ms;

        let mut removed = 0usize;
        for kv in kvs.iter() {
            let value: ClaimValue =
                serde_json::from_slice(kv.value()).map_err(|e| structural("decode claim value", e))?;
            let qkey = QueueKey {
                team_id: value.queue_key.team_id.0.clone(),
                priority: value.queue_key.priority,
                created_at: value.queue_key.created_at,
                job_id: value.queue_key.job_id.0.clone(),
            }
            .encode();
            let job_still_queued = trx.get(&qkey, true).await.map_err(store_err)?.is_some();
            if !job_still_queued || value.claimed_at < cutoff {
                trx.clear(kv.key());
                removed += 1;
            }
        }
        trx.commit().await.map_err(|e| store_err(e))?;
        Ok(removed)
    }

    async fn active_push(&self, scope: ActiveScope, scope_id: &str, job_id: &str, ttl_ms: i64) -> Result<()> {
        let scope_id = scope_id.to_owned();
        let job_id = job_id.to_owned();
        self.db
            .run(|trx, _| {
                let scope_id = scope_id.clone();
                let job_id = job_id.clone();
                async move {
                    let key = ActiveKey {
                        scope,
                        scope_id: scope_id.clone(),
                        job_id,
                    }
                    .encode();
                    let expires_at = chrono::Utc::now().timestamp_millis() + ttl_ms;
                    trx.set(&key, &expires_at.to_be_bytes());
                    let kind = match scope {
                        ActiveScope::Team => CounterKind::TeamActive,
                        ActiveScope::Crawl => CounterKind::CrawlActive,
                    };
                    counter_add(&trx, kind, &scope_id, 1).await;
                    Ok(())
                }
            })
            .await
            .map_err(store_err)
    }

    async fn active_remove(&self, scope: ActiveScope, scope_id: &str, job_id: &str) -> Result<bool> {
        let scope_id = scope_id.to_owned();
        let job_id = job_id.to_owned();
        self.db
            .run(|trx, _| {
                let scope_id = scope_id.clone();
                let job_id = job_id.clone();
                async move {
                    let key = ActiveKey {
                        scope,
                        scope_id: scope_id.clone(),
                        job_id,
                    }
                    .encode();
                    let existed = trx.get(&key, false).await?.is_some();
                    if existed {
                        trx.clear(&key);
                        let kind = match scope {
                            ActiveScope::Team => CounterKind::TeamActive,
                            ActiveScope::Crawl => CounterKind::CrawlActive,
                        };
                        counter_add(&trx, kind, &scope_id, -1).await;
                    }
                    Ok(existed)
                }
            })
            .await
            .map_err(store_err)
    }

    async fn active_list(&self, scope: ActiveScope, scope_id: &str) -> Result<Vec<String>> {
        let trx = self.db.create_trx().map_err(store_err)?;
        let prefix = ActiveKey::scope_prefix(scope, scope_id);
        let entries = scan_all(&trx, &prefix).await.map_err(store_err)?;
        let now = chrono::Utc::now().timestamp_millis();
        let mut out = Vec::new();
        for (k, v) in &entries {
            let expires_at = i64::from_be_bytes(
                v.as_slice()
                    .try_into()
                    .map_err(|_| structural("active record value", "expected 8-byte big-endian i64"))?,
            );
            if expires_at > now {
                let decoded = ActiveKey::decode(k, scope).map_err(|e| structural("decode active key", e))?;
                out.push(decoded.job_id);
            }
        }
        Ok(out)
    }

    async fn active_count(&self, scope: ActiveScope, scope_id: &str) -> Result<i64> {
        let kind = match scope {
            ActiveScope::Team => CounterKind::TeamActive,
            ActiveScope::Crawl => CounterKind::CrawlActive,
        };
        self.counter_get(kind, scope_id).await
    }

    async fn sweep_expired_active(&self, scope: ActiveScope, batch_size: usize) -> Result<usize> {
        self.db
            .run(|trx, _| async move {
                let prefix = match scope {
                    ActiveScope::Team => vec![key_codec::EntityKind::ActiveTeam.prefix()],
                    ActiveScope::Crawl => vec![key_codec::EntityKind::ActiveCrawl.prefix()],
                };
                let range = prefix_range(&prefix);
                let kvs = trx.get_range(&range, batch_size as i32, false).await?;
                let now = chrono::Utc::now().timestamp_millis();
                let mut removed = 0usize;
                for kv in kvs.iter() {
                    let expires_at = i64::from_be_bytes(kv.value().try_into().unwrap_or([0xFF; 8]));
                    if expires_at < now {
                        let decoded = ActiveKey::decode(kv.key(), scope)
                            .map_err(|e| FdbBindingError::custom(format!("decode active key: {e}")))?;
                        trx.clear(kv.key());
                        let kind = match scope {
                            ActiveScope::Team => CounterKind::TeamActive,
                            ActiveScope::Crawl => CounterKind::CrawlActive,
                        };
                        counter_add(&trx, kind, &decoded.scope_id, -1).await;
                        removed += 1;
                    }
                }
                Ok(removed)
            })
            .await
            .map_err(store_err)
    }

    async fn sweep_expired_queue_entries(&self, batch_size: usize) -> Result<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let start = TtlIndexKey::subspace_start();
        let end = TtlIndexKey::sweep_upper_bound(now);
        let trx = self.db.create_trx().map_err(store_err)?;
        let range = RangeOption::from(start..end);
        let kvs = trx
            .get_range(&range, batch_size as i32, true)
            .await
            .map_err(store_err)?;
        // The TTL value carries the queue entry's remaining key fields, so
        // the target can be addressed directly without scanning the team's
        // queue subspace to find it.
        let mut targets = Vec::with_capacity(kvs.len());
        for kv in kvs.iter() {
            let ttl_key = TtlIndexKey::decode(kv.key()).map_err(|e| structural("decode ttl index key", e))?;
            let ttl_value: TtlIndexValue =
                serde_json::from_slice(kv.value()).map_err(|e| structural("decode ttl index value", e))?;
            targets.push(QueueKeyRef {
                team_id: ttl_key.team_id.into(),
                priority: ttl_value.priority,
                created_at: ttl_value.created_at,
                job_id: ttl_key.job_id.into(),
            });
        }

        let mut removed = 0usize;
        for target in targets {
            let existed = self
                .db
                .run(|trx, _| {
                    let target = target.clone();
                    async move { remove_queue_entry_in_txn(&trx, &target).await }
                })
                .await
                .map_err(store_err)?;
            if existed {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

use foundationdb::FdbBindingError;

async fn remove_queue_entry_in_txn(
    trx: &Transaction,
    key: &QueueKeyRef,
) -> std::result::Result<bool, FdbBindingError> {
    let qkey = QueueKey {
        team_id: key.team_id.0.clone(),
        priority: key.priority,
        created_at: key.created_at,
        job_id: key.job_id.0.clone(),
    }
    .encode();
    let Some(existing) = trx.get(&qkey, false).await? else {
        return Ok(false);
    };
    let value: QueueEntryValue = serde_json::from_slice(&existing)
        .map_err(|e| FdbBindingError::custom(format!("decode queue entry value: {e}")))?;
    trx.clear(&qkey);
    counter_add(trx, CounterKind::TeamQueue, &key.team_id.0, -1).await;

    if let Some(expires_at) = value.times_out_at {
        let ttl_key = TtlIndexKey {
            expires_at,
            team_id: key.team_id.0.clone(),
            job_id: key.job_id.0.clone(),
        }
        .encode();
        trx.clear(&ttl_key);
    }
    if let Some(crawl_id) = &value.crawl_id {
        let crawl_key = CrawlIndexKey {
            crawl_id: crawl_id.clone(),
            job_id: key.job_id.0.clone(),
        }
        .encode();
        trx.clear(&crawl_key);
        counter_add(trx, CounterKind::CrawlQueue, crawl_id, -1).await;
    }
    Ok(true)
}

fn key_codec_prefix_claim() -> u8 {
    key_codec::EntityKind::Claim.prefix()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct QueueEntryValue {
    data: Vec<u8>,
    times_out_at: Option<i64>,
    crawl_id: Option<String>,
    listenable: bool,
    listen_channel_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ClaimValue {
    worker_id: String,
    claimed_at: i64,
    queue_key: QueueKeyRef,
}
