//! Worker-side client for the queue service's HTTP surface (`spec.md` §6),
//! wrapping `reqwest` behind a [`CircuitBreaker`] the same way
//! `apify_client::ApifyClient` wraps its own `reqwest::Client` with typed
//! errors and a poll-loop idiom, plus the fault envelope `spec.md` §4.I
//! requires on top of that for the worker/service boundary.

pub mod circuit_breaker;
pub mod error;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use error::{ClientError, Result};

use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

pub struct QueueClient {
    http: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl QueueClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_breaker(base_url, CircuitBreaker::default())
    }

    pub fn with_breaker(base_url: impl Into<String>, breaker: CircuitBreaker) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            breaker,
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(&self, path: &str, req: &Req) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        self.breaker
            .call(|| async {
                let resp = self.http.post(&url).json(req).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ClientError::Api {
                        status: status.as_u16(),
                        message: body,
                    });
                }
                let parsed: Resp = resp.json().await?;
                Ok(parsed)
            })
            .await
    }
}

#[derive(Serialize)]
pub struct PushJob<'a> {
    pub team_id: &'a str,
    pub job_id: &'a str,
    pub data: &'a str,
    pub priority: i32,
    pub listenable: bool,
    pub listen_channel_id: Option<&'a str>,
    pub timeout_ms: Option<i64>,
    pub crawl_id: Option<&'a str>,
}

#[derive(serde::Deserialize)]
pub struct Ack {
    pub ack: bool,
}

#[derive(serde::Deserialize)]
pub struct QueueKeyRef {
    pub team_id: String,
    pub priority: i32,
    pub created_at: i64,
    pub job_id: String,
}

#[derive(serde::Deserialize)]
pub struct ClaimedJob {
    pub job_id: String,
    pub team_id: String,
    pub data: String,
    pub priority: i32,
    pub created_at: i64,
    pub listenable: bool,
    pub listen_channel_id: Option<String>,
    pub crawl_id: Option<String>,
    pub queue_key: QueueKeyRef,
}

#[derive(serde::Deserialize)]
#[serde(tag = "outcome")]
pub enum PopOutcome {
    #[serde(rename = "claimed")]
    Claimed { job: ClaimedJob },
    #[serde(rename = "none_available")]
    NoneAvailable,
}

#[derive(Serialize)]
struct PopRequest<'a> {
    team_id: &'a str,
    worker_id: &'a str,
    blocked_crawl_ids: &'a [String],
}

#[derive(Serialize)]
struct CompleteRequest<'a> {
    team_id: &'a str,
    priority: i32,
    created_at: i64,
    job_id: &'a str,
}

#[derive(Serialize)]
struct ReleaseRequest<'a> {
    job_id: &'a str,
}

#[derive(serde::Deserialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum QueueCountScope {
    Team,
    Crawl,
}

#[derive(Serialize)]
struct QueueCountRequest<'a> {
    scope: QueueCountScope,
    scope_id: &'a str,
}

#[derive(serde::Deserialize)]
pub struct AcquireResult {
    pub granted: bool,
    pub count: u64,
    pub removed: u64,
}

#[derive(serde::Deserialize)]
pub struct AcquireBlockingResult {
    pub granted: bool,
    pub count: u64,
    pub removed: u64,
    pub limited: bool,
}

#[derive(Serialize)]
struct AcquireRequest<'a> {
    team_id: &'a str,
    holder_id: &'a str,
    limit: u32,
    ttl_ms: i64,
}

#[derive(Serialize)]
struct AcquireBlockingRequest<'a> {
    team_id: &'a str,
    holder_id: &'a str,
    limit: u32,
    ttl_ms: i64,
    deadline_ms: Option<u64>,
}

#[derive(Serialize)]
struct HeartbeatRequest<'a> {
    team_id: &'a str,
    holder_id: &'a str,
    ttl_ms: i64,
}

#[derive(serde::Deserialize)]
pub struct HeartbeatResult {
    pub extended: bool,
}

#[derive(Serialize)]
struct SemaphoreReleaseRequest<'a> {
    team_id: &'a str,
    holder_id: &'a str,
}

impl QueueClient {
    pub async fn push(&self, job: &PushJob<'_>) -> Result<Ack> {
        self.post("/queue/push", job).await
    }

    pub async fn pop(&self, team_id: &str, worker_id: &str, blocked_crawl_ids: &[String]) -> Result<PopOutcome> {
        self.post(
            "/queue/pop",
            &PopRequest {
                team_id,
                worker_id,
                blocked_crawl_ids,
            },
        )
        .await
    }

    pub async fn complete(&self, key: &QueueKeyRef) -> Result<Ack> {
        self.post(
            "/queue/complete",
            &CompleteRequest {
                team_id: &key.team_id,
                priority: key.priority,
                created_at: key.created_at,
                job_id: &key.job_id,
            },
        )
        .await
    }

    pub async fn release(&self, job_id: &str) -> Result<Ack> {
        self.post("/queue/release", &ReleaseRequest { job_id }).await
    }

    pub async fn team_queue_count(&self, team_id: &str) -> Result<i64> {
        let resp: CountResponse = self
            .post(
                "/queue/count",
                &QueueCountRequest {
                    scope: QueueCountScope::Team,
                    scope_id: team_id,
                },
            )
            .await?;
        Ok(resp.count)
    }

    pub async fn crawl_queue_count(&self, crawl_id: &str) -> Result<i64> {
        let resp: CountResponse = self
            .post(
                "/queue/count",
                &QueueCountRequest {
                    scope: QueueCountScope::Crawl,
                    scope_id: crawl_id,
                },
            )
            .await?;
        Ok(resp.count)
    }

    pub async fn semaphore_acquire(&self, team_id: &str, holder_id: &str, limit: u32, ttl_ms: i64) -> Result<AcquireResult> {
        self.post(
            "/semaphore/acquire",
            &AcquireRequest {
                team_id,
                holder_id,
                limit,
                ttl_ms,
            },
        )
        .await
    }

    /// Blocking acquire with a server-enforced deadline. `spec.md` §4.I's
    /// client-side cancellation is layered on top by the caller racing this
    /// future against its own cancellation signal — the HTTP request itself
    /// has no mid-flight cancel primitive once sent.
    pub async fn semaphore_acquire_blocking(
        &self,
        team_id: &str,
        holder_id: &str,
        limit: u32,
        ttl_ms: i64,
        deadline: Duration,
    ) -> Result<AcquireBlockingResult> {
        self.post(
            "/semaphore/acquire-blocking",
            &AcquireBlockingRequest {
                team_id,
                holder_id,
                limit,
                ttl_ms,
                deadline_ms: Some(deadline.as_millis() as u64),
            },
        )
        .await
    }

    pub async fn semaphore_heartbeat(&self, team_id: &str, holder_id: &str, ttl_ms: i64) -> Result<bool> {
        let resp: HeartbeatResult = self
            .post(
                "/semaphore/heartbeat",
                &HeartbeatRequest {
                    team_id,
                    holder_id,
                    ttl_ms,
                },
            )
            .await?;
        Ok(resp.extended)
    }

    pub async fn semaphore_release(&self, team_id: &str, holder_id: &str) -> Result<Ack> {
        self.post("/semaphore/release", &SemaphoreReleaseRequest { team_id, holder_id })
            .await
    }
}
