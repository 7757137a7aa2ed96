//! `push`/`pop`/`complete`/`release`/`queue.count` (`spec.md` §6).

use axum::extract::State;
use axum::Json;
use queue_core::{CounterKind, Job};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::app::AppState;
use crate::error::Result;

#[derive(Deserialize)]
pub struct PushRequest {
    pub team_id: String,
    pub job_id: String,
    /// Opaque job payload. The queue never interprets this; carried here as
    /// a string (rather than base64'd bytes) since callers already JSON- or
    /// UTF8-encode their payloads before handing them to the queue.
    pub data: String,
    pub priority: i32,
    pub listenable: bool,
    pub listen_channel_id: Option<String>,
    pub timeout_ms: Option<i64>,
    pub crawl_id: Option<String>,
}

#[derive(Serialize)]
pub struct AckResponse {
    pub ack: bool,
}

pub async fn push_handler(State(state): State<AppState>, Json(req): Json<PushRequest>) -> Result<Json<AckResponse>> {
    let job = Job {
        job_id: req.job_id.into(),
        team_id: req.team_id.into(),
        data: req.data.into_bytes(),
        priority: req.priority,
        created_at: chrono::Utc::now().timestamp_millis(),
        listenable: req.listenable,
        listen_channel_id: req.listen_channel_id,
        crawl_id: req.crawl_id.map(Into::into),
    };
    state.queue.push(&job, req.timeout_ms).await?;
    Ok(Json(AckResponse { ack: true }))
}

#[derive(Deserialize)]
pub struct PopRequest {
    pub team_id: String,
    pub worker_id: String,
    #[serde(default)]
    pub blocked_crawl_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct QueueKeyDto {
    pub team_id: String,
    pub priority: i32,
    pub created_at: i64,
    pub job_id: String,
}

#[derive(Serialize)]
pub struct ClaimedJobDto {
    pub job_id: String,
    pub team_id: String,
    pub data: String,
    pub priority: i32,
    pub created_at: i64,
    pub listenable: bool,
    pub listen_channel_id: Option<String>,
    pub crawl_id: Option<String>,
    pub queue_key: QueueKeyDto,
}

#[derive(Serialize)]
#[serde(tag = "outcome")]
pub enum PopResponse {
    #[serde(rename = "claimed")]
    Claimed { job: ClaimedJobDto },
    #[serde(rename = "none_available")]
    NoneAvailable,
}

pub async fn pop_handler(State(state): State<AppState>, Json(req): Json<PopRequest>) -> Result<Json<PopResponse>> {
    let cancel = CancellationToken::new();
    let outcome = state
        .queue
        .pop(&req.team_id, &req.worker_id, &req.blocked_crawl_ids, &cancel)
        .await?;

    let response = match outcome {
        queue_core::PopOutcome::Claimed(claimed) => PopResponse::Claimed {
            job: ClaimedJobDto {
                job_id: claimed.job.job_id.0.clone(),
                team_id: claimed.job.team_id.0.clone(),
                data: String::from_utf8_lossy(&claimed.job.data).into_owned(),
                priority: claimed.job.priority,
                created_at: claimed.job.created_at,
                listenable: claimed.job.listenable,
                listen_channel_id: claimed.job.listen_channel_id.clone(),
                crawl_id: claimed.job.crawl_id.map(|c| c.0),
                queue_key: QueueKeyDto {
                    team_id: claimed.queue_key.team_id.0,
                    priority: claimed.queue_key.priority,
                    created_at: claimed.queue_key.created_at,
                    job_id: claimed.queue_key.job_id.0,
                },
            },
        },
        queue_core::PopOutcome::NoneAvailable => PopResponse::NoneAvailable,
    };
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    pub team_id: String,
    pub priority: i32,
    pub created_at: i64,
    pub job_id: String,
}

/// `spec.md` §9 Open Question: whether `complete` must be idempotent after a
/// TTL-expire removal is left unstated; treated as a no-op success per the
/// spec's own stated safe default (see `DESIGN.md`) — the returned ack does
/// not distinguish "removed" from "already gone".
pub async fn complete_handler(
    State(state): State<AppState>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<AckResponse>> {
    let key = queue_core::QueueKeyRef {
        team_id: req.team_id.into(),
        priority: req.priority,
        created_at: req.created_at,
        job_id: req.job_id.into(),
    };
    state.queue.remove(&key).await?;
    Ok(Json(AckResponse { ack: true }))
}

#[derive(Deserialize)]
pub struct ReleaseRequest {
    pub job_id: String,
}

pub async fn release_handler(
    State(state): State<AppState>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<AckResponse>> {
    state.queue.release(&req.job_id).await?;
    Ok(Json(AckResponse { ack: true }))
}

#[derive(Deserialize)]
pub struct QueueCountRequest {
    pub scope: QueueCountScope,
    pub scope_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCountScope {
    Team,
    Crawl,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: i64,
}

pub async fn queue_count_handler(
    State(state): State<AppState>,
    Json(req): Json<QueueCountRequest>,
) -> Result<Json<CountResponse>> {
    let kind = match req.scope {
        QueueCountScope::Team => CounterKind::TeamQueue,
        QueueCountScope::Crawl => CounterKind::CrawlQueue,
    };
    let count = state.queue.queue_count(kind, &req.scope_id).await?;
    Ok(Json(CountResponse { count }))
}
