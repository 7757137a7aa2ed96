//! `semaphore.acquire`/`acquire_blocking`/`heartbeat`/`release` (`spec.md`
//! §6). `acquire_blocking` is the one endpoint with its own cancellation
//! concern: cancelling the underlying HTTP request doesn't cancel the
//! server-side wait, since the spec's `cancel_signal` is a caller-local
//! concept — a worker that wants to give up early should stop waiting for
//! the response and subsequently call `semaphore.release` as cleanup.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::app::{AppState, DEFAULT_ACQUIRE_DEADLINE};
use crate::error::Result;

#[derive(Deserialize)]
pub struct AcquireRequest {
    pub team_id: String,
    pub holder_id: String,
    pub limit: u32,
    pub ttl_ms: i64,
}

#[derive(Serialize)]
pub struct AcquireResponse {
    pub granted: bool,
    pub count: u64,
    pub removed: u64,
}

#[derive(Serialize)]
pub struct AcquireBlockingResponse {
    pub granted: bool,
    pub count: u64,
    pub removed: u64,
    /// Set if at least one attempt along the way was refused before this
    /// call eventually succeeded (`spec.md` §6).
    pub limited: bool,
}

pub async fn acquire_handler(
    State(state): State<AppState>,
    Json(req): Json<AcquireRequest>,
) -> Result<Json<AcquireResponse>> {
    let attempt = state
        .semaphore
        .acquire(&req.team_id, &req.holder_id, req.limit, req.ttl_ms)
        .await?;
    Ok(Json(AcquireResponse {
        granted: attempt.granted,
        count: attempt.count,
        removed: attempt.removed,
    }))
}

#[derive(Deserialize)]
pub struct AcquireBlockingRequest {
    pub team_id: String,
    pub holder_id: String,
    pub limit: u32,
    pub ttl_ms: i64,
    pub deadline_ms: Option<u64>,
}

pub async fn acquire_blocking_handler(
    State(state): State<AppState>,
    Json(req): Json<AcquireBlockingRequest>,
) -> Result<Json<AcquireBlockingResponse>> {
    let deadline = req
        .deadline_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_ACQUIRE_DEADLINE);
    let result = state
        .semaphore
        .acquire_blocking(
            &req.team_id,
            &req.holder_id,
            req.limit,
            req.ttl_ms,
            deadline,
            CancellationToken::new(),
        )
        .await?;
    Ok(Json(AcquireBlockingResponse {
        granted: result.attempt.granted,
        count: result.attempt.count,
        removed: result.attempt.removed,
        limited: result.limited,
    }))
}

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    pub team_id: String,
    pub holder_id: String,
    pub ttl_ms: i64,
}

#[derive(Serialize)]
pub struct HeartbeatResponse {
    pub extended: bool,
}

pub async fn heartbeat_handler(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>> {
    let extended = state
        .semaphore
        .heartbeat(&req.team_id, &req.holder_id, req.ttl_ms)
        .await?;
    Ok(Json(HeartbeatResponse { extended }))
}

#[derive(Deserialize)]
pub struct SemaphoreReleaseRequest {
    pub team_id: String,
    pub holder_id: String,
}

#[derive(Serialize)]
pub struct AckResponse {
    pub ack: bool,
}

pub async fn release_handler(
    State(state): State<AppState>,
    Json(req): Json<SemaphoreReleaseRequest>,
) -> Result<Json<AckResponse>> {
    state.semaphore.release(&req.team_id, &req.holder_id).await?;
    Ok(Json(AckResponse { ack: true }))
}
