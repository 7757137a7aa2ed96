//! Janitor-triggered endpoints (`spec.md` §6: `cleanup.*`, `reconcile.*`).
//! The janitor also runs these same `QueueCore` methods on its own schedule
//! (see `crate::janitor_loop`); exposing them here lets an operator or a
//! dev-cli trigger an out-of-band sweep without waiting for the next tick.

use axum::extract::State;
use axum::Json;
use queue_core::CounterKind;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::Result;

#[derive(Serialize)]
pub struct RemovedCountResponse {
    pub removed: usize,
}

pub async fn expired_jobs_handler(State(state): State<AppState>) -> Result<Json<RemovedCountResponse>> {
    let removed = state.queue.cleanup_expired_jobs().await?;
    Ok(Json(RemovedCountResponse { removed }))
}

pub async fn expired_active_jobs_handler(State(state): State<AppState>) -> Result<Json<RemovedCountResponse>> {
    let removed = state.queue.cleanup_expired_active_jobs().await?;
    Ok(Json(RemovedCountResponse { removed }))
}

pub async fn orphaned_claims_handler(State(state): State<AppState>) -> Result<Json<RemovedCountResponse>> {
    let removed = state
        .queue
        .cleanup_orphaned_claims(state.config.janitor.orphan_claim_age_ms)
        .await?;
    Ok(Json(RemovedCountResponse { removed }))
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileKind {
    TeamQueue,
    CrawlQueue,
    TeamActive,
    CrawlActive,
}

impl From<ReconcileKind> for CounterKind {
    fn from(k: ReconcileKind) -> Self {
        match k {
            ReconcileKind::TeamQueue => CounterKind::TeamQueue,
            ReconcileKind::CrawlQueue => CounterKind::CrawlQueue,
            ReconcileKind::TeamActive => CounterKind::TeamActive,
            ReconcileKind::CrawlActive => CounterKind::CrawlActive,
        }
    }
}

#[derive(Deserialize)]
pub struct ReconcileRequest {
    pub kind: ReconcileKind,
    pub scope_id: String,
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub correction_delta: i64,
}

pub async fn reconcile_handler(
    State(state): State<AppState>,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>> {
    let correction_delta = state.queue.reconcile(req.kind.into(), &req.scope_id).await?;
    Ok(Json(ReconcileResponse { correction_delta }))
}
