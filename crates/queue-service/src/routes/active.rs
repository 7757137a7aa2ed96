//! `active.push`/`active.remove`/`active.count` for both team and crawl
//! scopes (`spec.md` §6).

use axum::extract::State;
use axum::Json;
use queue_core::ActiveScope;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::Result;
use crate::routes::queue::{AckResponse, CountResponse};

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Team,
    Crawl,
}

impl From<Scope> for ActiveScope {
    fn from(s: Scope) -> Self {
        match s {
            Scope::Team => ActiveScope::Team,
            Scope::Crawl => ActiveScope::Crawl,
        }
    }
}

#[derive(Deserialize)]
pub struct ActivePushRequest {
    pub scope: Scope,
    pub scope_id: String,
    pub job_id: String,
    pub ttl_ms: i64,
}

pub async fn active_push_handler(
    State(state): State<AppState>,
    Json(req): Json<ActivePushRequest>,
) -> Result<Json<AckResponse>> {
    state
        .queue
        .active_push(req.scope.into(), &req.scope_id, &req.job_id, req.ttl_ms)
        .await?;
    Ok(Json(AckResponse { ack: true }))
}

#[derive(Deserialize)]
pub struct ActiveRemoveRequest {
    pub scope: Scope,
    pub scope_id: String,
    pub job_id: String,
}

#[derive(Serialize)]
pub struct ActiveRemoveResponse {
    pub existed: bool,
}

pub async fn active_remove_handler(
    State(state): State<AppState>,
    Json(req): Json<ActiveRemoveRequest>,
) -> Result<Json<ActiveRemoveResponse>> {
    let existed = state
        .queue
        .active_remove(req.scope.into(), &req.scope_id, &req.job_id)
        .await?;
    Ok(Json(ActiveRemoveResponse { existed }))
}

#[derive(Deserialize)]
pub struct ActiveCountRequest {
    pub scope: Scope,
    pub scope_id: String,
}

pub async fn active_count_handler(
    State(state): State<AppState>,
    Json(req): Json<ActiveCountRequest>,
) -> Result<Json<CountResponse>> {
    let count = state.queue.active_count(req.scope.into(), &req.scope_id).await?;
    Ok(Json(CountResponse { count }))
}
