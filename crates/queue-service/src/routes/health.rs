//! Liveness endpoint. Unlike the teacher's `health_handler` (which probes a
//! `PgPool`), this service's state lives entirely behind the
//! `QueueBackend`/`SemaphoreBackend` seams, so health is reported as
//! "process is up and serving" rather than pinging FDB/Redis on every check
//! — the janitor's own failures already surface store outages via logs.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}
