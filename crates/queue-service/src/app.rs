//! Application setup: shared state plus the axum router, one handler per
//! row of `spec.md` §6's operation table. Handlers stay thin — deserialize,
//! call into `queue-core`/`tenant-semaphore`, serialize — matching the
//! teacher's domain/kernel split where the HTTP layer carries no business
//! logic of its own.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use queue_core::fdb_backend::FdbBackend;
use queue_core::QueueCore;
use tenant_semaphore::redis_backend::RedisSemaphoreBackend;
use tenant_semaphore::TenantSemaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::routes;

#[derive(Clone)]
pub struct AppState {
    pub queue: QueueCore<FdbBackend>,
    pub semaphore: TenantSemaphore<RedisSemaphoreBackend>,
    pub config: Arc<Config>,
}

/// Default deadline for a single `semaphore.acquire_blocking` call made
/// through the HTTP surface; workers that need a different deadline pass
/// `opts.deadline_ms` in the request body.
pub const DEFAULT_ACQUIRE_DEADLINE: Duration = Duration::from_secs(30);

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_handler))
        .route("/queue/push", post(routes::queue::push_handler))
        .route("/queue/pop", post(routes::queue::pop_handler))
        .route("/queue/complete", post(routes::queue::complete_handler))
        .route("/queue/release", post(routes::queue::release_handler))
        .route("/queue/count", post(routes::queue::queue_count_handler))
        .route("/active/push", post(routes::active::active_push_handler))
        .route("/active/remove", post(routes::active::active_remove_handler))
        .route("/active/count", post(routes::active::active_count_handler))
        .route("/cleanup/expired-jobs", post(routes::cleanup::expired_jobs_handler))
        .route(
            "/cleanup/expired-active-jobs",
            post(routes::cleanup::expired_active_jobs_handler),
        )
        .route(
            "/cleanup/orphaned-claims",
            post(routes::cleanup::orphaned_claims_handler),
        )
        .route("/reconcile", post(routes::cleanup::reconcile_handler))
        .route("/semaphore/acquire", post(routes::semaphore::acquire_handler))
        .route(
            "/semaphore/acquire-blocking",
            post(routes::semaphore::acquire_blocking_handler),
        )
        .route("/semaphore/heartbeat", post(routes::semaphore::heartbeat_handler))
        .route("/semaphore/release", post(routes::semaphore::release_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
