//! Translation from domain errors (`queue_core::QueueCoreError`,
//! `tenant_semaphore::SemaphoreError`) to transport-level failures
//! (`spec.md` §7's propagation policy: "the queue engine surfaces raw store
//! errors to the service surface; the service surface translates them to
//! transport-level failures").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Queue(#[from] queue_core::QueueCoreError),
    #[error(transparent)]
    Semaphore(#[from] tenant_semaphore::SemaphoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ServiceError::Queue(queue_core::QueueCoreError::StoreUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            ServiceError::Queue(queue_core::QueueCoreError::Structural(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "structural")
            }
            ServiceError::Queue(queue_core::QueueCoreError::LeaseLost { .. }) => {
                (StatusCode::CONFLICT, "lease_lost")
            }
            ServiceError::Queue(queue_core::QueueCoreError::Cancelled) => {
                (StatusCode::GATEWAY_TIMEOUT, "cancelled")
            }
            ServiceError::Semaphore(tenant_semaphore::SemaphoreError::StoreUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            ServiceError::Semaphore(tenant_semaphore::SemaphoreError::Timeout { .. }) => {
                (StatusCode::GATEWAY_TIMEOUT, "timeout")
            }
            ServiceError::Semaphore(tenant_semaphore::SemaphoreError::Cancelled { .. }) => {
                (StatusCode::GATEWAY_TIMEOUT, "cancelled")
            }
            ServiceError::Semaphore(tenant_semaphore::SemaphoreError::LeaseLost { .. }) => {
                (StatusCode::CONFLICT, "lease_lost")
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "structural failure");
        } else {
            tracing::warn!(error = %self, kind, "request failed");
        }

        (
            status,
            Json(ErrorBody {
                error: kind.to_string(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
