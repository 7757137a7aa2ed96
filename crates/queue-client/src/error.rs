//! Client-side error taxonomy (`spec.md` §7): transport/decode failures from
//! `reqwest`, the service's own error body, and the circuit breaker's
//! fast-fail, kept distinguishable so callers can tell "the service said no"
//! from "we didn't even try".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The breaker is open; this call was never sent.
    #[error("circuit open, retry after {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Failures that should count toward the breaker's consecutive-failure
    /// threshold. `CircuitOpen` itself doesn't — the call never reached the
    /// service, so it can't indicate a new failure.
    pub fn counts_toward_circuit_breaker(&self) -> bool {
        !matches!(self, ClientError::CircuitOpen { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
