//! The queue engine's error taxonomy (`spec.md` §7).
//!
//! Backends surface raw store failures through [`QueueCoreError`] so callers
//! can branch on category rather than parse messages; the service surface
//! (in `queue-service`) is the layer that translates these into transport
//! failures.

use thiserror::Error;

/// A single error type covering every failure category in `spec.md` §7.
/// Each variant is tagged with the category it belongs to in its doc
/// comment rather than split into one enum per category, so callers that
/// only care about "is this retryable" can match on variant without
/// threading a separate classification enum through the codebase.
#[derive(Debug, Error)]
pub enum QueueCoreError {
    /// Transient: the backing store's own transaction retry loop gave up
    /// (commit conflict, timeout, connection reset) after exhausting its
    /// internal retries.
    #[error("store unavailable after retry: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    /// Structural: malformed key decode, counter-type mismatch, or an
    /// unexpected empty read where existence was just proven in the same
    /// transaction. Indicates a bug or data corruption; never retried.
    #[error("structural failure: {0}")]
    Structural(#[source] anyhow::Error),

    /// Lease: a heartbeat was lost; the enclosing operation's held slot is
    /// forfeit.
    #[error("lease lost for holder {holder}")]
    LeaseLost { holder: String },

    /// Cancellation/deadline: expected control flow, not a bug.
    #[error("operation cancelled or deadline exceeded")]
    Cancelled,
}

impl QueueCoreError {
    /// True for failures the circuit breaker in `queue-client` should count
    /// toward its consecutive-failure threshold.
    pub fn counts_toward_circuit_breaker(&self) -> bool {
        matches!(self, QueueCoreError::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, QueueCoreError>;
