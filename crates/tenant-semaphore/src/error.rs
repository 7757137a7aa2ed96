//! Error taxonomy for the tenant concurrency semaphore.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SemaphoreError {
    /// The backing Redis-style store was unreachable or returned an error.
    #[error("semaphore store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    /// `acquire_blocking`'s deadline elapsed before a slot was granted.
    #[error("acquire timed out waiting for a slot for team {team}")]
    Timeout { team: String },

    /// The caller's cancellation signal fired before a slot was granted.
    #[error("acquire cancelled waiting for a slot for team {team}")]
    Cancelled { team: String },

    /// A held lease's heartbeat was rejected (another process reclaimed the
    /// slot, or it expired before the heartbeat landed). The enclosing
    /// operation's slot is forfeit.
    #[error("lease lost for holder {holder} on team {team}")]
    LeaseLost { team: String, holder: String },
}

pub type Result<T> = std::result::Result<T, SemaphoreError>;
