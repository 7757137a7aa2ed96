//! Domain types shared across the queue engine.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype!(JobId);
string_newtype!(TeamId);
string_newtype!(CrawlId);

/// A job as supplied by `push`. The queue never interprets `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub team_id: TeamId,
    pub data: Vec<u8>,
    pub priority: i32,
    pub created_at: i64,
    pub listenable: bool,
    pub listen_channel_id: Option<String>,
    pub crawl_id: Option<CrawlId>,
}

/// A job handed back from a winning `pop`, with enough of the queue key to
/// `complete` or `release` it without a further lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub job: Job,
    pub queue_key: QueueKeyRef,
}

/// The fields needed to address a specific queue entry for removal, without
/// re-deriving them from the job. Mirrors `key_codec::QueueKey` but is kept
/// as a plain value type here so callers outside this crate don't need the
/// codec crate in scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueKeyRef {
    pub team_id: TeamId,
    pub priority: i32,
    pub created_at: i64,
    pub job_id: JobId,
}

/// A candidate surfaced by `enumerate_candidates`, plus enough context for
/// the claim arbiter to attempt a claim and, on success, commit the pop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueCandidate {
    pub queue_key: QueueKeyRef,
    pub times_out_at: Option<i64>,
    pub crawl_id: Option<CrawlId>,
    pub data: Vec<u8>,
    pub listenable: bool,
    pub listen_channel_id: Option<String>,
}

impl QueueCandidate {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.times_out_at, Some(t) if t <= now_ms)
    }
}

/// The value stored alongside a crawl-index entry: enough of the queue
/// entry's key fields to remove it directly during `cancel_crawl` without
/// re-scanning the team's whole queue space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlIndexValue {
    pub team_id: String,
    pub priority: i32,
    pub created_at: i64,
}

/// The value stored alongside a TTL-index entry: the queue entry's
/// remaining key fields (`team_id`/`job_id` are already in the TTL key
/// itself), so the TTL sweep can address and remove the queue entry
/// directly instead of scanning the team's queue subspace for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlIndexValue {
    pub priority: i32,
    pub created_at: i64,
    pub crawl_id: Option<String>,
}

/// The counter kinds tracked by the counter service, re-exported here so
/// callers of `queue-core` don't need to depend on `key-codec` directly for
/// this enum.
pub type CounterKind = key_codec::CounterKind;

/// Which per-scope active-job subspace an operation addresses.
pub type ActiveScope = key_codec::ActiveScope;

/// Outcome of a single claim attempt against one candidate (`spec.md` §4.D
/// step 3-4): either this worker's write turned out to be the
/// minimum-versionstamp record (won), or some other concurrent attempt's
/// write sorted first (lost).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimAttemptOutcome {
    Won,
    Lost,
    /// The candidate's queue entry was gone by the time the claim was
    /// attempted (already popped, TTL-swept, or cancelled).
    GoneAlready,
}

/// Result of a full `pop` call.
#[derive(Debug, Clone)]
pub enum PopOutcome {
    Claimed(ClaimedJob),
    /// The attempt budget was exhausted without a winning claim; a non-error
    /// condition per `spec.md` §7 (contention failure).
    NoneAvailable,
}
