//! Composite key/value encoding for the queue's subspaces.
//!
//! Keys are length-prefixed tuple encodings: a single-byte subspace prefix
//! followed by, for each field, either a 4-byte big-endian length + raw bytes
//! (strings) or a fixed-width big-endian integer (`i32`/`i64`). Signed
//! integers have their sign bit flipped before encoding so that big-endian
//! byte comparison agrees with signed integer comparison — the encoding must
//! be prefix-preserving so a range scan over `(prefix, team_id, *)` yields
//! entries in field order.
//!
//! Counter *values* are the one place this crate emits little-endian bytes,
//! because the backing store's atomic `ADD` operates on little-endian `i64`.
//! Every other integer in this crate is big-endian for ordering.
//!
//! Decoding is schema-driven: each entity kind knows its own field layout, so
//! `decode` never needs to guess a field's type. It does, however, verify the
//! subspace prefix byte and the exact encoded length, and rejects anything
//! else as [`CodecError::SchemaMismatch`].

use thiserror::Error;

/// Errors produced while encoding or decoding a key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The key's subspace prefix byte didn't match the entity kind being decoded.
    #[error("expected subspace prefix {expected:#04x}, found {found:#04x}")]
    WrongPrefix { expected: u8, found: u8 },

    /// The key was shorter than its schema requires, or had trailing bytes left over.
    #[error("key does not match the expected field schema for this entity kind")]
    SchemaMismatch,

    /// A length-prefixed string field claimed a length longer than the remaining bytes.
    #[error("string field length {declared} exceeds remaining {remaining} bytes")]
    TruncatedString { declared: usize, remaining: usize },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
}

type Result<T> = std::result::Result<T, CodecError>;

/// Single-byte subspace prefixes. Stable across releases: changing a value
/// here is a data-format break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntityKind {
    Queue = 0x01,
    CrawlIndex = 0x02,
    TtlIndex = 0x03,
    ActiveTeam = 0x04,
    ActiveCrawl = 0x05,
    Counter = 0x06,
    Claim = 0x07,
}

impl EntityKind {
    pub const fn prefix(self) -> u8 {
        self as u8
    }
}

/// The kinds of atomic counters tracked by the counter service (`spec.md` §3/§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    TeamQueue,
    CrawlQueue,
    TeamActive,
    CrawlActive,
}

impl CounterKind {
    fn tag(self) -> u8 {
        match self {
            CounterKind::TeamQueue => 0,
            CounterKind::CrawlQueue => 1,
            CounterKind::TeamActive => 2,
            CounterKind::CrawlActive => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CounterKind::TeamQueue),
            1 => Ok(CounterKind::CrawlQueue),
            2 => Ok(CounterKind::TeamActive),
            3 => Ok(CounterKind::CrawlActive),
            _ => Err(CodecError::SchemaMismatch),
        }
    }
}

// ---------------------------------------------------------------------
// Field primitives
// ---------------------------------------------------------------------

fn push_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn take_str<'a>(input: &mut &'a [u8]) -> Result<&'a str> {
    if input.len() < 4 {
        return Err(CodecError::SchemaMismatch);
    }
    let (len_bytes, rest) = input.split_at(4);
    let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
    if rest.len() < len {
        return Err(CodecError::TruncatedString {
            declared: len,
            remaining: rest.len(),
        });
    }
    let (s_bytes, rest) = rest.split_at(len);
    *input = rest;
    std::str::from_utf8(s_bytes).map_err(|_| CodecError::InvalidUtf8)
}

/// Big-endian-sortable `i32`: the sign bit is flipped so byte order agrees
/// with signed numeric order (lower priority value sorts first).
fn push_i32_sortable(buf: &mut Vec<u8>, v: i32) {
    let flipped = (v as u32) ^ 0x8000_0000;
    buf.extend_from_slice(&flipped.to_be_bytes());
}

fn take_i32_sortable(input: &mut &[u8]) -> Result<i32> {
    if input.len() < 4 {
        return Err(CodecError::SchemaMismatch);
    }
    let (bytes, rest) = input.split_at(4);
    let flipped = u32::from_be_bytes(bytes.try_into().unwrap());
    *input = rest;
    Ok((flipped ^ 0x8000_0000) as i32)
}

/// Big-endian-sortable `i64`, same sign-flip trick as `i32`.
fn push_i64_sortable(buf: &mut Vec<u8>, v: i64) {
    let flipped = (v as u64) ^ 0x8000_0000_0000_0000;
    buf.extend_from_slice(&flipped.to_be_bytes());
}

fn take_i64_sortable(input: &mut &[u8]) -> Result<i64> {
    if input.len() < 8 {
        return Err(CodecError::SchemaMismatch);
    }
    let (bytes, rest) = input.split_at(8);
    let flipped = u64::from_be_bytes(bytes.try_into().unwrap());
    *input = rest;
    Ok((flipped ^ 0x8000_0000_0000_0000) as i64)
}

fn expect_empty(input: &[u8]) -> Result<()> {
    if input.is_empty() {
        Ok(())
    } else {
        Err(CodecError::SchemaMismatch)
    }
}

fn expect_prefix(mut input: &[u8], kind: EntityKind) -> Result<&[u8]> {
    if input.is_empty() {
        return Err(CodecError::SchemaMismatch);
    }
    let (prefix, rest) = input.split_at(1);
    if prefix[0] != kind.prefix() {
        return Err(CodecError::WrongPrefix {
            expected: kind.prefix(),
            found: prefix[0],
        });
    }
    input = rest;
    Ok(input)
}

// ---------------------------------------------------------------------
// Queue entry key: (team_id, priority, created_at, job_id)
// ---------------------------------------------------------------------

/// The authoritative location of a queued job: `(team_id, priority, created_at, job_id)`.
///
/// Encoded so that a range scan over the bytes returned by [`QueueKey::team_prefix`]
/// yields entries ordered by `(priority, created_at, job_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKey {
    pub team_id: String,
    pub priority: i32,
    pub created_at: i64,
    pub job_id: String,
}

impl QueueKey {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![EntityKind::Queue.prefix()];
        push_str(&mut buf, &self.team_id);
        push_i32_sortable(&mut buf, self.priority);
        push_i64_sortable(&mut buf, self.created_at);
        push_str(&mut buf, &self.job_id);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut rest = expect_prefix(bytes, EntityKind::Queue)?;
        let team_id = take_str(&mut rest)?.to_owned();
        let priority = take_i32_sortable(&mut rest)?;
        let created_at = take_i64_sortable(&mut rest)?;
        let job_id = take_str(&mut rest)?.to_owned();
        expect_empty(rest)?;
        Ok(Self {
            team_id,
            priority,
            created_at,
            job_id,
        })
    }

    /// Prefix covering every queue entry for `team_id`, in `(priority,
    /// created_at, job_id)` order. Pair with [`range_end`] for an exclusive
    /// upper bound.
    pub fn team_prefix(team_id: &str) -> Vec<u8> {
        let mut buf = vec![EntityKind::Queue.prefix()];
        push_str(&mut buf, team_id);
        buf
    }
}

// ---------------------------------------------------------------------
// Crawl index key: (crawl_id, job_id)
// ---------------------------------------------------------------------

/// Secondary index `(crawl_id, job_id)`, used to remove/cancel a crawl's jobs
/// without scanning the whole team's queue space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlIndexKey {
    pub crawl_id: String,
    pub job_id: String,
}

impl CrawlIndexKey {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![EntityKind::CrawlIndex.prefix()];
        push_str(&mut buf, &self.crawl_id);
        push_str(&mut buf, &self.job_id);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut rest = expect_prefix(bytes, EntityKind::CrawlIndex)?;
        let crawl_id = take_str(&mut rest)?.to_owned();
        let job_id = take_str(&mut rest)?.to_owned();
        expect_empty(rest)?;
        Ok(Self { crawl_id, job_id })
    }

    pub fn crawl_prefix(crawl_id: &str) -> Vec<u8> {
        let mut buf = vec![EntityKind::CrawlIndex.prefix()];
        push_str(&mut buf, crawl_id);
        buf
    }
}

// ---------------------------------------------------------------------
// TTL index key: (expires_at, team_id, job_id)
// ---------------------------------------------------------------------

/// TTL index `(expires_at, team_id, job_id)`, ordered by expiry for
/// efficient sweeps from the minimum key up to `now`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlIndexKey {
    pub expires_at: i64,
    pub team_id: String,
    pub job_id: String,
}

impl TtlIndexKey {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![EntityKind::TtlIndex.prefix()];
        push_i64_sortable(&mut buf, self.expires_at);
        push_str(&mut buf, &self.team_id);
        push_str(&mut buf, &self.job_id);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut rest = expect_prefix(bytes, EntityKind::TtlIndex)?;
        let expires_at = take_i64_sortable(&mut rest)?;
        let team_id = take_str(&mut rest)?.to_owned();
        let job_id = take_str(&mut rest)?.to_owned();
        expect_empty(rest)?;
        Ok(Self {
            expires_at,
            team_id,
            job_id,
        })
    }

    /// The subspace's absolute lower bound (no entry can sort before this).
    pub fn subspace_start() -> Vec<u8> {
        vec![EntityKind::TtlIndex.prefix()]
    }

    /// Exclusive upper bound for a sweep of everything expiring at or before `now`.
    pub fn sweep_upper_bound(now_ms: i64) -> Vec<u8> {
        let mut buf = vec![EntityKind::TtlIndex.prefix()];
        push_i64_sortable(&mut buf, now_ms);
        // 0xFF is not a valid length-prefix continuation byte at this
        // position for any real team_id, so appending it yields a key that
        // sorts after every team_id/job_id pair sharing this expires_at.
        buf.push(0xFF);
        buf
    }
}

// ---------------------------------------------------------------------
// Active-job keys: (team_id|crawl_id, job_id) -> expires_at
// ---------------------------------------------------------------------

/// Scope a given active-job record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveScope {
    Team,
    Crawl,
}

impl ActiveScope {
    fn kind(self) -> EntityKind {
        match self {
            ActiveScope::Team => EntityKind::ActiveTeam,
            ActiveScope::Crawl => EntityKind::ActiveCrawl,
        }
    }
}

/// `(scope_id, job_id)` active-job record key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveKey {
    pub scope: ActiveScope,
    pub scope_id: String,
    pub job_id: String,
}

impl ActiveKey {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.scope.kind().prefix()];
        push_str(&mut buf, &self.scope_id);
        push_str(&mut buf, &self.job_id);
        buf
    }

    pub fn decode(bytes: &[u8], scope: ActiveScope) -> Result<Self> {
        let mut rest = expect_prefix(bytes, scope.kind())?;
        let scope_id = take_str(&mut rest)?.to_owned();
        let job_id = take_str(&mut rest)?.to_owned();
        expect_empty(rest)?;
        Ok(Self {
            scope,
            scope_id,
            job_id,
        })
    }

    pub fn scope_prefix(scope: ActiveScope, scope_id: &str) -> Vec<u8> {
        let mut buf = vec![scope.kind().prefix()];
        push_str(&mut buf, scope_id);
        buf
    }
}

// ---------------------------------------------------------------------
// Counter key/value
// ---------------------------------------------------------------------

/// `(counter_kind, id)` key for an atomic counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterKey {
    pub kind: CounterKind,
    pub id: String,
}

impl CounterKey {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![EntityKind::Counter.prefix(), self.kind.tag()];
        push_str(&mut buf, &self.id);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut rest = expect_prefix(bytes, EntityKind::Counter)?;
        if rest.is_empty() {
            return Err(CodecError::SchemaMismatch);
        }
        let (tag, tail) = rest.split_at(1);
        let kind = CounterKind::from_tag(tag[0])?;
        rest = tail;
        let id = take_str(&mut rest)?.to_owned();
        expect_empty(rest)?;
        Ok(Self { kind, id })
    }

    /// Prefix covering every counter of `kind`, for the cursor-based
    /// pagination used by `sweep_stale_counters` and counter reconciliation.
    pub fn kind_prefix(kind: CounterKind) -> Vec<u8> {
        vec![EntityKind::Counter.prefix(), kind.tag()]
    }
}

/// Encode a counter value as little-endian `i64`, matching the backing
/// store's atomic `ADD` mutation.
pub fn encode_counter_value(v: i64) -> [u8; 8] {
    v.to_le_bytes()
}

/// Decode a counter value, clamping negative results to zero at the API
/// boundary (`spec.md` invariant 5: active counters are non-negative).
pub fn decode_counter_value(bytes: &[u8]) -> Result<i64> {
    if bytes.len() != 8 {
        return Err(CodecError::SchemaMismatch);
    }
    let raw = i64::from_le_bytes(bytes.try_into().unwrap());
    Ok(raw.max(0))
}

// ---------------------------------------------------------------------
// Claim key: (job_id, versionstamp)
// ---------------------------------------------------------------------

/// 10-byte monotonic versionstamp assigned by the store at commit time.
pub type Versionstamp = [u8; 10];

/// `(job_id, versionstamp)` claim record key. The versionstamp suffix is
/// filled in by the store itself via a versionstamped-key write; this type
/// only builds the prefix the store appends to, and parses the suffix back
/// out of a committed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimKeyPrefix {
    pub job_id: String,
}

impl ClaimKeyPrefix {
    /// The prefix to pass to a versionstamped-key write: the store appends
    /// the 10-byte versionstamp (and a 4-byte little-endian offset trailer,
    /// per the backing store's convention) after this.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![EntityKind::Claim.prefix()];
        push_str(&mut buf, &self.job_id);
        buf
    }

    /// Prefix covering every claim record for `job_id`, ordered by
    /// versionstamp — the first entry in this range is the winning claim.
    pub fn job_prefix(job_id: &str) -> Vec<u8> {
        Self {
            job_id: job_id.to_owned(),
        }
        .encode()
    }

    /// Split a committed claim key into `(job_id, versionstamp)`.
    pub fn decode(bytes: &[u8]) -> Result<(String, Versionstamp)> {
        let mut rest = expect_prefix(bytes, EntityKind::Claim)?;
        let job_id = take_str(&mut rest)?.to_owned();
        if rest.len() != 10 {
            return Err(CodecError::SchemaMismatch);
        }
        let mut stamp = [0u8; 10];
        stamp.copy_from_slice(rest);
        Ok((job_id, stamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_key_round_trips() {
        let key = QueueKey {
            team_id: "team-a".into(),
            priority: 10,
            created_at: 1_700_000_000_000,
            job_id: "job-1".into(),
        };
        let encoded = key.encode();
        assert_eq!(QueueKey::decode(&encoded).unwrap(), key);
    }

    #[test]
    fn queue_key_orders_by_priority_then_created_at_then_job_id() {
        let lower_priority = QueueKey {
            team_id: "team-a".into(),
            priority: 5,
            created_at: 100,
            job_id: "z".into(),
        }
        .encode();
        let higher_priority_value = QueueKey {
            team_id: "team-a".into(),
            priority: 10,
            created_at: 50,
            job_id: "a".into(),
        }
        .encode();
        // priority 5 (higher precedence, lower value) must sort first.
        assert!(lower_priority < higher_priority_value);

        let earlier = QueueKey {
            team_id: "team-a".into(),
            priority: 10,
            created_at: 1,
            job_id: "z".into(),
        }
        .encode();
        let later = QueueKey {
            team_id: "team-a".into(),
            priority: 10,
            created_at: 2,
            job_id: "a".into(),
        }
        .encode();
        assert!(earlier < later);
    }

    #[test]
    fn queue_key_orders_negative_priority_before_positive() {
        let negative = QueueKey {
            team_id: "t".into(),
            priority: -5,
            created_at: 0,
            job_id: "j".into(),
        }
        .encode();
        let positive = QueueKey {
            team_id: "t".into(),
            priority: 5,
            created_at: 0,
            job_id: "j".into(),
        }
        .encode();
        assert!(negative < positive);
    }

    #[test]
    fn team_prefix_bounds_team_scan() {
        let prefix = QueueKey::team_prefix("team-a");
        let key = QueueKey {
            team_id: "team-a".into(),
            priority: 0,
            created_at: 0,
            job_id: "j".into(),
        }
        .encode();
        assert!(key.starts_with(&prefix));

        let other_team = QueueKey {
            team_id: "team-ab".into(),
            priority: 0,
            created_at: 0,
            job_id: "j".into(),
        }
        .encode();
        // "team-a" is a strict byte-prefix of "team-ab" as raw strings, but
        // the length-prefix on the encoded string field disambiguates them.
        assert!(!other_team.starts_with(&prefix));
    }

    #[test]
    fn decode_rejects_wrong_prefix() {
        let crawl_key = CrawlIndexKey {
            crawl_id: "c".into(),
            job_id: "j".into(),
        }
        .encode();
        assert_eq!(
            QueueKey::decode(&crawl_key),
            Err(CodecError::WrongPrefix {
                expected: EntityKind::Queue.prefix(),
                found: EntityKind::CrawlIndex.prefix(),
            })
        );
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut encoded = QueueKey {
            team_id: "t".into(),
            priority: 0,
            created_at: 0,
            job_id: "j".into(),
        }
        .encode();
        encoded.push(0xAB);
        assert_eq!(QueueKey::decode(&encoded), Err(CodecError::SchemaMismatch));
    }

    #[test]
    fn crawl_index_key_round_trips() {
        let key = CrawlIndexKey {
            crawl_id: "crawl-1".into(),
            job_id: "job-9".into(),
        };
        assert_eq!(CrawlIndexKey::decode(&key.encode()).unwrap(), key);
    }

    #[test]
    fn ttl_index_orders_by_expiry() {
        let soon = TtlIndexKey {
            expires_at: 100,
            team_id: "t".into(),
            job_id: "a".into(),
        }
        .encode();
        let later = TtlIndexKey {
            expires_at: 200,
            team_id: "t".into(),
            job_id: "a".into(),
        }
        .encode();
        assert!(soon < later);
    }

    #[test]
    fn ttl_sweep_upper_bound_excludes_later_expiries() {
        let upper = TtlIndexKey::sweep_upper_bound(100);
        let at_boundary = TtlIndexKey {
            expires_at: 100,
            team_id: "t".into(),
            job_id: "zzzz".into(),
        }
        .encode();
        let after_boundary = TtlIndexKey {
            expires_at: 101,
            team_id: "a".into(),
            job_id: "a".into(),
        }
        .encode();
        assert!(at_boundary < upper);
        assert!(after_boundary > upper);
    }

    #[test]
    fn active_key_round_trips_both_scopes() {
        let team_key = ActiveKey {
            scope: ActiveScope::Team,
            scope_id: "team-a".into(),
            job_id: "job-1".into(),
        };
        assert_eq!(
            ActiveKey::decode(&team_key.encode(), ActiveScope::Team).unwrap(),
            team_key
        );

        let crawl_key = ActiveKey {
            scope: ActiveScope::Crawl,
            scope_id: "crawl-1".into(),
            job_id: "job-1".into(),
        };
        assert_eq!(
            ActiveKey::decode(&crawl_key.encode(), ActiveScope::Crawl).unwrap(),
            crawl_key
        );
    }

    #[test]
    fn counter_key_round_trips() {
        let key = CounterKey {
            kind: CounterKind::CrawlActive,
            id: "crawl-42".into(),
        };
        assert_eq!(CounterKey::decode(&key.encode()).unwrap(), key);
    }

    #[test]
    fn counter_value_clamps_negative_to_zero() {
        let bytes = encode_counter_value(-7);
        assert_eq!(decode_counter_value(&bytes).unwrap(), 0);
        let bytes = encode_counter_value(42);
        assert_eq!(decode_counter_value(&bytes).unwrap(), 42);
    }

    #[test]
    fn claim_key_prefix_and_decode() {
        let prefix = ClaimKeyPrefix {
            job_id: "job-1".into(),
        };
        let mut full = prefix.encode();
        let stamp: Versionstamp = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        full.extend_from_slice(&stamp);
        let (job_id, decoded_stamp) = ClaimKeyPrefix::decode(&full).unwrap();
        assert_eq!(job_id, "job-1");
        assert_eq!(decoded_stamp, stamp);
    }
}
