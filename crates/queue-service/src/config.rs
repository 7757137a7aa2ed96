//! Environment-driven configuration, loaded once at process start. Shape and
//! loading idiom follow `packages/server/src/config.rs`: `dotenvy::dotenv()`
//! for local development, `std::env::var` with `anyhow::Context` for
//! required fields, and sensible production defaults for the rest.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Janitor tunables, defaulted from `spec.md` §4.F/§9's stated constants and
/// overridable per-deployment without touching code.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub tick_interval: Duration,
    pub reconcile_interval: Duration,
    /// Claim records older than this with no resolved queue entry are swept
    /// as orphans. `spec.md` §9 leaves the exact value unpinned; chosen here
    /// well above the worst observed pop-to-complete latency (see
    /// `DESIGN.md`).
    pub orphan_claim_age_ms: i64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(300),
            orphan_claim_age_ms: 5 * 60_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// FDB reads its cluster file from the default system location unless
    /// this is set, mirroring how the `foundationdb` crate's `boot()` and
    /// `Database::default()` resolve a cluster file.
    pub fdb_cluster_file: Option<String>,
    pub redis_url: String,
    pub semaphore_key_prefix: String,
    pub service_bind_addr: SocketAddr,
    pub janitor: JanitorConfig,
    /// Single-tenant deployments bypass the tenant semaphore entirely
    /// (`spec.md` §4.G Bypass).
    pub single_tenant: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            fdb_cluster_file: env::var("FDB_CLUSTER_FILE").ok(),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            semaphore_key_prefix: env::var("SEMAPHORE_KEY_PREFIX").unwrap_or_else(|_| "queue".to_string()),
            service_bind_addr: env::var("SERVICE_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
                .parse()
                .context("SERVICE_BIND_ADDR must be a valid socket address")?,
            janitor: JanitorConfig {
                tick_interval: Duration::from_secs(
                    env::var("JANITOR_TICK_INTERVAL_SECS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(5),
                ),
                reconcile_interval: Duration::from_secs(
                    env::var("JANITOR_RECONCILE_INTERVAL_SECS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(300),
                ),
                orphan_claim_age_ms: env::var("JANITOR_ORPHAN_CLAIM_AGE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5 * 60_000),
            },
            single_tenant: env::var("SINGLE_TENANT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}
