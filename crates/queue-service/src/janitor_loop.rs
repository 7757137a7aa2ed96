//! Owns the scheduling policy `queue_core::janitor` deliberately leaves out:
//! interval, jitter-free fixed-tick scanning, and graceful shutdown via a
//! `CancellationToken`. Two independent loops run side by side, since the
//! bounded per-tick sweeps (`spec.md` §4.F tasks 1, 2, 5) are cheap and want
//! a short interval, while full-keyspace reconciliation (tasks 3, 4) is
//! comparatively expensive and wants a longer one — the same split the
//! teacher draws between a tight poll loop and a slow periodic task.

use queue_core::backend::QueueBackend;
use queue_core::model::CounterKind;
use queue_core::QueueCore;
use tokio_util::sync::CancellationToken;

use crate::config::JanitorConfig;

pub fn spawn<B: QueueBackend>(core: QueueCore<B>, config: JanitorConfig, shutdown: CancellationToken) {
    tokio::spawn(tick_loop(core.clone(), config.clone(), shutdown.clone()));
    tokio::spawn(reconcile_loop(core, config, shutdown));
}

async fn tick_loop<B: QueueBackend>(core: QueueCore<B>, config: JanitorConfig, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(config.tick_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("janitor tick loop stopping");
                break;
            }
            _ = interval.tick() => {
                match core.janitor_tick(config.orphan_claim_age_ms).await {
                    Ok(report) => {
                        if report.expired_queue_entries > 0
                            || report.expired_team_active > 0
                            || report.expired_crawl_active > 0
                            || report.orphaned_claims > 0
                        {
                            tracing::info!(
                                expired_queue_entries = report.expired_queue_entries,
                                expired_team_active = report.expired_team_active,
                                expired_crawl_active = report.expired_crawl_active,
                                orphaned_claims = report.orphaned_claims,
                                "janitor tick"
                            );
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "janitor tick failed"),
                }
            }
        }
    }
}

async fn reconcile_loop<B: QueueBackend>(core: QueueCore<B>, config: JanitorConfig, shutdown: CancellationToken) {
    let kinds = [
        CounterKind::TeamQueue,
        CounterKind::CrawlQueue,
        CounterKind::TeamActive,
        CounterKind::CrawlActive,
    ];
    let mut interval = tokio::time::interval(config.reconcile_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("janitor reconcile loop stopping");
                break;
            }
            _ = interval.tick() => {
                for kind in kinds {
                    match core.reconcile_all(kind).await {
                        Ok(corrected) if corrected > 0 => {
                            tracing::info!(?kind, corrected, "counter reconciliation corrected drift");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(?kind, error = %e, "counter reconciliation failed"),
                    }
                    if let Err(e) = core.sweep_all_stale_counters(kind).await {
                        tracing::error!(?kind, error = %e, "stale counter sweep failed");
                    }
                }
            }
        }
    }
}
