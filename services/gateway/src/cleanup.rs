//! Scheduled cleanup: hourly purge of aged logs, expired idempotency
//! records, and orphaned queue messages.

use chrono::Duration;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::repo::{attempt_logs, idempotency, queue};
use crate::state::AppState;

pub const CLEANUP_INTERVAL_SECS: u64 = 3600;
pub const LOG_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub logs_purged: u64,
    pub idempotency_purged: u64,
    pub queue_orphans_purged: u64,
}

/// Periodic loop. Runs until the process exits.
pub async fn run_cleanup(state: AppState) {
    let mut ticker =
        tokio::time::interval(std::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
    ticker.tick().await; // first tick completes immediately
    loop {
        ticker.tick().await;
        match sweep(&state).await {
            Ok(report) => {
                if report != CleanupReport::default() {
                    info!(
                        logs = report.logs_purged,
                        idempotency = report.idempotency_purged,
                        queue_orphans = report.queue_orphans_purged,
                        "cleanup sweep removed rows"
                    );
                }
            }
            Err(e) => warn!("cleanup sweep failed: {e}"),
        }
    }
}

/// One sweep over all three relations.
pub async fn sweep(state: &AppState) -> Result<CleanupReport, GatewayError> {
    let now = state.clock.now();
    let log_cutoff = now - Duration::days(LOG_RETENTION_DAYS);

    Ok(CleanupReport {
        logs_purged: attempt_logs::purge_terminal_before(&state.pool, log_cutoff).await?,
        idempotency_purged: idempotency::purge_expired(&state.pool, now).await?,
        queue_orphans_purged: queue::purge_orphans(&state.pool).await?,
    })
}
