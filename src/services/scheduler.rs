use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use tokio::time::sleep;

use crate::state::AppState;

/// Spawn the background scheduler that runs periodic jobs.
///
/// Each daily job runs in its own `tokio::spawn` so a failure in one job
/// never crashes the scheduler loop or other jobs. The billing sweep
/// itself is idempotent, so an overlapping or repeated run is wasteful
/// but never incorrect.
pub async fn run_background_scheduler(state: AppState) {
    tracing::info!("Background scheduler started");

    let pool = match state.db_pool.as_ref() {
        Some(p) => p.clone(),
        None => {
            tracing::warn!("Scheduler: no database pool configured, exiting");
            return;
        }
    };

    let outbox_interval =
        Duration::from_secs(state.config.notification_poll_interval_seconds.max(30));

    let mut last_outbox_run = tokio::time::Instant::now();
    let mut last_daily_run: Option<u32> = None;

    loop {
        sleep(Duration::from_secs(15)).await;

        let now_instant = tokio::time::Instant::now();
        let now_utc = Utc::now();
        let today = now_utc.date_naive();

        // --- Notification outbox (every N seconds) ---
        if now_instant.duration_since(last_outbox_run) >= outbox_interval {
            last_outbox_run = now_instant;
            let pool = pool.clone();
            let client = state.http_client.clone();
            let config = state.config.clone();
            tokio::spawn(async move {
                let (sent, failed) =
                    crate::services::notifier::drain_outbox(&pool, &client, &config).await;
                if sent > 0 || failed > 0 {
                    tracing::info!(sent, failed, "Scheduler: notification outbox drained");
                }
            });
        }

        // --- Daily jobs (run once per calendar day) ---
        let today_ordinal = today.ordinal();
        if last_daily_run == Some(today_ordinal) {
            continue;
        }
        if now_utc.hour() < state.config.billing_sweep_hour_utc {
            continue;
        }

        last_daily_run = Some(today_ordinal);
        tracing::info!("Scheduler: running daily jobs for {today}");

        // Billing sweep: invoice generation, overdue reclassification,
        // lease expiry.
        {
            let pool = pool.clone();
            tokio::spawn(async move {
                let result = crate::services::billing::run_billing_sweep(&pool, today).await;
                tracing::info!(
                    generated = result.invoices_generated,
                    overdue = result.invoices_marked_overdue,
                    expired = result.leases_expired,
                    "Scheduler: billing sweep completed"
                );
            });
        }

        // Lease expiry notices.
        {
            let pool = pool.clone();
            let notice_days = state.config.lease_expiry_notice_days;
            tokio::spawn(async move {
                let queued = crate::services::notifier::queue_lease_expiry_notices(
                    &pool,
                    today,
                    notice_days,
                )
                .await;
                if queued > 0 {
                    tracing::info!(queued, "Scheduler: lease expiry notices queued");
                }
            });
        }
    }
}
