use crate::{dispatch, media, reconcile, AppState};
use std::time::Duration;
use tokio::time::interval;
use tracing::error;

const HOURLY_SECONDS: u64 = 3600;
const DAILY_SECONDS: u64 = 86400;

/// Spawns the periodic drivers: the outbound flush on every tick, the
/// reconciliation and media sweeps hourly, and the expiry sweep daily.
/// Each sweep re-checks the mute switch on entry.
pub fn start_schedulers(state: AppState) {
    let tick = state.config.queue.dispatch_interval_seconds.max(1);

    let dispatch_state = state.clone();
    tokio::spawn(async move {
        let mut timer = interval(Duration::from_secs(tick));
        loop {
            timer.tick().await;
            dispatch::flush_outgoing_queue(&dispatch_state).await;
        }
    });

    let hourly_state = state.clone();
    tokio::spawn(async move {
        let mut timer = interval(Duration::from_secs(HOURLY_SECONDS));
        // The first tick fires immediately; skip it so startup does not
        // race the dispatch loop.
        timer.tick().await;
        loop {
            timer.tick().await;
            reconcile::reconcile_pending_statuses(
                &hourly_state,
                hourly_state.config.queue.reconcile_batch,
            )
            .await;
            media::flush_incoming_media_queue(&hourly_state).await;
        }
    });

    tokio::spawn(async move {
        let mut timer = interval(Duration::from_secs(DAILY_SECONDS));
        timer.tick().await;
        loop {
            timer.tick().await;
            if let Err(err) = dispatch::expire_stale_queue(&state).await {
                error!("expiry sweep failed: {err:?}");
            }
        }
    });
}
