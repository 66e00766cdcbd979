use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::state::AppState;

/// Periodically moves AVAILABLE donations past their expiry to EXPIRED.
pub async fn run_expiry_sweeper(state: Arc<AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "expiry sweeper started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let expired = state.expire_due(Utc::now());
        if expired > 0 {
            info!(expired, "donations expired");
        } else {
            debug!("expiry sweep found nothing due");
        }
    }
}
