use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::state::SharedState;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll the store health and keep the shared degraded flag in sync with it.
pub async fn run(state: SharedState) {
    let mut ticker = interval(HEALTH_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        check_once(&state).await;
    }
}

/// Run a single health check and update the degraded flag.
pub async fn check_once(state: &SharedState) -> bool {
    match state.manager().store().health_check().await {
        Ok(()) => {
            if state.is_degraded() {
                info!("storage healthy again; leaving degraded mode");
                state.update_degraded(false);
            }
            true
        }
        Err(err) => {
            if !state.is_degraded() {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                state.update_degraded(true);
            }
            false
        }
    }
}
