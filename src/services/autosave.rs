use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::{services::session_service, state::SharedState};

/// Periodically queue a save for every open session.
///
/// This is also the only retry path for sub-resource writes that failed transiently.
pub async fn run(state: SharedState) {
    let period = state.config().autosave_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let queued = session_service::autosave_all(&state).await;
        if queued > 0 {
            debug!(sessions = queued, "autosave queued");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig, dao::player_store::memory::MemoryPlayerStore,
        services::player_data_manager::PlayerDataManager, state::AppState,
    };

    const AUTH_ID: &str = "3f2b8c1d-6e4a-4b7f-9d1c-2a5e8f0b7c34";

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_configured_interval() {
        let store = MemoryPlayerStore::new();
        let config = AppConfig {
            autosave_interval: Duration::from_secs(5),
            ..AppConfig::default()
        };
        let manager = PlayerDataManager::new(Arc::new(store.clone()), config.manager_settings());
        let state = AppState::new(manager, config);
        session_service::create_player(&state, AUTH_ID).await.unwrap();
        session_service::open_session(&state, AUTH_ID).await.unwrap();
        let before = store.profile_writes(AUTH_ID).await;

        tokio::spawn(run(state.clone()));
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(store.profile_writes(AUTH_ID).await, before);

        tokio::time::sleep(Duration::from_secs(2)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.profile_writes(AUTH_ID).await, before + 1);
    }
}
