use crate::{
    dao::models::SubResourceTable,
    dto::health::HealthResponse,
    services::{availability::BreakerState, storage_supervisor},
    state::SharedState,
};

/// Check the store and report breaker and session counters alongside it.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let mut response = HealthResponse::new(storage_supervisor::check_once(state).await);

    for table in SubResourceTable::ALL {
        if state.manager().breaker(table).state().await != BreakerState::Available {
            response.unavailable_tables.push(table.name().to_owned());
        }
    }
    response.open_sessions = state.sessions().len();
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::player_store::{PlayerStore, memory::MemoryPlayerStore},
        dto::health::HealthStatus,
        services::player_data_manager::PlayerDataManager,
        state::AppState,
    };

    #[tokio::test]
    async fn tripped_breakers_show_up_in_health() {
        let store = Arc::new(MemoryPlayerStore::new());
        let config = AppConfig::default();
        let manager = PlayerDataManager::new(store.clone(), config.manager_settings());
        let state = AppState::new(manager, config);

        let response = health_status(&state).await;
        assert_eq!(response.status, HealthStatus::Ok);
        assert!(response.unavailable_tables.is_empty());

        store.set_table_missing(SubResourceTable::Pets, true).await;
        let _ = state
            .manager()
            .breaker(SubResourceTable::Pets)
            .run(|| store.read_rows(SubResourceTable::Pets, "someone"))
            .await;

        let response = health_status(&state).await;
        assert_eq!(response.unavailable_tables, ["player_pets"]);
        assert_eq!(response.open_sessions, 0);
    }
}
