//! Player sessions: the triggers that drive the persistence pipeline.
//!
//! A session holds the authoritative in-memory [`PlayerRecord`] between join and disconnect.
//! Saves always hand the manager a snapshot of it, never the live value.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    error::ServiceError,
    services::{normalize::normalize_player_state, player_data_manager::FlushReport},
    state::{SharedState, player::PlayerRecord},
};

/// Create the starting records of a new account.
pub async fn create_player(state: &SharedState, auth_id: &str) -> Result<PlayerRecord, ServiceError> {
    Ok(state.manager().create_initial_player_records(auth_id).await?)
}

/// Load a player and open (or replace) its session.
pub async fn open_session(state: &SharedState, auth_id: &str) -> Result<PlayerRecord, ServiceError> {
    let record = state.manager().load_player_data(auth_id).await?;
    let replaced = state
        .sessions()
        .insert(auth_id.to_owned(), Arc::new(RwLock::new(record.clone())));
    if replaced.is_some() {
        warn!(auth_id, "session reopened; previous in-memory state discarded");
    }
    info!(auth_id, "session opened");
    Ok(record)
}

/// Replace the in-memory state of an open session with a client document.
pub async fn replace_state(
    state: &SharedState,
    auth_id: &str,
    document: &Value,
) -> Result<PlayerRecord, ServiceError> {
    let session = state
        .session(auth_id)
        .ok_or_else(|| ServiceError::NotFound(format!("session `{auth_id}`")))?;

    let mut incoming = normalize_player_state(document);
    let mut current = session.write().await;
    incoming.auth_id = current.auth_id.clone();
    if incoming.player_id <= 0 {
        incoming.player_id = current.player_id;
    }
    incoming.recent_honor = current.recent_honor;
    *current = incoming;
    Ok(current.clone())
}

/// Persist the current state of a session.
///
/// `None` when the snapshot was folded into a flush that was already running.
pub async fn save_session(
    state: &SharedState,
    auth_id: &str,
) -> Result<Option<FlushReport>, ServiceError> {
    let snapshot = snapshot(state, auth_id).await?;
    Ok(state.manager().save_player_data(snapshot).await?)
}

/// Final flush of a session, then eviction of everything tracked for the player.
///
/// The session is closed even when the final flush fails; the error is still returned.
pub async fn close_session(state: &SharedState, auth_id: &str) -> Result<(), ServiceError> {
    let snapshot = snapshot(state, auth_id).await?;
    let flushed = state.manager().save_player_data(snapshot).await;

    state.sessions().remove(auth_id);
    state.manager().release_player(auth_id);

    match flushed {
        Ok(_) => {
            info!(auth_id, "session closed");
            Ok(())
        }
        Err(err) => {
            error!(auth_id, error = %err, "final flush failed; session closed anyway");
            Err(err.into())
        }
    }
}

/// Queue a save for every open session without waiting for the writes.
///
/// Sessions closed before their queued save starts are skipped.
pub async fn autosave_all(state: &SharedState) -> usize {
    let snapshots = snapshots(state).await;
    let count = snapshots.len();
    for snapshot in snapshots {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            let auth_id = snapshot.auth_id.clone();
            if state.session(&auth_id).is_none() {
                debug!(auth_id, "session closed before autosave; skipped");
                return;
            }
            if let Err(err) = state.manager().save_player_data(snapshot).await {
                error!(auth_id, error = %err, "autosave failed");
            }
        });
    }
    count
}

/// Save every open session and wait for all of them; used on shutdown.
pub async fn flush_all(state: &SharedState) -> usize {
    let snapshots = snapshots(state).await;
    let saves = snapshots.into_iter().map(|snapshot| {
        let manager = state.manager().clone();
        async move {
            let auth_id = snapshot.auth_id.clone();
            let result = manager.save_player_data(snapshot).await;
            (auth_id, result)
        }
    });

    let mut failures = 0;
    for (auth_id, result) in join_all(saves).await {
        if let Err(err) = result {
            failures += 1;
            error!(auth_id, error = %err, "shutdown flush failed");
        }
    }
    failures
}

async fn snapshot(state: &SharedState, auth_id: &str) -> Result<PlayerRecord, ServiceError> {
    let session = state
        .session(auth_id)
        .ok_or_else(|| ServiceError::NotFound(format!("session `{auth_id}`")))?;
    let snapshot = session.read().await.clone();
    Ok(snapshot)
}

async fn snapshots(state: &SharedState) -> Vec<PlayerRecord> {
    let sessions = state
        .sessions()
        .iter()
        .map(|entry| entry.value().clone())
        .collect::<Vec<_>>();

    let mut snapshots = Vec::with_capacity(sessions.len());
    for session in sessions {
        snapshots.push(session.read().await.clone());
    }
    snapshots
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::SubResourceTable, player_store::memory::MemoryPlayerStore},
        services::player_data_manager::PlayerDataManager,
        state::AppState,
    };

    const AUTH_ID: &str = "9a7c1e52-3b4d-4f6a-8c2e-1d0b9f8e7a6c";

    async fn state_with_player(store: &MemoryPlayerStore) -> SharedState {
        let config = AppConfig::default();
        let manager = PlayerDataManager::new(Arc::new(store.clone()), config.manager_settings());
        let state = AppState::new(manager, config);
        create_player(&state, AUTH_ID).await.unwrap();
        state
    }

    #[tokio::test]
    async fn open_edit_save_close_round_trip() {
        let store = MemoryPlayerStore::new();
        let state = state_with_player(&store).await;

        open_session(&state, AUTH_ID).await.unwrap();
        let updated = replace_state(
            &state,
            AUTH_ID,
            &json!({ "inventory": { "credits": 5 }, "resources": { "ore": 3, "gas": 0 } }),
        )
        .await
        .unwrap();
        assert_eq!(updated.auth_id, AUTH_ID);
        assert!(updated.player_id > 0);

        let report = save_session(&state, AUTH_ID).await.unwrap().unwrap();
        assert_eq!(
            report.written,
            vec![
                SubResourceTable::WorldResources,
                SubResourceTable::QuestObjectives,
                SubResourceTable::InventoryItems,
            ]
        );

        close_session(&state, AUTH_ID).await.unwrap();
        assert!(state.session(AUTH_ID).is_none());
        assert_eq!(state.manager().tracked_players(), 0);

        let reloaded = open_session(&state, AUTH_ID).await.unwrap();
        assert_eq!(reloaded.inventory.unwrap().credits, 5);
        assert_eq!(reloaded.resources.0.len(), 1);
    }

    #[tokio::test]
    async fn saving_without_session_is_not_found() {
        let store = MemoryPlayerStore::new();
        let state = state_with_player(&store).await;

        let result = save_session(&state, AUTH_ID).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn autosave_queued_before_close_leaves_nothing_tracked() {
        let store = MemoryPlayerStore::new();
        let state = state_with_player(&store).await;
        open_session(&state, AUTH_ID).await.unwrap();
        replace_state(&state, AUTH_ID, &json!({ "nickname": "final", "inventory": {} }))
            .await
            .unwrap();

        assert_eq!(autosave_all(&state).await, 1);
        close_session(&state, AUTH_ID).await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(state.manager().tracked_players(), 0);
        assert_eq!(store.profile(AUTH_ID).await.unwrap()["nickname"], "final");
    }

    #[tokio::test]
    async fn shutdown_flush_reports_no_failures() {
        let store = MemoryPlayerStore::new();
        let state = state_with_player(&store).await;
        open_session(&state, AUTH_ID).await.unwrap();
        let before = store.profile_writes(AUTH_ID).await;

        assert_eq!(flush_all(&state).await, 0);
        assert_eq!(store.profile_writes(AUTH_ID).await, before + 1);
    }
}
