pub mod player;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, services::player_data_manager::PlayerDataManager};

use self::player::PlayerRecord;

/// Handle shared by handlers and background tasks.
pub type SharedState = Arc<AppState>;

/// In-memory state of a connected player, mutated by gameplay and snapshotted by saves.
pub type PlayerSession = Arc<RwLock<PlayerRecord>>;

/// Central application state: the persistence pipeline plus the open player sessions.
pub struct AppState {
    manager: Arc<PlayerDataManager>,
    sessions: DashMap<String, PlayerSession>,
    config: AppConfig,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(manager: Arc<PlayerDataManager>, config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        Arc::new(Self {
            manager,
            sessions: DashMap::new(),
            config,
            degraded: degraded_tx,
        })
    }

    /// Persistence pipeline.
    pub fn manager(&self) -> &Arc<PlayerDataManager> {
        &self.manager
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of open sessions keyed by account id.
    pub fn sessions(&self) -> &DashMap<String, PlayerSession> {
        &self.sessions
    }

    /// Open session of `auth_id`, if any.
    pub fn session(&self, auth_id: &str) -> Option<PlayerSession> {
        self.sessions.get(auth_id).map(|session| session.clone())
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
