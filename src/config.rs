//! Application-level configuration loading for the persistence pipeline.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::services::player_data_manager::ManagerSettings;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "STARPORT_BACK_CONFIG_PATH";

const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 60;
const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;
const DEFAULT_HONOR_AVERAGE_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Time an availability breaker stays open before probing again.
    pub breaker_cooldown: Duration,
    /// Period of the autosave trigger.
    pub autosave_interval: Duration,
    /// Number of honor samples averaged on load.
    pub honor_average_window: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        breaker_cooldown_secs = app_config.breaker_cooldown.as_secs(),
                        autosave_interval_secs = app_config.autosave_interval.as_secs(),
                        "loaded persistence settings from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Settings handed to the player data manager.
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            breaker_cooldown: self.breaker_cooldown,
            honor_average_window: self.honor_average_window,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    breaker_cooldown_secs: u64,
    autosave_interval_secs: u64,
    honor_average_window: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            breaker_cooldown_secs: DEFAULT_BREAKER_COOLDOWN_SECS,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
            honor_average_window: DEFAULT_HONOR_AVERAGE_WINDOW,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            breaker_cooldown: Duration::from_secs(value.breaker_cooldown_secs),
            autosave_interval: Duration::from_secs(value.autosave_interval_secs.max(1)),
            honor_average_window: value.honor_average_window.max(1),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults_for_missing_fields() {
        let raw: RawConfig = serde_json::from_str(r#"{ "breaker_cooldown_secs": 5 }"#).unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.breaker_cooldown, Duration::from_secs(5));
        assert_eq!(config.autosave_interval, Duration::from_secs(30));
        assert_eq!(config.honor_average_window, 10);
    }

    #[test]
    fn zero_window_and_interval_are_raised() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "autosave_interval_secs": 0, "honor_average_window": 0 }"#)
                .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.autosave_interval, Duration::from_secs(1));
        assert_eq!(config.manager_settings().honor_average_window, 1);
    }
}
