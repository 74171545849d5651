use serde::Serialize;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::models::SubResourceTable,
    dto::validation::validate_auth_id,
    services::player_data_manager::FlushReport,
    state::player::PlayerRecord,
};

/// Player state as returned by the session endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerResponse {
    /// Full in-memory record (camelCase fields).
    #[schema(value_type = Object)]
    pub player: PlayerRecord,
}

impl From<PlayerRecord> for PlayerResponse {
    fn from(player: PlayerRecord) -> Self {
        Self { player }
    }
}

/// How a save request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// The request ran the flush loop itself.
    Flushed,
    /// The snapshot was folded into a flush that was already running.
    Coalesced,
    /// The ledger was not hydrated; nothing was written.
    Skipped,
}

/// Outcome of an explicit save.
#[derive(Debug, Serialize, ToSchema)]
pub struct SaveResponse {
    /// Whether the save ran, was coalesced or found nothing to write.
    pub status: SaveStatus,
    /// Whether the aggregate profile was written.
    pub profile_written: bool,
    /// Tables written in this cycle.
    pub written: Vec<String>,
    /// Tables skipped because nothing changed.
    pub unchanged: Vec<String>,
    /// Tables skipped because they are not deployed.
    pub unavailable: Vec<String>,
    /// Tables whose write failed and will be retried.
    pub failed: Vec<String>,
}

fn table_names(tables: &[SubResourceTable]) -> Vec<String> {
    tables.iter().map(|table| table.name().to_owned()).collect()
}

impl From<Option<FlushReport>> for SaveResponse {
    fn from(report: Option<FlushReport>) -> Self {
        let Some(report) = report else {
            return Self {
                status: SaveStatus::Coalesced,
                profile_written: false,
                written: Vec::new(),
                unchanged: Vec::new(),
                unavailable: Vec::new(),
                failed: Vec::new(),
            };
        };

        Self {
            status: if report.profile_written {
                SaveStatus::Flushed
            } else {
                SaveStatus::Skipped
            },
            profile_written: report.profile_written,
            written: table_names(&report.written),
            unchanged: table_names(&report.unchanged),
            unavailable: table_names(&report.unavailable),
            failed: table_names(&report.failed),
        }
    }
}

/// Validate an account id taken from a request path.
pub fn require_auth_id(auth_id: &str) -> Result<&str, ValidationErrors> {
    validate_auth_id(auth_id).map_err(|err| {
        let mut errors = ValidationErrors::new();
        errors.add("auth_id", err);
        errors
    })?;
    Ok(auth_id)
}
