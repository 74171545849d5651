use serde::Serialize;
use utoipa::ToSchema;

/// Store health as reported by `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` when the store answers, `degraded` otherwise.
    pub status: HealthStatus,
    /// Sub-resource tables currently short-circuited by their breaker.
    pub unavailable_tables: Vec<String>,
    /// Number of open player sessions.
    pub open_sessions: usize,
}

/// Coarse store status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The store answered its last health check.
    Ok,
    /// The last health check failed; loads and saves are likely to fail too.
    Degraded,
}

impl HealthResponse {
    /// Build a response from the store status; tables and sessions are filled in by the caller.
    pub fn new(healthy: bool) -> Self {
        Self {
            status: if healthy {
                HealthStatus::Ok
            } else {
                HealthStatus::Degraded
            },
            unavailable_tables: Vec::new(),
            open_sessions: 0,
        }
    }
}
