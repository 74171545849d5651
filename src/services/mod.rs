/// Periodic save trigger.
pub mod autosave;
/// Per-storage-object availability breaker.
pub mod availability;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Loose document normalization and canonical forms.
pub mod normalize;
/// Load/save orchestration.
pub mod player_data_manager;
/// Per-key exclusive execution.
pub mod save_coordinator;
/// Player session triggers.
pub mod session_service;
/// Sub-resource change detection.
pub mod signature;
/// Store health polling.
pub mod storage_supervisor;
