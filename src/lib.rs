//! Library crate for starport-back, exposing modules for binaries and integration tests.

pub mod config;
/// Storage backends and persisted shapes.
pub mod dao;
/// HTTP payloads.
pub mod dto;
/// Pipeline, service and HTTP errors.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Persistence pipeline, sessions and background tasks.
pub mod services;
/// Shared application state and the player record.
pub mod state;
