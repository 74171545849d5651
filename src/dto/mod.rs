/// Health check payloads.
pub mod health;
/// Player and save payloads.
pub mod player;
pub mod validation;
