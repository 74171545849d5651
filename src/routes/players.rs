use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde_json::Value;

use crate::{
    dto::player::{PlayerResponse, SaveResponse, require_auth_id},
    error::AppError,
    services::{player_data_manager::PlayerDataManager, session_service},
    state::SharedState,
};

/// Player lifecycle endpoints standing in for the game connection layer.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/players/default", get(default_player))
        .route("/players/{auth_id}", post(create_player))
        .route(
            "/players/{auth_id}/session",
            post(open_session).delete(close_session),
        )
        .route("/players/{auth_id}/state", put(replace_state))
        .route("/players/{auth_id}/save", post(save_player))
}

/// Starting state of a brand-new player.
#[utoipa::path(
    get,
    path = "/players/default",
    tag = "players",
    responses((status = 200, description = "Default player data", body = PlayerResponse))
)]
pub async fn default_player() -> Json<PlayerResponse> {
    Json(PlayerDataManager::default_player_data().into())
}

/// Create and persist the starting records of a new account.
#[utoipa::path(
    post,
    path = "/players/{auth_id}",
    tag = "players",
    params(("auth_id" = String, Path, description = "Account id (hyphenated UUID)")),
    responses(
        (status = 201, description = "Player created", body = PlayerResponse),
        (status = 400, description = "Invalid account id"),
        (status = 409, description = "Player already exists")
    )
)]
pub async fn create_player(
    State(state): State<SharedState>,
    Path(auth_id): Path<String>,
) -> Result<(StatusCode, Json<PlayerResponse>), AppError> {
    let auth_id = require_auth_id(&auth_id)?;
    let record = session_service::create_player(&state, auth_id).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// Load a player and open its session.
#[utoipa::path(
    post,
    path = "/players/{auth_id}/session",
    tag = "players",
    params(("auth_id" = String, Path, description = "Account id (hyphenated UUID)")),
    responses(
        (status = 200, description = "Session opened", body = PlayerResponse),
        (status = 404, description = "No profile stored for this account"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn open_session(
    State(state): State<SharedState>,
    Path(auth_id): Path<String>,
) -> Result<Json<PlayerResponse>, AppError> {
    let auth_id = require_auth_id(&auth_id)?;
    let record = session_service::open_session(&state, auth_id).await?;
    Ok(Json(record.into()))
}

/// Replace the in-memory state of an open session.
///
/// Accepts camelCase or snake_case documents; values are normalized before they are kept.
#[utoipa::path(
    put,
    path = "/players/{auth_id}/state",
    tag = "players",
    params(("auth_id" = String, Path, description = "Account id (hyphenated UUID)")),
    request_body(content = Object, description = "Loose player document"),
    responses(
        (status = 200, description = "Normalized state now held by the session", body = PlayerResponse),
        (status = 404, description = "No open session")
    )
)]
pub async fn replace_state(
    State(state): State<SharedState>,
    Path(auth_id): Path<String>,
    Json(document): Json<Value>,
) -> Result<Json<PlayerResponse>, AppError> {
    let auth_id = require_auth_id(&auth_id)?;
    let record = session_service::replace_state(&state, auth_id, &document).await?;
    Ok(Json(record.into()))
}

/// Persist the current session state.
#[utoipa::path(
    post,
    path = "/players/{auth_id}/save",
    tag = "players",
    params(("auth_id" = String, Path, description = "Account id (hyphenated UUID)")),
    responses(
        (status = 200, description = "Save handled", body = SaveResponse),
        (status = 404, description = "No open session"),
        (status = 503, description = "Aggregate write failed")
    )
)]
pub async fn save_player(
    State(state): State<SharedState>,
    Path(auth_id): Path<String>,
) -> Result<Json<SaveResponse>, AppError> {
    let auth_id = require_auth_id(&auth_id)?;
    let report = session_service::save_session(&state, auth_id).await?;
    Ok(Json(report.into()))
}

/// Disconnect: final flush, then eviction of the session.
#[utoipa::path(
    delete,
    path = "/players/{auth_id}/session",
    tag = "players",
    params(("auth_id" = String, Path, description = "Account id (hyphenated UUID)")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "No open session"),
        (status = 503, description = "Final flush failed; session closed anyway")
    )
)]
pub async fn close_session(
    State(state): State<SharedState>,
    Path(auth_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let auth_id = require_auth_id(&auth_id)?;
    session_service::close_session(&state, auth_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
