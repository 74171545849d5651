use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Starport Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::players::default_player,
        crate::routes::players::create_player,
        crate::routes::players::open_session,
        crate::routes::players::replace_state,
        crate::routes::players::save_player,
        crate::routes::players::close_session,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::player::PlayerResponse,
            crate::dto::player::SaveResponse,
            crate::dto::player::SaveStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "players", description = "Player sessions and persistence triggers"),
    )
)]
/// OpenAPI document of the HTTP surface.
pub struct ApiDoc;
