use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the kiosk session server.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::start_session,
        crate::routes::session::get_session,
        crate::routes::session::get_session_by_code,
        crate::routes::session::advance_stage,
        crate::routes::session::attach_reveal,
        crate::routes::display::get_display_snapshot,
        crate::routes::card::lookup_card,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::StartSessionRequest,
            crate::dto::session::StartSessionResponse,
            crate::dto::session::AdvanceStageRequest,
            crate::dto::session::AttachRevealRequest,
            crate::dto::session::SessionView,
            crate::dto::common::LocationDto,
            crate::dto::common::RevealDto,
            crate::dto::display::DisplaySnapshotResponse,
            crate::dto::card::CardLookupResponse,
            crate::state::session_machine::SessionStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Kiosk session lifecycle operations"),
        (name = "display", description = "Read-only snapshots polled by kiosk displays"),
        (name = "card", description = "Inventory card lookups for scanned sleeves"),
    )
)]
pub struct ApiDoc;
