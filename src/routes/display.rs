use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::display::DisplaySnapshotResponse, error::AppError, services::display_service,
    state::SharedState,
};

/// Public read-only endpoint polled by kiosk displays.
pub fn router() -> Router<SharedState> {
    Router::new().route("/display/{slug}", get(get_display_snapshot))
}

/// Return the location and its active session (if any) for a kiosk display.
#[utoipa::path(
    get,
    path = "/display/{slug}",
    tag = "display",
    params(("slug" = String, Path, description = "URL-safe kiosk identifier")),
    responses(
        (status = 200, description = "Current display snapshot", body = DisplaySnapshotResponse),
        (status = 404, description = "No kiosk registered under this slug")
    )
)]
pub async fn get_display_snapshot(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Json<DisplaySnapshotResponse>, AppError> {
    let snapshot = display_service::snapshot(&state, &slug).await?;
    Ok(Json(snapshot))
}
