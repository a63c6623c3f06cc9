use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, header},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        AdvanceStageRequest, AttachRevealRequest, SessionView, StartSessionRequest,
        StartSessionResponse,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes handling the session lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/code/{code}", get(get_session_by_code))
        .route("/sessions/{id}/advance", post(advance_stage))
        .route("/sessions/{id}/reveal", post(attach_reveal))
}

/// Extract the bearer credential, empty when the header is missing or malformed.
fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

/// Start a session for a scanned pack; the countdown begins immediately.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "session",
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "Session created, countdown running", body = StartSessionResponse),
        (status = 409, description = "Pack or kiosk already has an active session")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<StartSessionRequest>>,
) -> Result<Json<StartSessionResponse>, AppError> {
    let response = session_service::start_session(&state, payload).await?;
    Ok(Json(response))
}

/// Fetch a session by identifier.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "session",
    params(("id" = Uuid, Path, description = "Identifier of the session")),
    responses(
        (status = 200, description = "Session found", body = SessionView),
        (status = 404, description = "No session with this identifier")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let view = session_service::get_session(&state, id).await?;
    Ok(Json(view))
}

/// Fetch a session by its short human-readable code.
#[utoipa::path(
    get,
    path = "/sessions/code/{code}",
    tag = "session",
    params(("code" = String, Path, description = "Human-readable session code")),
    responses(
        (status = 200, description = "Session found", body = SessionView),
        (status = 404, description = "No session with this code")
    )
)]
pub async fn get_session_by_code(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let view = session_service::get_session_by_code(&state, code).await?;
    Ok(Json(view))
}

/// Advance a session to the requested stage.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    tag = "session",
    request_body = AdvanceStageRequest,
    params(("id" = Uuid, Path, description = "Identifier of the session")),
    responses(
        (status = 200, description = "Session advanced (or already in the stage)", body = SessionView),
        (status = 401, description = "Missing or mismatched credential"),
        (status = 409, description = "Transition not valid from the current stage")
    )
)]
pub async fn advance_stage(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<AdvanceStageRequest>,
) -> Result<Json<SessionView>, AppError> {
    let credential = bearer_token(&headers);
    let view = session_service::advance_stage(&state, id, payload.stage, &credential).await?;
    Ok(Json(view))
}

/// Attach a resolved card to a live session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/reveal",
    tag = "session",
    request_body = AttachRevealRequest,
    params(("id" = Uuid, Path, description = "Identifier of the session")),
    responses(
        (status = 200, description = "Reveal payload attached", body = SessionView),
        (status = 401, description = "Missing or mismatched credential"),
        (status = 404, description = "Inventory item not found"),
        (status = 409, description = "Session is not live")
    )
)]
pub async fn attach_reveal(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<AttachRevealRequest>,
) -> Result<Json<SessionView>, AppError> {
    let credential = bearer_token(&headers);
    let view = session_service::attach_reveal(&state, id, payload.item_id, &credential).await?;
    Ok(Json(view))
}
