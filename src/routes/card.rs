use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::card::CardLookupResponse, error::AppError, services::card_service, state::SharedState,
};

/// Inventory lookup endpoint used while a rip is live.
pub fn router() -> Router<SharedState> {
    Router::new().route("/cards/{code}", get(lookup_card))
}

/// Resolve a scanned card-identification code to an inventory item.
#[utoipa::path(
    get,
    path = "/cards/{code}",
    tag = "card",
    params(("code" = String, Path, description = "Card-identification code from the sleeve label")),
    responses(
        (status = 200, description = "Card resolved", body = CardLookupResponse),
        (status = 404, description = "Card not linked to inventory yet")
    )
)]
pub async fn lookup_card(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<CardLookupResponse>, AppError> {
    let card = card_service::lookup_by_code(&state, &code).await?;
    Ok(Json(card))
}
