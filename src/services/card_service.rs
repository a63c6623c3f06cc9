use crate::{
    dto::{card::CardLookupResponse, validation::validate_card_code},
    error::ServiceError,
    state::SharedState,
};

/// Resolve a scanned card-identification code against the inventory index.
pub async fn lookup_by_code(
    state: &SharedState,
    code: &str,
) -> Result<CardLookupResponse, ServiceError> {
    if validate_card_code(code).is_err() {
        return Err(ServiceError::InvalidInput(format!(
            "`{code}` is not a card-identification code"
        )));
    }

    let store = state.require_session_store().await?;
    let Some(card) = store.find_card_by_code(code.to_string()).await? else {
        return Err(ServiceError::NotFound(format!(
            "card `{code}` is not linked to inventory yet"
        )));
    };

    Ok(card.into())
}
