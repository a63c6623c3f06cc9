use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::CardEntity;

/// Result of resolving a scanned card-identification code.
#[derive(Debug, Serialize, ToSchema)]
pub struct CardLookupResponse {
    /// Inventory item identifier, passed back in the reveal-attach call.
    pub item_id: Uuid,
    /// Card name, shown in the scan helper banner.
    pub name: String,
}

impl From<CardEntity> for CardLookupResponse {
    fn from(value: CardEntity) -> Self {
        Self {
            item_id: value.id,
            name: value.name,
        }
    }
}
