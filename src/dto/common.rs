use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::session::{Location, RevealPayload};

/// Public projection of a kiosk location.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct LocationDto {
    /// Stable identifier for the kiosk.
    pub id: Uuid,
    /// Display name of the kiosk.
    pub name: String,
    /// URL-safe identifier used in display snapshot lookups.
    pub slug: String,
}

impl From<Location> for LocationDto {
    fn from(value: Location) -> Self {
        Self {
            id: value.id,
            name: value.name,
            slug: value.slug,
        }
    }
}

/// Public projection of a reveal payload.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct RevealDto {
    /// Card name.
    pub name: String,
    /// Set the card belongs to.
    pub set_name: String,
    /// Collector number within the set.
    pub number: String,
    /// Image asset shown full-screen during the reveal stage.
    pub image_url: String,
}

impl From<RevealPayload> for RevealDto {
    fn from(value: RevealPayload) -> Self {
        Self {
            name: value.name,
            set_name: value.set_name,
            number: value.number,
            image_url: value.image_url,
        }
    }
}
