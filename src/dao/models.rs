use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::session_machine::SessionStatus;

/// Persisted form of a kiosk location reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationEntity {
    /// Stable identifier for the kiosk.
    pub id: Uuid,
    /// Display name of the kiosk.
    pub name: String,
    /// URL-safe identifier used by display snapshot lookups.
    pub slug: String,
}

/// Persisted form of a resolved reveal payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealEntity {
    /// Card name.
    pub name: String,
    /// Set the card belongs to.
    pub set_name: String,
    /// Collector number within the set.
    pub number: String,
    /// Image asset shown during the reveal stage.
    pub image_url: String,
}

/// Persisted form of a kiosk session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Short human-readable recovery code.
    pub code: String,
    /// Current lifecycle stage.
    pub status: SessionStatus,
    /// Pack-activation code bound at creation.
    pub pack_code: String,
    /// Kiosk this session belongs to.
    pub location: LocationEntity,
    /// Configured countdown window, in seconds.
    pub countdown_seconds: u64,
    /// Configured live window, in seconds.
    pub live_seconds: u64,
    /// Configured reveal window, in seconds.
    pub reveal_seconds: u64,
    /// Countdown deadline, if armed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub countdown_ends_at: Option<OffsetDateTime>,
    /// Live-window deadline, if armed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub live_ends_at: Option<OffsetDateTime>,
    /// Reveal deadline, if armed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub reveal_ends_at: Option<OffsetDateTime>,
    /// Attached reveal payload, if any.
    pub reveal: Option<RevealEntity>,
    /// Capability secret checked on every mutating call.
    pub control_token: String,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last-update timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Inventory card row consulted when a scanned card code is resolved.
///
/// Rows are written by the catalog admin tooling, which is outside this
/// service; the orchestrator only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardEntity {
    /// Inventory item identifier.
    pub id: Uuid,
    /// Card-identification code printed on the sleeve label.
    pub code: String,
    /// Card name.
    pub name: String,
    /// Set the card belongs to.
    pub set_name: String,
    /// Collector number within the set.
    pub number: String,
    /// Image asset URL.
    pub image_url: String,
}
