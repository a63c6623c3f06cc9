use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        common::{LocationDto, RevealDto},
        format_timestamp,
        validation::validate_pack_code,
    },
    state::{session::KioskSession, session_machine::SessionStatus},
};

/// Longest stage window a start request may ask for, in seconds.
const MAX_WINDOW_SECONDS: u64 = 600;

/// Payload used to start a new kiosk session from a scanned pack.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    /// Normalized pack-activation code (`tkp_` prefix).
    pub pack_code: String,
    /// Identifier of the kiosk the session plays out on.
    pub location_id: Uuid,
    /// Optional override of the configured countdown window.
    #[serde(default)]
    pub countdown_seconds: Option<u64>,
    /// Optional override of the configured live window.
    #[serde(default)]
    pub live_seconds: Option<u64>,
}

impl Validate for StartSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_pack_code(&self.pack_code) {
            errors.add("pack_code", e);
        }

        for (field, value) in [
            ("countdown_seconds", self.countdown_seconds),
            ("live_seconds", self.live_seconds),
        ] {
            if let Some(seconds) = value {
                if seconds == 0 || seconds > MAX_WINDOW_SECONDS {
                    let mut err = validator::ValidationError::new(field);
                    err.message = Some(
                        format!("window must be between 1 and {MAX_WINDOW_SECONDS} seconds").into(),
                    );
                    errors.add(field, err);
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Payload for an authenticated stage-advance call.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceStageRequest {
    /// Target stage the caller wants the session moved to.
    pub stage: SessionStatus,
}

/// Payload attaching a resolved card to a live session.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachRevealRequest {
    /// Inventory item identifier returned by the card lookup.
    pub item_id: Uuid,
}

/// Public projection of a session; never carries the control token.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct SessionView {
    /// Session identifier.
    pub id: Uuid,
    /// Short human-readable recovery code.
    pub code: String,
    /// Current lifecycle stage.
    pub status: SessionStatus,
    /// Pack-activation code bound to the session.
    pub pack_code: String,
    /// Kiosk the session plays out on.
    pub location: LocationDto,
    /// Countdown deadline (RFC 3339), when armed.
    #[schema(value_type = Option<String>)]
    pub countdown_ends_at: Option<String>,
    /// Live-window deadline (RFC 3339), when armed.
    #[schema(value_type = Option<String>)]
    pub live_ends_at: Option<String>,
    /// Reveal deadline (RFC 3339), when armed.
    #[schema(value_type = Option<String>)]
    pub reveal_ends_at: Option<String>,
    /// Attached reveal payload, once the pulled card has been resolved.
    pub reveal: Option<RevealDto>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last-update timestamp (RFC 3339).
    pub updated_at: String,
}

impl From<KioskSession> for SessionView {
    fn from(value: KioskSession) -> Self {
        Self {
            id: value.id,
            code: value.code,
            status: value.status,
            pack_code: value.pack_code,
            location: value.location.into(),
            countdown_ends_at: value.countdown_ends_at.map(format_timestamp),
            live_ends_at: value.live_ends_at.map(format_timestamp),
            reveal_ends_at: value.reveal_ends_at.map(format_timestamp),
            reveal: value.reveal.map(Into::into),
            created_at: format_timestamp(value.created_at),
            updated_at: format_timestamp(value.updated_at),
        }
    }
}

/// Response returned once when a session is started.
///
/// This is the only place the control token ever leaves the server.
#[derive(Debug, Serialize, ToSchema)]
pub struct StartSessionResponse {
    /// The freshly created session, in countdown.
    pub session: SessionView,
    /// Capability secret for subsequent state-mutating calls.
    pub control_token: String,
}
