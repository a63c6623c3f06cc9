use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::{common::LocationDto, session::SessionView};

/// Read-only snapshot polled by kiosk displays.
#[derive(Debug, Serialize, ToSchema)]
pub struct DisplaySnapshotResponse {
    /// The kiosk the snapshot describes.
    pub location: LocationDto,
    /// The active session at this kiosk, or `null` when the display
    /// should sit in standby.
    pub session: Option<SessionView>,
}
