use time::OffsetDateTime;

use crate::{
    dto::display::DisplaySnapshotResponse,
    error::ServiceError,
    services::session_service,
    state::{SharedState, session::KioskSession},
};

/// Assemble the read-only snapshot a kiosk display polls.
///
/// Overdue auto-transitions are applied before the snapshot is taken, so a
/// display that polls after a window elapsed sees the stage it should be
/// rendering, not the stale one. A session that lazily lands in a terminal
/// stage is reported as `null` and the display goes back to standby.
pub async fn snapshot(
    state: &SharedState,
    slug: &str,
) -> Result<DisplaySnapshotResponse, ServiceError> {
    let Some(location) = state.config().location_by_slug(slug).cloned() else {
        return Err(ServiceError::NotFound(format!("kiosk `{slug}`")));
    };

    let store = state.require_session_store().await?;
    let _gate = state.transition_gate().lock().await;

    let session = match store.find_active_by_location(location.id).await? {
        Some(entity) => {
            let session: KioskSession = entity.into();
            let session = session_service::apply_due_transitions(
                &store,
                session,
                OffsetDateTime::now_utc(),
            )
            .await?;
            session.is_active().then(|| session.into())
        }
        None => None,
    };

    Ok(DisplaySnapshotResponse {
        location: location.into(),
        session,
    })
}
