use time::OffsetDateTime;
use tokio::time::interval;
use tracing::warn;

use crate::{error::ServiceError, services::session_service, state::SharedState};

/// Periodically advance sessions whose stage windows have elapsed.
///
/// This is what moves a countdown to live even when no display is polling
/// and no operator intervenes: sessions progress on their own timers.
/// Storage being in degraded mode skips the pass rather than failing it.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().sweep_interval());

    loop {
        ticker.tick().await;
        if let Err(err) = sweep_once(&state, OffsetDateTime::now_utc()).await {
            warn!(error = %err, "sweep pass failed; retrying on next tick");
        }
    }
}

/// Run one sweep pass at the given instant, returning how many sessions moved.
pub async fn sweep_once(state: &SharedState, now: OffsetDateTime) -> Result<usize, ServiceError> {
    let Some(store) = state.session_store().await else {
        return Ok(0);
    };

    let _gate = state.transition_gate().lock().await;

    let mut advanced = 0;
    for entity in store.list_active_sessions().await? {
        let before = entity.status;
        let session =
            session_service::apply_due_transitions(&store, entity.into(), now).await?;
        if session.status != before {
            advanced += 1;
        }
    }

    Ok(advanced)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::CardEntity,
            session_store::{SessionStore, memory::MemorySessionStore},
        },
        dto::session::StartSessionRequest,
        services::session_service,
        state::{AppState, session_machine::SessionStatus},
    };

    async fn test_state() -> (SharedState, MemorySessionStore) {
        let state = AppState::new(AppConfig::default());
        let store = MemorySessionStore::new();
        state.install_session_store(Arc::new(store.clone())).await;
        (state, store)
    }

    fn pilot_location_id(state: &SharedState) -> Uuid {
        state
            .config()
            .location_by_slug("pilot-booth")
            .map(|location| location.id)
            .unwrap()
    }

    async fn start_test_session(state: &SharedState, pack: &str) -> (Uuid, String) {
        let response = session_service::start_session(
            state,
            StartSessionRequest {
                pack_code: pack.into(),
                location_id: pilot_location_id(state),
                countdown_seconds: Some(10),
                live_seconds: Some(60),
            },
        )
        .await
        .unwrap();
        (response.session.id, response.control_token)
    }

    #[tokio::test]
    async fn countdown_goes_live_without_caller_intervention() {
        let (state, store) = test_state().await;
        let (id, _token) = start_test_session(&state, "tkp_001").await;

        // Nothing due yet.
        let advanced = sweep_once(&state, OffsetDateTime::now_utc()).await.unwrap();
        assert_eq!(advanced, 0);

        let later = OffsetDateTime::now_utc() + Duration::seconds(11);
        let advanced = sweep_once(&state, later).await.unwrap();
        assert_eq!(advanced, 1);

        let entity = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(entity.status, SessionStatus::Live);
        let live_ends = entity.live_ends_at.unwrap();
        assert_eq!(live_ends, later + Duration::seconds(60));
    }

    #[tokio::test]
    async fn live_without_reveal_cancels_not_reveals() {
        let (state, store) = test_state().await;
        let (id, _token) = start_test_session(&state, "tkp_002").await;

        // First pass takes the session live and arms the 60s live window;
        // a later pass finds it elapsed with no reveal payload attached.
        let live_at = OffsetDateTime::now_utc() + Duration::seconds(11);
        sweep_once(&state, live_at).await.unwrap();
        sweep_once(&state, live_at + Duration::seconds(61)).await.unwrap();

        let entity = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(entity.status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn live_with_reveal_runs_to_completion() {
        let (state, store) = test_state().await;
        let (id, token) = start_test_session(&state, "tkp_003").await;

        let card_id = Uuid::new_v4();
        store.seed_cards([CardEntity {
            id: card_id,
            code: "tkc_ab12".into(),
            name: "Charizard".into(),
            set_name: "Base Set".into(),
            number: "4/102".into(),
            image_url: "https://cards.example/base4.png".into(),
        }]);

        // Countdown elapses; the session goes live.
        let live_at = OffsetDateTime::now_utc() + Duration::seconds(11);
        sweep_once(&state, live_at).await.unwrap();

        session_service::attach_reveal(&state, id, card_id, &token)
            .await
            .unwrap();

        // Live window elapses with a payload attached: reveal, then complete.
        let reveal_at = live_at + Duration::seconds(61);
        sweep_once(&state, reveal_at).await.unwrap();
        let entity = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(entity.status, SessionStatus::Reveal);
        assert!(entity.reveal_ends_at.is_some());

        let complete_at = reveal_at + Duration::seconds(16);
        sweep_once(&state, complete_at).await.unwrap();
        let entity = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(entity.status, SessionStatus::Complete);
    }

    #[tokio::test]
    async fn degraded_mode_skips_the_pass() {
        let state = AppState::new(AppConfig::default());
        let advanced = sweep_once(&state, OffsetDateTime::now_utc()).await.unwrap();
        assert_eq!(advanced, 0);
    }
}
