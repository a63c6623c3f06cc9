use std::sync::Arc;

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::session_store::SessionStore,
    dto::session::{StartSessionRequest, StartSessionResponse, SessionView},
    error::ServiceError,
    state::{
        SharedState,
        session::{KioskSession, SessionWindows},
        session_machine::{self, SessionStatus, Transition},
    },
};

/// Start a session for a freshly scanned pack.
///
/// The conflict checks and the insert run under the transition gate, so two
/// kiosks racing to claim the same pack in the same second resolve to a
/// single winner on this server.
pub async fn start_session(
    state: &SharedState,
    request: StartSessionRequest,
) -> Result<StartSessionResponse, ServiceError> {
    let store = state.require_session_store().await?;
    let _gate = state.transition_gate().lock().await;

    let location = state
        .config()
        .location_by_id(request.location_id)
        .cloned()
        .ok_or_else(|| {
            ServiceError::NotFound(format!("location `{}` is not registered", request.location_id))
        })?;

    if let Some(existing) = store.find_active_by_pack(request.pack_code.clone()).await? {
        return Err(ServiceError::Conflict(format!(
            "pack `{}` already has an active session (`{}`)",
            request.pack_code, existing.code
        )));
    }

    if store.find_active_by_location(location.id).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "kiosk `{}` is already running a session",
            location.slug
        )));
    }

    let defaults = state.config().default_windows();
    let windows = SessionWindows {
        countdown_seconds: request.countdown_seconds.unwrap_or(defaults.countdown_seconds),
        live_seconds: request.live_seconds.unwrap_or(defaults.live_seconds),
        reveal_seconds: defaults.reveal_seconds,
    };

    let session = KioskSession::new(
        request.pack_code,
        location,
        windows,
        OffsetDateTime::now_utc(),
    );
    store.save_session(session.clone().into()).await?;

    info!(
        session_id = %session.id,
        code = %session.code,
        pack = %session.pack_code,
        kiosk = %session.location.slug,
        "session started; countdown running"
    );

    let control_token = session.control_token.clone();
    Ok(StartSessionResponse {
        session: session.into(),
        control_token,
    })
}

/// Fetch a session by id, applying any overdue auto-transitions first.
pub async fn get_session(state: &SharedState, id: Uuid) -> Result<SessionView, ServiceError> {
    let store = state.require_session_store().await?;
    let _gate = state.transition_gate().lock().await;

    let session = load_session(&store, id).await?;
    let session = apply_due_transitions(&store, session, OffsetDateTime::now_utc()).await?;
    Ok(session.into())
}

/// Fetch a session by its short human-readable code.
pub async fn get_session_by_code(
    state: &SharedState,
    code: String,
) -> Result<SessionView, ServiceError> {
    let store = state.require_session_store().await?;
    let _gate = state.transition_gate().lock().await;

    let Some(entity) = store.find_session_by_code(code.clone()).await? else {
        return Err(ServiceError::NotFound(format!("session with code `{code}`")));
    };
    let session = apply_due_transitions(&store, entity.into(), OffsetDateTime::now_utc()).await?;
    Ok(session.into())
}

/// Advance a session to the requested stage on behalf of an authenticated caller.
///
/// Asking for the stage the session is already in is an idempotent no-op:
/// the display's guard timers and the server-side sweeper race to request
/// the same transition, and the loser must not see an error.
pub async fn advance_stage(
    state: &SharedState,
    id: Uuid,
    stage: SessionStatus,
    credential: &str,
) -> Result<SessionView, ServiceError> {
    let store = state.require_session_store().await?;
    let _gate = state.transition_gate().lock().await;

    let session = load_session(&store, id).await?;
    authorize(state, &session, credential)?;

    let now = OffsetDateTime::now_utc();
    let mut session = apply_due_transitions(&store, session, now).await?;

    // Repeat advances must not error, and a terminal session accepts no
    // further mutation whatever stage the loser of the guard/sweeper race
    // asked for.
    if session.status == stage || session.status.is_terminal() {
        return Ok(session.into());
    }

    let Some(event) = session_machine::event_for_stage(stage) else {
        return Err(ServiceError::InvalidInput(
            "countdown is not a valid advance target".into(),
        ));
    };

    let transition = session_machine::apply_event(&mut session, event, now)?;
    if let Transition::Moved(next) = transition {
        store.save_session(session.clone().into()).await?;
        info!(session_id = %session.id, stage = ?next, "session advanced manually");
    }

    Ok(session.into())
}

/// Resolve an inventory item and attach it as the session's reveal payload.
pub async fn attach_reveal(
    state: &SharedState,
    id: Uuid,
    item_id: Uuid,
    credential: &str,
) -> Result<SessionView, ServiceError> {
    let store = state.require_session_store().await?;
    let _gate = state.transition_gate().lock().await;

    let session = load_session(&store, id).await?;
    authorize(state, &session, credential)?;

    let now = OffsetDateTime::now_utc();
    let mut session = apply_due_transitions(&store, session, now).await?;

    let Some(card) = store.find_card(item_id).await? else {
        return Err(ServiceError::NotFound(format!("inventory item `{item_id}`")));
    };

    session_machine::attach_reveal(
        &mut session,
        crate::state::session::RevealPayload {
            name: card.name,
            set_name: card.set_name,
            number: card.number,
            image_url: card.image_url,
        },
        now,
    )?;
    store.save_session(session.clone().into()).await?;

    info!(session_id = %session.id, item = %item_id, "reveal payload attached");
    Ok(session.into())
}

/// Apply every auto-transition due at `now`, persisting the session once if
/// anything moved. Callers must hold the transition gate.
pub(crate) async fn apply_due_transitions(
    store: &Arc<dyn SessionStore>,
    mut session: KioskSession,
    now: OffsetDateTime,
) -> Result<KioskSession, ServiceError> {
    let mut moved = false;

    while let Some(event) = session_machine::due_event(&session, now) {
        let from = session.status;
        session_machine::apply_event(&mut session, event, now)?;
        moved = true;
        info!(
            session_id = %session.id,
            from = ?from,
            to = ?session.status,
            "session auto-advanced on elapsed window"
        );
    }

    if moved {
        store.save_session(session.clone().into()).await?;
    }

    Ok(session)
}

async fn load_session(
    store: &Arc<dyn SessionStore>,
    id: Uuid,
) -> Result<KioskSession, ServiceError> {
    let Some(entity) = store.find_session(id).await? else {
        return Err(ServiceError::NotFound(format!("session `{id}`")));
    };
    Ok(entity.into())
}

/// Check the caller's credential against the session control token and the
/// configured operator token. Runs before any mutation so a rejected call
/// leaves state and timers untouched.
fn authorize(
    state: &SharedState,
    session: &KioskSession,
    credential: &str,
) -> Result<(), ServiceError> {
    if credential.is_empty() {
        return Err(ServiceError::Unauthorized("missing credential".into()));
    }

    if credential == session.control_token {
        return Ok(());
    }

    if state
        .config()
        .operator_token()
        .is_some_and(|operator| operator == credential)
    {
        return Ok(());
    }

    Err(ServiceError::Unauthorized(
        "credential does not match session control token".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::CardEntity, session_store::memory::MemorySessionStore},
        state::AppState,
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

    fn start_request(state: &SharedState, pack: &str) -> StartSessionRequest {
        StartSessionRequest {
            pack_code: pack.into(),
            location_id: pilot_location_id(state),
            countdown_seconds: None,
            live_seconds: None,
        }
    }

    #[tokio::test]
    async fn start_returns_token_and_countdown_session() {
        let (state, _store) = test_state().await;

        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();

        assert_eq!(response.session.status, SessionStatus::Countdown);
        assert!(response.session.countdown_ends_at.is_some());
        assert!(!response.control_token.is_empty());
    }

    #[tokio::test]
    async fn duplicate_pack_conflicts() {
        let (state, _store) = test_state().await;
        start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();

        let err = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn busy_location_conflicts_even_for_a_fresh_pack() {
        let (state, _store) = test_state().await;
        start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();

        let err = start_session(&state, start_request(&state, "tkp_002"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn unregistered_location_is_not_found() {
        let (state, _store) = test_state().await;
        let err = start_session(
            &state,
            StartSessionRequest {
                pack_code: "tkp_001".into(),
                location_id: Uuid::new_v4(),
                countdown_seconds: None,
                live_seconds: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_and_touches_nothing() {
        let (state, store) = test_state().await;
        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();
        let id = response.session.id;

        let err = advance_stage(&state, id, SessionStatus::Live, "wrong-token")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let entity = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(entity.status, SessionStatus::Countdown);
        assert!(entity.live_ends_at.is_none());
    }

    #[tokio::test]
    async fn manual_advance_skips_the_countdown() {
        let (state, store) = test_state().await;
        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();
        let id = response.session.id;

        let view = advance_stage(&state, id, SessionStatus::Live, &response.control_token)
            .await
            .unwrap();
        assert_eq!(view.status, SessionStatus::Live);

        let entity = store.find_session(id).await.unwrap().unwrap();
        assert!(entity.live_ends_at.is_some());
    }

    #[tokio::test]
    async fn terminal_sessions_absorb_any_advance() {
        let (state, _store) = test_state().await;
        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();
        let id = response.session.id;
        let token = response.control_token;

        let cancelled = advance_stage(&state, id, SessionStatus::Cancelled, &token)
            .await
            .unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);

        // Repeat cancel and even a mismatched terminal request are no-ops.
        for stage in [SessionStatus::Cancelled, SessionStatus::Complete] {
            let view = advance_stage(&state, id, stage, &token).await.unwrap();
            assert_eq!(view.status, SessionStatus::Cancelled);
        }
    }

    #[tokio::test]
    async fn countdown_is_not_a_valid_advance_target() {
        let (state, _store) = test_state().await;
        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();

        let err = advance_stage(
            &state,
            response.session.id,
            SessionStatus::Countdown,
            &response.control_token,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn attach_reveal_requires_live_stage() {
        let (state, store) = test_state().await;
        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();
        let card_id = Uuid::new_v4();
        store.seed_cards([CardEntity {
            id: card_id,
            code: "tkc_ab12".into(),
            name: "Pikachu".into(),
            set_name: "Jungle".into(),
            number: "60/64".into(),
            image_url: "https://cards.example/jun60.png".into(),
        }]);

        let err = attach_reveal(&state, response.session.id, card_id, &response.control_token)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn attach_reveal_resolves_the_card_while_live() {
        let (state, store) = test_state().await;
        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();
        let id = response.session.id;
        let token = response.control_token;

        advance_stage(&state, id, SessionStatus::Live, &token)
            .await
            .unwrap();

        let card_id = Uuid::new_v4();
        store.seed_cards([CardEntity {
            id: card_id,
            code: "tkc_ab12".into(),
            name: "Blue-Eyes White Dragon".into(),
            set_name: "LOB".into(),
            number: "001".into(),
            image_url: "https://cards.example/lob001.png".into(),
        }]);

        let view = attach_reveal(&state, id, card_id, &token).await.unwrap();
        let reveal = view.reveal.unwrap();
        assert_eq!(reveal.name, "Blue-Eyes White Dragon");
        assert_eq!(reveal.set_name, "LOB");
    }

    #[tokio::test]
    async fn attach_reveal_with_unknown_item_is_not_found() {
        let (state, _store) = test_state().await;
        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();
        let id = response.session.id;
        let token = response.control_token;

        advance_stage(&state, id, SessionStatus::Live, &token)
            .await
            .unwrap();

        let err = attach_reveal(&state, id, Uuid::new_v4(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn sessions_are_findable_by_human_code() {
        let (state, _store) = test_state().await;
        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();

        let view = get_session_by_code(&state, response.session.code.clone())
            .await
            .unwrap();
        assert_eq!(view.id, response.session.id);

        let err = get_session_by_code(&state, "zzzzzz".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn manual_reveal_advance_is_allowed_before_the_window_elapses() {
        let (state, _store) = test_state().await;
        let response = start_session(&state, start_request(&state, "tkp_001"))
            .await
            .unwrap();
        let id = response.session.id;
        let token = response.control_token;

        advance_stage(&state, id, SessionStatus::Live, &token)
            .await
            .unwrap();
        let view = advance_stage(&state, id, SessionStatus::Reveal, &token)
            .await
            .unwrap();
        assert_eq!(view.status, SessionStatus::Reveal);
        assert!(view.reveal_ends_at.is_some());
    }
}
