//! The unattended kiosk display process.
//!
//! One task multiplexes three inputs: the snapshot poll, the once-per-
//! second guard tick, and scanner lines. The most recently resolved
//! snapshot is authoritative for what the kiosk renders; guard-driven
//! stage advances are latched per state entry so the tick and poll
//! schedules cannot double-fire a transition. Encoder control is derived
//! purely from the current stage and is advisory; a dead encoder never
//! stalls a session.

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::{select, sync::mpsc, time::interval};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    display::{
        latch::{AdvanceLatch, Guard},
        recovery::{RecoveryRecord, RecoveryStore},
        scan::{ScanKind, classify, normalize_scan},
        session_api::{ApiError, RemoteLocation, RemoteSession, SessionApi},
    },
    encoder::{EncoderManager, EncoderState},
    state::session_machine::SessionStatus,
};

/// How long a helper banner stays on screen before auto-dismissing.
const BANNER_TTL: time::Duration = time::Duration::seconds(5);
/// Default snapshot poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// The fixed set of stage screens a kiosk can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageScreen {
    /// No session: attract loop, waiting for a pack scan.
    Standby,
    /// Countdown before the rip goes live.
    Countdown,
    /// Live rip window.
    Live,
    /// Winning card reveal.
    Reveal,
}

/// Transient helper message shown alongside the stage screen.
#[derive(Debug, Clone)]
struct HelperBanner {
    message: String,
    expires_at: OffsetDateTime,
}

/// State and behavior of one kiosk display process.
pub struct DisplayClient {
    api: Arc<dyn SessionApi>,
    encoder: Arc<EncoderManager>,
    recovery: Arc<dyn RecoveryStore>,
    location_slug: String,
    poll_interval: Duration,
    location: Option<RemoteLocation>,
    session: Option<RemoteSession>,
    /// Control token together with the session it belongs to.
    control: Option<(Uuid, String)>,
    pending_recovery: Option<RecoveryRecord>,
    latch: AdvanceLatch,
    banner: Option<HelperBanner>,
}

impl DisplayClient {
    /// Wire up a display client for one kiosk.
    pub fn new(
        api: Arc<dyn SessionApi>,
        encoder: Arc<EncoderManager>,
        recovery: Arc<dyn RecoveryStore>,
        location_slug: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            encoder,
            recovery,
            location_slug: location_slug.into(),
            poll_interval,
            location: None,
            session: None,
            control: None,
            pending_recovery: None,
            latch: AdvanceLatch::new(),
            banner: None,
        }
    }

    /// Which stage screen should currently be rendered.
    pub fn screen(&self) -> StageScreen {
        match self.session.as_ref().map(|session| session.status) {
            Some(SessionStatus::Countdown) => StageScreen::Countdown,
            Some(SessionStatus::Live) => StageScreen::Live,
            Some(SessionStatus::Reveal) => StageScreen::Reveal,
            None | Some(SessionStatus::Complete) | Some(SessionStatus::Cancelled) => {
                StageScreen::Standby
            }
        }
    }

    /// Current helper banner text, if one is showing.
    pub fn banner(&self) -> Option<&str> {
        let banner = self.banner.as_ref()?;
        (OffsetDateTime::now_utc() < banner.expires_at).then_some(banner.message.as_str())
    }

    /// Currently adopted session, if any.
    pub fn session(&self) -> Option<&RemoteSession> {
        self.session.as_ref()
    }

    /// Attempt startup recovery from the local cache.
    ///
    /// Finding the session live again re-hydrates the in-memory state
    /// (including the control token) without a fresh scan. A missing or
    /// terminal session silently clears the cache: self-healing, nothing
    /// the customer should see.
    pub async fn recover(&mut self) {
        self.pending_recovery = self.recovery.load(&self.location_slug);
        if self.pending_recovery.is_some() {
            self.try_recover().await;
        }
    }

    async fn try_recover(&mut self) {
        let Some(record) = self.pending_recovery.clone() else {
            return;
        };

        match self.api.get_session(record.session_id).await {
            Ok(session) if !session.status.is_terminal() => {
                info!(session_id = %session.id, status = ?session.status, "recovered session from local cache");
                self.control = Some((session.id, record.control_token));
                self.pending_recovery = None;
                self.adopt(Some(session)).await;
            }
            Ok(_) | Err(ApiError::NotFound(_)) => {
                self.recovery.clear(&self.location_slug);
                self.pending_recovery = None;
            }
            Err(err) => {
                // Server unreachable is not "session gone": keep the record
                // and retry on the next tick.
                warn!(error = %err, "recovery lookup failed; will retry");
            }
        }
    }

    /// Fetch the display snapshot and adopt it as the authoritative state.
    pub async fn poll_once(&mut self) {
        if self.pending_recovery.is_some() {
            self.try_recover().await;
        }

        match self
            .api
            .get_display_snapshot(self.location_slug.clone())
            .await
        {
            Ok(snapshot) => {
                self.location = Some(snapshot.location);
                self.adopt(snapshot.session).await;
            }
            Err(err) => {
                // A failed poll never kills the loop; the next one retries.
                warn!(error = %err, "display snapshot poll failed");
            }
        }
    }

    /// Evaluate the three auto-advance guards against the local clock.
    pub async fn tick_once(&mut self, now: OffsetDateTime) {
        if self.banner.as_ref().is_some_and(|banner| now >= banner.expires_at) {
            self.banner = None;
        }

        if self.pending_recovery.is_some() {
            self.try_recover().await;
        }

        let Some(session) = self.session.clone() else {
            return;
        };
        // Without the control token this display cannot authenticate an
        // advance; the server-side sweeper moves the session instead and
        // the poll picks it up.
        let Some(token) = self.token_for(session.id) else {
            return;
        };

        let due = match session.status {
            SessionStatus::Countdown
                if session.countdown_ends_at.is_some_and(|deadline| now >= deadline) =>
            {
                Some((Guard::CountdownExpired, SessionStatus::Live))
            }
            SessionStatus::Live
                if session.live_ends_at.is_some_and(|deadline| now >= deadline) =>
            {
                let target = if session.reveal.is_some() {
                    SessionStatus::Reveal
                } else {
                    SessionStatus::Cancelled
                };
                Some((Guard::LiveWindowExpired, target))
            }
            SessionStatus::Reveal
                if session.reveal_ends_at.is_some_and(|deadline| now >= deadline) =>
            {
                Some((Guard::RevealWindowExpired, SessionStatus::Complete))
            }
            _ => None,
        };

        let Some((guard, target)) = due else {
            return;
        };

        if !self.latch.try_fire(session.id, guard) {
            return;
        }

        match self.api.advance_stage(session.id, target, token).await {
            Ok(updated) => {
                self.adopt(Some(updated)).await;
            }
            Err(ApiError::Conflict(message)) => {
                // The sweeper won the race and the session moved under us;
                // the latch stays held until the poll shows the new stage.
                info!(%message, "advance superseded by server-side transition");
            }
            Err(err) => {
                warn!(error = %err, guard = ?guard, "auto-advance failed; retrying next tick");
                self.latch.release(session.id, guard);
            }
        }
    }

    /// Turn a raw scanner line into a domain action.
    pub async fn handle_scan(&mut self, raw: &str) {
        let code = normalize_scan(raw);
        if code.is_empty() {
            self.show_banner("Code not recognized, try scanning again");
            return;
        }

        match classify(&code) {
            ScanKind::Pack => self.handle_pack_scan(code).await,
            ScanKind::Card => self.handle_card_scan(code).await,
            ScanKind::Unknown => {
                self.show_banner("Code not recognized, try scanning again");
            }
        }
    }

    async fn handle_pack_scan(&mut self, code: String) {
        if self.session.is_some() {
            self.show_banner("A rip is already running on this kiosk");
            return;
        }

        let Some(location) = self.location.clone() else {
            self.show_banner("Display is still connecting, try again in a moment");
            return;
        };

        match self.api.start_session(code.clone(), location.id).await {
            Ok(started) => {
                self.recovery.save(
                    &self.location_slug,
                    &RecoveryRecord {
                        session_id: started.session.id,
                        control_token: started.control_token.clone(),
                        pack_code: code,
                        saved_at: OffsetDateTime::now_utc(),
                    },
                );
                self.control = Some((started.session.id, started.control_token));
                self.adopt(Some(started.session)).await;
            }
            Err(ApiError::Conflict(message)) => {
                warn!(%message, "pack scan conflicted");
                self.show_banner("That pack already has a session running");
            }
            Err(err) => {
                warn!(error = %err, "failed to start session from pack scan");
                self.show_banner("Could not start the rip, please scan again");
            }
        }
    }

    async fn handle_card_scan(&mut self, code: String) {
        let Some(session) = self.session.clone() else {
            self.show_banner("Scan a pack to start a rip first");
            return;
        };

        if session.status != SessionStatus::Live {
            self.show_banner("Cards can be scanned once the rip is live");
            return;
        }

        let Some(token) = self.token_for(session.id) else {
            self.show_banner("This display cannot control the running session");
            return;
        };

        let card = match self.api.lookup_card(code).await {
            Ok(card) => card,
            Err(ApiError::NotFound(_)) => {
                self.show_banner("Card is not linked to inventory yet");
                return;
            }
            Err(err) => {
                warn!(error = %err, "card lookup failed");
                self.show_banner("Card lookup failed, try scanning again");
                return;
            }
        };

        match self.api.attach_reveal(session.id, card.item_id, token).await {
            Ok(updated) => {
                self.show_banner(format!("Card identified: {}", card.name));
                self.adopt(Some(updated)).await;
            }
            Err(err) => {
                warn!(error = %err, "failed to attach reveal");
                self.show_banner("Could not attach the card, try scanning again");
            }
        }
    }

    /// Run the display loop until the scanner channel closes.
    pub async fn run(mut self, mut scans: mpsc::Receiver<String>) {
        self.recover().await;
        self.poll_once().await;

        let mut poll = interval(self.poll_interval);
        let mut tick = interval(Duration::from_secs(1));

        loop {
            select! {
                _ = poll.tick() => self.poll_once().await,
                _ = tick.tick() => self.tick_once(OffsetDateTime::now_utc()).await,
                maybe_scan = scans.recv() => match maybe_scan {
                    Some(raw) => self.handle_scan(&raw).await,
                    None => break,
                },
            }
        }
    }

    /// Adopt the freshest session state, clear the recovery cache when the
    /// session ended, update latches, and reconcile the encoder.
    async fn adopt(&mut self, incoming: Option<RemoteSession>) {
        let incoming = match incoming {
            Some(session) if session.status.is_terminal() => {
                info!(session_id = %session.id, status = ?session.status, "session reached a terminal stage");
                None
            }
            other => other,
        };

        if self.session.is_some() && incoming.is_none() {
            self.recovery.clear(&self.location_slug);
            self.control = None;
        }

        let token_stale = match (&incoming, &self.control) {
            (Some(session), Some((held_id, _))) => session.id != *held_id,
            _ => false,
        };
        if token_stale {
            self.control = None;
        }

        let before = self.session.as_ref().map(|s| (s.id, s.status));
        let after = incoming.as_ref().map(|s| (s.id, s.status));
        self.session = incoming;
        self.latch.observe(after);

        if before != after {
            info!(screen = ?self.screen(), "stage changed");
        }

        self.reconcile_encoder().await;
    }

    /// Drive the encoder to the scene/stream state implied by the current
    /// stage. All calls are idempotent, so re-running after an unchanged
    /// poll is harmless; failures are logged and surfaced but never touch
    /// the session.
    async fn reconcile_encoder(&mut self) {
        if !self.encoder.is_enabled() {
            return;
        }

        if let Err(err) = self.encoder.connect().await {
            warn!(error = %err, "encoder unavailable");
            self.show_banner("Stream encoder offline, the session continues");
            return;
        }

        let scenes = self.encoder.scenes().clone();
        let (scene, want_stream) = match self.screen() {
            StageScreen::Standby => (scenes.attract, false),
            StageScreen::Countdown | StageScreen::Live => (scenes.live, true),
            StageScreen::Reveal => (scenes.reveal, true),
        };

        if let Err(err) = self.encoder.set_scene(&scene).await {
            warn!(error = %err, %scene, "encoder scene switch failed");
            self.show_banner("Stream scene switch failed");
        }

        let streaming = self.encoder.state().await == EncoderState::Streaming;
        let result = if want_stream && !streaming {
            self.encoder.start_stream().await
        } else if !want_stream && streaming {
            self.encoder.stop_stream().await
        } else {
            Ok(())
        };

        if let Err(err) = result {
            warn!(error = %err, "encoder stream control failed");
            self.show_banner("Stream control failed, the session continues");
        }
    }

    fn token_for(&self, session_id: Uuid) -> Option<String> {
        self.control
            .as_ref()
            .filter(|(held_id, _)| *held_id == session_id)
            .map(|(_, token)| token.clone())
    }

    fn show_banner(&mut self, message: impl Into<String>) {
        self.banner = Some(HelperBanner {
            message: message.into(),
            expires_at: OffsetDateTime::now_utc() + BANNER_TTL,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use futures::future::BoxFuture;
    use time::Duration as TimeDuration;

    use super::*;
    use crate::{
        display::session_api::{ApiResult, CardRef, DisplaySnapshot, StartedSession},
        encoder::{EncoderConfig, EncoderManager, transport::tests_support},
    };

    /// Scripted session-server double.
    #[derive(Clone, Default)]
    struct MockApi {
        calls: Arc<StdMutex<Vec<String>>>,
        snapshot: Arc<StdMutex<Option<ApiResult<DisplaySnapshot>>>>,
        session: Arc<StdMutex<Option<ApiResult<RemoteSession>>>>,
        start: Arc<StdMutex<Option<ApiResult<StartedSession>>>>,
        advances: Arc<StdMutex<VecDeque<ApiResult<RemoteSession>>>>,
        card: Arc<StdMutex<Option<ApiResult<CardRef>>>>,
        attach: Arc<StdMutex<Option<ApiResult<RemoteSession>>>>,
    }

    impl MockApi {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| call.starts_with(prefix))
                .count()
        }
    }

    impl SessionApi for MockApi {
        fn start_session(
            &self,
            pack_code: String,
            _location_id: Uuid,
        ) -> BoxFuture<'static, ApiResult<StartedSession>> {
            self.record(format!("start:{pack_code}"));
            let result = self.start.lock().unwrap().clone();
            Box::pin(async move { result.expect("start_session not scripted") })
        }

        fn get_session(&self, id: Uuid) -> BoxFuture<'static, ApiResult<RemoteSession>> {
            self.record(format!("get:{id}"));
            let result = self.session.lock().unwrap().clone();
            Box::pin(async move { result.expect("get_session not scripted") })
        }

        fn get_display_snapshot(
            &self,
            slug: String,
        ) -> BoxFuture<'static, ApiResult<DisplaySnapshot>> {
            self.record(format!("snapshot:{slug}"));
            let result = self.snapshot.lock().unwrap().clone();
            Box::pin(async move { result.expect("snapshot not scripted") })
        }

        fn advance_stage(
            &self,
            _id: Uuid,
            stage: SessionStatus,
            _credential: String,
        ) -> BoxFuture<'static, ApiResult<RemoteSession>> {
            self.record(format!("advance:{stage:?}"));
            let result = self.advances.lock().unwrap().pop_front();
            Box::pin(async move { result.expect("advance_stage not scripted") })
        }

        fn attach_reveal(
            &self,
            _id: Uuid,
            item_id: Uuid,
            _credential: String,
        ) -> BoxFuture<'static, ApiResult<RemoteSession>> {
            self.record(format!("attach:{item_id}"));
            let result = self.attach.lock().unwrap().clone();
            Box::pin(async move { result.expect("attach_reveal not scripted") })
        }

        fn lookup_card(&self, code: String) -> BoxFuture<'static, ApiResult<CardRef>> {
            self.record(format!("card:{code}"));
            let result = self.card.lock().unwrap().clone();
            Box::pin(async move { result.expect("lookup_card not scripted") })
        }
    }

    /// In-memory recovery store double.
    #[derive(Clone, Default)]
    struct MockRecovery {
        record: Arc<StdMutex<Option<RecoveryRecord>>>,
    }

    impl RecoveryStore for MockRecovery {
        fn load(&self, _slug: &str) -> Option<RecoveryRecord> {
            self.record.lock().unwrap().clone()
        }

        fn save(&self, _slug: &str, record: &RecoveryRecord) {
            *self.record.lock().unwrap() = Some(record.clone());
        }

        fn clear(&self, _slug: &str) {
            *self.record.lock().unwrap() = None;
        }
    }

    fn epoch() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }

    fn remote_session(status: SessionStatus) -> RemoteSession {
        RemoteSession {
            id: Uuid::new_v4(),
            code: "abcdef".into(),
            status,
            pack_code: "tkp_001".into(),
            countdown_ends_at: Some(epoch() + TimeDuration::seconds(10)),
            live_ends_at: matches!(status, SessionStatus::Live | SessionStatus::Reveal)
                .then(|| epoch() + TimeDuration::seconds(70)),
            reveal_ends_at: matches!(status, SessionStatus::Reveal)
                .then(|| epoch() + TimeDuration::seconds(85)),
            reveal: None,
        }
    }

    fn remote_location() -> RemoteLocation {
        RemoteLocation {
            id: Uuid::new_v4(),
            name: "Pilot Booth".into(),
            slug: "pilot-booth".into(),
        }
    }

    fn disabled_encoder() -> Arc<EncoderManager> {
        EncoderManager::new(
            Arc::new(tests_support::NullTransport::default()),
            EncoderConfig::default(),
        )
    }

    fn client_with(api: &MockApi, recovery: &MockRecovery) -> DisplayClient {
        DisplayClient::new(
            Arc::new(api.clone()),
            disabled_encoder(),
            Arc::new(recovery.clone()),
            "pilot-booth",
            DEFAULT_POLL_INTERVAL,
        )
    }

    fn script_snapshot(api: &MockApi, session: Option<RemoteSession>) {
        *api.snapshot.lock().unwrap() = Some(Ok(DisplaySnapshot {
            location: remote_location(),
            session,
        }));
    }

    #[tokio::test]
    async fn restart_mid_live_recovers_from_cache() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();

        let live = remote_session(SessionStatus::Live);
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: live.id,
                control_token: "secret-token".into(),
                pack_code: live.pack_code.clone(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Ok(live.clone()));

        let mut client = client_with(&api, &recovery);
        client.recover().await;

        assert_eq!(client.screen(), StageScreen::Live);
        assert_eq!(client.session().unwrap().id, live.id);
        // The control token survived the restart: guard ticks can advance.
        assert_eq!(client.token_for(live.id).as_deref(), Some("secret-token"));
        assert!(recovery.load("pilot-booth").is_some());
    }

    #[tokio::test]
    async fn recovery_of_missing_session_clears_cache() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: Uuid::new_v4(),
                control_token: "stale".into(),
                pack_code: "tkp_001".into(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Err(ApiError::NotFound("gone".into())));

        let mut client = client_with(&api, &recovery);
        client.recover().await;

        assert_eq!(client.screen(), StageScreen::Standby);
        assert!(recovery.load("pilot-booth").is_none());
    }

    #[tokio::test]
    async fn recovery_of_terminal_session_clears_cache() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();
        let completed = remote_session(SessionStatus::Complete);
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: completed.id,
                control_token: "stale".into(),
                pack_code: completed.pack_code.clone(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Ok(completed));

        let mut client = client_with(&api, &recovery);
        client.recover().await;

        assert_eq!(client.screen(), StageScreen::Standby);
        assert!(recovery.load("pilot-booth").is_none());
    }

    #[tokio::test]
    async fn pack_scan_starts_session_and_persists_recovery() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();
        script_snapshot(&api, None);

        let countdown = remote_session(SessionStatus::Countdown);
        *api.start.lock().unwrap() = Some(Ok(StartedSession {
            session: countdown.clone(),
            control_token: "fresh-token".into(),
        }));

        let mut client = client_with(&api, &recovery);
        client.poll_once().await;
        client.handle_scan("  TKP_001  ").await;

        assert_eq!(api.count("start:tkp_001"), 1);
        assert_eq!(client.screen(), StageScreen::Countdown);
        let record = recovery.load("pilot-booth").unwrap();
        assert_eq!(record.session_id, countdown.id);
        assert_eq!(record.control_token, "fresh-token");
    }

    #[tokio::test]
    async fn pack_scan_with_active_session_is_rejected_with_hint() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();
        script_snapshot(&api, Some(remote_session(SessionStatus::Countdown)));

        let mut client = client_with(&api, &recovery);
        client.poll_once().await;
        client.handle_scan("tkp_999").await;

        assert_eq!(api.count("start:"), 0);
        assert!(client.banner().is_some());
    }

    #[tokio::test]
    async fn card_scan_without_session_hints_instead_of_acting() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();

        let mut client = client_with(&api, &recovery);
        client.handle_scan("tkc_ab12").await;

        assert_eq!(api.count("card:"), 0);
        assert!(client.banner().is_some());
    }

    #[tokio::test]
    async fn card_scan_while_live_attaches_reveal() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();

        let live = remote_session(SessionStatus::Live);
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: live.id,
                control_token: "tok".into(),
                pack_code: live.pack_code.clone(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Ok(live.clone()));

        let item_id = Uuid::new_v4();
        *api.card.lock().unwrap() = Some(Ok(CardRef {
            item_id,
            name: "Charizard".into(),
        }));
        let mut with_reveal = live.clone();
        with_reveal.reveal = Some(crate::display::session_api::RemoteReveal {
            name: "Charizard".into(),
            set_name: "Base Set".into(),
            number: "4/102".into(),
            image_url: "https://cards.example/base4.png".into(),
        });
        *api.attach.lock().unwrap() = Some(Ok(with_reveal));

        let mut client = client_with(&api, &recovery);
        client.recover().await;
        client.handle_scan("https://x/claim/tkc_ab12").await;

        assert_eq!(api.count("card:tkc_ab12"), 1);
        assert_eq!(api.count(&format!("attach:{item_id}")), 1);
        assert!(client.session().unwrap().reveal.is_some());
    }

    #[tokio::test]
    async fn unlinked_card_scan_leaves_session_unchanged() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();

        let live = remote_session(SessionStatus::Live);
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: live.id,
                control_token: "tok".into(),
                pack_code: live.pack_code.clone(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Ok(live.clone()));
        *api.card.lock().unwrap() = Some(Err(ApiError::NotFound("unlinked".into())));

        let mut client = client_with(&api, &recovery);
        client.recover().await;
        client.handle_scan("tkc_zzzz").await;

        assert_eq!(api.count("attach:"), 0);
        assert!(client.banner().is_some());
        assert_eq!(client.screen(), StageScreen::Live);
    }

    #[tokio::test]
    async fn guard_fires_at_most_once_per_state_entry() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();

        let countdown = remote_session(SessionStatus::Countdown);
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: countdown.id,
                control_token: "tok".into(),
                pack_code: countdown.pack_code.clone(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Ok(countdown.clone()));
        // The server is lagging: both advances would return countdown still.
        api.advances
            .lock()
            .unwrap()
            .push_back(Ok(countdown.clone()));
        api.advances.lock().unwrap().push_back(Ok(countdown.clone()));

        let mut client = client_with(&api, &recovery);
        client.recover().await;

        let after_deadline = epoch() + TimeDuration::seconds(11);
        client.tick_once(after_deadline).await;
        client.tick_once(after_deadline + TimeDuration::seconds(1)).await;

        assert_eq!(api.count("advance:"), 1);
    }

    #[tokio::test]
    async fn failed_advance_releases_latch_for_retry() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();

        let countdown = remote_session(SessionStatus::Countdown);
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: countdown.id,
                control_token: "tok".into(),
                pack_code: countdown.pack_code.clone(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Ok(countdown.clone()));
        api.advances
            .lock()
            .unwrap()
            .push_back(Err(ApiError::Network("timeout".into())));
        let mut live = countdown.clone();
        live.status = SessionStatus::Live;
        api.advances.lock().unwrap().push_back(Ok(live));

        let mut client = client_with(&api, &recovery);
        client.recover().await;

        let after_deadline = epoch() + TimeDuration::seconds(11);
        client.tick_once(after_deadline).await;
        client.tick_once(after_deadline + TimeDuration::seconds(1)).await;

        assert_eq!(api.count("advance:"), 2);
        assert_eq!(client.screen(), StageScreen::Live);
    }

    #[tokio::test]
    async fn live_expiry_without_reveal_requests_cancellation() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();

        let live = remote_session(SessionStatus::Live);
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: live.id,
                control_token: "tok".into(),
                pack_code: live.pack_code.clone(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Ok(live.clone()));
        let mut cancelled = live.clone();
        cancelled.status = SessionStatus::Cancelled;
        api.advances.lock().unwrap().push_back(Ok(cancelled));

        let mut client = client_with(&api, &recovery);
        client.recover().await;
        client.tick_once(epoch() + TimeDuration::seconds(71)).await;

        assert_eq!(api.count("advance:Cancelled"), 1);
        // Terminal outcome: back to standby, recovery cache gone.
        assert_eq!(client.screen(), StageScreen::Standby);
        assert!(recovery.load("pilot-booth").is_none());
    }

    #[tokio::test]
    async fn reveal_expiry_completes_and_clears_recovery() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();

        let reveal = remote_session(SessionStatus::Reveal);
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: reveal.id,
                control_token: "tok".into(),
                pack_code: reveal.pack_code.clone(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Ok(reveal.clone()));
        let mut complete = reveal.clone();
        complete.status = SessionStatus::Complete;
        api.advances.lock().unwrap().push_back(Ok(complete));

        let mut client = client_with(&api, &recovery);
        client.recover().await;
        client.tick_once(epoch() + TimeDuration::seconds(86)).await;

        assert_eq!(api.count("advance:Complete"), 1);
        assert_eq!(client.screen(), StageScreen::Standby);
        assert!(recovery.load("pilot-booth").is_none());
    }

    #[tokio::test]
    async fn poll_adopting_empty_snapshot_ends_the_session_locally() {
        let api = MockApi::default();
        let recovery = MockRecovery::default();

        let live = remote_session(SessionStatus::Live);
        recovery.save(
            "pilot-booth",
            &RecoveryRecord {
                session_id: live.id,
                control_token: "tok".into(),
                pack_code: live.pack_code.clone(),
                saved_at: epoch(),
            },
        );
        *api.session.lock().unwrap() = Some(Ok(live.clone()));

        let mut client = client_with(&api, &recovery);
        client.recover().await;
        assert_eq!(client.screen(), StageScreen::Live);

        // The session completed while this display was mid-poll-cycle.
        script_snapshot(&api, None);
        client.poll_once().await;

        assert_eq!(client.screen(), StageScreen::Standby);
        assert!(recovery.load("pilot-booth").is_none());
    }
}
