use rand::{Rng, distr::Alphanumeric};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
    dao::models::{LocationEntity, RevealEntity, SessionEntity},
    state::session_machine::SessionStatus,
};

/// Length of the capability secret returned once at session creation.
const CONTROL_TOKEN_LENGTH: usize = 32;
/// Length of the short human-readable session code.
const SESSION_CODE_LENGTH: usize = 6;
/// Alphabet for session codes; skips 0/o/1/l/i so staff can read a code
/// over the phone without ambiguity.
const SESSION_CODE_ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

/// Physical kiosk a session belongs to, drawn from the configured registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Stable identifier for the kiosk.
    pub id: Uuid,
    /// Display name shown on stage screens ("Dallas Galleria #2").
    pub name: String,
    /// URL-safe identifier used by the display snapshot route.
    pub slug: String,
}

/// Card payload attached when the pulled card is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealPayload {
    /// Card name.
    pub name: String,
    /// Set the card belongs to.
    pub set_name: String,
    /// Collector number within the set.
    pub number: String,
    /// Image asset shown full-screen during the reveal stage.
    pub image_url: String,
}

/// Stage window durations captured at session creation.
#[derive(Debug, Clone, Copy)]
pub struct SessionWindows {
    /// Seconds of on-screen countdown before the rip goes live.
    pub countdown_seconds: u64,
    /// Seconds the live window stays open waiting for a card scan.
    pub live_seconds: u64,
    /// Seconds the reveal stays on screen before the session completes.
    pub reveal_seconds: u64,
}

/// Runtime state of one kiosk session.
#[derive(Debug, Clone)]
pub struct KioskSession {
    /// Primary key of the session.
    pub id: Uuid,
    /// Short human-readable code for manual recovery at the counter.
    pub code: String,
    /// Current lifecycle stage.
    pub status: SessionStatus,
    /// Pack-activation code bound at creation; immutable afterwards.
    pub pack_code: String,
    /// Kiosk this session plays out on; immutable.
    pub location: Location,
    /// Seconds of countdown configured for this session.
    pub countdown_seconds: u64,
    /// Seconds of live window configured for this session.
    pub live_seconds: u64,
    /// Seconds of reveal configured for this session.
    pub reveal_seconds: u64,
    /// Countdown deadline; meaningful only while in the countdown stage.
    pub countdown_ends_at: Option<OffsetDateTime>,
    /// Live-window deadline; armed on the countdown-to-live transition.
    pub live_ends_at: Option<OffsetDateTime>,
    /// Reveal deadline; armed on the live-to-reveal transition.
    pub reveal_ends_at: Option<OffsetDateTime>,
    /// Resolved card payload; absent until attached during the live stage.
    pub reveal: Option<RevealPayload>,
    /// Capability secret required by every state-mutating call.
    pub control_token: String,
    /// Creation timestamp for auditing/debugging.
    pub created_at: OffsetDateTime,
    /// Last time the session record was updated.
    pub updated_at: OffsetDateTime,
}

impl KioskSession {
    /// Build a fresh session in the countdown stage with its countdown
    /// deadline armed and new code/token secrets generated.
    pub fn new(
        pack_code: String,
        location: Location,
        windows: SessionWindows,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: generate_session_code(),
            status: SessionStatus::Countdown,
            pack_code,
            location,
            countdown_seconds: windows.countdown_seconds,
            live_seconds: windows.live_seconds,
            reveal_seconds: windows.reveal_seconds,
            countdown_ends_at: Some(now + Duration::seconds(windows.countdown_seconds as i64)),
            live_ends_at: None,
            reveal_ends_at: None,
            reveal: None,
            control_token: generate_control_token(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the session still accepts mutation.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Generate a fresh control token.
fn generate_control_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CONTROL_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Generate a short session code from the unambiguous alphabet.
fn generate_session_code() -> String {
    let mut rng = rand::rng();
    (0..SESSION_CODE_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..SESSION_CODE_ALPHABET.len());
            SESSION_CODE_ALPHABET[index] as char
        })
        .collect()
}

impl From<LocationEntity> for Location {
    fn from(value: LocationEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            slug: value.slug,
        }
    }
}

impl From<Location> for LocationEntity {
    fn from(value: Location) -> Self {
        Self {
            id: value.id,
            name: value.name,
            slug: value.slug,
        }
    }
}

impl From<RevealEntity> for RevealPayload {
    fn from(value: RevealEntity) -> Self {
        Self {
            name: value.name,
            set_name: value.set_name,
            number: value.number,
            image_url: value.image_url,
        }
    }
}

impl From<RevealPayload> for RevealEntity {
    fn from(value: RevealPayload) -> Self {
        Self {
            name: value.name,
            set_name: value.set_name,
            number: value.number,
            image_url: value.image_url,
        }
    }
}

impl From<SessionEntity> for KioskSession {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id,
            code: value.code,
            status: value.status,
            pack_code: value.pack_code,
            location: value.location.into(),
            countdown_seconds: value.countdown_seconds,
            live_seconds: value.live_seconds,
            reveal_seconds: value.reveal_seconds,
            countdown_ends_at: value.countdown_ends_at,
            live_ends_at: value.live_ends_at,
            reveal_ends_at: value.reveal_ends_at,
            reveal: value.reveal.map(Into::into),
            control_token: value.control_token,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<KioskSession> for SessionEntity {
    fn from(value: KioskSession) -> Self {
        Self {
            id: value.id,
            code: value.code,
            status: value.status,
            pack_code: value.pack_code,
            location: value.location.into(),
            countdown_seconds: value.countdown_seconds,
            live_seconds: value.live_seconds,
            reveal_seconds: value.reveal_seconds,
            countdown_ends_at: value.countdown_ends_at,
            live_ends_at: value.live_ends_at,
            reveal_ends_at: value.reveal_ends_at,
            reveal: value.reveal.map(Into::into),
            control_token: value.control_token,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}
