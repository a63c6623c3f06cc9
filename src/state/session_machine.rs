use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

use crate::state::session::{KioskSession, RevealPayload};

/// Lifecycle stage of a kiosk session.
///
/// The display-side "standby" (no session at all) is deliberately not a
/// variant: a session record always starts its life in [`Countdown`].
///
/// [`Countdown`]: SessionStatus::Countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Pack scanned, on-screen countdown running before the rip goes live.
    Countdown,
    /// Live window airing; the pulled card can be scanned and attached.
    Live,
    /// Winning card revealed on screen.
    Reveal,
    /// Session finished normally.
    Complete,
    /// Session abandoned, either manually or because the live window
    /// elapsed without an identified card.
    Cancelled,
}

impl SessionStatus {
    /// Whether this stage accepts no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Cancelled)
    }
}

/// Events that can be applied to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Countdown finished (or was skipped); start the live window.
    GoLive,
    /// Move to the reveal stage.
    GoReveal,
    /// Close out a revealed session.
    Finish,
    /// Abandon the session from any non-terminal stage.
    Cancel,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The stage the session was in when the invalid event was received.
    pub from: SessionStatus,
    /// The event that cannot be applied from this stage.
    pub event: StageEvent,
}

/// Error returned when a reveal payload is attached outside the live stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reveal payload can only be attached while live (currently {status:?})")]
pub struct RevealNotAllowed {
    /// The stage the session was in when the attach was attempted.
    pub status: SessionStatus,
}

/// Outcome of applying an event to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The session moved to a new stage.
    Moved(SessionStatus),
    /// The event re-entered a terminal stage the session is already in;
    /// repeat calls must not error, so nothing changed.
    Unchanged,
}

/// Validate that `event` can be applied from `from` and compute the next stage.
///
/// Re-applying the event that leads into a terminal stage the session is
/// already in yields [`Transition::Unchanged`] instead of an error.
pub fn compute_transition(
    from: SessionStatus,
    event: StageEvent,
) -> Result<Transition, InvalidTransition> {
    let next = match (from, event) {
        (SessionStatus::Countdown, StageEvent::GoLive) => SessionStatus::Live,
        (SessionStatus::Live, StageEvent::GoReveal) => SessionStatus::Reveal,
        (SessionStatus::Reveal, StageEvent::Finish) => SessionStatus::Complete,
        (from, StageEvent::Cancel) if !from.is_terminal() => SessionStatus::Cancelled,
        (SessionStatus::Complete, StageEvent::Finish)
        | (SessionStatus::Cancelled, StageEvent::Cancel) => return Ok(Transition::Unchanged),
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(Transition::Moved(next))
}

/// Map a requested target stage to the event that moves a session there.
///
/// `Countdown` has no entry event (sessions are created in it), so it maps
/// to `None` and callers reject the request as an invalid target.
pub fn event_for_stage(stage: SessionStatus) -> Option<StageEvent> {
    match stage {
        SessionStatus::Countdown => None,
        SessionStatus::Live => Some(StageEvent::GoLive),
        SessionStatus::Reveal => Some(StageEvent::GoReveal),
        SessionStatus::Complete => Some(StageEvent::Finish),
        SessionStatus::Cancelled => Some(StageEvent::Cancel),
    }
}

/// Compute the automatic event due for `session` at `now`, if any.
///
/// A live window that elapses without a reveal payload attached yields
/// [`StageEvent::Cancel`], never [`StageEvent::GoReveal`]: a rip that
/// produced no identified card is not worth keeping open.
pub fn due_event(session: &KioskSession, now: OffsetDateTime) -> Option<StageEvent> {
    match session.status {
        SessionStatus::Countdown => {
            let deadline = session.countdown_ends_at?;
            (now >= deadline).then_some(StageEvent::GoLive)
        }
        SessionStatus::Live => {
            let deadline = session.live_ends_at?;
            if now < deadline {
                return None;
            }
            if session.reveal.is_some() {
                Some(StageEvent::GoReveal)
            } else {
                Some(StageEvent::Cancel)
            }
        }
        SessionStatus::Reveal => {
            let deadline = session.reveal_ends_at?;
            (now >= deadline).then_some(StageEvent::Finish)
        }
        SessionStatus::Complete | SessionStatus::Cancelled => None,
    }
}

/// Apply `event` to `session`, moving its status and arming the window for
/// the stage being entered.
pub fn apply_event(
    session: &mut KioskSession,
    event: StageEvent,
    now: OffsetDateTime,
) -> Result<Transition, InvalidTransition> {
    let transition = compute_transition(session.status, event)?;

    if let Transition::Moved(next) = transition {
        session.status = next;
        match next {
            SessionStatus::Live => {
                session.live_ends_at = Some(now + Duration::seconds(session.live_seconds as i64));
            }
            SessionStatus::Reveal => {
                session.reveal_ends_at =
                    Some(now + Duration::seconds(session.reveal_seconds as i64));
            }
            _ => {}
        }
        session.updated_at = now;
    }

    Ok(transition)
}

/// Attach the reveal payload to a live session.
///
/// Valid only while the session is [`SessionStatus::Live`]; a session holds
/// at most one payload, so a second attach replaces the first (re-scan of a
/// misread card).
pub fn attach_reveal(
    session: &mut KioskSession,
    payload: RevealPayload,
    now: OffsetDateTime,
) -> Result<(), RevealNotAllowed> {
    if session.status != SessionStatus::Live {
        return Err(RevealNotAllowed {
            status: session.status,
        });
    }

    session.reveal = Some(payload);
    session.updated_at = now;
    Ok(())
}
