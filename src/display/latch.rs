//! Per-transition latches preventing duplicate auto-advance calls.
//!
//! The once-per-second guard timer and the slower poll loop both observe
//! the same session, and a stage-advance call can still be in flight when
//! the next evaluation runs. Each guard therefore fires at most once per
//! state entry, keyed on `(session id, guard)`, and is released only when
//! the session is observed outside the stage that made the guard relevant,
//! not on a timeout.

use std::collections::HashSet;

use uuid::Uuid;

use crate::state::session_machine::SessionStatus;

/// The three timer guards a display evaluates every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    /// Countdown deadline passed; request the live stage.
    CountdownExpired,
    /// Live window deadline passed; request reveal or cancellation.
    LiveWindowExpired,
    /// Reveal deadline passed; request completion.
    RevealWindowExpired,
}

impl Guard {
    /// The stage a session must be in for this guard to be meaningful.
    fn relevant_stage(self) -> SessionStatus {
        match self {
            Guard::CountdownExpired => SessionStatus::Countdown,
            Guard::LiveWindowExpired => SessionStatus::Live,
            Guard::RevealWindowExpired => SessionStatus::Reveal,
        }
    }
}

/// Latch set tracking which guards have already fired.
#[derive(Debug, Default)]
pub struct AdvanceLatch {
    fired: HashSet<(Uuid, Guard)>,
}

impl AdvanceLatch {
    /// Create an empty latch set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest observed session state, releasing every latch
    /// whose session is gone or whose relevant stage has been left.
    pub fn observe(&mut self, session: Option<(Uuid, SessionStatus)>) {
        self.fired.retain(|(id, guard)| {
            session
                .as_ref()
                .is_some_and(|(current, status)| current == id && guard.relevant_stage() == *status)
        });
    }

    /// Attempt to fire a guard; returns `false` when it already fired for
    /// this state entry.
    pub fn try_fire(&mut self, session_id: Uuid, guard: Guard) -> bool {
        self.fired.insert((session_id, guard))
    }

    /// Release a fired guard so the next tick retries (used when the
    /// advance call itself failed).
    pub fn release(&mut self, session_id: Uuid, guard: Guard) {
        self.fired.remove(&(session_id, guard));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_fires_once_until_released() {
        let mut latch = AdvanceLatch::new();
        let id = Uuid::new_v4();

        assert!(latch.try_fire(id, Guard::CountdownExpired));
        assert!(!latch.try_fire(id, Guard::CountdownExpired));

        latch.release(id, Guard::CountdownExpired);
        assert!(latch.try_fire(id, Guard::CountdownExpired));
    }

    #[test]
    fn leaving_the_relevant_stage_releases_the_guard() {
        let mut latch = AdvanceLatch::new();
        let id = Uuid::new_v4();

        assert!(latch.try_fire(id, Guard::CountdownExpired));

        // Still counting down: the latch holds.
        latch.observe(Some((id, SessionStatus::Countdown)));
        assert!(!latch.try_fire(id, Guard::CountdownExpired));

        // Went live: the countdown guard is no longer relevant and resets.
        latch.observe(Some((id, SessionStatus::Live)));
        assert!(latch.try_fire(id, Guard::CountdownExpired));
    }

    #[test]
    fn a_new_session_does_not_inherit_latches() {
        let mut latch = AdvanceLatch::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(latch.try_fire(first, Guard::LiveWindowExpired));
        latch.observe(Some((second, SessionStatus::Live)));
        assert!(latch.try_fire(second, Guard::LiveWindowExpired));
    }

    #[test]
    fn standby_clears_everything() {
        let mut latch = AdvanceLatch::new();
        let id = Uuid::new_v4();

        latch.try_fire(id, Guard::RevealWindowExpired);
        latch.observe(None);
        assert!(latch.try_fire(id, Guard::RevealWindowExpired));
    }
}
