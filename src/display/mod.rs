//! The on-site kiosk display client: polling, guard timers, scan routing,
//! crash recovery, and encoder stage mapping.

/// The display loop and its stage/banner state.
pub mod client;
/// Per-transition latches for auto-advance guards.
pub mod latch;
/// Locally persisted recovery state.
pub mod recovery;
/// Scanner input normalization and classification.
pub mod scan;
/// HTTP client for the session server.
pub mod session_api;

pub use client::{DEFAULT_POLL_INTERVAL, DisplayClient, StageScreen};
pub use recovery::{FileRecoveryStore, RecoveryRecord, RecoveryStore};
pub use scan::{ScanKind, classify, normalize_scan};
pub use session_api::{HttpSessionApi, SessionApi};
