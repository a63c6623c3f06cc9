//! Locally persisted recovery state, keyed by kiosk location.
//!
//! A display that crashes or power-cycles mid-session must resume without
//! an operator re-scanning the pack. The record holds just enough to
//! re-fetch the session and keep authenticating: session id, control
//! token, pack code. The cache exists if and only if the display believes
//! a non-terminal session is active for its location.

use std::{fs, io::ErrorKind, path::PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

/// Recovery record persisted per kiosk location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    /// Session to re-fetch on startup.
    pub session_id: Uuid,
    /// Control token needed to keep driving the session.
    pub control_token: String,
    /// Pack bound to the session, for operator diagnostics.
    pub pack_code: String,
    /// When the record was written.
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
}

/// Keyed persistence for recovery records.
///
/// Injected into the display client so recovery logic is testable without
/// a real filesystem backend.
pub trait RecoveryStore: Send + Sync {
    /// Load the record for a location, if one exists.
    fn load(&self, location_slug: &str) -> Option<RecoveryRecord>;
    /// Persist the record for a location.
    fn save(&self, location_slug: &str, record: &RecoveryRecord);
    /// Remove the record for a location.
    fn clear(&self, location_slug: &str);
}

/// File-backed [`RecoveryStore`]: one JSON file per location slug under a
/// state directory.
pub struct FileRecoveryStore {
    dir: PathBuf,
}

impl FileRecoveryStore {
    /// Create a store rooted at `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, location_slug: &str) -> PathBuf {
        self.dir.join(format!("{location_slug}.json"))
    }
}

impl RecoveryStore for FileRecoveryStore {
    fn load(&self, location_slug: &str) -> Option<RecoveryRecord> {
        let path = self.path_for(location_slug);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read recovery cache");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(err) => {
                // A half-written record from a crash is useless; drop it so
                // the display falls back to standby instead of looping.
                warn!(path = %path.display(), error = %err, "recovery cache corrupted; clearing");
                self.clear(location_slug);
                None
            }
        }
    }

    fn save(&self, location_slug: &str, record: &RecoveryRecord) {
        let path = self.path_for(location_slug);
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %err, "failed to create recovery dir");
            return;
        }

        match serde_json::to_string_pretty(record) {
            Ok(json) => {
                if let Err(err) = fs::write(&path, json) {
                    warn!(path = %path.display(), error = %err, "failed to write recovery cache");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize recovery record"),
        }
    }

    fn clear(&self, location_slug: &str) {
        let path = self.path_for(location_slug);
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "failed to clear recovery cache");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FileRecoveryStore {
        let dir = std::env::temp_dir().join(format!("rip-kiosk-recovery-{}", Uuid::new_v4()));
        FileRecoveryStore::new(dir)
    }

    fn sample_record() -> RecoveryRecord {
        RecoveryRecord {
            session_id: Uuid::new_v4(),
            control_token: "tok".repeat(8),
            pack_code: "tkp_0001".into(),
            saved_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn save_load_clear_round_trip() {
        let store = temp_store();
        let record = sample_record();

        assert_eq!(store.load("pilot-booth"), None);

        store.save("pilot-booth", &record);
        assert_eq!(store.load("pilot-booth"), Some(record));

        store.clear("pilot-booth");
        assert_eq!(store.load("pilot-booth"), None);
    }

    #[test]
    fn records_are_keyed_by_location() {
        let store = temp_store();
        let record = sample_record();

        store.save("booth-a", &record);
        assert_eq!(store.load("booth-b"), None);
        assert!(store.load("booth-a").is_some());
    }

    #[test]
    fn corrupted_record_is_self_healing() {
        let store = temp_store();
        store.save("pilot-booth", &sample_record());

        fs::write(store.path_for("pilot-booth"), "{not json").unwrap();
        assert_eq!(store.load("pilot-booth"), None);
        // The corrupt file was removed, not just skipped.
        assert!(!store.path_for("pilot-booth").exists());
    }

    #[test]
    fn clearing_missing_record_is_a_no_op() {
        let store = temp_store();
        store.clear("pilot-booth");
    }
}
