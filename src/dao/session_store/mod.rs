//! Persistence abstraction for kiosk sessions and the card index.

#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{CardEntity, SessionEntity},
    storage::StorageResult,
};

/// Abstraction over the persistence layer for sessions and card lookups.
///
/// All methods return owned futures so implementations can be held behind
/// `Arc<dyn SessionStore>` and cloned into background tasks.
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite a session document.
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a session by primary key.
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Fetch a session by its short human-readable code.
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Fetch the active (non-terminal) session bound to a pack code, if any.
    fn find_active_by_pack(
        &self,
        pack_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Fetch the active (non-terminal) session running at a location, if any.
    fn find_active_by_location(
        &self,
        location_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// List every active (non-terminal) session; consumed by the sweeper.
    fn list_active_sessions(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    /// Fetch an inventory card by item id.
    fn find_card(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<CardEntity>>>;
    /// Fetch an inventory card by its sleeve-label code.
    fn find_card_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<CardEntity>>>;
    /// Insert or overwrite a card row (catalog tooling and tests).
    fn save_card(&self, card: CardEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap readiness probe used by the supervisor and healthcheck.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish the backend connection after a failed probe.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
