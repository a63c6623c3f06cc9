//! In-memory store backing single-node deployments and tests.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use uuid::Uuid;

use crate::dao::{
    models::{CardEntity, SessionEntity},
    session_store::SessionStore,
    storage::StorageResult,
};

/// Process-local [`SessionStore`] holding everything in concurrent maps.
///
/// This is the default backend: a kiosk pilot runs the session server on
/// the same box as the display, and sessions are short-lived enough that
/// durability across server restarts is an operator convenience, not a
/// requirement. Clones share the underlying maps.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<Uuid, SessionEntity>>,
    cards: Arc<DashMap<Uuid, CardEntity>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload inventory cards (demo wiring and tests).
    pub fn seed_cards(&self, cards: impl IntoIterator<Item = CardEntity>) {
        for card in cards {
            self.cards.insert(card.id, card);
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.sessions.get(&id).map(|entry| entry.clone())) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .sessions
                .iter()
                .find(|entry| entry.code == code)
                .map(|entry| entry.clone()))
        })
    }

    fn find_active_by_pack(
        &self,
        pack_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .sessions
                .iter()
                .find(|entry| entry.pack_code == pack_code && !entry.status.is_terminal())
                .map(|entry| entry.clone()))
        })
    }

    fn find_active_by_location(
        &self,
        location_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .sessions
                .iter()
                .find(|entry| entry.location.id == location_id && !entry.status.is_terminal())
                .map(|entry| entry.clone()))
        })
    }

    fn list_active_sessions(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .sessions
                .iter()
                .filter(|entry| !entry.status.is_terminal())
                .map(|entry| entry.clone())
                .collect())
        })
    }

    fn find_card(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<CardEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.cards.get(&id).map(|entry| entry.clone())) })
    }

    fn find_card_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<CardEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .cards
                .iter()
                .find(|entry| entry.code == code)
                .map(|entry| entry.clone()))
        })
    }

    fn save_card(&self, card: CardEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.cards.insert(card.id, card);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::{KioskSession, Location, SessionWindows};
    use time::OffsetDateTime;

    fn sample_session() -> SessionEntity {
        KioskSession::new(
            "tkp_0001".into(),
            Location {
                id: Uuid::new_v4(),
                name: "Booth".into(),
                slug: "booth".into(),
            },
            SessionWindows {
                countdown_seconds: 10,
                live_seconds: 60,
                reveal_seconds: 15,
            },
            OffsetDateTime::UNIX_EPOCH,
        )
        .into()
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let store = MemorySessionStore::new();
        let session = sample_session();
        let id = session.id;
        let code = session.code.clone();

        store.save_session(session).await.unwrap();

        assert!(store.find_session(id).await.unwrap().is_some());
        assert!(store.find_session_by_code(code).await.unwrap().is_some());
        assert!(
            store
                .find_session_by_code("zzzzzz".into())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn active_lookups_skip_terminal_sessions() {
        use crate::state::session_machine::SessionStatus;

        let store = MemorySessionStore::new();
        let mut session = sample_session();
        let location_id = session.location.id;
        session.status = SessionStatus::Cancelled;
        store.save_session(session.clone()).await.unwrap();

        assert!(
            store
                .find_active_by_pack(session.pack_code.clone())
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_active_by_location(location_id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.list_active_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn card_lookup_by_code() {
        let store = MemorySessionStore::new();
        let card = CardEntity {
            id: Uuid::new_v4(),
            code: "tkc_ab12".into(),
            name: "Blue-Eyes White Dragon".into(),
            set_name: "LOB".into(),
            number: "001".into(),
            image_url: "https://cards.example/lob001.png".into(),
        };
        store.seed_cards([card.clone()]);

        let found = store
            .find_card_by_code("tkc_ab12".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, card.id);
        assert!(store.find_card(card.id).await.unwrap().is_some());
    }
}
