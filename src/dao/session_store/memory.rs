//! Process-local store backing both [`SessionStore`] and [`PlayerDirectory`].

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    models::{PlayerRecord, PlayerSessionEntity, SessionEntity},
    session_store::{PlayerDirectory, SessionStore},
    storage::{StorageError, StorageResult},
};

/// Failures of the in-memory backend.
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    /// The store was switched offline.
    #[error("in-memory store is offline")]
    Offline,
}

impl From<MemoryStoreError> for StorageError {
    fn from(err: MemoryStoreError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}

#[derive(Default)]
struct Inner {
    sessions: DashMap<Uuid, SessionEntity>,
    codes: DashMap<String, Uuid>,
    players: DashMap<Uuid, Vec<PlayerSessionEntity>>,
    directory: DashMap<i64, PlayerRecord>,
    offline: AtomicBool,
}

/// DashMap-backed store; cloning shares the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again) to exercise outage handling.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), MemoryStoreError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(MemoryStoreError::Offline)
        } else {
            Ok(())
        }
    }
}

impl SessionStore for InMemoryStore {
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            store
                .inner
                .codes
                .insert(session.session_code.clone(), session.id);
            store.inner.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn save_player_session(
        &self,
        player: PlayerSessionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut entries = store.inner.players.entry(player.session_id).or_default();
            match entries.iter_mut().find(|existing| existing.id == player.id) {
                Some(existing) => *existing = player,
                None => entries.push(player),
            }
            Ok(())
        })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let Some(id) = store.inner.codes.get(&code).map(|entry| *entry) else {
                return Ok(None);
            };
            Ok(store.inner.sessions.get(&id).map(|entry| entry.clone()))
        })
    }

    fn find_players_by_session_id(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .inner
                .players
                .get(&session_id)
                .map(|entries| entries.clone())
                .unwrap_or_default())
        })
    }

    fn find_player_by_user_and_session(
        &self,
        player_id: i64,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.inner.players.get(&session_id).and_then(|entries| {
                entries
                    .iter()
                    .find(|entry| entry.player.player_id == player_id)
                    .cloned()
            }))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online().map_err(Into::into) })
    }
}

impl PlayerDirectory for InMemoryStore {
    fn find_by_external_id(
        &self,
        player_id: i64,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .inner
                .directory
                .get(&player_id)
                .map(|entry| entry.clone()))
        })
    }

    fn register(&self, player: PlayerRecord) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            match store.inner.directory.entry(player.player_id) {
                Entry::Occupied(_) => Ok(false),
                Entry::Vacant(slot) => {
                    slot.insert(player);
                    Ok(true)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn record(player_id: i64) -> PlayerRecord {
        PlayerRecord {
            player_id,
            first_name: Some("Hana".into()),
            last_name: None,
            user_name: None,
            registered_at: SystemTime::now(),
        }
    }

    fn participation(session_id: Uuid, player_id: i64, card: Option<u32>) -> PlayerSessionEntity {
        let now = SystemTime::now();
        PlayerSessionEntity {
            id: Uuid::new_v4(),
            session_id,
            player: record(player_id),
            selected_card_code: card,
            card_numbers_json: None,
            is_winner: false,
            claim_rejected: false,
            joined_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let store = InMemoryStore::new();
        assert!(store.register(record(7)).await.unwrap());
        assert!(!store.register(record(7)).await.unwrap());
        assert_eq!(
            store.find_by_external_id(7).await.unwrap().map(|p| p.player_id),
            Some(7)
        );
        assert!(store.find_by_external_id(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn player_upsert_keeps_insertion_order() {
        let store = InMemoryStore::new();
        let session_id = Uuid::new_v4();
        let mut first = participation(session_id, 1, None);
        let second = participation(session_id, 2, Some(4));
        store.save_player_session(first.clone()).await.unwrap();
        store.save_player_session(second).await.unwrap();

        first.selected_card_code = Some(9);
        store.save_player_session(first).await.unwrap();

        let players = store.find_players_by_session_id(session_id).await.unwrap();
        let cards: Vec<_> = players.iter().map(|p| p.selected_card_code).collect();
        assert_eq!(cards, vec![Some(9), Some(4)]);

        let found = store
            .find_player_by_user_and_session(2, session_id)
            .await
            .unwrap();
        assert_eq!(found.and_then(|p| p.selected_card_code), Some(4));
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        assert!(store.health_check().await.is_err());
        assert!(store.register(record(1)).await.is_err());
        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
