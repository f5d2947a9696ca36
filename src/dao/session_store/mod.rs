pub mod memory;

use crate::dao::models::{PlayerRecord, PlayerSessionEntity, SessionEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use self::memory::InMemoryStore;

/// Abstraction over the persistence layer for sessions and player participations.
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session record.
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Insert or replace a player participation record.
    fn save_player_session(
        &self,
        player: PlayerSessionEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Look a session up by its public code.
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Participations of one session in the order they were first saved.
    fn find_players_by_session_id(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerSessionEntity>>>;
    /// Participation of one player in one session.
    fn find_player_by_user_and_session(
        &self,
        player_id: i64,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerSessionEntity>>>;
    /// Cheap liveness check.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Registration and lookup of players.
pub trait PlayerDirectory: Send + Sync {
    /// Find a player by the identifier the front-end knows them by.
    fn find_by_external_id(
        &self,
        player_id: i64,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerRecord>>>;
    /// Store a new player; returns `false` when the id is already registered.
    fn register(&self, player: PlayerRecord) -> BoxFuture<'static, StorageResult<bool>>;
}
