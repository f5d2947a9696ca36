use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dao::session_store::SessionStore,
    error::ServiceError,
    state::{
        actor::{SessionActor, SessionHandle},
        session::Session,
        state_machine::SessionPhase,
    },
};

/// Process-wide index of running sessions keyed by session code, in creation order.
pub struct SessionRegistry {
    sessions: RwLock<IndexMap<String, SessionHandle>>,
    store: Arc<dyn SessionStore>,
    config: Arc<AppConfig>,
    last_code_millis: AtomicU64,
}

impl SessionRegistry {
    /// Empty registry creating sessions backed by `store`.
    pub fn new(store: Arc<dyn SessionStore>, config: Arc<AppConfig>) -> Self {
        Self {
            sessions: RwLock::new(IndexMap::new()),
            store,
            config,
            last_code_millis: AtomicU64::new(0),
        }
    }

    /// Return the live session, creating and persisting a new one when none exists.
    ///
    /// Creation happens under the registry write lock so concurrent callers observe a single
    /// new session.
    pub async fn get_or_create_active(&self) -> Result<SessionHandle, ServiceError> {
        if let Some(handle) = self.find_active().await {
            return Ok(handle);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = first_active(&sessions) {
            return Ok(handle);
        }

        let session = Session::new(self.next_code(), self.config.countdown_seconds);
        self.store.save_session((&session).into()).await?;
        info!(
            session = %session.code,
            countdown = session.countdown,
            "created new session"
        );

        let code = session.code.clone();
        let handle = SessionActor::spawn(session, self.store.clone(), self.config.clone());
        sessions.insert(code, handle.clone());
        Ok(handle)
    }

    /// Look a tracked session up by code.
    pub async fn find(&self, code: &str) -> Result<SessionHandle, ServiceError> {
        self.sessions
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| ServiceError::SessionNotFound(code.to_owned()))
    }

    /// First session that has not ended and whose actor is still running.
    pub async fn find_active(&self) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        first_active(&sessions)
    }

    /// Snapshot of every tracked handle in creation order.
    pub async fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Drop a session from the index; its persisted record stays.
    pub async fn remove(&self, code: &str) -> Option<SessionHandle> {
        self.sessions.write().await.shift_remove(code)
    }

    #[cfg(test)]
    pub(crate) async fn codes(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Forget the oldest ended sessions so at most `keep` of them remain queryable.
    pub async fn prune_ended(&self, keep: usize) -> Vec<String> {
        let ended: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, handle)| handle.phase() == SessionPhase::Ended || handle.is_closed())
            .map(|(code, _)| code.clone())
            .collect();
        // ended sessions never reopen, so the oldest ones stay the oldest
        let excess = ended.len().saturating_sub(keep);
        let mut pruned = Vec::with_capacity(excess);
        for code in ended.into_iter().take(excess) {
            if self.remove(&code).await.is_some() {
                pruned.push(code);
            }
        }
        pruned
    }

    /// `GAME_<millis>`, strictly increasing even when two sessions are created within one
    /// millisecond.
    fn next_code(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        let mut last = self.last_code_millis.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self.last_code_millis.compare_exchange(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return format!("GAME_{candidate}"),
                Err(actual) => last = actual,
            }
        }
    }
}

fn first_active(sessions: &IndexMap<String, SessionHandle>) -> Option<SessionHandle> {
    let mut active = sessions
        .values()
        .filter(|handle| handle.phase().is_active() && !handle.is_closed());
    let first = active.next().cloned();
    let extra = active.count();
    if extra > 0 {
        warn!(
            active = extra + 1,
            "more than one active session tracked; using the oldest"
        );
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::session_store::InMemoryStore, state::state_machine::EndReason};

    fn registry() -> (Arc<SessionRegistry>, InMemoryStore) {
        let store = InMemoryStore::new();
        let registry = SessionRegistry::new(
            Arc::new(store.clone()),
            Arc::new(AppConfig::default()),
        );
        (Arc::new(registry), store)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_new_session() {
        let (registry, store) = registry();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create_active().await })
            })
            .collect();

        let mut codes = Vec::new();
        for task in tasks {
            codes.push(task.await.unwrap().unwrap().code().to_owned());
        }
        codes.dedup();
        assert_eq!(codes.len(), 1);
        assert_eq!(registry.codes().await, codes);

        let stored = store.find_session_by_code(codes[0].clone()).await.unwrap();
        let stored = stored.unwrap();
        assert_eq!(stored.phase, "cardSelection");
        assert_eq!(stored.countdown, 30);
        assert!(!stored.game_active);
    }

    #[tokio::test]
    async fn ended_session_is_replaced() {
        let (registry, _store) = registry();
        let first = registry.get_or_create_active().await.unwrap();
        first.end(EndReason::Manual).await.unwrap();

        let second = registry.get_or_create_active().await.unwrap();
        assert_ne!(first.code(), second.code());
        assert!(second.code().starts_with("GAME_"));
        assert_eq!(registry.find_active().await.map(|h| h.id()), Some(second.id()));
        // ended session is still queryable
        assert!(registry.find(first.code()).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let (registry, _store) = registry();
        match registry.find("GAME_0").await {
            Err(ServiceError::SessionNotFound(code)) => assert_eq!(code, "GAME_0"),
            other => panic!("expected not found, got {:?}", other.map(|h| h.id())),
        }
    }

    #[tokio::test]
    async fn creation_failure_propagates() {
        let (registry, store) = registry();
        store.set_offline(true);
        assert!(matches!(
            registry.get_or_create_active().await,
            Err(ServiceError::Unavailable(_))
        ));
        assert!(registry.codes().await.is_empty());
    }

    #[tokio::test]
    async fn prune_keeps_the_newest_ended_sessions() {
        let (registry, _store) = registry();
        let mut ended = Vec::new();
        for _ in 0..3 {
            let handle = registry.get_or_create_active().await.unwrap();
            handle.end(EndReason::Manual).await.unwrap();
            ended.push(handle.code().to_owned());
        }
        let live = registry.get_or_create_active().await.unwrap();

        let pruned = registry.prune_ended(1).await;
        assert_eq!(pruned, ended[..2].to_vec());
        assert_eq!(
            registry.codes().await,
            vec![ended[2].clone(), live.code().to_owned()]
        );
        assert!(registry.remove(live.code()).await.is_some());
        assert!(registry.remove(live.code()).await.is_none());
        assert!(registry.find_active().await.is_none());
    }
}
