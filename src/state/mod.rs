/// Session actor and its handle.
pub mod actor;
/// Card reservations of one session.
pub mod allocation;
/// Bingo card layout.
pub mod card;
/// Commands and replies exchanged with session actors.
pub mod messages;
/// Index of running sessions.
pub mod registry;
/// In-memory session and participation records.
pub mod session;
/// Session phases and transitions.
pub mod state_machine;
/// Background task bookkeeping.
pub mod tasks;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::session_store::{InMemoryStore, PlayerDirectory, SessionStore},
    services::cards::{CardBatchError, generate_card_batch},
};

pub use self::actor::SessionHandle;
use self::{card::Card, registry::SessionRegistry, tasks::ScheduledTasks};

/// Shared handle to [`AppState`] passed to routes, services and timers.
pub type SharedState = Arc<AppState>;

/// Central application state: storage, the session registry, timers and the card batch.
pub struct AppState {
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn PlayerDirectory>,
    config: Arc<AppConfig>,
    registry: SessionRegistry,
    countdowns: ScheduledTasks,
    callers: ScheduledTasks,
    cards: Arc<Vec<Card>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Generates the card batch once; card codes index into it for the process lifetime.
    pub fn new(
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn PlayerDirectory>,
        config: AppConfig,
    ) -> Result<SharedState, CardBatchError> {
        let config = Arc::new(config);
        let cards = generate_card_batch(config.card_batch_size)?;
        Ok(Arc::new(Self {
            registry: SessionRegistry::new(store.clone(), config.clone()),
            store,
            directory,
            config,
            countdowns: ScheduledTasks::new(),
            callers: ScheduledTasks::new(),
            cards: Arc::new(cards),
        }))
    }

    /// State backed by a single [`InMemoryStore`] acting as both store and directory.
    pub fn in_memory(config: AppConfig) -> Result<(SharedState, InMemoryStore), CardBatchError> {
        let store = InMemoryStore::new();
        let state = Self::new(Arc::new(store.clone()), Arc::new(store.clone()), config)?;
        Ok((state, store))
    }

    /// Persistence collaborator for sessions and participations.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Player registration and lookup.
    pub fn directory(&self) -> &Arc<dyn PlayerDirectory> {
        &self.directory
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Running sessions.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Countdown timers keyed by session code.
    pub fn countdowns(&self) -> &ScheduledTasks {
        &self.countdowns
    }

    /// Number-call timers keyed by session code.
    pub fn callers(&self) -> &ScheduledTasks {
        &self.callers
    }

    /// The whole card batch, ordered by code.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Card with the given 1-based code.
    pub fn card(&self, code: u32) -> Option<&Card> {
        let index = usize::try_from(code).ok()?.checked_sub(1)?;
        self.cards.get(index)
    }
}
