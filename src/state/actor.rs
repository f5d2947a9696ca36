//! Single-writer task owning one session, its players and its card reservations.

use std::{collections::HashSet, sync::Arc, time::SystemTime};

use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::session_store::SessionStore,
    dto::session::SessionView,
    error::ServiceError,
    services::verifier,
    state::{
        allocation::{CardAllocationTable, CardHolder, Reservation},
        messages::{
            CountdownOutcome, DrawOutcome, JoinCommand, ReconcileReport, SessionCommand,
            WinnerScan,
        },
        session::{PlayerSession, Session},
        state_machine::{EndReason, SessionEvent, SessionPhase},
    },
};

const INBOX_CAPACITY: usize = 64;

/// Cloneable address of a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    code: Arc<str>,
    sender: mpsc::Sender<SessionCommand>,
    phase: watch::Receiver<SessionPhase>,
}

impl SessionHandle {
    /// Primary key of the session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Public session code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Last phase published by the actor.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Whether the actor is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| ServiceError::SessionClosed(self.code.to_string()))?;
        rx.await
            .map_err(|_| ServiceError::SessionClosed(self.code.to_string()))
    }

    /// Advance the countdown by one step.
    pub async fn countdown_tick(&self) -> Result<CountdownOutcome, ServiceError> {
        self.request(|respond_to| SessionCommand::CountdownTick { respond_to })
            .await?
    }

    /// Draw the next number.
    pub async fn draw_number(&self) -> Result<DrawOutcome, ServiceError> {
        self.request(|respond_to| SessionCommand::DrawNumber { respond_to })
            .await
    }

    /// Join the session, reserving the requested card.
    pub async fn join(&self, request: JoinCommand) -> Result<SessionView, ServiceError> {
        self.request(|respond_to| SessionCommand::Join {
            request,
            respond_to,
        })
        .await?
    }

    /// Verify a player's win claim.
    pub async fn call_bingo(&self, player_id: i64) -> Result<SessionView, ServiceError> {
        self.request(|respond_to| SessionCommand::CallBingo {
            player_id,
            respond_to,
        })
        .await?
    }

    /// Scan every selected card for a win.
    pub async fn check_for_winner(&self) -> Result<WinnerScan, ServiceError> {
        self.request(|respond_to| SessionCommand::CheckForWinner { respond_to })
            .await
    }

    /// End the round; returns `false` when it had already ended.
    pub async fn end(&self, reason: EndReason) -> Result<bool, ServiceError> {
        self.request(|respond_to| SessionCommand::End { reason, respond_to })
            .await
    }

    /// Render the session for a player or a spectator.
    pub async fn view(&self, viewer: Option<i64>) -> Result<SessionView, ServiceError> {
        self.request(|respond_to| SessionCommand::View { viewer, respond_to })
            .await
    }

    /// Audit players and reservations.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ServiceError> {
        self.request(|respond_to| SessionCommand::Reconcile { respond_to })
            .await
    }
}

/// Actor owning a [`Session`]; every mutation of the session goes through its inbox.
pub struct SessionActor {
    session: Session,
    players: IndexMap<Uuid, PlayerSession>,
    allocation: CardAllocationTable,
    store: Arc<dyn SessionStore>,
    config: Arc<AppConfig>,
    phase_tx: watch::Sender<SessionPhase>,
    inbox: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    /// Spawn an actor for `session` and return its handle.
    ///
    /// The actor stops once every handle is dropped.
    pub fn spawn(
        session: Session,
        store: Arc<dyn SessionStore>,
        config: Arc<AppConfig>,
    ) -> SessionHandle {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (phase_tx, phase_rx) = watch::channel(session.phase());
        let handle = SessionHandle {
            id: session.id,
            code: Arc::from(session.code.as_str()),
            sender,
            phase: phase_rx,
        };

        let actor = Self {
            allocation: CardAllocationTable::new(session.code.clone()),
            session,
            players: IndexMap::new(),
            store,
            config,
            phase_tx,
            inbox,
        };
        tokio::spawn(actor.run());

        handle
    }

    async fn run(mut self) {
        debug!(session = %self.session.code, "session actor started");
        while let Some(command) = self.inbox.recv().await {
            self.handle(command).await;
        }
        debug!(session = %self.session.code, "session actor stopped");
    }

    async fn handle(&mut self, command: SessionCommand) {
        // a dropped reply only means the caller stopped waiting
        match command {
            SessionCommand::CountdownTick { respond_to } => {
                let _ = respond_to.send(self.countdown_tick().await);
            }
            SessionCommand::DrawNumber { respond_to } => {
                let _ = respond_to.send(self.draw_number().await);
            }
            SessionCommand::Join {
                request,
                respond_to,
            } => {
                let _ = respond_to.send(self.join(request).await);
            }
            SessionCommand::CallBingo {
                player_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.call_bingo(player_id).await);
            }
            SessionCommand::CheckForWinner { respond_to } => {
                let _ = respond_to.send(self.check_for_winner().await);
            }
            SessionCommand::End { reason, respond_to } => {
                let _ = respond_to.send(self.end(reason).await);
            }
            SessionCommand::View { viewer, respond_to } => {
                let _ = respond_to.send(self.view(viewer));
            }
            SessionCommand::Reconcile { respond_to } => {
                let _ = respond_to.send(self.reconcile().await);
            }
        }
    }

    fn view(&self, viewer: Option<i64>) -> SessionView {
        SessionView::project(
            &self.session,
            &self.players,
            &self.allocation,
            viewer,
            self.config.join_cutoff_seconds,
        )
    }

    async fn countdown_tick(&mut self) -> Result<CountdownOutcome, ServiceError> {
        if self.session.phase() != SessionPhase::CardSelection {
            return Ok(CountdownOutcome::Inactive);
        }

        self.session.countdown = self.session.countdown.saturating_sub(1);
        self.session.touch();

        if self.session.countdown > 0 {
            self.persist_session().await;
            return Ok(CountdownOutcome::Running {
                remaining: self.session.countdown,
            });
        }

        let phase = self.session.lifecycle.apply(SessionEvent::CountdownElapsed)?;
        self.session.game_active = true;
        self.phase_tx.send_replace(phase);
        self.persist_session().await;
        info!(
            session = %self.session.code,
            players = self.players.len(),
            version = self.session.lifecycle.version(),
            "countdown elapsed; entering game room"
        );
        Ok(CountdownOutcome::Elapsed)
    }

    async fn draw_number(&mut self) -> DrawOutcome {
        match self.session.phase() {
            SessionPhase::Ended => return DrawOutcome::Inactive,
            SessionPhase::CardSelection => return DrawOutcome::Idle,
            SessionPhase::GameRoom => {}
        }
        if !self.session.game_active {
            return if self.session.winner.is_some() {
                DrawOutcome::WinnerDeclared
            } else {
                DrawOutcome::Idle
            };
        }

        let available = self.session.available_numbers();
        let picked = {
            let mut rng = rand::rng();
            available.choose(&mut rng).copied()
        };
        let Some(number) = picked else {
            info!(session = %self.session.code, "all numbers called");
            return DrawOutcome::Exhausted;
        };

        self.session.record_call(number);
        info!(
            session = %self.session.code,
            number,
            called = self.session.called_numbers.len(),
            "number called"
        );

        if self.config.auto_detect_winner {
            if let Some(winner) = self.first_winning_player() {
                self.declare_winner(winner).await;
                return DrawOutcome::WinnerDeclared;
            }
        }

        self.persist_session().await;
        DrawOutcome::Drawn {
            number,
            remaining: available.len() - 1,
        }
    }

    async fn join(&mut self, request: JoinCommand) -> Result<SessionView, ServiceError> {
        match self.session.phase() {
            SessionPhase::Ended => {
                return Err(ServiceError::SessionClosed(self.session.code.clone()));
            }
            SessionPhase::GameRoom => return Err(ServiceError::GameAlreadyInProgress),
            SessionPhase::CardSelection if self.session.game_active => {
                return Err(ServiceError::GameAlreadyInProgress);
            }
            SessionPhase::CardSelection => {}
        }
        if self.session.countdown < self.config.join_cutoff_seconds {
            return Err(ServiceError::JoinWindowClosing {
                countdown: self.session.countdown,
            });
        }

        let player_id = request.player.player_id;
        let mut player = self.load_or_create_player(&request).await?;
        player.player = request.player;
        let holder = CardHolder {
            player_session_id: player.id,
            player_id,
        };

        let previous = player.selected_card_code;
        let mut changed_to = None;
        if let Some(selection) = request.card {
            if previous != Some(selection.code) {
                if let Some(old) = previous {
                    self.allocation.release(old);
                }
                if let Reservation::AlreadyTaken { holder: current } =
                    self.allocation.try_reserve(selection.code, holder)
                {
                    if let Some(old) = previous {
                        self.allocation.try_reserve(old, holder);
                    }
                    debug!(
                        session = %self.session.code,
                        card = selection.code,
                        player = player_id,
                        holder = current.player_id,
                        "card already taken"
                    );
                    return Err(ServiceError::CardAlreadyTaken {
                        card_code: selection.code,
                        holder: Some(current.player_id),
                    });
                }
                changed_to = Some(selection.code);
            }
            player.selected_card_code = Some(selection.code);
            player.card_grid = Some(selection.grid);
        }
        player.updated_at = SystemTime::now();

        if let Err(err) = self.store.save_player_session((&player).into()).await {
            if let Some(code) = changed_to {
                self.allocation.release(code);
                if let Some(old) = previous {
                    self.allocation.try_reserve(old, holder);
                }
            }
            warn!(
                session = %self.session.code,
                player = player_id,
                error = %err,
                "failed to persist join; reservation rolled back"
            );
            return Err(err.into());
        }

        info!(
            session = %self.session.code,
            player = player_id,
            card = ?player.selected_card_code,
            "player joined"
        );
        self.players.insert(player.id, player);
        self.dedupe_players().await;
        self.allocation.reconcile(self.players.values());
        self.session.touch();
        self.persist_session().await;

        Ok(self.view(Some(player_id)))
    }

    async fn load_or_create_player(
        &self,
        request: &JoinCommand,
    ) -> Result<PlayerSession, ServiceError> {
        let player_id = request.player.player_id;
        if let Some(existing) = self.find_player(player_id) {
            return Ok(existing.clone());
        }

        match self
            .store
            .find_player_by_user_and_session(player_id, self.session.id)
            .await
        {
            Ok(Some(entity)) => PlayerSession::try_from(entity),
            Ok(None) => Ok(PlayerSession::new(self.session.id, request.player.clone())),
            Err(err) => {
                warn!(
                    session = %self.session.code,
                    player = player_id,
                    error = %err,
                    "player lookup failed; creating a fresh participation"
                );
                Ok(PlayerSession::new(self.session.id, request.player.clone()))
            }
        }
    }

    async fn call_bingo(&mut self, player_id: i64) -> Result<SessionView, ServiceError> {
        let Some(id) = self.find_player(player_id).map(|p| p.id) else {
            return Err(ServiceError::PlayerNotInSession {
                player_id,
                session_code: self.session.code.clone(),
            });
        };
        if self.session.winner.is_some() {
            return Err(ServiceError::ClaimNotAllowed(
                "a winner has already been declared".into(),
            ));
        }
        if self.session.phase() != SessionPhase::GameRoom || !self.session.game_active {
            return Err(ServiceError::ClaimNotAllowed(
                "numbers are not being called".into(),
            ));
        }

        let called = &self.session.called_numbers;
        let Some(player) = self.players.get_mut(&id) else {
            return Err(ServiceError::InternalState(format!(
                "player session {id} vanished"
            )));
        };
        if player.claim_rejected {
            return Err(ServiceError::InvalidBingoClaim);
        }
        let Some(grid) = player.card_grid.as_ref() else {
            return Err(ServiceError::ClaimNotAllowed("no card selected".into()));
        };

        if verifier::verify(grid, called) {
            self.declare_winner(id).await;
            return Ok(self.view(Some(player_id)));
        }

        player.is_winner = false;
        player.claim_rejected = true;
        player.updated_at = SystemTime::now();
        let entity = (&*player).into();
        if let Err(err) = self.store.save_player_session(entity).await {
            warn!(
                session = %self.session.code,
                player = player_id,
                error = %err,
                "failed to persist rejected claim"
            );
        }
        info!(session = %self.session.code, player = player_id, "false bingo claim");
        Err(ServiceError::InvalidBingoClaim)
    }

    async fn check_for_winner(&mut self) -> WinnerScan {
        if self.session.winner.is_some() {
            return WinnerScan::AlreadyDeclared;
        }
        if self.session.phase() == SessionPhase::Ended {
            return WinnerScan::NoWinner;
        }
        match self.first_winning_player() {
            Some(id) => {
                self.declare_winner(id).await;
                let player_id = self.players.get(&id).map(PlayerSession::player_id);
                WinnerScan::Found {
                    player_id: player_id.unwrap_or_default(),
                }
            }
            None => WinnerScan::NoWinner,
        }
    }

    /// First player, in join order, whose card has a full line.
    ///
    /// Players whose claim was rejected this round are out of the running.
    fn first_winning_player(&self) -> Option<Uuid> {
        self.players
            .values()
            .filter(|p| p.selected_card_code.is_some() && !p.claim_rejected)
            .find(|p| {
                p.card_grid
                    .as_ref()
                    .is_some_and(|grid| verifier::verify(grid, &self.session.called_numbers))
            })
            .map(|p| p.id)
    }

    async fn declare_winner(&mut self, id: Uuid) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        player.is_winner = true;
        player.updated_at = SystemTime::now();
        let entity = (&*player).into();
        let player_id = player.player_id();

        self.session.winner = Some(id);
        self.session.game_active = false;
        self.session.touch();

        if let Err(err) = self.store.save_player_session(entity).await {
            warn!(
                session = %self.session.code,
                player = player_id,
                error = %err,
                "failed to persist winner"
            );
        }
        self.persist_session().await;
        info!(session = %self.session.code, player = player_id, "winner declared");
    }

    async fn end(&mut self, reason: EndReason) -> bool {
        let phase = match self.session.lifecycle.apply(SessionEvent::End(reason)) {
            Ok(phase) => phase,
            Err(err) => {
                debug!(session = %self.session.code, error = %err, "session already ended");
                return false;
            }
        };

        self.session.game_active = false;
        self.session.ended_at = Some(SystemTime::now());
        self.session.touch();
        self.phase_tx.send_replace(phase);
        self.dedupe_players().await;
        self.persist_session().await;

        // the persisted record keeps the call trace; only the live indexes are released
        self.allocation.clear();
        self.session.called_numbers_ordered.clear();

        info!(
            session = %self.session.code,
            reason = reason.as_str(),
            called = self.session.called_numbers.len(),
            version = self.session.lifecycle.version(),
            "session ended"
        );
        true
    }

    async fn reconcile(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        match self.store.find_players_by_session_id(self.session.id).await {
            Ok(entities) => {
                for entity in entities {
                    match PlayerSession::try_from(entity) {
                        Ok(stored) => {
                            let known = self.players.contains_key(&stored.id)
                                || self.find_player(stored.player_id()).is_some();
                            if !known {
                                self.players.insert(stored.id, stored);
                                report.players_restored += 1;
                            }
                        }
                        Err(err) => {
                            warn!(
                                session = %self.session.code,
                                error = %err,
                                "skipping unreadable player record"
                            );
                        }
                    }
                }
            }
            Err(err) => {
                warn!(
                    session = %self.session.code,
                    error = %err,
                    "player list unavailable; auditing in-memory players only"
                );
            }
        }

        let (duplicates_removed, conflicts_cleared) = self.dedupe_players().await;
        report.duplicates_removed = duplicates_removed;
        report.conflicts_cleared = conflicts_cleared;

        if self.session.phase().is_active() {
            let audit = self.allocation.reconcile(self.players.values());
            report.orphaned = audit.orphaned;
            report.reservations_restored = audit.restored;
        }
        report.players = self.players.len();
        report
    }

    /// Keep one entry per player and one holder per card, first come first kept.
    ///
    /// Returns `(duplicates_removed, conflicts_cleared)`.
    async fn dedupe_players(&mut self) -> (usize, usize) {
        let mut seen_players = HashSet::new();
        let before = self.players.len();
        self.players.retain(|_, p| seen_players.insert(p.player_id()));
        let duplicates_removed = before - self.players.len();

        let mut seen_cards = HashSet::new();
        let mut cleared = Vec::new();
        for player in self.players.values_mut() {
            if let Some(code) = player.selected_card_code {
                if !seen_cards.insert(code) {
                    player.selected_card_code = None;
                    player.card_grid = None;
                    player.updated_at = SystemTime::now();
                    cleared.push(player.id);
                }
            }
        }

        for id in &cleared {
            if let Some(player) = self.players.get(id) {
                if let Err(err) = self.store.save_player_session(player.into()).await {
                    warn!(
                        session = %self.session.code,
                        player = player.player_id(),
                        error = %err,
                        "failed to persist cleared card"
                    );
                }
            }
        }

        if duplicates_removed > 0 || !cleared.is_empty() {
            warn!(
                session = %self.session.code,
                duplicates_removed,
                conflicts_cleared = cleared.len(),
                "cleaned up player list"
            );
        }
        (duplicates_removed, cleared.len())
    }

    fn find_player(&self, player_id: i64) -> Option<&PlayerSession> {
        self.players.values().find(|p| p.player_id() == player_id)
    }

    async fn persist_session(&self) {
        if let Err(err) = self.store.save_session((&self.session).into()).await {
            warn!(session = %self.session.code, error = %err, "failed to persist session");
        }
    }
}
