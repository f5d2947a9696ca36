use std::collections::BTreeSet;

use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use crate::{
    dto::session::{AvailableCardsResponse, JoinRequest, RandomCardResponse, SessionView},
    error::ServiceError,
    services::{countdown, number_caller},
    state::{
        SessionHandle, SharedState,
        allocation::CardAllocationTable,
        card::Card,
        messages::{CardSelection, JoinCommand, WinnerScan},
        session::{PlayerSession, Session},
        state_machine::{EndReason, SessionPhase},
    },
};

const SESSION_ERROR: &str = "Error loading game session";
const NEXT_GAME_ERROR: &str = "Error loading next game information";
const STATUS_ERROR: &str = "Error loading game status. Please try again later.";

/// Make sure a session is open for card selection when the server starts.
pub async fn bootstrap(state: &SharedState) -> Result<(), ServiceError> {
    let handle = active_session(state).await?;
    info!(session = %handle.code(), "initial session ready");
    Ok(())
}

/// Live session, created when none exists, with its countdown running while it is still
/// selecting cards.
pub async fn active_session(state: &SharedState) -> Result<SessionHandle, ServiceError> {
    let handle = state.registry().get_or_create_active().await?;
    countdown::ensure_scheduled(state, &handle);
    Ok(handle)
}

/// The card batch generated at startup.
pub fn cards(state: &SharedState) -> Vec<Card> {
    state.cards().to_vec()
}

/// Join the active session as a registered player.
///
/// A card code without numbers picks the numbers from the card batch. A session that closes
/// between lookup and join is retried once against its successor.
pub async fn join(state: &SharedState, request: JoinRequest) -> Result<SessionView, ServiceError> {
    let player = state
        .directory()
        .find_by_external_id(request.player_id)
        .await?
        .ok_or(ServiceError::PlayerNotRegistered(request.player_id))?;

    let card = match (request.card_code, request.card_numbers) {
        (None, None) => None,
        (None, Some(_)) => {
            return Err(ServiceError::InvalidInput(
                "card numbers require a card code".into(),
            ));
        }
        (Some(code), numbers) => {
            let batch_card = state.card(code).ok_or_else(|| {
                ServiceError::InvalidInput(format!(
                    "card code {code} is outside 1..={}",
                    state.cards().len()
                ))
            })?;
            let grid = numbers.unwrap_or_else(|| batch_card.numbers.clone());
            if !grid.is_well_formed() {
                return Err(ServiceError::InvalidInput(
                    "card numbers must be a 5x5 grid".into(),
                ));
            }
            Some(CardSelection { code, grid })
        }
    };
    let command = JoinCommand { player, card };

    let handle = active_session(state).await?;
    match handle.join(command.clone()).await {
        Err(ServiceError::SessionClosed(code)) => {
            debug!(session = %code, "session closed during join; retrying on its successor");
            active_session(state).await?.join(command).await
        }
        other => other,
    }
}

/// Session by code, rendered for a spectator.
///
/// Sessions no longer tracked in memory are rendered from their stored record.
pub async fn get_session(state: &SharedState, code: &str) -> Result<SessionView, ServiceError> {
    match state.registry().find(code).await {
        Ok(handle) => Ok(view_or_degraded(&handle, None).await),
        Err(ServiceError::SessionNotFound(_)) => archived_view(state, code, None).await,
        Err(err) => Err(err),
    }
}

/// Session by code, rendered for one player.
pub async fn get_session_for_player(
    state: &SharedState,
    code: &str,
    player_id: i64,
) -> Result<SessionView, ServiceError> {
    match state.registry().find(code).await {
        Ok(handle) => Ok(view_or_degraded(&handle, Some(player_id)).await),
        Err(ServiceError::SessionNotFound(_)) => {
            archived_view(state, code, Some(player_id)).await
        }
        Err(err) => Err(err),
    }
}

/// The live session, creating one when needed. Never fails.
pub async fn get_active_session(state: &SharedState) -> SessionView {
    match active_session(state).await {
        Ok(handle) => view_or_degraded(&handle, None).await,
        Err(err) => {
            warn!(error = %err, "failed to load the active session");
            SessionView::degraded(SESSION_ERROR)
        }
    }
}

/// Active session with a message telling newcomers when they can play.
pub async fn get_next_game_info(state: &SharedState) -> SessionView {
    let cutoff = state.config().join_cutoff_seconds;
    match resynced_active_view(state).await {
        Ok(mut view) => {
            let message = if view.is_in_progress() {
                "Current game is in progress. A new game will start automatically when this one ends."
                    .to_owned()
            } else if view.countdown < cutoff {
                "Game is about to start! Please wait for the next round.".to_owned()
            } else {
                "New game is available! Select a card to join.".to_owned()
            };
            view.wait_message = Some(message);
            view
        }
        Err(err) => {
            warn!(error = %err, "failed to load next game information");
            SessionView::degraded(NEXT_GAME_ERROR)
        }
    }
}

/// Active session with a status line including the remaining countdown.
pub async fn get_detailed_status(state: &SharedState) -> SessionView {
    let cutoff = state.config().join_cutoff_seconds;
    match resynced_active_view(state).await {
        Ok(mut view) => {
            let message = if view.is_in_progress() {
                "Game is currently in progress! You can watch the current game or wait for the next round. A new game will start automatically when this one ends."
                    .to_owned()
            } else if view.countdown < cutoff {
                format!(
                    "Game is about to start in {} seconds! Please wait for the next round.",
                    view.countdown
                )
            } else if view.countdown > 0 {
                format!(
                    "Game is open for players! Join now with {} seconds remaining to select your card.",
                    view.countdown
                )
            } else {
                "New game is available! Select a card to join and start playing.".to_owned()
            };
            view.wait_message = Some(message);
            view
        }
        Err(err) => {
            warn!(error = %err, "failed to load game status");
            SessionView::degraded(STATUS_ERROR)
        }
    }
}

/// Claim a win in the active session.
pub async fn call_bingo(state: &SharedState, player_id: i64) -> Result<SessionView, ServiceError> {
    state
        .directory()
        .find_by_external_id(player_id)
        .await?
        .ok_or(ServiceError::PlayerNotRegistered(player_id))?;

    let handle = state
        .registry()
        .find_active()
        .await
        .ok_or_else(|| ServiceError::SessionNotFound("active".into()))?;
    let view = handle.call_bingo(player_id).await?;
    info!(session = %handle.code(), player_id, "bingo verified");
    Ok(view)
}

/// Start drawing numbers for a session already in the game room.
///
/// Returns `false` when a caller is already running.
pub async fn start_calling(state: &SharedState, code: &str) -> Result<bool, ServiceError> {
    let handle = state.registry().find(code).await?;
    match handle.phase() {
        SessionPhase::GameRoom => Ok(number_caller::start(state, &handle)),
        SessionPhase::CardSelection => Err(ServiceError::InvalidInput(format!(
            "session {code} is still selecting cards"
        ))),
        SessionPhase::Ended => Err(ServiceError::SessionClosed(code.to_owned())),
    }
}

/// End a session, stop its timers and open the next round.
///
/// Returns `false` when the session had already ended; the next round is still guaranteed.
pub async fn end_session(
    state: &SharedState,
    code: &str,
    reason: EndReason,
) -> Result<bool, ServiceError> {
    let handle = state.registry().find(code).await?;
    let ended = close(state, &handle, reason).await?;

    let pruned = state
        .registry()
        .prune_ended(state.config().retained_ended_sessions)
        .await;
    if !pruned.is_empty() {
        debug!(sessions = ?pruned, "pruned ended sessions");
    }

    let next = active_session(state).await?;
    info!(ended = %code, next = %next.code(), "next round open");
    Ok(ended)
}

/// End every tracked session and return a fresh one.
pub async fn restart(state: &SharedState) -> Result<SessionView, ServiceError> {
    info!("restarting sessions");
    for handle in state.registry().handles().await {
        if let Err(err) = close(state, &handle, EndReason::Restart).await {
            warn!(session = %handle.code(), error = %err, "failed to end session during restart");
        }
    }
    state
        .registry()
        .prune_ended(state.config().retained_ended_sessions)
        .await;

    let handle = active_session(state).await?;
    info!(session = %handle.code(), "restart complete");
    handle.view(None).await
}

/// Scan a session for a completed line; a new winner ends the session.
pub async fn check_for_winner(
    state: &SharedState,
    code: &str,
) -> Result<SessionView, ServiceError> {
    let handle = state.registry().find(code).await?;
    match handle.check_for_winner().await? {
        WinnerScan::Found { player_id } => {
            info!(session = %code, player_id, "winner found by scan");
            end_session(state, code, EndReason::WinnerDeclared).await?;
        }
        WinnerScan::AlreadyDeclared | WinnerScan::NoWinner => {}
    }
    handle.view(None).await
}

/// Card codes still free in a session.
pub async fn available_cards(
    state: &SharedState,
    code: &str,
) -> Result<AvailableCardsResponse, ServiceError> {
    let view = state.registry().find(code).await?.view(None).await?;
    let taken = view.selected_card_codes;
    let available = free_codes(state, &taken);
    Ok(AvailableCardsResponse {
        session_code: view.session_code,
        available_count: available.len(),
        available,
        taken,
        total: state.cards().len(),
    })
}

/// One free card of a session picked uniformly, if any is left.
pub async fn random_available_card(
    state: &SharedState,
    code: &str,
) -> Result<RandomCardResponse, ServiceError> {
    let view = state.registry().find(code).await?.view(None).await?;
    let available = free_codes(state, &view.selected_card_codes);
    let card = available
        .choose(&mut rand::rng())
        .and_then(|code| state.card(*code));
    Ok(RandomCardResponse {
        session_code: view.session_code,
        card_code: card.map(|card| card.code),
        card_numbers: card.map(|card| card.numbers.clone()),
        available_count: available.len(),
    })
}

async fn close(
    state: &SharedState,
    handle: &SessionHandle,
    reason: EndReason,
) -> Result<bool, ServiceError> {
    state.countdowns().cancel(handle.code());
    state.callers().cancel(handle.code());
    let ended = handle.end(reason).await?;
    if ended {
        info!(session = %handle.code(), reason = reason.as_str(), "session ended");
    }
    Ok(ended)
}

/// Render a pruned session from the store. Its reservations were released when it ended.
async fn archived_view(
    state: &SharedState,
    code: &str,
    viewer: Option<i64>,
) -> Result<SessionView, ServiceError> {
    let entity = state
        .store()
        .find_session_by_code(code.to_owned())
        .await?
        .ok_or_else(|| ServiceError::SessionNotFound(code.to_owned()))?;
    let session = Session::try_from(entity)?;

    let mut players = IndexMap::new();
    for entity in state.store().find_players_by_session_id(session.id).await? {
        let player = PlayerSession::try_from(entity)?;
        players.insert(player.id, player);
    }
    debug!(session = %session.code, players = players.len(), "rendering archived session");

    let allocation = CardAllocationTable::new(session.code.clone());
    Ok(SessionView::project(
        &session,
        &players,
        &allocation,
        viewer,
        state.config().join_cutoff_seconds,
    ))
}

async fn view_or_degraded(handle: &SessionHandle, viewer: Option<i64>) -> SessionView {
    match handle.view(viewer).await {
        Ok(view) => view,
        Err(err) => {
            warn!(session = %handle.code(), error = %err, "failed to render session");
            SessionView::degraded(SESSION_ERROR)
        }
    }
}

async fn resynced_active_view(state: &SharedState) -> Result<SessionView, ServiceError> {
    let handle = active_session(state).await?;
    let report = handle.reconcile().await?;
    debug!(session = %handle.code(), ?report, "card tracking resynced");
    handle.view(None).await
}

fn free_codes(state: &SharedState, taken: &[u32]) -> Vec<u32> {
    let taken: BTreeSet<u32> = taken.iter().copied().collect();
    state
        .cards()
        .iter()
        .map(|card| card.code)
        .filter(|code| !taken.contains(code))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::PlayerRecord, session_store::InMemoryStore},
        services::verifier,
        state::AppState,
    };

    fn state() -> (SharedState, InMemoryStore) {
        let config = AppConfig {
            card_batch_size: 20,
            ..AppConfig::default()
        };
        AppState::in_memory(config).unwrap()
    }

    async fn register(state: &SharedState, player_id: i64, name: &str) {
        let record = PlayerRecord {
            player_id,
            first_name: Some(name.into()),
            last_name: None,
            user_name: None,
            registered_at: std::time::SystemTime::now(),
        };
        assert!(state.directory().register(record).await.unwrap());
    }

    fn join_request(player_id: i64, card_code: Option<u32>) -> JoinRequest {
        JoinRequest {
            player_id,
            card_code,
            card_numbers: None,
        }
    }

    /// Sleep one call interval at a time until `player_id`'s card completes a line, then claim.
    async fn claim_when_complete(
        state: &SharedState,
        code: &str,
        player_id: i64,
        card_code: u32,
    ) -> SessionView {
        let grid = state.card(card_code).unwrap().numbers.clone();
        for _ in 0..80 {
            let view = get_session(state, code).await.unwrap();
            let called: BTreeSet<u8> = view.called_numbers.iter().copied().collect();
            if verifier::verify(&grid, &called) {
                return call_bingo(state, player_id).await.unwrap();
            }
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        panic!("card {card_code} never completed a line");
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_player_cannot_join() {
        let (state, _store) = state();
        assert!(matches!(
            join(&state, join_request(99, Some(1))).await,
            Err(ServiceError::PlayerNotRegistered(99))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn card_code_outside_batch_is_rejected() {
        let (state, _store) = state();
        register(&state, 1, "Abebe").await;
        assert!(matches!(
            join(&state, join_request(1, Some(21))).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn join_resolves_numbers_from_the_batch() {
        let (state, _store) = state();
        register(&state, 1, "Abebe").await;

        let view = join(&state, join_request(1, Some(7))).await.unwrap();
        assert_eq!(view.selected_card_codes, vec![7]);
        assert!(view.has_selected_card);
        assert_eq!(view.players[0].selected_card_code, Some(7));

        let cards = available_cards(&state, &view.session_code).await.unwrap();
        assert_eq!(cards.taken, vec![7]);
        assert_eq!(cards.available_count, 19);
        assert_eq!(cards.total, 20);
        assert!(!cards.available.contains(&7));

        let random = random_available_card(&state, &view.session_code).await.unwrap();
        assert_ne!(random.card_code, Some(7));
        assert!(random.card_code.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_leads_to_game_room_and_calls() {
        let (state, _store) = state();
        register(&state, 1, "Abebe").await;
        let code = join(&state, join_request(1, Some(3)))
            .await
            .unwrap()
            .session_code;

        tokio::time::sleep(Duration::from_millis(29_500)).await;
        let waiting = get_session(&state, &code).await.unwrap();
        assert_eq!(waiting.phase, "cardSelection");
        assert!(waiting.called_numbers.is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let playing = get_session(&state, &code).await.unwrap();
        assert_eq!(playing.phase, "gameRoom");
        assert!(playing.game_active);
        assert_eq!(playing.called_numbers.len(), 1);
        assert!(playing.current_call_with_letter.is_some());

        // joining is refused once the game room is open
        register(&state, 2, "Sara").await;
        assert!(matches!(
            join(&state, join_request(2, Some(4))).await,
            Err(ServiceError::GameAlreadyInProgress)
        ));

        let status = get_detailed_status(&state).await;
        assert!(status.wait_message.unwrap().starts_with("Game is currently in progress"));
    }

    #[tokio::test(start_paused = true)]
    async fn verified_claim_ends_round_on_next_call() {
        let (state, _store) = state();
        register(&state, 1, "Abebe").await;
        let code = join(&state, join_request(1, Some(5)))
            .await
            .unwrap()
            .session_code;
        tokio::time::sleep(Duration::from_millis(30_500)).await;

        let claimed = claim_when_complete(&state, &code, 1, 5).await;
        assert_eq!(claimed.winner.as_deref(), Some("Abebe"));
        assert!(!claimed.game_active);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let ended = get_session(&state, &code).await.unwrap();
        assert_eq!(ended.phase, "ended");
        assert_eq!(ended.winner.as_deref(), Some("Abebe"));
        assert_eq!(
            ended.winning_card_numbers,
            Some(state.card(5).unwrap().numbers.clone())
        );

        let next = get_active_session(&state).await;
        assert_ne!(next.session_code, code);
        assert_eq!(next.phase, "cardSelection");
    }

    #[tokio::test(start_paused = true)]
    async fn winner_scan_ends_session_immediately() {
        let (state, _store) = state();
        register(&state, 1, "Abebe").await;
        let code = join(&state, join_request(1, Some(9)))
            .await
            .unwrap()
            .session_code;
        tokio::time::sleep(Duration::from_millis(30_500)).await;

        let grid = state.card(9).unwrap().numbers.clone();
        loop {
            let view = check_for_winner(&state, &code).await.unwrap();
            let called: BTreeSet<u8> = view.called_numbers.iter().copied().collect();
            if view.phase == "ended" {
                assert!(verifier::verify(&grid, &called));
                assert_eq!(view.winner.as_deref(), Some("Abebe"));
                break;
            }
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        assert!(!state.callers().contains(&code));
        assert_ne!(get_active_session(&state).await.session_code, code);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_running_session() {
        let (state, _store) = state();
        let first = get_active_session(&state).await.session_code;
        assert!(state.countdowns().contains(&first));

        let fresh = restart(&state).await.unwrap();
        assert_ne!(fresh.session_code, first);
        assert_eq!(fresh.phase, "cardSelection");
        assert_eq!(fresh.countdown, 30);
        assert!(!state.countdowns().contains(&first));
        assert!(state.countdowns().contains(&fresh.session_code));
        assert_eq!(get_session(&state, &first).await.unwrap().phase, "ended");
    }

    #[tokio::test(start_paused = true)]
    async fn ending_twice_keeps_one_successor() {
        let (state, _store) = state();
        let first = get_active_session(&state).await.session_code;

        assert!(end_session(&state, &first, EndReason::Manual).await.unwrap());
        let second = get_active_session(&state).await.session_code;
        assert!(!end_session(&state, &first, EndReason::Manual).await.unwrap());
        assert_eq!(get_active_session(&state).await.session_code, second);
    }

    #[tokio::test(start_paused = true)]
    async fn pruned_session_is_served_from_the_store() {
        let config = AppConfig {
            card_batch_size: 20,
            retained_ended_sessions: 0,
            ..AppConfig::default()
        };
        let (state, _store) = AppState::in_memory(config).unwrap();
        register(&state, 1, "Abebe").await;
        let code = join(&state, join_request(1, Some(4)))
            .await
            .unwrap()
            .session_code;

        assert!(end_session(&state, &code, EndReason::Manual).await.unwrap());
        assert!(matches!(
            state.registry().find(&code).await,
            Err(ServiceError::SessionNotFound(_))
        ));

        let archived = get_session(&state, &code).await.unwrap();
        assert_eq!(archived.phase, "ended");
        assert_eq!(archived.player_count, 1);
        assert!(archived.selected_card_codes.is_empty());
        let for_player = get_session_for_player(&state, &code, 1).await.unwrap();
        assert_eq!(for_player.session_code, code);

        assert!(matches!(
            get_session(&state, "GAME_0").await,
            Err(ServiceError::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn read_paths_degrade_when_storage_is_down() {
        let (state, store) = state();
        store.set_offline(true);

        let view = get_active_session(&state).await;
        assert_eq!(view.phase, "error");
        assert_eq!(get_next_game_info(&state).await.wait_message.as_deref(), Some(NEXT_GAME_ERROR));
        assert_eq!(get_detailed_status(&state).await.wait_message.as_deref(), Some(STATUS_ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn next_game_info_for_open_session() {
        let (state, _store) = state();
        let view = get_next_game_info(&state).await;
        assert_eq!(
            view.wait_message.as_deref(),
            Some("New game is available! Select a card to join.")
        );
        assert!(matches!(
            start_calling(&state, &view.session_code).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
