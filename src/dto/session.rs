use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::PlayerRecord,
    dto::{format_system_time, validation::validate_card_grid},
    state::{
        allocation::CardAllocationTable,
        card::{CardGrid, format_call},
        session::{PlayerSession, Session},
        state_machine::SessionPhase,
    },
};

const IN_PROGRESS_FOR_PLAYER: &str =
    "Game is already in progress. Please wait for the current game to end before joining.";
const IN_PROGRESS_FOR_SPECTATOR: &str =
    "Game is currently in progress. You can watch or wait for the next round.";
const STARTING_SOON: &str = "Game is about to start! Please wait for the next round.";
const SELECT_CARD: &str = "Please select a card to join the game";
const OPEN_FOR_SPECTATOR: &str = "Game is open for players to join. Select a card to participate.";
const ENDED: &str = "This game has ended. A new round is open for card selection.";

/// Read projection of a session returned by every session endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    /// Public session code; `error` for degraded views.
    pub session_code: String,
    /// Phase name; `error` for degraded views.
    pub phase: String,
    pub countdown: u32,
    pub game_active: bool,
    /// Drawn numbers, ascending.
    pub called_numbers: Vec<u8>,
    /// Drawn numbers in call order.
    pub called_numbers_ordered: Vec<u8>,
    pub current_call: Option<u8>,
    /// Last call with its letter, e.g. `B-12`.
    pub current_call_with_letter: Option<String>,
    pub player_count: usize,
    /// Display name of the winner.
    pub winner: Option<String>,
    pub winning_card_numbers: Option<CardGrid>,
    /// Reserved card codes, ascending.
    pub selected_card_codes: Vec<u32>,
    /// Whether the player the view was rendered for holds a card.
    pub has_selected_card: bool,
    pub wait_message: Option<String>,
    /// Numbers are being called or a winner is known.
    pub game_in_progress: bool,
    pub players: Vec<PlayerInfo>,
    pub created_at: Option<String>,
}

/// Participant entry inside a [`SessionView`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlayerInfo {
    pub player_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_name: Option<String>,
    pub selected_card_code: Option<u32>,
    pub is_winner: bool,
}

impl From<&PlayerSession> for PlayerInfo {
    fn from(value: &PlayerSession) -> Self {
        Self {
            player_id: value.player.player_id,
            first_name: value.player.first_name.clone(),
            last_name: value.player.last_name.clone(),
            user_name: value.player.user_name.clone(),
            selected_card_code: value.selected_card_code,
            is_winner: value.is_winner,
        }
    }
}

impl SessionView {
    /// Render a session for `viewer` (or for a spectator when `None`).
    pub fn project(
        session: &Session,
        players: &IndexMap<Uuid, PlayerSession>,
        allocation: &CardAllocationTable,
        viewer: Option<i64>,
        join_cutoff: u32,
    ) -> Self {
        let phase = session.phase();
        let winner = session.winner.and_then(|id| players.get(&id));
        let viewer_has_card = viewer.map(|player_id| {
            players
                .values()
                .any(|p| p.player_id() == player_id && p.selected_card_code.is_some())
        });

        Self {
            session_code: session.code.clone(),
            phase: phase.as_str().to_owned(),
            countdown: session.countdown,
            game_active: session.game_active,
            called_numbers: session.called_numbers.iter().copied().collect(),
            called_numbers_ordered: session.called_numbers_ordered.clone(),
            current_call: session.current_call,
            current_call_with_letter: session.current_call.map(format_call),
            player_count: players.len(),
            winner: winner.map(PlayerSession::display_name),
            winning_card_numbers: winner.and_then(|p| p.card_grid.clone()),
            selected_card_codes: allocation.taken(),
            has_selected_card: viewer_has_card.unwrap_or(false),
            wait_message: wait_message(session, viewer_has_card, join_cutoff).map(str::to_owned),
            game_in_progress: phase == SessionPhase::GameRoom || session.winner.is_some(),
            players: players.values().map(PlayerInfo::from).collect(),
            created_at: Some(format_system_time(session.created_at)),
        }
    }

    /// Zeroed view returned by read paths that could not reach a session.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            session_code: "error".into(),
            phase: "error".into(),
            countdown: 0,
            game_active: false,
            called_numbers: Vec::new(),
            called_numbers_ordered: Vec::new(),
            current_call: None,
            current_call_with_letter: None,
            player_count: 0,
            winner: None,
            winning_card_numbers: None,
            selected_card_codes: Vec::new(),
            has_selected_card: false,
            wait_message: Some(message.into()),
            game_in_progress: false,
            players: Vec::new(),
            created_at: None,
        }
    }

    /// Whether numbers are being called (or about to be) in this view.
    pub fn is_in_progress(&self) -> bool {
        self.game_active || self.phase == SessionPhase::GameRoom.as_str()
    }
}

/// Status line for a viewer: `Some(true)` holds a card, `Some(false)` does not, `None` spectates.
fn wait_message(
    session: &Session,
    viewer_has_card: Option<bool>,
    join_cutoff: u32,
) -> Option<&'static str> {
    if session.phase() == SessionPhase::Ended {
        return Some(ENDED);
    }
    let in_progress = session.phase() == SessionPhase::GameRoom || session.game_active;
    let closing = session.countdown < join_cutoff;

    match viewer_has_card {
        Some(true) => None,
        Some(false) if in_progress => Some(IN_PROGRESS_FOR_PLAYER),
        Some(false) if closing => Some(STARTING_SOON),
        Some(false) => Some(SELECT_CARD),
        None if in_progress => Some(IN_PROGRESS_FOR_SPECTATOR),
        None if closing => Some(STARTING_SOON),
        None => Some(OPEN_FOR_SPECTATOR),
    }
}

/// Payload used to join the active session, optionally reserving a card.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    #[validate(range(min = 1))]
    pub player_id: i64,
    /// Card to reserve; when `card_numbers` is omitted the numbers come from the card batch.
    #[validate(range(min = 1))]
    pub card_code: Option<u32>,
    #[validate(custom(function = "validate_card_grid"))]
    #[schema(value_type = Option<Vec<Vec<u8>>>)]
    pub card_numbers: Option<CardGrid>,
}

/// Payload used to claim a win.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct BingoCallRequest {
    #[validate(range(min = 1))]
    pub player_id: i64,
}

/// Payload used to register a player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RegisterPlayerRequest {
    #[validate(range(min = 1))]
    pub player_id: i64,
    #[validate(length(max = 64))]
    pub first_name: Option<String>,
    #[validate(length(max = 64))]
    pub last_name: Option<String>,
    #[validate(length(max = 64))]
    pub user_name: Option<String>,
}

impl From<RegisterPlayerRequest> for PlayerRecord {
    fn from(value: RegisterPlayerRequest) -> Self {
        Self {
            player_id: value.player_id,
            first_name: value.first_name,
            last_name: value.last_name,
            user_name: value.user_name,
            registered_at: SystemTime::now(),
        }
    }
}

/// Registered player as returned by the player endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerResponse {
    pub player_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_name: Option<String>,
    pub registered_at: String,
}

impl From<PlayerRecord> for PlayerResponse {
    fn from(value: PlayerRecord) -> Self {
        Self {
            player_id: value.player_id,
            first_name: value.first_name,
            last_name: value.last_name,
            user_name: value.user_name,
            registered_at: format_system_time(value.registered_at),
        }
    }
}

/// Card codes of a session split by availability.
#[derive(Debug, Serialize, ToSchema)]
pub struct AvailableCardsResponse {
    pub session_code: String,
    pub available: Vec<u32>,
    pub available_count: usize,
    pub taken: Vec<u32>,
    /// Size of the card batch.
    pub total: usize,
}

/// One free card picked at random, if any is left.
#[derive(Debug, Serialize, ToSchema)]
pub struct RandomCardResponse {
    pub session_code: String,
    pub card_code: Option<u32>,
    #[schema(value_type = Option<Vec<Vec<u8>>>)]
    pub card_numbers: Option<CardGrid>,
    pub available_count: usize,
}

/// Generic acknowledgement for operator actions.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{session::test_support::player_with_card, state_machine::SessionEvent};

    fn session_with(countdown: u32) -> Session {
        Session::new("GAME_1".into(), countdown)
    }

    #[test]
    fn spectator_messages_follow_countdown() {
        let players = IndexMap::new();
        let table = CardAllocationTable::new("GAME_1");

        let open = SessionView::project(&session_with(30), &players, &table, None, 10);
        assert_eq!(open.wait_message.as_deref(), Some(OPEN_FOR_SPECTATOR));
        assert!(!open.game_in_progress);

        let closing = SessionView::project(&session_with(9), &players, &table, None, 10);
        assert_eq!(closing.wait_message.as_deref(), Some(STARTING_SOON));
    }

    #[test]
    fn player_with_card_gets_no_wait_message() {
        let mut session = session_with(20);
        let player = player_with_card(5, Some(12));
        let mut players = IndexMap::new();
        players.insert(player.id, player);
        let table = CardAllocationTable::new("GAME_1");

        let view = SessionView::project(&session, &players, &table, Some(5), 10);
        assert!(view.has_selected_card);
        assert_eq!(view.wait_message, None);

        let stranger = SessionView::project(&session, &players, &table, Some(6), 10);
        assert!(!stranger.has_selected_card);
        assert_eq!(stranger.wait_message.as_deref(), Some(SELECT_CARD));

        session.lifecycle.apply(SessionEvent::CountdownElapsed).unwrap();
        session.game_active = true;
        let running = SessionView::project(&session, &players, &table, Some(6), 10);
        assert_eq!(running.wait_message.as_deref(), Some(IN_PROGRESS_FOR_PLAYER));
        assert!(running.game_in_progress);
    }

    #[test]
    fn current_call_carries_letter() {
        let mut session = session_with(0);
        session.record_call(47);
        let view = SessionView::project(
            &session,
            &IndexMap::new(),
            &CardAllocationTable::new("GAME_1"),
            None,
            10,
        );
        assert_eq!(view.current_call_with_letter.as_deref(), Some("G-47"));
        assert_eq!(view.called_numbers_ordered, vec![47]);
    }

    #[test]
    fn degraded_view_is_zeroed() {
        let view = SessionView::degraded("Error loading game session");
        assert_eq!(view.phase, "error");
        assert_eq!(view.player_count, 0);
        assert!(view.players.is_empty());
    }
}
